//! # vde-core
//!
//! VDE 解码框架核心库, 提供基础类型定义、错误处理和工具函数.
//!
//! - [`bitreader`]: 大端比特流读取与 Exp-Golomb 变长码
//! - [`format`]: DRM fourcc 像素格式注册表
//! - [`image`]: 去平铺后的线性图像

pub mod bitreader;
pub mod error;
pub mod format;
pub mod image;

// 重导出常用类型
pub use bitreader::BitReader;
pub use error::{VdeError, VdeResult};
pub use format::{DRM_FORMAT_YUV420, FormatInfo, FourCc};
pub use image::LinearImage;
