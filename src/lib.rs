//! # VDE
//!
//! 纯 Rust 实现的 Tegra VDE 硬件 H.264 Baseline 解码框架.
//!
//! - **码流解析**: 从解码器配置记录中提取 SPS/PPS, 拒绝 Baseline 以外的码流
//! - **设备访问**: GEM 缓冲区管理, 向内核驱动提交解码请求
//! - **帧转换**: 块线性平铺帧与线性图像之间的互相转换
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use vde::device::{DecodeSession, SessionConfig};
//!
//! # fn demo(extradata: &[u8], slice: &[u8]) -> vde::core::VdeResult<()> {
//! let config = vde::codec::h264::parse_config(extradata)?;
//! let mut session = DecodeSession::open_tegra(SessionConfig::default())?;
//!
//! let mut frame = session.decode(&config, slice)?;
//! let image = session.detile(&mut frame)?;
//! println!("{}x{} {}", image.width, image.height, image.format);
//! session.release_frame(frame)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `vde-core` | 错误类型, 比特读取器, 像素格式, 线性图像 |
//! | `vde-codec` | H.264 NAL 与参数集解析 |
//! | `vde-scale` | 块线性布局与去平铺 |
//! | `vde-device` | GEM 缓冲区与硬件解码会话 |

/// 核心类型与工具
pub use vde_core as core;

/// H.264 码流解析
pub use vde_codec as codec;

/// 块线性布局与去平铺
pub use vde_scale as scale;

/// 设备访问与解码会话
pub use vde_device as device;

/// 获取版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
