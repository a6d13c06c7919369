//! # vde-codec
//!
//! VDE 解码框架码流解析库.
//!
//! 硬件解码只需要参数集中的一小部分字段, 本 crate 负责从解码器配置记录中
//! 提取这些字段, 并拒绝超出 Baseline 子集的码流.
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use vde_codec::h264::parse_config;
//!
//! # fn demo(extradata: &[u8]) -> vde_core::VdeResult<()> {
//! let config = parse_config(extradata)?;
//! println!("{}x{}", config.sps.width(), config.sps.height());
//! # Ok(())
//! # }
//! ```

pub mod h264;

// 重导出常用类型
pub use h264::{DecoderConfig, NalUnit, NalUnitType, PictureParameterSet, SequenceParameterSet};
