//! H.264/AVC Baseline 码流解析器.
//!
//! - NAL 单元分割与类型识别
//! - SPS / PPS 解析 (Baseline 子集)
//! - 解码器配置记录解析与构建

#[cfg(test)]
mod bitwriter;
pub mod config;
pub mod nal;
pub mod pps;
pub mod sps;

pub use config::{DecoderConfig, parse_config};
pub use nal::{
    NalUnit, NalUnitType, build_config_blob, remove_emulation_prevention, split_annex_b,
    split_length_prefixed,
};
pub use pps::{PictureParameterSet, parse_pps};
pub use sps::{FrameCropping, SequenceParameterSet, VuiParameters, parse_sps};

use std::fmt;
use std::ops::RangeInclusive;

use vde_core::{VdeError, VdeResult};

/// 检查语法元素取值范围, 越界返回 [`VdeError::InvalidData`]
pub(crate) fn check_range<T>(
    unit: &str,
    field: &str,
    value: T,
    range: RangeInclusive<T>,
) -> VdeResult<T>
where
    T: PartialOrd + Copy + fmt::Display,
{
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(VdeError::InvalidData(format!(
            "H.264: {unit} {field}={value} 超出范围 [{}, {}]",
            range.start(),
            range.end()
        )))
    }
}
