//! 解码会话配置.
//!
//! 全部字段都有默认值, 可以从空的 JSON 对象反序列化.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use vde_core::format::{self, FourCc};
use vde_core::{VdeError, VdeResult};
use vde_scale::{DEFAULT_MODIFIER, block_height_from_modifier};

use crate::backend::PrimeFlags;

/// 解码会话配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionConfig {
    /// DRM 设备节点
    #[serde(default = "default_drm_device")]
    pub drm_device: PathBuf,
    /// VDE 设备节点
    #[serde(default = "default_vde_device")]
    pub vde_device: PathBuf,
    /// 码流暂存缓冲区字节数
    #[serde(default = "default_bitstream_size")]
    pub bitstream_size: usize,
    /// 安全上下文缓冲区字节数
    #[serde(default = "default_secure_size")]
    pub secure_size: usize,
    /// 输出像素格式 (fourcc 字符串)
    #[serde(default = "default_output_format")]
    pub output_format: String,
    /// 输出平铺修饰符
    #[serde(default = "default_modifier")]
    pub modifier: u64,
    /// PRIME 导出标志 (`DRM_CLOEXEC` / `DRM_RDWR` 的组合)
    #[serde(default)]
    pub export_flags: u32,
}

fn default_drm_device() -> PathBuf {
    PathBuf::from("/dev/dri/card0")
}

fn default_vde_device() -> PathBuf {
    PathBuf::from("/dev/tegra_vde")
}

fn default_bitstream_size() -> usize {
    256 * 1024
}

fn default_secure_size() -> usize {
    4 * 1024
}

fn default_output_format() -> String {
    "YU12".into()
}

fn default_modifier() -> u64 {
    DEFAULT_MODIFIER
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            drm_device: default_drm_device(),
            vde_device: default_vde_device(),
            bitstream_size: default_bitstream_size(),
            secure_size: default_secure_size(),
            output_format: default_output_format(),
            modifier: default_modifier(),
            export_flags: 0,
        }
    }
}

impl SessionConfig {
    /// 输出像素格式
    pub fn output_format(&self) -> VdeResult<FourCc> {
        let code: [u8; 4] = self.output_format.as_bytes().try_into().map_err(|_| {
            VdeError::InvalidArgument(format!(
                "output_format 必须是 4 个字符, 实际为 \"{}\"",
                self.output_format
            ))
        })?;
        Ok(FourCc::from_chars(code))
    }

    /// 导出标志
    pub fn export_flags(&self) -> VdeResult<PrimeFlags> {
        PrimeFlags::from_bits(self.export_flags).ok_or_else(|| {
            VdeError::InvalidArgument(format!(
                "export_flags 包含未知位: {:#x}",
                self.export_flags
            ))
        })
    }

    /// 校验配置, 在打开设备前调用
    pub fn validate(&self) -> VdeResult<()> {
        if self.bitstream_size == 0 {
            return Err(VdeError::InvalidArgument(
                "bitstream_size 不能为 0".into(),
            ));
        }
        if self.secure_size == 0 {
            return Err(VdeError::InvalidArgument("secure_size 不能为 0".into()));
        }
        format::require(self.output_format()?)?;
        block_height_from_modifier(self.modifier)?;
        self.export_flags()?;
        Ok(())
    }
}
