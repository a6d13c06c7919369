//! 像素格式注册表.
//!
//! 以 DRM fourcc 标识像素格式, 静态登记每种格式的平面数、
//! 每平面字节数以及色度子采样系数. 表为进程级常量, 运行期不可修改.

use std::fmt;

use crate::{VdeError, VdeResult};

/// DRM fourcc 像素格式标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub u32);

impl FourCc {
    /// 由 4 个 ASCII 字符构造 (小端排列, 与 `drm_fourcc.h` 一致)
    pub const fn from_chars(code: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(code))
    }

    /// 原始 32 位值
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_le_bytes();
        if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            write!(
                f,
                "{}{}{}{}",
                bytes[0] as char, bytes[1] as char, bytes[2] as char, bytes[3] as char
            )
        } else {
            write!(f, "{:#010x}", self.0)
        }
    }
}

/// YUV 4:2:0 三平面格式, 8 位 (`YU12`)
pub const DRM_FORMAT_YUV420: FourCc = FourCc::from_chars(*b"YU12");

/// 像素格式描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    /// 格式标识
    pub format: FourCc,
    /// 平面数量 (1-3)
    pub num_planes: usize,
    /// 每平面每像素字节数
    pub cpp: [u32; 3],
    /// 水平色度子采样系数
    pub hsub: u32,
    /// 垂直色度子采样系数
    pub vsub: u32,
}

impl FormatInfo {
    /// 指定平面的像素宽度 (首平面之外应用子采样)
    pub fn plane_width(&self, plane: usize, width: u32) -> u32 {
        if plane == 0 { width } else { width / self.hsub }
    }

    /// 指定平面的像素高度 (首平面之外应用子采样)
    pub fn plane_height(&self, plane: usize, height: u32) -> u32 {
        if plane == 0 { height } else { height / self.vsub }
    }

    /// 指定平面每行的有效字节数, 溢出 `u32` 时返回 `None`
    pub fn plane_bytes_per_row(&self, plane: usize, width: u32) -> Option<u32> {
        self.plane_width(plane, width).checked_mul(self.cpp[plane])
    }
}

static FORMATS: [FormatInfo; 1] = [FormatInfo {
    format: DRM_FORMAT_YUV420,
    num_planes: 3,
    cpp: [1, 1, 1],
    hsub: 2,
    vsub: 2,
}];

/// 查找像素格式描述
pub fn lookup(format: FourCc) -> Option<&'static FormatInfo> {
    FORMATS.iter().find(|info| info.format == format)
}

/// 查找像素格式描述, 未注册时返回 [`VdeError::UnknownFormat`]
pub fn require(format: FourCc) -> VdeResult<&'static FormatInfo> {
    lookup(format).ok_or(VdeError::UnknownFormat(format.value()))
}
