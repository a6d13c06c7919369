//! 块线性 (block-linear) 布局计算.
//!
//! # 寻址结构
//! ```text
//! GOB    : 64 字节 × 8 行 = 512 字节
//! block  : 1 个 GOB 宽, block_height 个 GOB 高
//! 一行 block 覆盖 8 × block_height 像素行, 宽度为 pitch / 64 个 GOB
//! ```
//!
//! GOB 内部再按 32×2 → 16×2 → 16×1 的顺序细分, 连续 16 字节在内存中总是相邻,
//! 因此去平铺以 16 字节为最小搬运单位.

use vde_core::format::{self, FourCc};
use vde_core::{VdeError, VdeResult};

/// GOB 宽度 (字节)
pub const GOB_WIDTH: u32 = 64;
/// GOB 高度 (行)
pub const GOB_HEIGHT: u32 = 8;
/// GOB 字节数
pub const GOB_SIZE: usize = 512;

/// NVIDIA 修饰符厂商编号 (`DRM_FORMAT_MOD_VENDOR_NVIDIA`)
pub const MODIFIER_VENDOR_NVIDIA: u64 = 0x03;

/// NVIDIA 16Bx2 块线性修饰符
///
/// `log2_block_height` 取 0-5, 对应块高 1/2/4/8/16/32 个 GOB.
pub const fn nvidia_16bx2_block(log2_block_height: u64) -> u64 {
    (MODIFIER_VENDOR_NVIDIA << 56) | 0x10 | (log2_block_height & 0xF)
}

/// 默认输出修饰符: 块高 16 个 GOB
pub const DEFAULT_MODIFIER: u64 = nvidia_16bx2_block(4);

/// 从修饰符解析块高 (以 GOB 计)
pub fn block_height_from_modifier(modifier: u64) -> VdeResult<u32> {
    let vendor = modifier >> 56;
    if vendor != MODIFIER_VENDOR_NVIDIA || modifier & 0x10 == 0 {
        return Err(VdeError::InvalidArgument(format!(
            "不是 NVIDIA 块线性修饰符, modifier={modifier:#018x}"
        )));
    }

    let log2 = (modifier & 0xF) as u32;
    if log2 > 5 {
        return Err(VdeError::InvalidArgument(format!(
            "块高编码超出范围, modifier={modifier:#018x}, log2_block_height={log2}"
        )));
    }

    Ok(1 << log2)
}

/// 平铺帧布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiledLayout {
    pub width: u32,
    pub height: u32,
    pub format: FourCc,
    pub modifier: u64,
    /// 块高 (GOB 数)
    pub block_height: u32,
    /// 首平面每行字节数 (64 字节对齐)
    pub pitch: u32,
    /// 平面数量
    pub num_planes: usize,
    /// 各平面每行字节数
    pub plane_pitches: [u32; 3],
    /// 各平面按 8 × block_height 对齐后的行数
    pub plane_heights: [u32; 3],
    /// 各平面的字节偏移
    pub offsets: [usize; 3],
    /// 缓冲区总字节数
    pub size: usize,
}

impl TiledLayout {
    /// 指定平面的字节数
    pub fn plane_size(&self, plane: usize) -> usize {
        self.plane_pitches[plane] as usize * self.plane_heights[plane] as usize
    }

    /// 指定平面内 (x 字节, y 行) 的平铺偏移
    pub fn tiled_offset(&self, plane: usize, x: u32, y: u32) -> usize {
        tiled_offset(x, y, self.plane_pitches[plane], self.block_height)
    }
}

/// 计算平铺帧布局
pub fn layout(width: u32, height: u32, format: FourCc, modifier: u64) -> VdeResult<TiledLayout> {
    let info = format::require(format)?;
    let block_height = block_height_from_modifier(modifier)?;
    let align_rows = GOB_HEIGHT * block_height;

    let mut plane_pitches = [0u32; 3];
    let mut plane_heights = [0u32; 3];
    let mut offsets = [0usize; 3];
    let mut size = 0usize;

    let overflow = || {
        VdeError::InvalidArgument(format!(
            "平铺布局尺寸溢出: {width}x{height} {format}, block_height={block_height}"
        ))
    };

    for plane in 0..info.num_planes {
        let pitch = info
            .plane_bytes_per_row(plane, width)
            .and_then(|bytes| bytes.checked_next_multiple_of(GOB_WIDTH))
            .ok_or_else(overflow)?;
        let rows = info
            .plane_height(plane, height)
            .checked_next_multiple_of(align_rows)
            .ok_or_else(overflow)?;

        plane_pitches[plane] = pitch;
        plane_heights[plane] = rows;
        offsets[plane] = size;
        size = (pitch as usize)
            .checked_mul(rows as usize)
            .and_then(|plane_size| size.checked_add(plane_size))
            .ok_or_else(overflow)?;
    }

    Ok(TiledLayout {
        width,
        height,
        format,
        modifier,
        block_height,
        pitch: plane_pitches[0],
        num_planes: info.num_planes,
        plane_pitches,
        plane_heights,
        offsets,
        size,
    })
}

/// 块线性寻址: 平面内 (x 字节, y 行) → 字节偏移
///
/// `pitch` 须为 64 的倍数.
#[inline]
pub fn tiled_offset(x: u32, y: u32, pitch: u32, block_height: u32) -> usize {
    let gobs_per_row = (pitch / GOB_WIDTH) as usize;
    let bh = block_height as usize;
    let rows_per_block = GOB_HEIGHT as usize * bh;
    let (x, y) = (x as usize, y as usize);

    let gob = (y / rows_per_block) * gobs_per_row * bh + (x / 64) * bh + (y % rows_per_block) / 8;

    gob * GOB_SIZE
        + ((x % 64) / 32) * 256
        + ((y % 8) / 2) * 64
        + ((x % 32) / 16) * 32
        + (y % 2) * 16
        + (x % 16)
}
