//! 线性 (行优先) 图像.
//!
//! 去平铺后的输出: 所有平面连续存放在一块缓冲区中,
//! 调用方通过宽高、pitch 和各平面偏移访问像素, 不直接按下标索引原始缓冲区.

use crate::format::{self, FourCc};
use crate::{VdeError, VdeResult};

/// 线性图像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearImage {
    /// 宽度 (像素)
    pub width: u32,
    /// 高度 (像素)
    pub height: u32,
    /// 像素格式
    pub format: FourCc,
    /// 首平面每行字节数
    pub pitch: u32,
    /// 各平面在 `data` 中的字节偏移
    pub offsets: [usize; 3],
    /// 全部平面的总字节数
    pub size: usize,
    data: Vec<u8>,
}

impl LinearImage {
    /// 创建全零图像
    ///
    /// 首平面 pitch = 宽度 × 首平面字节数, 其余平面按子采样后的尺寸紧接其后.
    pub fn new(width: u32, height: u32, format: FourCc) -> VdeResult<Self> {
        let info = format::require(format)?;
        let overflow =
            || VdeError::InvalidArgument(format!("图像尺寸溢出: {width}x{height} {format}"));

        let pitch = info.plane_bytes_per_row(0, width).ok_or_else(overflow)?;
        let mut size = (pitch as usize)
            .checked_mul(height as usize)
            .ok_or_else(overflow)?;
        let mut offsets = [0usize; 3];

        for (plane, offset) in offsets.iter_mut().enumerate().take(info.num_planes).skip(1) {
            *offset = size;
            let plane_pitch = info.plane_bytes_per_row(plane, width).ok_or_else(overflow)?;
            size = (plane_pitch as usize)
                .checked_mul(info.plane_height(plane, height) as usize)
                .and_then(|plane_size| size.checked_add(plane_size))
                .ok_or_else(overflow)?;
        }

        Ok(Self {
            width,
            height,
            format,
            pitch,
            offsets,
            size,
            data: vec![0; size],
        })
    }

    /// 平面数量
    pub fn plane_count(&self) -> usize {
        format::lookup(self.format).map_or(0, |info| info.num_planes)
    }

    /// 指定平面每行字节数
    pub fn plane_pitch(&self, plane: usize) -> usize {
        match format::lookup(self.format) {
            Some(info) if plane < info.num_planes => info
                .plane_bytes_per_row(plane, self.width)
                .map_or(0, |bytes| bytes as usize),
            _ => 0,
        }
    }

    /// 指定平面的行数
    pub fn plane_rows(&self, plane: usize) -> usize {
        match format::lookup(self.format) {
            Some(info) if plane < info.num_planes => info.plane_height(plane, self.height) as usize,
            _ => 0,
        }
    }

    /// 指定平面的像素数据
    pub fn plane(&self, plane: usize) -> &[u8] {
        let len = self.plane_pitch(plane) * self.plane_rows(plane);
        if len == 0 {
            return &[];
        }
        let start = self.offsets[plane];
        &self.data[start..start + len]
    }

    /// 指定平面的可变像素数据
    pub fn plane_mut(&mut self, plane: usize) -> &mut [u8] {
        let len = self.plane_pitch(plane) * self.plane_rows(plane);
        if len == 0 {
            return &mut [];
        }
        let start = self.offsets[plane];
        &mut self.data[start..start + len]
    }

    /// 完整像素缓冲区
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// 完整可变像素缓冲区
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}
