//! 块线性 ↔ 线性 转换.
//!
//! 以 16 字节为单位搬运: 每个单位在平铺缓冲区中连续, 只需按块线性公式
//! 计算起始地址. 平面行宽必须是 16 的倍数, 否则视为配置错误.

use log::trace;
use vde_core::{LinearImage, VdeError, VdeResult};

use crate::layout::TiledLayout;

/// 搬运单位 (字节)
pub const STRIDE_UNIT: usize = 16;

/// 将平铺缓冲区转换为线性图像
///
/// `src` 至少包含 `layout.size` 字节.
pub fn detile(src: &[u8], layout: &TiledLayout) -> VdeResult<LinearImage> {
    check_source_len(src.len(), layout)?;

    let mut image = LinearImage::new(layout.width, layout.height, layout.format)?;

    for plane in 0..layout.num_planes {
        let row_bytes = image.plane_pitch(plane);
        let rows = image.plane_rows(plane);
        check_row_alignment(plane, row_bytes)?;

        let base = layout.offsets[plane];
        let dst = image.plane_mut(plane);
        for y in 0..rows {
            let line = &mut dst[y * row_bytes..(y + 1) * row_bytes];
            for (unit, chunk) in line.chunks_exact_mut(STRIDE_UNIT).enumerate() {
                let x = (unit * STRIDE_UNIT) as u32;
                let offset = base + layout.tiled_offset(plane, x, y as u32);
                chunk.copy_from_slice(&src[offset..offset + STRIDE_UNIT]);
            }
        }
    }

    trace!(
        "去平铺完成: {}x{}, block_height={}, tiled_size={}",
        layout.width, layout.height, layout.block_height, layout.size
    );

    Ok(image)
}

/// 将线性图像写成平铺缓冲区 (detile 的逆变换)
///
/// 对齐填充区域保持为零.
pub fn tile(image: &LinearImage, layout: &TiledLayout) -> VdeResult<Vec<u8>> {
    let mut dst = vec![0u8; layout.size];
    tile_into(image, layout, &mut dst)?;
    Ok(dst)
}

/// 将线性图像写入已有的平铺缓冲区
pub fn tile_into(image: &LinearImage, layout: &TiledLayout, dst: &mut [u8]) -> VdeResult<()> {
    if (image.width, image.height, image.format) != (layout.width, layout.height, layout.format)
    {
        return Err(VdeError::InvalidArgument(format!(
            "图像与布局不匹配: image={}x{} {}, layout={}x{} {}",
            image.width, image.height, image.format, layout.width, layout.height, layout.format
        )));
    }
    check_source_len(dst.len(), layout)?;

    for plane in 0..layout.num_planes {
        let row_bytes = image.plane_pitch(plane);
        check_row_alignment(plane, row_bytes)?;

        let base = layout.offsets[plane];
        let src = image.plane(plane);
        for (y, line) in src.chunks_exact(row_bytes).enumerate() {
            for (unit, chunk) in line.chunks_exact(STRIDE_UNIT).enumerate() {
                let x = (unit * STRIDE_UNIT) as u32;
                let offset = base + layout.tiled_offset(plane, x, y as u32);
                dst[offset..offset + STRIDE_UNIT].copy_from_slice(chunk);
            }
        }
    }

    Ok(())
}

fn check_source_len(len: usize, layout: &TiledLayout) -> VdeResult<()> {
    if len < layout.size {
        return Err(VdeError::InvalidArgument(format!(
            "平铺缓冲区过小: len={len}, 需要 {}",
            layout.size
        )));
    }
    Ok(())
}

fn check_row_alignment(plane: usize, row_bytes: usize) -> VdeResult<()> {
    if row_bytes == 0 || row_bytes % STRIDE_UNIT != 0 {
        return Err(VdeError::InvalidArgument(format!(
            "平面 {plane} 行宽 {row_bytes} 字节不是 {STRIDE_UNIT} 的倍数"
        )));
    }
    Ok(())
}
