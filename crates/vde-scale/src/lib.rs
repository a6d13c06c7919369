//! # vde-scale
//!
//! VDE 解码框架平铺帧转换库.
//!
//! 硬件解码输出为 NVIDIA 16Bx2 块线性布局, 本 crate 提供:
//! - 布局计算 (pitch, 平面偏移, 块高)
//! - 块线性 → 线性 去平铺
//! - 线性 → 块线性 平铺 (用于软件生成测试帧)

pub mod detile;
pub mod layout;

pub use detile::{detile, tile, tile_into};
pub use layout::{
    DEFAULT_MODIFIER, TiledLayout, block_height_from_modifier, layout, nvidia_16bx2_block,
    tiled_offset,
};
