//! 解码请求.
//!
//! 与后端无关的安全表示, 由 [`TegraBackend`](crate::TegraBackend) 转换为驱动 ABI 结构.
//! 参数直接取自 [`DecoderConfig`], 不做二次推导.

use std::os::fd::RawFd;

use bitflags::bitflags;
use vde_codec::DecoderConfig;
use vde_core::{VdeError, VdeResult};

bitflags! {
    /// 解码帧标志 (`FLAG_B_FRAME` / `FLAG_REFERENCE`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FrameFlags: u32 {
        /// B 帧
        const B_FRAME   = 0x1;
        /// 参考帧
        const REFERENCE = 0x2;
    }
}

/// 缓冲区引用: 导出的文件描述符 + 字节偏移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRef {
    pub fd: RawFd,
    pub offset: u32,
}

/// DPB 帧描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub y_fd: RawFd,
    pub cb_fd: RawFd,
    pub cr_fd: RawFd,
    /// 无辅助缓冲区时为 -1
    pub aux_fd: RawFd,
    pub y_offset: u32,
    pub cb_offset: u32,
    pub cr_offset: u32,
    pub aux_offset: u32,
    pub frame_num: u32,
    pub flags: FrameFlags,
    /// 平铺修饰符
    pub modifier: u64,
}

/// 由 SPS/PPS 展开的硬件解码参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct H264DecodeParams {
    pub baseline_profile: bool,
    pub level_idc: u32,
    pub log2_max_pic_order_cnt_lsb: u32,
    pub log2_max_frame_num: u32,
    pub pic_order_cnt_type: u32,
    pub direct_8x8_inference_flag: bool,
    pub pic_width_in_mbs: u32,
    pub pic_height_in_mbs: u32,
    /// 初始 QP (0-51)
    pub pic_init_qp: u32,
    pub deblocking_filter_control_present_flag: bool,
    pub constrained_intra_pred_flag: bool,
    /// 5 位补码表示的色度 QP 偏移
    pub chroma_qp_index_offset: u32,
    pub pic_order_present_flag: bool,
    pub num_ref_idx_l0_active_minus1: u32,
    pub num_ref_idx_l1_active_minus1: u32,
}

impl H264DecodeParams {
    /// 从解码器配置展开参数
    pub fn from_config(config: &DecoderConfig) -> VdeResult<Self> {
        let sps = &config.sps;
        let pps = &config.pps;

        let qp = pps.pic_init_qp();
        if !(0..=51).contains(&qp) {
            return Err(VdeError::InvalidData(format!(
                "H.264: PPS pic_init_qp 超出范围, pic_init_qp_minus26={}",
                pps.pic_init_qp_minus26
            )));
        }

        Ok(Self {
            baseline_profile: true,
            level_idc: u32::from(sps.level_idc),
            log2_max_pic_order_cnt_lsb: sps.log2_max_pic_order_cnt_lsb_minus4.saturating_add(4),
            log2_max_frame_num: sps.log2_max_frame_num(),
            pic_order_cnt_type: sps.pic_order_cnt_type,
            direct_8x8_inference_flag: sps.direct_8x8_inference_flag,
            pic_width_in_mbs: sps.width_in_mbs(),
            pic_height_in_mbs: sps.height_in_mbs(),
            pic_init_qp: qp as u32,
            deblocking_filter_control_present_flag: pps.deblocking_filter_control_present_flag,
            constrained_intra_pred_flag: pps.constrained_intra_pred_flag,
            chroma_qp_index_offset: (pps.chroma_qp_index_offset as u32) & 0x1F,
            pic_order_present_flag: pps.bottom_field_pic_order_in_frame_present_flag,
            num_ref_idx_l0_active_minus1: pps.num_ref_idx_l0_default_active_minus1,
            num_ref_idx_l1_active_minus1: pps.num_ref_idx_l1_default_active_minus1,
        })
    }
}

/// 一次 H.264 解码请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeRequest {
    /// 码流暂存缓冲区
    pub bitstream: BufferRef,
    /// 安全上下文缓冲区
    pub secure: BufferRef,
    /// DPB 帧数组, 首项为输出帧
    pub frames: Vec<FrameDescriptor>,
    /// POC 早于当前帧的参考帧数量
    pub ref_frames_with_earlier_poc: u32,
    pub params: H264DecodeParams,
}
