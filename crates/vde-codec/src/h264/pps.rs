//! H.264 PPS (Picture Parameter Set) 解析器.
//!
//! 只接受单个 slice group 且不带量化矩阵的 PPS.
//! transform_8x8_mode_flag 之后的尾部字段仅在 `more_rbsp_data()` 为真时读取.

use std::ops::RangeInclusive;

use log::debug;
use vde_core::bitreader::BitReader;
use vde_core::{VdeError, VdeResult};

use super::check_range;
use super::sps::MAX_SPS_ID;

/// pic_parameter_set_id 上限
pub const MAX_PPS_ID: u32 = 255;

/// num_ref_idx_l*_default_active_minus1 上限
pub const MAX_NUM_REF_IDX_ACTIVE_MINUS1: u32 = 31;

/// pic_init_qp_minus26 / pic_init_qs_minus26 取值范围 (8 位样本)
pub const QP_MINUS26_RANGE: RangeInclusive<i32> = -26..=25;

/// chroma_qp_index_offset 取值范围
pub const CHROMA_QP_OFFSET_RANGE: RangeInclusive<i32> = -12..=12;

/// PPS 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureParameterSet {
    pub pic_parameter_set_id: u32,
    /// 所属 SPS 的 seq_parameter_set_id
    pub seq_parameter_set_id: u32,
    /// 0=CAVLC, 1=CABAC
    pub entropy_coding_mode_flag: bool,
    pub bottom_field_pic_order_in_frame_present_flag: bool,
    /// 恒为 0
    pub num_slice_groups_minus1: u32,
    pub num_ref_idx_l0_default_active_minus1: u32,
    pub num_ref_idx_l1_default_active_minus1: u32,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_idc: u8,
    pub pic_init_qp_minus26: i32,
    pub pic_init_qs_minus26: i32,
    pub chroma_qp_index_offset: i32,
    pub deblocking_filter_control_present_flag: bool,
    pub constrained_intra_pred_flag: bool,
    pub redundant_pic_cnt_present_flag: bool,
    /// 尾部字段缺省时为 false
    pub transform_8x8_mode_flag: bool,
    /// 尾部字段缺省时等于 `chroma_qp_index_offset`
    pub second_chroma_qp_index_offset: i32,
}

impl PictureParameterSet {
    /// 初始亮度 QP (pic_init_qp_minus26 + 26)
    pub fn pic_init_qp(&self) -> i32 {
        self.pic_init_qp_minus26.saturating_add(26)
    }
}

/// 从 RBSP 数据解析 PPS
pub fn parse_pps(rbsp: &[u8]) -> VdeResult<PictureParameterSet> {
    let mut br = BitReader::new(rbsp);

    let pic_parameter_set_id =
        check_range("PPS", "pic_parameter_set_id", br.read_ue()?, 0..=MAX_PPS_ID)?;
    let seq_parameter_set_id =
        check_range("PPS", "seq_parameter_set_id", br.read_ue()?, 0..=MAX_SPS_ID)?;
    let entropy_coding_mode_flag = br.read_flag()?;
    let bottom_field_pic_order_in_frame_present_flag = br.read_flag()?;

    let num_slice_groups_minus1 = br.read_ue()?;
    if num_slice_groups_minus1 > 0 {
        return Err(VdeError::Unsupported(format!(
            "H.264: PPS num_slice_groups_minus1={num_slice_groups_minus1}, 仅支持单个 slice group"
        )));
    }

    let num_ref_idx_l0_default_active_minus1 = check_range(
        "PPS",
        "num_ref_idx_l0_default_active_minus1",
        br.read_ue()?,
        0..=MAX_NUM_REF_IDX_ACTIVE_MINUS1,
    )?;
    let num_ref_idx_l1_default_active_minus1 = check_range(
        "PPS",
        "num_ref_idx_l1_default_active_minus1",
        br.read_ue()?,
        0..=MAX_NUM_REF_IDX_ACTIVE_MINUS1,
    )?;
    let weighted_pred_flag = br.read_flag()?;
    let weighted_bipred_idc = br.read_u8(2)?;
    let pic_init_qp_minus26 =
        check_range("PPS", "pic_init_qp_minus26", br.read_se()?, QP_MINUS26_RANGE)?;
    let pic_init_qs_minus26 =
        check_range("PPS", "pic_init_qs_minus26", br.read_se()?, QP_MINUS26_RANGE)?;
    let chroma_qp_index_offset = check_range(
        "PPS",
        "chroma_qp_index_offset",
        br.read_se()?,
        CHROMA_QP_OFFSET_RANGE,
    )?;
    let deblocking_filter_control_present_flag = br.read_flag()?;
    let constrained_intra_pred_flag = br.read_flag()?;
    let redundant_pic_cnt_present_flag = br.read_flag()?;

    let mut transform_8x8_mode_flag = false;
    let mut second_chroma_qp_index_offset = chroma_qp_index_offset;

    if br.more_rbsp_data() {
        transform_8x8_mode_flag = br.read_flag()?;
        if br.read_flag()? {
            return Err(VdeError::Unsupported(
                "H.264: PPS pic_scaling_matrix_present_flag=1, 不支持量化矩阵".into(),
            ));
        }
        second_chroma_qp_index_offset = check_range(
            "PPS",
            "second_chroma_qp_index_offset",
            br.read_se()?,
            CHROMA_QP_OFFSET_RANGE,
        )?;
    }

    let pps = PictureParameterSet {
        pic_parameter_set_id,
        seq_parameter_set_id,
        entropy_coding_mode_flag,
        bottom_field_pic_order_in_frame_present_flag,
        num_slice_groups_minus1,
        num_ref_idx_l0_default_active_minus1,
        num_ref_idx_l1_default_active_minus1,
        weighted_pred_flag,
        weighted_bipred_idc,
        pic_init_qp_minus26,
        pic_init_qs_minus26,
        chroma_qp_index_offset,
        deblocking_filter_control_present_flag,
        constrained_intra_pred_flag,
        redundant_pic_cnt_present_flag,
        transform_8x8_mode_flag,
        second_chroma_qp_index_offset,
    };

    debug!(
        "H.264: PPS id={}, sps_id={}, cabac={}, qp={}, chroma_qp_offset={}",
        pps.pic_parameter_set_id,
        pps.seq_parameter_set_id,
        pps.entropy_coding_mode_flag,
        pps.pic_init_qp(),
        pps.chroma_qp_index_offset,
    );

    Ok(pps)
}
