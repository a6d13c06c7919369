//! 测试辅助.

use vde_codec::DecoderConfig;
use vde_codec::h264::{PictureParameterSet, SequenceParameterSet};

/// 1280x720 Baseline 配置
pub(crate) fn sample_config() -> DecoderConfig {
    DecoderConfig {
        profile: 66,
        compatibility: 0xC0,
        level: 30,
        nal_length_size: 4,
        sps: SequenceParameterSet {
            profile_idc: 66,
            constraint_flags: 0xC0,
            level_idc: 31,
            seq_parameter_set_id: 0,
            log2_max_frame_num_minus4: 2,
            pic_order_cnt_type: 2,
            log2_max_pic_order_cnt_lsb_minus4: 0,
            max_num_ref_frames: 1,
            gaps_in_frame_num_value_allowed_flag: false,
            pic_width_in_mbs_minus1: 79,
            pic_height_in_map_units_minus1: 44,
            frame_mbs_only_flag: true,
            mb_adaptive_frame_field_flag: false,
            direct_8x8_inference_flag: true,
            frame_cropping: None,
            vui: None,
        },
        pps: PictureParameterSet {
            pic_parameter_set_id: 0,
            seq_parameter_set_id: 0,
            entropy_coding_mode_flag: false,
            bottom_field_pic_order_in_frame_present_flag: false,
            num_slice_groups_minus1: 0,
            num_ref_idx_l0_default_active_minus1: 2,
            num_ref_idx_l1_default_active_minus1: 0,
            weighted_pred_flag: false,
            weighted_bipred_idc: 0,
            pic_init_qp_minus26: -6,
            pic_init_qs_minus26: 0,
            chroma_qp_index_offset: -2,
            deblocking_filter_control_present_flag: true,
            constrained_intra_pred_flag: true,
            redundant_pic_cnt_present_flag: false,
            transform_8x8_mode_flag: false,
            second_chroma_qp_index_offset: -2,
        },
    }
}
