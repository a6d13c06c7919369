//! H.264 SPS (Sequence Parameter Set) 解析器.
//!
//! 仅支持 Baseline (profile_idc=66) 且 pic_order_cnt_type=2 的序列:
//! 硬件解码路径不实现 POC 类型 0/1 所需的 lsb/周期字段.
//!
//! 输入为去掉 NAL 头部与 emulation prevention 字节后的 RBSP.

use log::debug;
use vde_core::bitreader::BitReader;
use vde_core::{VdeError, VdeResult};

use super::check_range;

/// Baseline profile 的 profile_idc
pub const PROFILE_BASELINE: u8 = 66;

/// seq_parameter_set_id 上限
pub const MAX_SPS_ID: u32 = 31;

/// log2_max_frame_num_minus4 上限 (MaxFrameNum ≤ 2^16)
pub const MAX_LOG2_MAX_FRAME_NUM_MINUS4: u32 = 12;

/// max_num_ref_frames 上限
pub const MAX_NUM_REF_FRAMES: u32 = 16;

/// 单个方向的宏块数上限: level 6.2 下 sqrt(8 × MaxFS) 取整
pub const MAX_DIMENSION_MBS: u32 = 1055;

/// 扩展 SAR 标记 (aspect_ratio_idc == Extended_SAR)
pub const EXTENDED_SAR: u8 = 255;

/// 预定义的 SAR 表 (ITU-T H.264 表 E-1)
const SAR_TABLE: [(u16, u16); 17] = [
    (0, 0),    // 0: 未指定
    (1, 1),    // 1: 1:1
    (12, 11),  // 2: 12:11
    (10, 11),  // 3: 10:11
    (16, 11),  // 4: 16:11
    (40, 33),  // 5: 40:33
    (24, 11),  // 6: 24:11
    (20, 11),  // 7: 20:11
    (32, 11),  // 8: 32:11
    (80, 33),  // 9: 80:33
    (18, 11),  // 10: 18:11
    (15, 11),  // 11: 15:11
    (64, 33),  // 12: 64:33
    (160, 99), // 13: 160:99
    (4, 3),    // 14: 4:3
    (3, 2),    // 15: 3:2
    (2, 1),    // 16: 2:1
];

/// 帧裁剪偏移 (以裁剪单位计)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCropping {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

/// VUI 参数
///
/// 解析到 timing_info 为止, HRD 及其后的字段不读取.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VuiParameters {
    pub aspect_ratio_info_present_flag: bool,
    pub aspect_ratio_idc: u8,
    /// 仅 aspect_ratio_idc == 255 时有效
    pub sar_width: u16,
    /// 仅 aspect_ratio_idc == 255 时有效
    pub sar_height: u16,
    pub overscan_info_present_flag: bool,
    pub overscan_appropriate_flag: bool,
    pub video_signal_type_present_flag: bool,
    pub video_format: u8,
    pub video_full_range_flag: bool,
    pub colour_description_present_flag: bool,
    pub colour_primaries: u8,
    pub transfer_characteristics: u8,
    pub matrix_coefficients: u8,
    pub chroma_loc_info_present_flag: bool,
    pub chroma_sample_loc_type_top_field: u32,
    pub chroma_sample_loc_type_bottom_field: u32,
    pub timing_info_present_flag: bool,
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub fixed_frame_rate_flag: bool,
}

impl VuiParameters {
    /// 像素宽高比
    ///
    /// 未携带、未指定或保留值时返回 `None`.
    pub fn sample_aspect_ratio(&self) -> Option<(u16, u16)> {
        if !self.aspect_ratio_info_present_flag {
            return None;
        }
        let (w, h) = if self.aspect_ratio_idc == EXTENDED_SAR {
            (self.sar_width, self.sar_height)
        } else {
            *SAR_TABLE.get(usize::from(self.aspect_ratio_idc))?
        };
        (w > 0 && h > 0).then_some((w, h))
    }
}

/// SPS 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceParameterSet {
    /// profile_idc (恒为 66)
    pub profile_idc: u8,
    /// constraint_set 标志字节
    pub constraint_flags: u8,
    /// level_idc (如 30=3.0)
    pub level_idc: u8,
    pub seq_parameter_set_id: u32,
    pub log2_max_frame_num_minus4: u32,
    /// 图像顺序计数类型 (恒为 2)
    pub pic_order_cnt_type: u32,
    /// 仅 pic_order_cnt_type == 0 时出现于码流, 此处恒为 0
    pub log2_max_pic_order_cnt_lsb_minus4: u32,
    pub max_num_ref_frames: u32,
    pub gaps_in_frame_num_value_allowed_flag: bool,
    pub pic_width_in_mbs_minus1: u32,
    pub pic_height_in_map_units_minus1: u32,
    pub frame_mbs_only_flag: bool,
    /// 仅 frame_mbs_only_flag == 0 时出现
    pub mb_adaptive_frame_field_flag: bool,
    pub direct_8x8_inference_flag: bool,
    /// frame_cropping_flag 置位时的裁剪偏移
    pub frame_cropping: Option<FrameCropping>,
    /// vui_parameters_present_flag 置位时的 VUI 参数
    pub vui: Option<VuiParameters>,
}

impl SequenceParameterSet {
    /// 宽度 (宏块数)
    pub fn width_in_mbs(&self) -> u32 {
        self.pic_width_in_mbs_minus1.saturating_add(1)
    }

    /// 高度 (宏块数)
    pub fn height_in_mbs(&self) -> u32 {
        self.pic_height_in_map_units_minus1.saturating_add(1)
    }

    /// 宽度 (像素, 未裁剪)
    pub fn width(&self) -> u32 {
        self.width_in_mbs().saturating_mul(16)
    }

    /// 高度 (像素, 未裁剪)
    pub fn height(&self) -> u32 {
        self.height_in_mbs().saturating_mul(16)
    }

    /// log2(MaxFrameNum)
    pub fn log2_max_frame_num(&self) -> u32 {
        self.log2_max_frame_num_minus4.saturating_add(4)
    }
}

/// 从 RBSP 数据解析 SPS
///
/// 失败时不返回任何部分结果.
pub fn parse_sps(rbsp: &[u8]) -> VdeResult<SequenceParameterSet> {
    let mut br = BitReader::new(rbsp);

    let profile_idc = br.read_u8(8)?;
    let constraint_flags = br.read_u8(8)?;
    let level_idc = br.read_u8(8)?;
    let seq_parameter_set_id = br.read_ue()?;

    if profile_idc != PROFILE_BASELINE {
        return Err(VdeError::UnsupportedProfile(profile_idc));
    }
    check_range("SPS", "seq_parameter_set_id", seq_parameter_set_id, 0..=MAX_SPS_ID)?;

    let log2_max_frame_num_minus4 = check_range(
        "SPS",
        "log2_max_frame_num_minus4",
        br.read_ue()?,
        0..=MAX_LOG2_MAX_FRAME_NUM_MINUS4,
    )?;
    let pic_order_cnt_type = br.read_ue()?;
    if pic_order_cnt_type != 2 {
        return Err(VdeError::Unsupported(format!(
            "H.264: SPS pic_order_cnt_type={pic_order_cnt_type}, 仅支持 2"
        )));
    }

    let max_num_ref_frames =
        check_range("SPS", "max_num_ref_frames", br.read_ue()?, 0..=MAX_NUM_REF_FRAMES)?;
    let gaps_in_frame_num_value_allowed_flag = br.read_flag()?;
    let pic_width_in_mbs_minus1 = check_range(
        "SPS",
        "pic_width_in_mbs_minus1",
        br.read_ue()?,
        0..=MAX_DIMENSION_MBS - 1,
    )?;
    let pic_height_in_map_units_minus1 = check_range(
        "SPS",
        "pic_height_in_map_units_minus1",
        br.read_ue()?,
        0..=MAX_DIMENSION_MBS - 1,
    )?;

    let frame_mbs_only_flag = br.read_flag()?;
    let mb_adaptive_frame_field_flag = if frame_mbs_only_flag {
        false
    } else {
        br.read_flag()?
    };
    let direct_8x8_inference_flag = br.read_flag()?;

    let frame_cropping = if br.read_flag()? {
        Some(FrameCropping {
            left: br.read_ue()?,
            right: br.read_ue()?,
            top: br.read_ue()?,
            bottom: br.read_ue()?,
        })
    } else {
        None
    };

    let vui = if br.read_flag()? {
        Some(parse_vui(&mut br)?)
    } else {
        None
    };

    let sps = SequenceParameterSet {
        profile_idc,
        constraint_flags,
        level_idc,
        seq_parameter_set_id,
        log2_max_frame_num_minus4,
        pic_order_cnt_type,
        log2_max_pic_order_cnt_lsb_minus4: 0,
        max_num_ref_frames,
        gaps_in_frame_num_value_allowed_flag,
        pic_width_in_mbs_minus1,
        pic_height_in_map_units_minus1,
        frame_mbs_only_flag,
        mb_adaptive_frame_field_flag,
        direct_8x8_inference_flag,
        frame_cropping,
        vui,
    };

    debug!(
        "H.264: SPS id={}, level={}, {}x{} mbs, ref_frames={}, flags={:#04x}",
        sps.seq_parameter_set_id,
        sps.level_idc,
        sps.width_in_mbs(),
        sps.height_in_mbs(),
        sps.max_num_ref_frames,
        sps.constraint_flags,
    );

    Ok(sps)
}

fn parse_vui(br: &mut BitReader) -> VdeResult<VuiParameters> {
    let mut vui = VuiParameters {
        aspect_ratio_info_present_flag: br.read_flag()?,
        ..VuiParameters::default()
    };

    if vui.aspect_ratio_info_present_flag {
        vui.aspect_ratio_idc = br.read_u8(8)?;
        if vui.aspect_ratio_idc == EXTENDED_SAR {
            vui.sar_width = br.read_u16(16)?;
            vui.sar_height = br.read_u16(16)?;
        }
    }

    vui.overscan_info_present_flag = br.read_flag()?;
    if vui.overscan_info_present_flag {
        vui.overscan_appropriate_flag = br.read_flag()?;
    }

    vui.video_signal_type_present_flag = br.read_flag()?;
    if vui.video_signal_type_present_flag {
        vui.video_format = br.read_u8(3)?;
        vui.video_full_range_flag = br.read_flag()?;
        vui.colour_description_present_flag = br.read_flag()?;
        if vui.colour_description_present_flag {
            vui.colour_primaries = br.read_u8(8)?;
            vui.transfer_characteristics = br.read_u8(8)?;
            vui.matrix_coefficients = br.read_u8(8)?;
        }
    }

    vui.chroma_loc_info_present_flag = br.read_flag()?;
    if vui.chroma_loc_info_present_flag {
        vui.chroma_sample_loc_type_top_field = br.read_ue()?;
        vui.chroma_sample_loc_type_bottom_field = br.read_ue()?;
    }

    vui.timing_info_present_flag = br.read_flag()?;
    if vui.timing_info_present_flag {
        vui.num_units_in_tick = br.read_bits(32)?;
        vui.time_scale = br.read_bits(32)?;
        vui.fixed_frame_rate_flag = br.read_flag()?;
    }

    Ok(vui)
}
