//! H.264 参数集集成测试
//!
//! Annex-B 码流 → NAL 分割 → 配置记录 → SPS/PPS → 硬件解码参数

use vde::codec::h264::{
    NalUnitType, build_config_blob, parse_config, remove_emulation_prevention, split_annex_b,
};
use vde::core::VdeError;
use vde::device::H264DecodeParams;

// ============================================================
// 比特构造辅助
// ============================================================

fn push_bits(bits: &mut Vec<bool>, val: u32, n: u32) {
    for i in (0..n).rev() {
        bits.push((val >> i) & 1 == 1);
    }
}

fn write_ue(bits: &mut Vec<bool>, val: u32) {
    let code = val + 1;
    let len = 32 - code.leading_zeros();
    for _ in 0..len - 1 {
        bits.push(false);
    }
    push_bits(bits, code, len);
}

/// se(v) 对应的 ue 码字, 与 `read_se` 互逆: 正值须为奇数, 负值须为偶数
fn se_code(val: i32) -> u32 {
    let magnitude = val.unsigned_abs();
    assert!(
        val == 0 || (val > 0) == (magnitude % 2 == 1),
        "{val} 无法以当前符号约定编码"
    );
    if val == 0 { 0 } else { 2 * magnitude - 1 }
}

fn write_se(bits: &mut Vec<bool>, val: i32) {
    write_ue(bits, se_code(val));
}

/// 追加 rbsp_stop_one_bit 并补齐到字节边界
fn finish(mut bits: Vec<bool>) -> Vec<u8> {
    bits.push(true);
    while bits.len() % 8 != 0 {
        bits.push(false);
    }
    bits.chunks(8)
        .map(|chunk| chunk.iter().fold(0u8, |acc, &b| (acc << 1) | u8::from(b)))
        .collect()
}

/// RBSP → NAL 载荷, 插入 emulation prevention 字节
fn escape(rbsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rbsp.len() + 4);
    let mut zeros = 0;
    for &byte in rbsp {
        if zeros >= 2 && byte <= 0x03 {
            out.push(0x03);
            zeros = 0;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        out.push(byte);
    }
    out
}

fn nal(header: u8, rbsp: &[u8]) -> Vec<u8> {
    let mut out = vec![header];
    out.extend_from_slice(&escape(rbsp));
    out
}

struct SpsOptions {
    log2_max_frame_num_minus4: u32,
    width_mbs: u32,
    height_mbs: u32,
    level: u32,
    crop_bottom: u32,
    timing: Option<(u32, u32)>,
}

impl Default for SpsOptions {
    fn default() -> Self {
        Self {
            log2_max_frame_num_minus4: 0,
            width_mbs: 20,
            height_mbs: 15,
            level: 30,
            crop_bottom: 0,
            timing: None,
        }
    }
}

fn build_sps(opts: &SpsOptions) -> Vec<u8> {
    let mut bits = Vec::new();
    push_bits(&mut bits, 66, 8); // profile_idc
    push_bits(&mut bits, 0xC0, 8); // constraint flags
    push_bits(&mut bits, opts.level, 8);
    write_ue(&mut bits, 0); // seq_parameter_set_id
    write_ue(&mut bits, opts.log2_max_frame_num_minus4);
    write_ue(&mut bits, 2); // pic_order_cnt_type
    write_ue(&mut bits, 1); // max_num_ref_frames
    bits.push(false); // gaps_in_frame_num_value_allowed_flag
    write_ue(&mut bits, opts.width_mbs - 1);
    write_ue(&mut bits, opts.height_mbs - 1);
    bits.push(true); // frame_mbs_only_flag
    bits.push(true); // direct_8x8_inference_flag

    bits.push(opts.crop_bottom > 0);
    if opts.crop_bottom > 0 {
        write_ue(&mut bits, 0);
        write_ue(&mut bits, 0);
        write_ue(&mut bits, 0);
        write_ue(&mut bits, opts.crop_bottom);
    }

    bits.push(opts.timing.is_some()); // vui_parameters_present_flag
    if let Some((num_units_in_tick, time_scale)) = opts.timing {
        bits.push(false); // aspect_ratio_info_present_flag
        bits.push(false); // overscan_info_present_flag
        bits.push(false); // video_signal_type_present_flag
        bits.push(false); // chroma_loc_info_present_flag
        bits.push(true); // timing_info_present_flag
        push_bits(&mut bits, num_units_in_tick, 32);
        push_bits(&mut bits, time_scale, 32);
        bits.push(true); // fixed_frame_rate_flag
    }

    nal(0x67, &finish(bits))
}

fn build_pps(qp_minus26: i32, chroma_offset: i32, with_tail: bool) -> Vec<u8> {
    build_pps_with_qp_code(se_code(qp_minus26), chroma_offset, with_tail)
}

/// pic_init_qp_minus26 以原始 ue 码字写入
fn build_pps_with_qp_code(qp_code: u32, chroma_offset: i32, with_tail: bool) -> Vec<u8> {
    let mut bits = Vec::new();
    write_ue(&mut bits, 0); // pic_parameter_set_id
    write_ue(&mut bits, 0); // seq_parameter_set_id
    bits.push(false); // entropy_coding_mode_flag
    bits.push(false); // bottom_field_pic_order_in_frame_present_flag
    write_ue(&mut bits, 0); // num_slice_groups_minus1
    write_ue(&mut bits, 0); // num_ref_idx_l0_default_active_minus1
    write_ue(&mut bits, 0); // num_ref_idx_l1_default_active_minus1
    bits.push(false); // weighted_pred_flag
    push_bits(&mut bits, 0, 2); // weighted_bipred_idc
    write_ue(&mut bits, qp_code); // pic_init_qp_minus26
    write_se(&mut bits, 0); // pic_init_qs_minus26
    write_se(&mut bits, chroma_offset);
    bits.push(true); // deblocking_filter_control_present_flag
    bits.push(false); // constrained_intra_pred_flag
    bits.push(false); // redundant_pic_cnt_present_flag
    if with_tail {
        bits.push(true); // transform_8x8_mode_flag
        bits.push(false); // pic_scaling_matrix_present_flag
        write_se(&mut bits, 1); // second_chroma_qp_index_offset
    }
    nal(0x68, &finish(bits))
}

fn annex_b(units: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, unit) in units.iter().enumerate() {
        // 交替使用 4 字节与 3 字节起始码
        if i % 2 == 0 {
            out.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        } else {
            out.extend_from_slice(&[0x00, 0x00, 0x01]);
        }
        out.extend_from_slice(unit);
    }
    out
}

// ============================================================
// 配置记录
// ============================================================

#[test]
fn test_annex_b_to_decode_params() {
    let sps = build_sps(&SpsOptions::default());
    let pps = build_pps(-4, -2, false);
    let idr = [0x65, 0x88, 0x84, 0x00, 0x33];
    let stream = annex_b(&[&sps[..], &pps[..], &idr[..]]);

    let units = split_annex_b(&stream).unwrap();
    assert_eq!(units.len(), 3);
    assert_eq!(units[0].unit_type, NalUnitType::Sps);
    assert_eq!(units[1].unit_type, NalUnitType::Pps);
    assert_eq!(units[2].unit_type, NalUnitType::SliceIdr);
    assert_eq!(units[2].ref_idc, 3);

    let blob = build_config_blob(&[units[0].data], &[units[1].data], 4).unwrap();
    let config = parse_config(&blob).unwrap();
    assert_eq!(config.profile, 66);
    assert_eq!(config.level, 30);
    assert_eq!(config.nal_length_size, 4);
    assert_eq!((config.sps.width(), config.sps.height()), (320, 240));

    let params = H264DecodeParams::from_config(&config).unwrap();
    assert_eq!(params.pic_width_in_mbs, 20);
    assert_eq!(params.pic_height_in_mbs, 15);
    assert_eq!(params.pic_init_qp, 22);
    assert_eq!(params.level_idc, 30);
    assert_eq!(params.log2_max_frame_num, 4);
    assert_eq!(params.chroma_qp_index_offset, 0x1E);
    assert!(params.deblocking_filter_control_present_flag);
    assert!(!params.pic_order_present_flag);
}

#[test]
fn test_common_resolutions() {
    let cases = [
        (
            SpsOptions {
                width_mbs: 120,
                height_mbs: 68,
                level: 40,
                crop_bottom: 4,
                ..Default::default()
            },
            (1920, 1088),
        ),
        (
            SpsOptions {
                width_mbs: 80,
                height_mbs: 45,
                level: 31,
                ..Default::default()
            },
            (1280, 720),
        ),
        (
            SpsOptions {
                width_mbs: 40,
                height_mbs: 30,
                ..Default::default()
            },
            (640, 480),
        ),
    ];

    let pps = build_pps(0, 0, false);
    for (opts, (width, height)) in cases {
        let sps = build_sps(&opts);
        let blob = build_config_blob(&[&sps[..]], &[&pps[..]], 4).unwrap();
        let config = parse_config(&blob).unwrap();
        assert_eq!(config.sps.width(), width);
        assert_eq!(config.sps.height(), height);
        assert_eq!(config.sps.width_in_mbs(), opts.width_mbs);
        assert_eq!(u32::from(config.sps.level_idc), opts.level);
        assert_eq!(
            config.sps.frame_cropping.map_or(0, |crop| crop.bottom),
            opts.crop_bottom
        );
    }
}

#[test]
fn test_emulation_prevention_in_vui_timing() {
    // num_units_in_tick=1 产生连续零字节, 载荷中必须出现防竞争字节
    let sps = build_sps(&SpsOptions {
        timing: Some((1, 50)),
        ..Default::default()
    });
    let rbsp = remove_emulation_prevention(&sps[1..]);
    assert!(rbsp.len() < sps.len() - 1);

    let pps = build_pps(0, 0, false);
    let blob = build_config_blob(&[&sps[..]], &[&pps[..]], 4).unwrap();
    let config = parse_config(&blob).unwrap();
    let vui = config.sps.vui.expect("缺少 VUI");
    assert!(vui.timing_info_present_flag);
    assert_eq!(vui.num_units_in_tick, 1);
    assert_eq!(vui.time_scale, 50);
    assert!(vui.fixed_frame_rate_flag);
    assert_eq!(vui.sample_aspect_ratio(), None);
}

#[test]
fn test_pps_tail_fields() {
    let sps = build_sps(&SpsOptions::default());
    let pps = build_pps(3, -4, true);
    let blob = build_config_blob(&[&sps[..]], &[&pps[..]], 2).unwrap();
    let config = parse_config(&blob).unwrap();
    assert_eq!(config.nal_length_size, 2);
    assert_eq!(config.pps.pic_init_qp(), 29);
    assert_eq!(config.pps.chroma_qp_index_offset, -4);
    assert!(config.pps.transform_8x8_mode_flag);
    assert_eq!(config.pps.second_chroma_qp_index_offset, 1);
}

#[test]
fn test_multiple_parameter_sets_rejected() {
    let sps = build_sps(&SpsOptions::default());
    let pps = build_pps(0, 0, false);
    let blob = build_config_blob(&[&sps[..], &sps[..]], &[&pps[..]], 4).unwrap();
    assert!(matches!(parse_config(&blob), Err(VdeError::Unsupported(_))));
}

#[test]
fn test_truncated_blob_rejected() {
    let sps = build_sps(&SpsOptions::default());
    let pps = build_pps(0, 0, false);
    let blob = build_config_blob(&[&sps[..]], &[&pps[..]], 4).unwrap();

    for cut in [3, 7, blob.len() - 1] {
        let err = parse_config(&blob[..cut]).unwrap_err();
        assert!(
            matches!(err, VdeError::InvalidData(_) | VdeError::OutOfData),
            "cut={cut}: {err}"
        );
    }
}

// ============================================================
// 取值范围
// ============================================================

fn parse_error(sps: &[u8], pps: &[u8]) -> VdeError {
    let blob = build_config_blob(&[sps], &[pps], 4).unwrap();
    parse_config(&blob).unwrap_err()
}

#[test]
fn test_out_of_range_qp_rejected() {
    // pic_init_qp = 53
    let sps = build_sps(&SpsOptions::default());
    let err = parse_error(&sps, &build_pps(27, 0, false));
    assert!(matches!(&err, VdeError::InvalidData(msg) if msg.contains("pic_init_qp_minus26")));

    // ue=0xFFFF_FFFE 解出 i32::MAX
    let err = parse_error(&sps, &build_pps_with_qp_code(0xFFFF_FFFE, 0, false));
    assert!(matches!(&err, VdeError::InvalidData(msg) if msg.contains("pic_init_qp_minus26")));

    // 边界值 -26 / +25 对应 QP 0 / 51
    for (qp_minus26, qp) in [(-26, 0), (25, 51)] {
        let blob = build_config_blob(&[&sps[..]], &[&build_pps(qp_minus26, 0, false)[..]], 4)
            .unwrap();
        let params = H264DecodeParams::from_config(&parse_config(&blob).unwrap()).unwrap();
        assert_eq!(params.pic_init_qp, qp);
    }
}

#[test]
fn test_out_of_range_chroma_offsets_rejected() {
    let sps = build_sps(&SpsOptions::default());
    let err = parse_error(&sps, &build_pps(0, 13, false));
    assert!(matches!(&err, VdeError::InvalidData(msg) if msg.contains("chroma_qp_index_offset")));
    let err = parse_error(&sps, &build_pps(0, -14, true));
    assert!(matches!(&err, VdeError::InvalidData(msg) if msg.contains("chroma_qp_index_offset")));
}

#[test]
fn test_out_of_range_sps_fields_rejected() {
    let cases = [
        (
            SpsOptions {
                log2_max_frame_num_minus4: 13,
                ..Default::default()
            },
            "log2_max_frame_num_minus4",
        ),
        (
            SpsOptions {
                log2_max_frame_num_minus4: 0xFFFF_FFFE,
                ..Default::default()
            },
            "log2_max_frame_num_minus4",
        ),
        (
            SpsOptions {
                width_mbs: 0x1000_0001,
                ..Default::default()
            },
            "pic_width_in_mbs_minus1",
        ),
        (
            SpsOptions {
                height_mbs: 1056,
                ..Default::default()
            },
            "pic_height_in_map_units_minus1",
        ),
    ];

    let pps = build_pps(0, 0, false);
    for (opts, field) in cases {
        let err = parse_error(&build_sps(&opts), &pps);
        assert!(
            matches!(&err, VdeError::InvalidData(msg) if msg.contains(field)),
            "{field}: {err}"
        );
    }
}

#[test]
fn test_largest_accepted_sps_fits_hardware_params() {
    let sps = build_sps(&SpsOptions {
        log2_max_frame_num_minus4: 12,
        width_mbs: 1055,
        height_mbs: 1055,
        ..Default::default()
    });
    let pps = build_pps(0, 0, false);
    let blob = build_config_blob(&[&sps[..]], &[&pps[..]], 4).unwrap();
    let config = parse_config(&blob).unwrap();
    assert_eq!((config.sps.width(), config.sps.height()), (16880, 16880));

    let params = H264DecodeParams::from_config(&config).unwrap();
    assert_eq!(params.log2_max_frame_num, 16);
    assert_eq!(params.pic_width_in_mbs, 1055);
}
