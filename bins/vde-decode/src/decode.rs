//! 解码流程: 读取码流 → 提取参数集 → 硬件解码 → 去平铺 → 写出平面.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, bail};
use log::{debug, info, warn};
use vde_codec::h264::{DecoderConfig, NalUnit, NalUnitType, build_config_blob, parse_config};
use vde_core::LinearImage;
use vde_device::{DecodeSession, SessionConfig};

use crate::Cli;

/// 构建配置记录时使用的 NAL 长度字段宽度
const CONFIG_NAL_LENGTH_SIZE: usize = 4;

/// 从 Annex-B 码流中提取的解码输入
#[derive(Debug)]
pub struct StreamInput<'a> {
    pub config: DecoderConfig,
    /// 切片 NAL 单元, 每个单元视为一幅图像
    pub slices: Vec<NalUnit<'a>>,
}

/// 拆分码流, 由其中的 SPS/PPS 构建解码器配置
pub fn collect_stream(data: &[u8]) -> anyhow::Result<StreamInput<'_>> {
    let units = vde_codec::h264::split_annex_b(data).context("拆分 Annex-B 码流失败")?;

    let mut sps = Vec::new();
    let mut pps = Vec::new();
    let mut slices = Vec::new();
    for unit in units {
        match unit.unit_type {
            NalUnitType::Sps => sps.push(unit.data),
            NalUnitType::Pps => pps.push(unit.data),
            t if t.is_vcl() => slices.push(unit),
            t => debug!("跳过 NAL 单元: {t}"),
        }
    }

    if sps.is_empty() || pps.is_empty() {
        bail!(
            "码流中缺少参数集: SPS {} 个, PPS {} 个",
            sps.len(),
            pps.len()
        );
    }

    let blob = build_config_blob(&sps, &pps, CONFIG_NAL_LENGTH_SIZE)?;
    let config = parse_config(&blob).context("解析参数集失败")?;

    Ok(StreamInput { config, slices })
}

/// 带 4 字节起始码的切片数据
fn slice_payload(unit: &NalUnit<'_>) -> Vec<u8> {
    let mut payload = Vec::with_capacity(unit.data.len() + 4);
    payload.extend_from_slice(&[0, 0, 0, 1]);
    payload.extend_from_slice(unit.data);
    payload
}

/// 按平面顺序写出线性图像
fn write_image(out: &mut impl Write, image: &LinearImage) -> std::io::Result<()> {
    for plane in 0..image.plane_count() {
        out.write_all(image.plane(plane))?;
    }
    Ok(())
}

fn load_session_config(path: Option<&Path>) -> anyhow::Result<SessionConfig> {
    let Some(path) = path else {
        return Ok(SessionConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
    let config = serde_json::from_str(&text)
        .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
    Ok(config)
}

pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let session_config = load_session_config(cli.config.as_deref())?;

    if !cli.overwrite && cli.output.exists() {
        bail!(
            "输出文件已存在 '{}', 使用 -y 覆盖",
            cli.output.display()
        );
    }

    let data = fs::read(&cli.input)
        .with_context(|| format!("读取输入文件失败: {}", cli.input.display()))?;
    let stream = collect_stream(&data)?;
    let sps = &stream.config.sps;
    info!(
        "输入: {}, {}x{} (宏块 {}x{}), level {}, {} 个切片",
        cli.input.display(),
        sps.width(),
        sps.height(),
        sps.width_in_mbs(),
        sps.height_in_mbs(),
        sps.level_idc,
        stream.slices.len()
    );

    let mut out = BufWriter::new(
        File::create(&cli.output)
            .with_context(|| format!("创建输出文件失败: {}", cli.output.display()))?,
    );

    let mut session = DecodeSession::open_tegra(session_config).context("打开解码会话失败")?;

    let limit = cli.max_frames.unwrap_or(usize::MAX);
    let mut decoded = 0usize;
    for unit in stream.slices.iter().take(limit) {
        let mut frame = session
            .decode(&stream.config, &slice_payload(unit))
            .with_context(|| format!("第 {decoded} 帧解码失败"))?;

        let image = session.detile(&mut frame);
        if let Err(e) = session.release_frame(frame) {
            warn!("释放第 {decoded} 帧失败: {e}");
        }
        let image = image.with_context(|| format!("第 {decoded} 帧去平铺失败"))?;

        write_image(&mut out, &image).context("写入输出文件失败")?;
        decoded += 1;
        debug!("第 {decoded} 帧: {}x{}", image.width, image.height);
    }

    out.flush().context("写入输出文件失败")?;
    session.close().context("关闭解码会话失败")?;

    info!("完成: 解码 {decoded} 帧, 输出 {}", cli.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // 64x32 Baseline, level 3.0
    const SPS: &[u8] = &[0x67, 0x42, 0xC0, 0x1E, 0xDA, 0x11, 0x64];
    const PPS: &[u8] = &[0x68, 0xCE, 0x3C, 0x80];

    fn annex_b(units: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for unit in units {
            out.extend_from_slice(&[0, 0, 0, 1]);
            out.extend_from_slice(unit);
        }
        out
    }

    #[test]
    fn test_collect_stream() {
        let aud: &[u8] = &[0x09, 0xF0];
        let idr: &[u8] = &[0x65, 0x88, 0x84, 0x21];
        let non_idr: &[u8] = &[0x41, 0x9A, 0x02];
        let data = annex_b(&[aud, SPS, PPS, idr, non_idr]);

        let stream = collect_stream(&data).unwrap();
        assert_eq!(stream.config.sps.width(), 64);
        assert_eq!(stream.config.sps.height(), 32);
        assert_eq!(stream.config.level, 30);
        assert_eq!(stream.slices.len(), 2);
        assert_eq!(stream.slices[0].unit_type, NalUnitType::SliceIdr);
        assert_eq!(slice_payload(&stream.slices[1]), [0, 0, 0, 1, 0x41, 0x9A, 0x02]);
    }

    #[test]
    fn test_collect_stream_requires_parameter_sets() {
        let idr: &[u8] = &[0x65, 0x88];
        let data = annex_b(&[SPS, idr]);
        let err = collect_stream(&data).unwrap_err();
        assert!(err.to_string().contains("PPS 0 个"));
    }

    #[test]
    fn test_write_image_plane_order() {
        let mut image = LinearImage::new(32, 16, vde_core::DRM_FORMAT_YUV420).unwrap();
        image.plane_mut(1).fill(1);
        image.plane_mut(2).fill(2);

        let mut out = Vec::new();
        write_image(&mut out, &image).unwrap();
        assert_eq!(out.len(), 32 * 16 * 3 / 2);
        assert!(out[..512].iter().all(|&b| b == 0));
        assert!(out[512..640].iter().all(|&b| b == 1));
        assert!(out[640..].iter().all(|&b| b == 2));
    }

    #[test]
    fn test_default_session_config_without_file() {
        assert_eq!(load_session_config(None).unwrap(), SessionConfig::default());
    }
}
