//! 解码器配置记录 (codec-configuration blob) 解析.
//!
//! # 布局 (版本 1)
//! ```text
//! [0]      configurationVersion = 1
//! [1..4]   profile / compatibility / level
//! [4]      低 2 位 + 1 = NAL 长度字段宽度
//! [5]      低 5 位 = SPS 数量
//!          SPS 数量 × ([len: 2 字节 BE] [NAL])
//!          [PPS 数量: 1 字节]
//!          PPS 数量 × ([len: 2 字节 BE] [NAL])
//! ```
//!
//! 每次读取长度字段或载荷之前都检查边界, 越界返回 [`VdeError::InvalidData`].
//! 只支持一组 SPS/PPS, 多于或少于一组都视为不支持.

use byteorder::{BigEndian, ByteOrder};
use log::{debug, warn};
use vde_core::{VdeError, VdeResult};

use super::nal::{NalUnit, NalUnitType};
use super::pps::{PictureParameterSet, parse_pps};
use super::sps::{SequenceParameterSet, parse_sps};

/// 解析后的解码器配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    pub profile: u8,
    pub compatibility: u8,
    pub level: u8,
    /// NAL 长度字段宽度 (1-4 字节)
    pub nal_length_size: usize,
    /// 当前生效的 SPS
    pub sps: SequenceParameterSet,
    /// 当前生效的 PPS
    pub pps: PictureParameterSet,
}

/// 解析解码器配置记录
pub fn parse_config(blob: &[u8]) -> VdeResult<DecoderConfig> {
    let mut cursor = ByteCursor::new(blob);

    let version = cursor.read_u8("configurationVersion")?;
    if version != 1 {
        return Err(VdeError::Unsupported(format!(
            "H.264: 配置记录版本 configurationVersion={version}, 仅支持 1"
        )));
    }

    let profile = cursor.read_u8("profile")?;
    let compatibility = cursor.read_u8("compatibility")?;
    let level = cursor.read_u8("level")?;
    let nal_length_size = usize::from(cursor.read_u8("lengthSizeMinusOne")? & 0x03) + 1;
    let num_sps = cursor.read_u8("numOfSequenceParameterSets")? & 0x1F;

    debug!(
        "H.264: 配置记录 profile={profile}, compat={compatibility:#04x}, level={level}, nal_size={nal_length_size}, sps={num_sps}"
    );

    let mut sps_list = Vec::new();
    for index in 0..num_sps {
        let nal = cursor.read_nal("SPS", index)?;
        if nal.unit_type == NalUnitType::Sps {
            sps_list.push(parse_sps(&nal.rbsp())?);
        } else {
            warn!("H.264: SPS 列表中出现非 SPS 单元, index={index}, type={}", nal.unit_type);
        }
    }

    let num_pps = cursor.read_u8("numOfPictureParameterSets")?;
    let mut pps_list = Vec::new();
    for index in 0..num_pps {
        let nal = cursor.read_nal("PPS", index)?;
        if nal.unit_type == NalUnitType::Pps {
            pps_list.push(parse_pps(&nal.rbsp())?);
        } else {
            warn!("H.264: PPS 列表中出现非 PPS 单元, index={index}, type={}", nal.unit_type);
        }
    }

    let sps = take_single(sps_list, "SPS")?;
    let pps = take_single(pps_list, "PPS")?;

    if !sps.frame_mbs_only_flag {
        return Err(VdeError::Unsupported(
            "H.264: SPS frame_mbs_only_flag=0, 不支持场编码".into(),
        ));
    }

    Ok(DecoderConfig {
        profile,
        compatibility,
        level,
        nal_length_size,
        sps,
        pps,
    })
}

/// 取出唯一的参数集, 数量不为 1 时返回不支持
fn take_single<T>(list: Vec<T>, kind: &str) -> VdeResult<T> {
    let count = list.len();
    match list.into_iter().next() {
        Some(item) if count == 1 => Ok(item),
        None => Err(VdeError::Unsupported(format!("H.264: 配置记录缺少 {kind}"))),
        Some(_) => Err(VdeError::Unsupported(format!(
            "H.264: 配置记录包含 {count} 个 {kind}, 仅支持 1 个"
        ))),
    }
}

/// 带边界检查的字节游标
struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, len: usize, field: &str) -> VdeResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(VdeError::InvalidData(format!(
                "H.264: 配置记录截断, field={field}, need={len}, remain={}",
                self.remaining()
            )));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_u8(&mut self, field: &str) -> VdeResult<u8> {
        Ok(self.take(1, field)?[0])
    }

    fn read_u16(&mut self, field: &str) -> VdeResult<u16> {
        Ok(BigEndian::read_u16(self.take(2, field)?))
    }

    /// 读取一个 2 字节长度前缀的 NAL 单元
    fn read_nal(&mut self, kind: &str, index: u8) -> VdeResult<NalUnit<'a>> {
        let len = usize::from(self.read_u16(&format!("{kind}[{index}].length"))?);
        if len == 0 {
            return Err(VdeError::InvalidData(format!(
                "H.264: 配置记录 {kind} 长度非法, index={index}, len=0"
            )));
        }
        let data = self.take(len, &format!("{kind}[{index}].data"))?;
        NalUnit::parse(data)
    }
}
