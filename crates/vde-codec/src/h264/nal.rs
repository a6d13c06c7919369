//! H.264 NAL (Network Abstraction Layer) 单元处理.
//!
//! # NAL 头部 (1 字节)
//! ```text
//! ┌─────────────────────────────────────┐
//! │ forbidden(1) | ref_idc(2) | type(5) │
//! └─────────────────────────────────────┘
//! ```
//!
//! NAL 单元以借用视图的形式返回, 不复制原始码流.
//! 参数集在进入比特解析之前需要先去除 emulation prevention 字节.

use std::fmt;

use vde_core::{VdeError, VdeResult};

/// NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    /// 非 IDR 图像切片
    Slice,
    /// 数据分区 A
    SliceDpa,
    /// 数据分区 B
    SliceDpb,
    /// 数据分区 C
    SliceDpc,
    /// IDR 图像切片
    SliceIdr,
    /// 增补增强信息
    Sei,
    /// 序列参数集
    Sps,
    /// 图像参数集
    Pps,
    /// 访问单元分隔符
    Aud,
    /// 序列结束
    EndOfSequence,
    /// 流结束
    EndOfStream,
    /// 填充数据
    FillerData,
    /// 其他类型
    Other(u8),
}

impl NalUnitType {
    /// 从 5 位类型编号创建
    pub fn from_type_id(type_id: u8) -> Self {
        match type_id & 0x1F {
            1 => Self::Slice,
            2 => Self::SliceDpa,
            3 => Self::SliceDpb,
            4 => Self::SliceDpc,
            5 => Self::SliceIdr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::FillerData,
            id => Self::Other(id),
        }
    }

    /// 5 位类型编号
    pub fn type_id(&self) -> u8 {
        match self {
            Self::Slice => 1,
            Self::SliceDpa => 2,
            Self::SliceDpb => 3,
            Self::SliceDpc => 4,
            Self::SliceIdr => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::Aud => 9,
            Self::EndOfSequence => 10,
            Self::EndOfStream => 11,
            Self::FillerData => 12,
            Self::Other(id) => *id,
        }
    }

    /// 是否携带图像数据 (VCL)
    pub fn is_vcl(&self) -> bool {
        matches!(
            self,
            Self::Slice | Self::SliceDpa | Self::SliceDpb | Self::SliceDpc | Self::SliceIdr
        )
    }
}

impl fmt::Display for NalUnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slice => write!(f, "Slice"),
            Self::SliceDpa => write!(f, "SliceDPA"),
            Self::SliceDpb => write!(f, "SliceDPB"),
            Self::SliceDpc => write!(f, "SliceDPC"),
            Self::SliceIdr => write!(f, "IDR"),
            Self::Sei => write!(f, "SEI"),
            Self::Sps => write!(f, "SPS"),
            Self::Pps => write!(f, "PPS"),
            Self::Aud => write!(f, "AUD"),
            Self::EndOfSequence => write!(f, "EndOfSeq"),
            Self::EndOfStream => write!(f, "EndOfStream"),
            Self::FillerData => write!(f, "Filler"),
            Self::Other(id) => write!(f, "Other({id})"),
        }
    }
}

/// NAL 单元视图
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit<'a> {
    /// nal_ref_idc (0-3)
    pub ref_idc: u8,
    /// 单元类型
    pub unit_type: NalUnitType,
    /// 完整单元数据 (含 1 字节头部, 不含起始码或长度前缀)
    pub data: &'a [u8],
}

impl<'a> NalUnit<'a> {
    /// 解析 NAL 头部
    pub fn parse(data: &'a [u8]) -> VdeResult<Self> {
        let Some(&header) = data.first() else {
            return Err(VdeError::InvalidData("H.264: NAL 单元数据为空".into()));
        };

        if header & 0x80 != 0 {
            return Err(VdeError::InvalidData(format!(
                "H.264: forbidden_zero_bit 非法, header={header:#04x}"
            )));
        }

        Ok(Self {
            ref_idc: (header >> 5) & 0x03,
            unit_type: NalUnitType::from_type_id(header & 0x1F),
            data,
        })
    }

    /// 去掉头部字节后的载荷 (仍含 emulation prevention 字节)
    pub fn payload(&self) -> &'a [u8] {
        &self.data[1..]
    }

    /// 去掉头部与 emulation prevention 字节后的 RBSP
    pub fn rbsp(&self) -> Vec<u8> {
        remove_emulation_prevention(self.payload())
    }
}

/// 从 Annex-B 字节流中分割 NAL 单元
///
/// 支持 3 字节 (`00 00 01`) 和 4 字节 (`00 00 00 01`) 起始码,
/// 单元末尾的填充零字节会被去掉. 头部非法的单元返回错误.
pub fn split_annex_b(data: &[u8]) -> VdeResult<Vec<NalUnit<'_>>> {
    let starts = find_start_codes(data);
    let mut units = Vec::with_capacity(starts.len());

    for (i, &(code_pos, payload_pos)) in starts.iter().enumerate() {
        let mut end = starts.get(i + 1).map_or(data.len(), |&(next, _)| next);
        while end > payload_pos && data[end - 1] == 0x00 {
            end -= 1;
        }
        if end <= payload_pos {
            log::trace!("H.264: 跳过空 NAL 单元, offset={code_pos}");
            continue;
        }
        units.push(NalUnit::parse(&data[payload_pos..end])?);
    }

    Ok(units)
}

/// 从长度前缀格式中分割 NAL 单元
///
/// `length_size` 为长度字段字节数 (1-4, 大端).
/// 声明长度越界时返回 [`VdeError::InvalidData`].
pub fn split_length_prefixed(data: &[u8], length_size: usize) -> VdeResult<Vec<NalUnit<'_>>> {
    if !(1..=4).contains(&length_size) {
        return Err(VdeError::InvalidArgument(format!(
            "H.264: NAL 长度字段宽度非法, length_size={length_size}"
        )));
    }

    let mut units = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        if rest.len() < length_size {
            return Err(VdeError::InvalidData(format!(
                "H.264: NAL 长度字段截断, remain={}",
                rest.len()
            )));
        }
        let (len_bytes, tail) = rest.split_at(length_size);
        let len = len_bytes
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | usize::from(b));
        if len > tail.len() {
            return Err(VdeError::InvalidData(format!(
                "H.264: NAL 数据截断, declared_len={len}, remain={}",
                tail.len()
            )));
        }
        let (unit, next) = tail.split_at(len);
        if !unit.is_empty() {
            units.push(NalUnit::parse(unit)?);
        }
        rest = next;
    }

    Ok(units)
}

/// 移除 emulation prevention 字节 (`00 00 03` → `00 00`)
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut rbsp = Vec::with_capacity(data.len());
    let mut zeros = 0usize;

    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0x00 { zeros + 1 } else { 0 };
        rbsp.push(byte);
    }

    rbsp
}

/// 由 SPS/PPS NAL 单元构建版本 1 的解码器配置记录
///
/// 单元数据须含头部字节. 配置中的 profile/compat/level 取自首个 SPS.
pub fn build_config_blob(sps: &[&[u8]], pps: &[&[u8]], length_size: usize) -> VdeResult<Vec<u8>> {
    let Some(first) = sps.first() else {
        return Err(VdeError::InvalidArgument(
            "H.264: 构建配置记录需要至少一个 SPS".into(),
        ));
    };
    if first.len() < 4 {
        return Err(VdeError::InvalidData(format!(
            "H.264: SPS 数据太短, len={}",
            first.len()
        )));
    }
    if !(1..=4).contains(&length_size) {
        return Err(VdeError::InvalidArgument(format!(
            "H.264: NAL 长度字段宽度非法, length_size={length_size}"
        )));
    }
    if sps.len() > 0x1F || pps.len() > 0xFF {
        return Err(VdeError::InvalidArgument(format!(
            "H.264: 参数集数量超出配置记录容量, sps={}, pps={}",
            sps.len(),
            pps.len()
        )));
    }

    let mut out = vec![
        1,                                // configurationVersion
        first[1],                         // profile_idc
        first[2],                         // profile_compatibility
        first[3],                         // level_idc
        0xFC | ((length_size as u8) - 1), // lengthSizeMinusOne
        0xE0 | (sps.len() as u8),         // numOfSequenceParameterSets
    ];
    push_units(&mut out, sps)?;
    out.push(pps.len() as u8);
    push_units(&mut out, pps)?;

    Ok(out)
}

// ============================================================
// 内部工具函数
// ============================================================

fn push_units(out: &mut Vec<u8>, units: &[&[u8]]) -> VdeResult<()> {
    for unit in units {
        let len = u16::try_from(unit.len()).map_err(|_| {
            VdeError::InvalidArgument(format!("H.264: 参数集过长, len={}", unit.len()))
        })?;
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(unit);
    }
    Ok(())
}

/// 查找所有起始码, 返回 (起始码位置, 载荷位置)
fn find_start_codes(data: &[u8]) -> Vec<(usize, usize)> {
    let mut positions = Vec::new();
    let mut i = 0;

    while i + 2 < data.len() {
        if data[i] == 0x00 && data[i + 1] == 0x00 {
            if data[i + 2] == 0x01 {
                positions.push((i, i + 3));
                i += 3;
                continue;
            }
            if i + 3 < data.len() && data[i + 2] == 0x00 && data[i + 3] == 0x01 {
                positions.push((i, i + 4));
                i += 4;
                continue;
            }
        }
        i += 1;
    }

    positions
}
