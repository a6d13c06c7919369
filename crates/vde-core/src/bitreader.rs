//! 比特流读取器.
//!
//! 按大端位序 (MSB first) 从字节缓冲区中读取数据, 供 H.264 参数集解析使用.
//!
//! 除定长读取外, 还提供码流语法需要的两种 Exp-Golomb 变长码:
//! - `ue(v)`: 无符号 Exp-Golomb
//! - `se(v)`: 有符号 Exp-Golomb
//!
//! 以及决定 PPS 可选尾部字段是否存在的 `more_rbsp_data()` 判定.

use crate::{VdeError, VdeResult};

/// Exp-Golomb 前缀的最大零位数 (不含)
const MAX_GOLOMB_PREFIX: u32 = 32;

/// 比特流读取器
///
/// 游标由字节偏移和字节内的位位置 (7 到 0, 7 为最高位) 组成.
/// 字节偏移等于缓冲区长度后, 所有读取都返回 [`VdeError::OutOfData`].
///
/// # 示例
/// ```
/// use vde_core::bitreader::BitReader;
///
/// let data = [0b10110001, 0b01010101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.read_bits(4).unwrap(), 0b0001);
/// assert_eq!(br.read_bits(8).unwrap(), 0b01010101);
/// ```
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前字节索引
    offset: usize,
    /// 当前字节中下一个待读位 (7 为最高位, 0 为最低位)
    bit: u8,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            bit: 7,
        }
    }

    /// 剩余可读位数
    pub fn available(&self) -> usize {
        if self.offset >= self.data.len() {
            return 0;
        }
        (self.data.len() - self.offset) * 8 - (7 - self.bit as usize)
    }

    /// 已读取的总位数
    pub fn position(&self) -> usize {
        self.offset * 8 + (7 - self.bit as usize)
    }

    /// 是否已读完全部数据
    pub fn is_exhausted(&self) -> bool {
        self.available() == 0
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> VdeResult<u32> {
        if self.offset >= self.data.len() {
            return Err(VdeError::OutOfData);
        }

        let value = (self.data[self.offset] >> self.bit) & 1;
        if self.bit == 0 {
            self.bit = 7;
            self.offset += 1;
        } else {
            self.bit -= 1;
        }

        Ok(u32::from(value))
    }

    /// 读取 1 位标志
    pub fn read_flag(&mut self) -> VdeResult<bool> {
        Ok(self.read_bit()? == 1)
    }

    /// 读取 N 个位 (最多 32 位), 按大端顺序累积为无符号整数
    ///
    /// 数据不足时不移动游标.
    pub fn read_bits(&mut self, n: u32) -> VdeResult<u32> {
        self.read_bits_checked(n, 32)
    }

    /// 读取 N 个位到 `u8` (最多 8 位)
    pub fn read_u8(&mut self, n: u32) -> VdeResult<u8> {
        Ok(self.read_bits_checked(n, 8)? as u8)
    }

    /// 读取 N 个位到 `u16` (最多 16 位)
    pub fn read_u16(&mut self, n: u32) -> VdeResult<u16> {
        Ok(self.read_bits_checked(n, 16)? as u16)
    }

    fn read_bits_checked(&mut self, n: u32, max: u32) -> VdeResult<u32> {
        if n > max {
            return Err(VdeError::InvalidWidth { requested: n, max });
        }
        if n == 0 {
            return Ok(0);
        }
        if (n as usize) > self.available() {
            return Err(VdeError::OutOfData);
        }

        let mut value: u64 = 0;
        let mut remaining = n;

        while remaining > 0 {
            let in_byte = u32::from(self.bit) + 1;
            let take = remaining.min(in_byte);

            // 当前字节中从 bit 往下取 take 位
            let shift = in_byte - take;
            let mask = ((1u32 << take) - 1) as u8;
            let bits = (self.data[self.offset] >> shift) & mask;
            value = (value << take) | u64::from(bits);

            if take == in_byte {
                self.bit = 7;
                self.offset += 1;
            } else {
                self.bit -= take as u8;
            }
            remaining -= take;
        }

        Ok(value as u32)
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: usize) -> VdeResult<()> {
        if n > self.available() {
            return Err(VdeError::OutOfData);
        }

        let consumed = self.position() + n;
        self.offset = consumed / 8;
        self.bit = 7 - (consumed % 8) as u8;
        Ok(())
    }

    /// 是否还有 RBSP 数据 (more_rbsp_data)
    ///
    /// 只有当游标正好停在末字节最低的置位 (rbsp_stop_one_bit) 上时返回 false.
    /// 末字节全零时不存在停止位, 只要还有数据就返回 true.
    pub fn more_rbsp_data(&self) -> bool {
        if self.available() == 0 {
            return false;
        }

        let last = self.data[self.data.len() - 1];
        let stop_bit = last.trailing_zeros();

        !(self.offset == self.data.len() - 1 && u32::from(self.bit) == stop_bit)
    }

    /// 读取无符号 Exp-Golomb 编码值 ue(v)
    pub fn read_ue(&mut self) -> VdeResult<u32> {
        self.read_ue_with_length().map(|(value, _)| value)
    }

    /// 读取 ue(v), 同时返回码长 (2 * 前缀 + 1)
    pub fn read_ue_with_length(&mut self) -> VdeResult<(u32, u32)> {
        let mut prefix = 0u32;
        loop {
            if self.read_bit()? == 1 {
                break;
            }
            prefix += 1;
            if prefix >= MAX_GOLOMB_PREFIX {
                return Err(VdeError::CodeTooLong);
            }
        }

        let suffix = self.read_bits(prefix)?;
        let value = ((1u64 << prefix) - 1 + u64::from(suffix)) as u32;
        Ok((value, prefix * 2 + 1))
    }

    /// 读取有符号 Exp-Golomb 编码值 se(v)
    ///
    /// 映射规则: `code = (ue + 1) / 2`, code 为偶数时取负.
    /// 该规则与 VDE 驱动联调时使用的码流一致, 与标准表 9-3 的奇偶约定相反,
    /// 在没有一致性码流验证之前不要改动.
    pub fn read_se(&mut self) -> VdeResult<i32> {
        let ue = self.read_ue()?;
        let code = ((u64::from(ue) + 1) / 2) as i32;
        if code % 2 == 0 { Ok(-code) } else { Ok(code) }
    }

    /// 获取底层数据的引用
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}
