//! 测试辅助: 构造参数集比特流.

/// 大端比特写入器
#[derive(Debug, Default)]
pub(crate) struct BitWriter {
    bits: Vec<bool>,
}

impl BitWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn flag(&mut self, value: bool) -> &mut Self {
        self.bits.push(value);
        self
    }

    pub(crate) fn bits(&mut self, value: u32, n: u32) -> &mut Self {
        for i in (0..n).rev() {
            self.bits.push((value >> i) & 1 != 0);
        }
        self
    }

    pub(crate) fn ue(&mut self, value: u32) -> &mut Self {
        let code = u64::from(value) + 1;
        let len = 64 - code.leading_zeros();
        for _ in 0..len - 1 {
            self.bits.push(false);
        }
        for i in (0..len).rev() {
            self.bits.push((code >> i) & 1 != 0);
        }
        self
    }

    /// 按解析器的符号约定写入 se(v): 奇数 code 为正, 偶数 code 为负
    pub(crate) fn se(&mut self, value: i32) -> &mut Self {
        let code = value.unsigned_abs();
        if code == 0 {
            return self.ue(0);
        }
        assert_eq!(value > 0, code % 2 == 1, "se({value}) 无法用当前符号约定编码");
        // code = (ue + 1) / 2
        self.ue(2 * code - 1)
    }

    /// 追加 rbsp_trailing_bits 并输出字节
    pub(crate) fn finish(&mut self) -> Vec<u8> {
        self.bits.push(true);
        while self.bits.len() % 8 != 0 {
            self.bits.push(false);
        }
        self.bytes()
    }

    /// 不追加停止位, 零填充到字节边界
    pub(crate) fn bytes(&self) -> Vec<u8> {
        self.bits
            .chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0u8, |acc, (i, &bit)| acc | (u8::from(bit) << (7 - i)))
            })
            .collect()
    }
}
