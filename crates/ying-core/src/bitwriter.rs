//! 比特流写入器.
//!
//! 与 [`BitCursor`](crate::bitreader::BitCursor) 位序一致 (LSB first),
//! 用于构造合成码流 (测试, 码流工具).

/// 比特流写入器
///
/// 向字节缓冲区按位写入数据, 先写入的位占据字节的低位.
///
/// # 示例
/// ```
/// use ying_core::bitwriter::BitWriter;
///
/// let mut bw = BitWriter::new();
/// bw.write_bits(0, 1);
/// bw.write_bits(0b001, 3);
/// bw.write_bits(0b1011, 4);
/// assert_eq!(bw.finish(), vec![0b1011_0010]);
/// ```
pub struct BitWriter {
    /// 输出缓冲区
    data: Vec<u8>,
    /// 当前字节 (正在填充)
    current_byte: u8,
    /// 当前字节中已填充的位数 (0-7)
    bit_count: u8,
}

impl BitWriter {
    /// 创建新的比特流写入器
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// 以指定容量创建比特流写入器
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            current_byte: 0,
            bit_count: 0,
        }
    }

    /// 获取已写入的总位数
    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.bit_count as usize
    }

    /// 写入 1 个位
    pub fn write_bit(&mut self, bit: u32) {
        self.current_byte |= ((bit & 1) as u8) << self.bit_count;
        self.bit_count += 1;
        if self.bit_count == 8 {
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// 写入布尔标志位
    pub fn write_flag(&mut self, flag: bool) {
        self.write_bit(u32::from(flag));
    }

    /// 写入 N 个位 (最多 32 位)
    ///
    /// 值的低位先写入.
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32, "write_bits: n={} 超过 32 位", n);
        for i in 0..n {
            self.write_bit(value >> i);
        }
    }

    /// 以零填充对齐到 32 位边界
    pub fn align_to_32(&mut self) {
        while self.bits_written() % 32 != 0 {
            self.write_bit(0);
        }
    }

    /// 结束写入, 不足一字节的部分以零补齐
    pub fn finish(mut self) -> Vec<u8> {
        if self.bit_count > 0 {
            self.data.push(self.current_byte);
        }
        self.data
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}
