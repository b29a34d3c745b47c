//! 比特流读取器.
//!
//! 码流按 32 位小端字打包, 每个字从最低位开始消耗. 对完整字节而言,
//! 这等价于逐字节按最低位优先 (LSB first) 读取, 因此这里直接按字节实现.

use crate::{YingError, YingResult};

/// 比特游标
///
/// 借用一段字节数据, 按 LSB first 位序读取. 游标不持有数据, 只维护位置.
/// 越过数据末尾的读取返回 [`YingError::Bounds`], 由调用方作为码流损坏处理.
///
/// # 示例
/// ```
/// use ying_core::bitreader::BitCursor;
///
/// let data = [0b1011_0010];
/// let mut br = BitCursor::new(&data);
/// assert_eq!(br.bit().unwrap(), 0);
/// assert_eq!(br.bits(3).unwrap(), 0b001);
/// assert_eq!(br.bits(4).unwrap(), 0b1011);
/// ```
pub struct BitCursor<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前位位置
    pos: usize,
    /// 总位数
    size: usize,
}

impl<'a> BitCursor<'a> {
    /// 创建新的比特游标
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            size: data.len() * 8,
        }
    }

    /// 当前位位置
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// 总位数
    pub fn size(&self) -> usize {
        self.size
    }

    /// 剩余可读位数
    pub fn bits_left(&self) -> usize {
        self.size.saturating_sub(self.pos)
    }

    /// 是否已读完
    pub fn is_eof(&self) -> bool {
        self.pos >= self.size
    }

    /// 读取 1 个位
    pub fn bit(&mut self) -> YingResult<u32> {
        if self.pos >= self.size {
            return Err(YingError::Bounds(format!(
                "比特读取越过数据末尾: pos={}, size={}",
                self.pos, self.size
            )));
        }
        let bit = (self.data[self.pos >> 3] >> (self.pos & 7)) & 1;
        self.pos += 1;
        Ok(u32::from(bit))
    }

    /// 读取 1 个位并转换为布尔值
    pub fn flag(&mut self) -> YingResult<bool> {
        Ok(self.bit()? != 0)
    }

    /// 读取 N 个位 (最多 32 位)
    ///
    /// 先读到的位位于返回值的低位, 与重复调用 `bit()` 的顺序一致.
    pub fn bits(&mut self, n: u32) -> YingResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(YingError::InvalidArgument(format!(
                "bits: n={} 超过 32 位",
                n
            )));
        }
        if n as usize > self.bits_left() {
            return Err(YingError::Bounds(format!(
                "比特读取越过数据末尾: pos={}, n={}, size={}",
                self.pos, n, self.size
            )));
        }

        let mut out = 0u32;
        let mut done = 0u32;
        while done < n {
            let shift = (self.pos & 7) as u32;
            let take = (8 - shift).min(n - done);
            let chunk = (u32::from(self.data[self.pos >> 3]) >> shift) & ((1u32 << take) - 1);
            out |= chunk << done;
            done += take;
            self.pos += take as usize;
        }
        Ok(out)
    }

    /// 跳过 N 个位
    pub fn skip(&mut self, n: usize) -> YingResult<()> {
        if n > self.bits_left() {
            return Err(YingError::Bounds(format!(
                "跳过位数越过数据末尾: pos={}, n={}, size={}",
                self.pos, n, self.size
            )));
        }
        self.pos += n;
        Ok(())
    }

    /// 对齐到下一个 32 位边界
    ///
    /// 数据末尾不足 32 位时停在末尾.
    pub fn align_to_32(&mut self) {
        let rem = self.pos & 31;
        if rem != 0 {
            self.pos = (self.pos + 32 - rem).min(self.size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_lsb_first() {
        let data = [0b1011_0010, 0xFF];
        let mut br = BitCursor::new(&data);
        assert_eq!(br.bits(1).unwrap(), 0);
        assert_eq!(br.bits(3).unwrap(), 0b001);
        assert_eq!(br.bits(4).unwrap(), 0b1011);
        assert_eq!(br.bits(8).unwrap(), 0xFF);
        assert!(br.is_eof());
    }

    #[test]
    fn test_bits_cross_byte() {
        let data = [0x34, 0x12, 0x78, 0x56];
        let mut br = BitCursor::new(&data);
        assert_eq!(br.bits(4).unwrap(), 0x4);
        assert_eq!(br.bits(12).unwrap(), 0x123);
        assert_eq!(br.bits(16).unwrap(), 0x5678);
    }

    #[test]
    fn test_bits_32_matches_le_word() {
        let data = 0xDEAD_BEEFu32.to_le_bytes();
        let mut br = BitCursor::new(&data);
        assert_eq!(br.bits(32).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_bit_matches_bits() {
        let data = [0xA5, 0x3C];
        let mut a = BitCursor::new(&data);
        let mut b = BitCursor::new(&data);
        let mut assembled = 0u32;
        for i in 0..11 {
            assembled |= a.bit().unwrap() << i;
        }
        assert_eq!(assembled, b.bits(11).unwrap());
        assert_eq!(a.pos(), b.pos());
    }

    #[test]
    fn test_align_to_32() {
        let data = [0u8; 8];
        let mut br = BitCursor::new(&data);
        br.skip(5).unwrap();
        br.align_to_32();
        assert_eq!(br.pos(), 32);
        br.align_to_32();
        assert_eq!(br.pos(), 32);
        br.skip(1).unwrap();
        br.align_to_32();
        assert_eq!(br.pos(), 64);
    }

    #[test]
    fn test_align_clamps_to_end() {
        let data = [0u8; 3];
        let mut br = BitCursor::new(&data);
        br.skip(3).unwrap();
        br.align_to_32();
        assert_eq!(br.pos(), 24);
        assert!(br.is_eof());
    }

    #[test]
    fn test_overrun_is_bounds_error() {
        let data = [0u8; 1];
        let mut br = BitCursor::new(&data);
        assert!(matches!(br.bits(9), Err(YingError::Bounds(_))));
        br.skip(8).unwrap();
        assert!(matches!(br.bit(), Err(YingError::Bounds(_))));
        assert!(matches!(br.skip(1), Err(YingError::Bounds(_))));
    }

    #[test]
    fn test_zero_and_invalid_width() {
        let data = [0xFFu8; 8];
        let mut br = BitCursor::new(&data);
        assert_eq!(br.bits(0).unwrap(), 0);
        assert_eq!(br.pos(), 0);
        assert!(matches!(br.bits(33), Err(YingError::InvalidArgument(_))));
    }
}
