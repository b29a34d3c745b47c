//! Bink 数据通道 (bundle).
//!
//! 每个语义通道 (块类型, 颜色, 运动矢量, DC 等) 各有一个暂存缓冲区.
//! 每个块行开头按通道各自的规则解码一批值写入缓冲区, 块重建时依次取出.
//!
//! 读写游标只在平面开头复位; 只有当已写入的值全部被取走后,
//! 下一行才会读入新的元素个数. 元素个数为 0 表示该通道在本平面内已耗尽.

use ying_core::{BitCursor, YingError, YingResult};

use super::huffman::HuffmanTable;
use super::tables::{BLOCK_TYPE_RUNS, DC_START_BITS};

/// 单个数据通道的暂存缓冲区
#[derive(Debug, Clone)]
pub(crate) struct Bundle<T> {
    data: Vec<T>,
    /// 写游标
    write_pos: usize,
    /// 读游标
    read_pos: usize,
    /// 本平面内已读到元素个数 0
    exhausted: bool,
    /// 元素个数字段的位宽 [亮度, 色度]
    count_lengths: [u32; 2],
    table: HuffmanTable,
}

impl<T: Copy + Default> Bundle<T> {
    pub(crate) fn new(capacity: usize, count_lengths: [u32; 2]) -> Self {
        Self {
            data: vec![T::default(); capacity],
            write_pos: 0,
            read_pos: 0,
            exhausted: false,
            count_lengths,
            table: HuffmanTable::default(),
        }
    }

    /// 平面开头复位游标
    fn reset(&mut self) {
        self.write_pos = 0;
        self.read_pos = 0;
        self.exhausted = false;
    }

    fn read_table(&mut self, br: &mut BitCursor<'_>) -> YingResult<()> {
        self.table = HuffmanTable::read(br)?;
        Ok(())
    }

    /// 读取本行的元素个数
    ///
    /// 通道已耗尽或上一批尚未取完时不读取, 返回 0.
    fn read_count(&mut self, br: &mut BitCursor<'_>, chroma: bool) -> YingResult<usize> {
        if self.exhausted || self.write_pos > self.read_pos {
            return Ok(0);
        }
        let n = br.bits(self.count_lengths[usize::from(chroma)])? as usize;
        if n == 0 {
            self.exhausted = true;
        }
        Ok(n)
    }

    fn check_room(&self, n: usize, what: &str) -> YingResult<()> {
        if self.write_pos + n > self.data.len() {
            return Err(YingError::Bounds(format!(
                "{} 过多: 已写 {}, 新增 {}, 容量 {}",
                what,
                self.write_pos,
                n,
                self.data.len()
            )));
        }
        Ok(())
    }

    fn push(&mut self, value: T) {
        self.data[self.write_pos] = value;
        self.write_pos += 1;
    }

    fn fill(&mut self, value: T, n: usize) {
        self.data[self.write_pos..self.write_pos + n].fill(value);
        self.write_pos += n;
    }

    /// 取出下一个值
    pub(crate) fn next(&mut self) -> YingResult<T> {
        if self.read_pos >= self.write_pos {
            return Err(YingError::Bounds(format!(
                "bundle 读取越过写游标: {}",
                self.write_pos
            )));
        }
        let v = self.data[self.read_pos];
        self.read_pos += 1;
        Ok(v)
    }

    /// 一次取出连续 n 个值
    pub(crate) fn take(&mut self, n: usize) -> YingResult<&[T]> {
        if self.read_pos + n > self.write_pos {
            return Err(YingError::Bounds(format!(
                "bundle 读取越过写游标: 需要 {}, 剩余 {}",
                n,
                self.write_pos - self.read_pos
            )));
        }
        let start = self.read_pos;
        self.read_pos += n;
        Ok(&self.data[start..start + n])
    }
}

impl Bundle<u8> {
    /// 块类型 / 子块类型: 单值重复, 或符号流中 12..=15 作为上一值的游程
    fn read_block_types(&mut self, br: &mut BitCursor<'_>, chroma: bool) -> YingResult<()> {
        let n = self.read_count(br, chroma)?;
        if n == 0 {
            return Ok(());
        }
        self.check_room(n, "块类型")?;

        if br.flag()? {
            let v = br.bits(4)? as u8;
            self.fill(v, n);
            return Ok(());
        }

        let end = self.write_pos + n;
        let mut last = 0u8;
        while self.write_pos < end {
            let v = self.table.decode(br)?;
            if v < 12 {
                last = v;
                self.push(v);
            } else {
                // 游程可以越过本行个数, 但不能越过容量
                let run = BLOCK_TYPE_RUNS[usize::from(v - 12)];
                self.check_room(run, "块类型游程")?;
                self.fill(last, run);
            }
        }
        Ok(())
    }

    fn read_patterns(&mut self, br: &mut BitCursor<'_>, chroma: bool) -> YingResult<()> {
        let n = self.read_count(br, chroma)?;
        if n == 0 {
            return Ok(());
        }
        self.check_room(n, "图案")?;

        for _ in 0..n {
            let lo = self.table.decode(br)?;
            let hi = self.table.decode(br)?;
            self.push(lo | (hi << 4));
        }
        Ok(())
    }

    fn read_runs(&mut self, br: &mut BitCursor<'_>, chroma: bool) -> YingResult<()> {
        let n = self.read_count(br, chroma)?;
        if n == 0 {
            return Ok(());
        }
        self.check_room(n, "游程")?;

        if br.flag()? {
            let v = br.bits(4)? as u8;
            self.fill(v, n);
        } else {
            for _ in 0..n {
                let v = self.table.decode(br)?;
                self.push(v);
            }
        }
        Ok(())
    }
}

impl Bundle<i8> {
    /// 运动矢量分量: 非零值后跟 1 个符号位
    fn read_motion_values(&mut self, br: &mut BitCursor<'_>, chroma: bool) -> YingResult<()> {
        let n = self.read_count(br, chroma)?;
        if n == 0 {
            return Ok(());
        }
        self.check_room(n, "运动矢量")?;

        if br.flag()? {
            let magnitude = br.bits(4)? as u8;
            let v = read_signed(br, magnitude)?;
            self.fill(v, n);
        } else {
            for _ in 0..n {
                let sym = self.table.decode(br)?;
                let v = read_signed(br, sym)?;
                self.push(v);
            }
        }
        Ok(())
    }
}

fn read_signed(br: &mut BitCursor<'_>, magnitude: u8) -> YingResult<i8> {
    let v = magnitude as i8;
    if v != 0 && br.flag()? {
        Ok(-v)
    } else {
        Ok(v)
    }
}

impl Bundle<i16> {
    /// DC 值: 初值后按每 8 个一组读取增量
    fn read_dcs(&mut self, br: &mut BitCursor<'_>, chroma: bool, signed: bool) -> YingResult<()> {
        let n = self.read_count(br, chroma)?;
        if n == 0 {
            return Ok(());
        }
        self.check_room(n, "DC")?;

        let mut v = br.bits(DC_START_BITS - u32::from(signed))? as i32;
        if signed && v != 0 && br.flag()? {
            v = -v;
        }
        self.push(v as i16);

        let rest = n - 1;
        for i in (0..rest).step_by(8) {
            let group = (rest - i).min(8);
            let width = br.bits(4)?;
            if width == 0 {
                self.fill(v as i16, group);
                continue;
            }
            for _ in 0..group {
                let mut delta = br.bits(width)? as i32;
                if delta != 0 && br.flag()? {
                    delta = -delta;
                }
                v += delta;
                if v < i32::from(i16::MIN) || v > i32::from(i16::MAX) {
                    return Err(YingError::Bounds(format!("DC 值越界: {}", v)));
                }
                self.push(v as i16);
            }
        }
        Ok(())
    }
}

/// 元素个数字段的位宽: `bitlen(x + 511)`
fn count_length(x: u32) -> u32 {
    32 - (x + 511).leading_zeros()
}

/// 一个平面解码所需的全部数据通道
#[derive(Debug, Clone)]
pub(crate) struct Bundles {
    pub(crate) block_types: Bundle<u8>,
    pub(crate) sub_block_types: Bundle<u8>,
    pub(crate) colors: Bundle<u8>,
    pub(crate) pattern: Bundle<u8>,
    pub(crate) x_off: Bundle<i8>,
    pub(crate) y_off: Bundle<i8>,
    pub(crate) intra_dc: Bundle<i16>,
    pub(crate) inter_dc: Bundle<i16>,
    pub(crate) runs: Bundle<u8>,
    /// 颜色高半字节的 16 个码表, 由上一个高半字节选择
    col_high: [HuffmanTable; 16],
    col_last: u8,
    /// 颜色值是否做符号折叠与偏置 (修订版 i 关闭)
    rebias_colors: bool,
}

impl Bundles {
    /// 按亮度平面尺寸一次性分配全部通道
    pub(crate) fn new(width: u32, height: u32, rebias_colors: bool) -> Self {
        let bw = (width + 7) >> 3;
        let bh = (height + 7) >> 3;
        let capacity = (bw * bh) as usize * 64;

        let cbw = [(width + 7) >> 3, (width + 15) >> 4];
        let cw = [width, width >> 1];
        // 平面宽度不足 8 时按 8 计
        let lengths = |f: fn(u32, u32) -> u32| -> [u32; 2] {
            [0usize, 1].map(|i| count_length(f(cw[i].max(8), cbw[i])))
        };

        let block = lengths(|w, _| w >> 3);
        Self {
            block_types: Bundle::new(capacity, block),
            sub_block_types: Bundle::new(capacity, lengths(|w, _| w >> 4)),
            colors: Bundle::new(capacity, lengths(|w, _| (w >> 3) * 64)),
            pattern: Bundle::new(capacity, lengths(|_, cbw| cbw << 3)),
            x_off: Bundle::new(capacity, block),
            y_off: Bundle::new(capacity, block),
            intra_dc: Bundle::new(capacity, block),
            inter_dc: Bundle::new(capacity, block),
            runs: Bundle::new(capacity, lengths(|w, _| (w >> 3) * 48)),
            col_high: [HuffmanTable::default(); 16],
            col_last: 0,
            rebias_colors,
        }
    }

    /// 平面开头: 复位全部游标并读取各通道码表
    pub(crate) fn start_plane(&mut self, br: &mut BitCursor<'_>) -> YingResult<()> {
        self.block_types.reset();
        self.sub_block_types.reset();
        self.colors.reset();
        self.pattern.reset();
        self.x_off.reset();
        self.y_off.reset();
        self.intra_dc.reset();
        self.inter_dc.reset();
        self.runs.reset();

        self.block_types.read_table(br)?;
        self.sub_block_types.read_table(br)?;
        for table in self.col_high.iter_mut() {
            *table = HuffmanTable::read(br)?;
        }
        self.col_last = 0;
        self.colors.read_table(br)?;
        self.pattern.read_table(br)?;
        self.x_off.read_table(br)?;
        self.y_off.read_table(br)?;
        // DC 通道没有码表
        self.runs.read_table(br)
    }

    /// 块行开头: 按固定顺序填充全部通道
    pub(crate) fn fill_row(&mut self, br: &mut BitCursor<'_>, chroma: bool) -> YingResult<()> {
        self.block_types.read_block_types(br, chroma)?;
        self.sub_block_types.read_block_types(br, chroma)?;
        self.read_colors(br, chroma)?;
        self.pattern.read_patterns(br, chroma)?;
        self.x_off.read_motion_values(br, chroma)?;
        self.y_off.read_motion_values(br, chroma)?;
        self.intra_dc.read_dcs(br, chroma, false)?;
        self.inter_dc.read_dcs(br, chroma, true)?;
        self.runs.read_runs(br, chroma)
    }

    fn read_colors(&mut self, br: &mut BitCursor<'_>, chroma: bool) -> YingResult<()> {
        let n = self.colors.read_count(br, chroma)?;
        if n == 0 {
            return Ok(());
        }
        self.colors.check_room(n, "颜色")?;

        if br.flag()? {
            let v = self.read_color(br)?;
            self.colors.fill(v, n);
        } else {
            for _ in 0..n {
                let v = self.read_color(br)?;
                self.colors.push(v);
            }
        }
        Ok(())
    }

    fn read_color(&mut self, br: &mut BitCursor<'_>) -> YingResult<u8> {
        self.col_last = self.col_high[usize::from(self.col_last)].decode(br)?;
        let v = (self.col_last << 4) | self.colors.table.decode(br)?;
        if !self.rebias_colors {
            return Ok(v);
        }
        let sign = (v as i8) >> 7;
        let folded = ((v & 0x7F) as i8 ^ sign).wrapping_sub(sign) as u8;
        Ok(folded.wrapping_add(0x80))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ying_core::BitWriter;

    /// 16x16 亮度平面: 各通道元素个数均为 10 位
    fn luma_bundles() -> Bundles {
        Bundles::new(16, 16, true)
    }

    fn write_identity_tables(bw: &mut BitWriter) {
        // 23 个码表, 每个 4 位索引 0
        for _ in 0..23 {
            bw.write_bits(0, 4);
        }
    }

    #[test]
    fn test_元素个数位宽() {
        let b = Bundles::new(16, 16, true);
        assert_eq!(b.block_types.count_lengths, [10, 10]);
        assert_eq!(b.sub_block_types.count_lengths, [10, 9]);
        assert_eq!(b.colors.count_lengths, [10, 10]);
        assert_eq!(b.pattern.count_lengths, [10, 10]);
        assert_eq!(b.runs.count_lengths, [10, 10]);

        let wide = Bundles::new(1280, 720, true);
        assert_eq!(wide.block_types.count_lengths, [10, 10]);
        assert_eq!(wide.colors.count_lengths, [14, 13]);
        assert_eq!(wide.runs.count_lengths, [13, 13]);
    }

    #[test]
    fn test_块类型游程往返() {
        let mut bundles = luma_bundles();
        let mut bw = BitWriter::new();
        write_identity_tables(&mut bw);
        bw.write_bits(14, 10); // 个数
        bw.write_bit(0); // 符号流
        for sym in [3, 12, 5, 13] {
            bw.write_bits(sym, 4);
        }
        let data = bw.finish();
        let mut br = BitCursor::new(&data);
        bundles.start_plane(&mut br).unwrap();
        bundles.block_types.read_block_types(&mut br, false).unwrap();

        let mut out = Vec::new();
        for _ in 0..14 {
            out.push(bundles.block_types.next().unwrap());
        }
        assert_eq!(out, [3, 3, 3, 3, 3, 5, 5, 5, 5, 5, 5, 5, 5, 5]);
        assert!(matches!(
            bundles.block_types.next(),
            Err(YingError::Bounds(_))
        ));
    }

    #[test]
    fn test_未取完时不读新个数() {
        let mut bundles = luma_bundles();
        let mut bw = BitWriter::new();
        bw.write_bits(2, 10);
        bw.write_bit(1);
        bw.write_bits(6, 4);
        let data = bw.finish();
        let mut br = BitCursor::new(&data);

        bundles.runs.read_runs(&mut br, false).unwrap();
        let pos = br.pos();
        assert_eq!(bundles.runs.next().unwrap(), 6);
        // 还剩 1 个未取, 第二次填充不消耗位
        bundles.runs.read_runs(&mut br, false).unwrap();
        assert_eq!(br.pos(), pos);
        assert_eq!(bundles.runs.next().unwrap(), 6);
    }

    #[test]
    fn test_个数为0后通道耗尽() {
        let mut bundles = luma_bundles();
        let mut bw = BitWriter::new();
        bw.write_bits(0, 10);
        bw.write_bits(0x3FF, 10);
        let data = bw.finish();
        let mut br = BitCursor::new(&data);

        bundles.pattern.read_patterns(&mut br, false).unwrap();
        assert_eq!(br.pos(), 10);
        bundles.pattern.read_patterns(&mut br, false).unwrap();
        assert_eq!(br.pos(), 10);
        assert!(bundles.pattern.next().is_err());
    }

    #[test]
    fn test_颜色_偏置与单值重复() {
        let mut bundles = luma_bundles();
        let mut bw = BitWriter::new();
        bw.write_bits(3, 10);
        bw.write_bit(1);
        bw.write_bits(1, 4); // 高半字节
        bw.write_bits(0, 4); // 低半字节
        let data = bw.finish();
        let mut br = BitCursor::new(&data);
        bundles.read_colors(&mut br, false).unwrap();
        for _ in 0..3 {
            assert_eq!(bundles.colors.next().unwrap(), 0x90);
        }
    }

    #[test]
    fn test_颜色_负值折叠() {
        // 0xF3: 符号位为 1, 幅值 0x73 取反 -> -0x73 + 0x80 = 0x0D
        let mut bundles = luma_bundles();
        let mut bw = BitWriter::new();
        bw.write_bits(1, 10);
        bw.write_bit(0);
        bw.write_bits(0xF, 4);
        bw.write_bits(0x3, 4);
        let data = bw.finish();
        let mut br = BitCursor::new(&data);
        bundles.read_colors(&mut br, false).unwrap();
        assert_eq!(bundles.colors.next().unwrap(), 0x0D);
        assert_eq!(bundles.col_last, 0xF);

        let mut raw = Bundles::new(16, 16, false);
        let mut br = BitCursor::new(&data);
        raw.read_colors(&mut br, false).unwrap();
        assert_eq!(raw.colors.next().unwrap(), 0xF3);
    }

    #[test]
    fn test_运动矢量符号() {
        let mut bundles = luma_bundles();
        let mut bw = BitWriter::new();
        bw.write_bits(3, 10);
        bw.write_bit(0);
        bw.write_bits(5, 4);
        bw.write_bit(1);
        bw.write_bits(0, 4);
        bw.write_bits(7, 4);
        bw.write_bit(0);
        let data = bw.finish();
        let mut br = BitCursor::new(&data);
        bundles.x_off.read_motion_values(&mut br, false).unwrap();
        assert_eq!(bundles.x_off.take(3).unwrap(), &[-5, 0, 7]);
        assert_eq!(br.pos(), 25);
    }

    #[test]
    fn test_dc_增量分组() {
        let mut bundles = luma_bundles();
        let mut bw = BitWriter::new();
        bw.write_bits(10, 10); // 10 个值
        bw.write_bits(100, 10); // 有符号初值 100
        bw.write_bit(1); // 负号
        bw.write_bits(2, 4); // 第一组位宽 2
        for _ in 0..8 {
            bw.write_bits(1, 2);
            bw.write_bit(0);
        }
        bw.write_bits(0, 4); // 第二组 (1 个) 重复
        let data = bw.finish();
        let mut br = BitCursor::new(&data);
        bundles.inter_dc.read_dcs(&mut br, false, true).unwrap();
        let values = bundles.inter_dc.take(10).unwrap().to_vec();
        assert_eq!(values, [-100, -99, -98, -97, -96, -95, -94, -93, -92, -92]);
    }

    #[test]
    fn test_dc_越界报错() {
        let mut bundles = luma_bundles();
        let mut bw = BitWriter::new();
        bw.write_bits(9, 10);
        bw.write_bits(2047, 11);
        bw.write_bits(15, 4);
        for _ in 0..8 {
            bw.write_bits(0x7FFF, 15);
            bw.write_bit(0);
        }
        let data = bw.finish();
        let mut br = BitCursor::new(&data);
        let err = bundles.intra_dc.read_dcs(&mut br, false, false).unwrap_err();
        assert!(matches!(err, YingError::Bounds(_)));
    }

    #[test]
    fn test_填充超出容量报错() {
        // 8x8 平面容量 64, 个数 100 超出
        let mut bundles = Bundles::new(8, 8, true);
        let mut bw = BitWriter::new();
        bw.write_bits(100, 10);
        bw.write_bit(1);
        bw.write_bits(1, 4);
        let data = bw.finish();
        let mut br = BitCursor::new(&data);
        let err = bundles.runs.read_runs(&mut br, false).unwrap_err();
        assert!(matches!(err, YingError::Bounds(_)));
    }
}
