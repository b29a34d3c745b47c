//! Bink 平面解码.
//!
//! 平面缓冲区四周留出 32 像素余量, 运动矢量可以指向可见区域之外.
//! 每个块行开头填充全部数据通道, 然后逐块按块类型重建.

use ying_core::{BitCursor, YingError, YingResult};

use super::bundle::Bundles;
use super::tables::*;
use super::transform::{idct, read_dct_coeffs, read_residue};

/// 平面边缘余量 (像素)
pub(crate) const PLANE_PADDING: usize = 32;

/// 单个平面的像素缓冲区
#[derive(Debug, Clone)]
pub(crate) struct Plane {
    pub(crate) data: Vec<u8>,
    /// 行跨度 (含余量)
    pub(crate) stride: usize,
}

impl Plane {
    /// 按可见尺寸分配带余量的平面, 以 `fill` 初始化
    pub(crate) fn new(width: usize, height: usize, chroma: bool, fill: u8) -> Self {
        let (stride, rows) = if chroma {
            ((width + PLANE_PADDING) >> 1, (height + PLANE_PADDING) >> 1)
        } else {
            (width + PLANE_PADDING, height + PLANE_PADDING)
        };
        Self {
            data: vec![fill; stride * rows],
            stride,
        }
    }

    #[inline]
    pub(crate) fn at(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.stride + x]
    }
}

/// 平面解码器: 一次解码一个平面
pub(crate) struct PlaneDecoder<'a, 'b> {
    br: &'a mut BitCursor<'b>,
    bundles: &'a mut Bundles,
    cur: &'a mut [u8],
    prev: &'a [u8],
    stride: usize,
}

impl<'a, 'b> PlaneDecoder<'a, 'b> {
    pub(crate) fn new(
        br: &'a mut BitCursor<'b>,
        bundles: &'a mut Bundles,
        cur: &'a mut Plane,
        prev: &'a Plane,
    ) -> Self {
        Self {
            br,
            bundles,
            stride: cur.stride,
            cur: &mut cur.data,
            prev: &prev.data,
        }
    }

    /// 解码 `block_w` x `block_h` 个块, 结束后对齐到 32 位
    pub(crate) fn decode(&mut self, block_w: usize, block_h: usize, chroma: bool) -> YingResult<()> {
        self.bundles.start_plane(self.br)?;

        for by in 0..block_h {
            self.bundles.fill_row(self.br, chroma)?;

            let mut bx = 0;
            while bx < block_w {
                let off = by * 8 * self.stride + bx * 8;
                let block_type = self.bundles.block_types.next()?;

                // 奇数行上的 Scaled 是上一行 16x16 块的占位
                if by & 1 == 1 && block_type == BLOCK_SCALED {
                    bx += 2;
                    continue;
                }

                match block_type {
                    BLOCK_SKIP => self.copy_block(off, off),
                    BLOCK_SCALED => {
                        self.scaled(off)?;
                        bx += 1;
                    }
                    BLOCK_MOTION => self.motion(off, bx, by)?,
                    BLOCK_RUN => self.run(off, false)?,
                    BLOCK_RESIDUE => self.residue(off, bx, by)?,
                    BLOCK_INTRA => self.intra(off)?,
                    BLOCK_FILL => {
                        let v = self.bundles.colors.next()?;
                        self.fill(off, 8, v);
                    }
                    BLOCK_INTER => self.inter(off, bx, by)?,
                    BLOCK_PATTERN => self.pattern(off, false)?,
                    BLOCK_RAW => self.raw(off, false)?,
                    other => {
                        return Err(YingError::Format(format!(
                            "未知块类型 {} (块 {}, {})",
                            other, bx, by
                        )));
                    }
                }
                bx += 1;
            }
        }

        self.br.align_to_32();
        Ok(())
    }

    fn copy_block(&mut self, dst: usize, src: usize) {
        for row in 0..8 {
            let d = dst + row * self.stride;
            let s = src + row * self.stride;
            self.cur[d..d + 8].copy_from_slice(&self.prev[s..s + 8]);
        }
    }

    /// 运动补偿复制, 源块越出上一帧平面时报错且不写入
    fn motion(&mut self, off: usize, bx: usize, by: usize) -> YingResult<()> {
        let x = self.bundles.x_off.next()?;
        let y = self.bundles.y_off.next()?;

        let src = off as isize + isize::from(y) * self.stride as isize + isize::from(x);
        if src < 0 || src as usize + 7 * self.stride + 8 > self.prev.len() {
            return Err(YingError::Bounds(format!(
                "运动补偿越界: 块 ({}, {}), 偏移 ({}, {})",
                bx, by, x, y
            )));
        }
        self.copy_block(off, src as usize);
        Ok(())
    }

    #[inline]
    fn put(&mut self, off: usize, pos: u8, value: u8, scaled: bool) {
        let (row, col) = (usize::from(pos >> 3), usize::from(pos & 7));
        if scaled {
            let p = off + row * 2 * self.stride + col * 2;
            self.cur[p] = value;
            self.cur[p + 1] = value;
            self.cur[p + self.stride] = value;
            self.cur[p + self.stride + 1] = value;
        } else {
            self.cur[off + row * self.stride + col] = value;
        }
    }

    fn run(&mut self, off: usize, scaled: bool) -> YingResult<()> {
        let scan = &BINK_PATTERNS[self.br.bits(4)? as usize];

        let mut i = 0usize;
        loop {
            let run = usize::from(self.bundles.runs.next()?) + 1;
            if i + run > 64 {
                return Err(YingError::Format(format!("Run 块游程越界: {} + {}", i, run)));
            }
            if self.br.flag()? {
                let v = self.bundles.colors.next()?;
                for &pos in &scan[i..i + run] {
                    self.put(off, pos, v, scaled);
                }
            } else {
                for &pos in &scan[i..i + run] {
                    let v = self.bundles.colors.next()?;
                    self.put(off, pos, v, scaled);
                }
            }
            i += run;
            if i >= 63 {
                break;
            }
        }

        // 第 64 个像素隐含
        if i == 63 {
            let v = self.bundles.colors.next()?;
            self.put(off, scan[63], v, scaled);
        }
        Ok(())
    }

    fn residue(&mut self, off: usize, bx: usize, by: usize) -> YingResult<()> {
        self.motion(off, bx, by)?;
        let masks_count = self.br.bits(7)? as i32;
        let mut block = [0i16; 64];
        read_residue(self.br, &mut block, masks_count)?;
        self.add_block(off, &block);
        Ok(())
    }

    fn intra(&mut self, off: usize) -> YingResult<()> {
        let mut block = [0i16; 64];
        block[0] = self.bundles.intra_dc.next()?;
        read_dct_coeffs(self.br, &mut block, true)?;
        idct(&mut block);
        for row in 0..8 {
            let d = off + row * self.stride;
            for (dst, &v) in self.cur[d..d + 8].iter_mut().zip(&block[row * 8..row * 8 + 8]) {
                *dst = v as u8;
            }
        }
        Ok(())
    }

    fn inter(&mut self, off: usize, bx: usize, by: usize) -> YingResult<()> {
        self.motion(off, bx, by)?;
        let mut block = [0i16; 64];
        block[0] = self.bundles.inter_dc.next()?;
        read_dct_coeffs(self.br, &mut block, false)?;
        idct(&mut block);
        self.add_block(off, &block);
        Ok(())
    }

    /// 逐像素回绕相加
    fn add_block(&mut self, off: usize, block: &[i16; 64]) {
        for row in 0..8 {
            let d = off + row * self.stride;
            for (dst, &v) in self.cur[d..d + 8].iter_mut().zip(&block[row * 8..row * 8 + 8]) {
                *dst = dst.wrapping_add(v as u8);
            }
        }
    }

    fn fill(&mut self, off: usize, size: usize, value: u8) {
        for row in 0..size {
            let d = off + row * self.stride;
            self.cur[d..d + size].fill(value);
        }
    }

    fn pattern(&mut self, off: usize, scaled: bool) -> YingResult<()> {
        let colors = [self.bundles.colors.next()?, self.bundles.colors.next()?];
        for row in 0..8u8 {
            let mut mask = self.bundles.pattern.next()?;
            for col in 0..8u8 {
                self.put(off, (row << 3) | col, colors[usize::from(mask & 1)], scaled);
                mask >>= 1;
            }
        }
        Ok(())
    }

    fn raw(&mut self, off: usize, scaled: bool) -> YingResult<()> {
        let mut pixels = [0u8; 64];
        pixels.copy_from_slice(self.bundles.colors.take(64)?);
        for (pos, &v) in pixels.iter().enumerate() {
            self.put(off, pos as u8, v, scaled);
        }
        Ok(())
    }

    /// 16x16 块: 子块类型决定重建方式, 每个值写成 2x2
    fn scaled(&mut self, off: usize) -> YingResult<()> {
        match self.bundles.sub_block_types.next()? {
            BLOCK_RUN => self.run(off, true),
            BLOCK_INTRA => {
                let mut block = [0i16; 64];
                block[0] = self.bundles.intra_dc.next()?;
                read_dct_coeffs(self.br, &mut block, true)?;
                idct(&mut block);
                for (pos, &v) in block.iter().enumerate() {
                    self.put(off, pos as u8, v as u8, true);
                }
                Ok(())
            }
            BLOCK_FILL => {
                let v = self.bundles.colors.next()?;
                self.fill(off, 16, v);
                Ok(())
            }
            BLOCK_PATTERN => self.pattern(off, true),
            BLOCK_RAW => self.raw(off, true),
            other => Err(YingError::Format(format!("无效的 16x16 子块类型 {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ying_core::BitWriter;

    /// 所有码表使用索引 0
    fn write_tables(bw: &mut BitWriter) {
        for _ in 0..23 {
            bw.write_bits(0, 4);
        }
    }

    /// 仅写块类型通道, 其余通道个数为 0
    fn write_row_types(bw: &mut BitWriter, count: u32, block_type: u32) {
        bw.write_bits(count, 10);
        bw.write_bit(1);
        bw.write_bits(block_type, 4);
        for _ in 0..8 {
            bw.write_bits(0, 10);
        }
    }

    fn planes(fill_cur: u8) -> (Plane, Plane) {
        let mut prev = Plane::new(16, 16, false, 0);
        for (i, v) in prev.data.iter_mut().enumerate() {
            *v = (i * 7 % 251) as u8;
        }
        (Plane::new(16, 16, false, fill_cur), prev)
    }

    #[test]
    fn test_平面尺寸含余量() {
        let luma = Plane::new(16, 16, false, 0);
        assert_eq!(luma.stride, 48);
        assert_eq!(luma.data.len(), 48 * 48);
        let chroma = Plane::new(16, 16, true, 0);
        assert_eq!(chroma.stride, 24);
        assert_eq!(chroma.data.len(), 24 * 24);
    }

    #[test]
    fn test_skip块复制上一帧() {
        let mut bw = BitWriter::new();
        write_tables(&mut bw);
        write_row_types(&mut bw, 2, u32::from(BLOCK_SKIP));
        // 第二行: 其余通道已耗尽, 只有块类型读入新个数
        bw.write_bits(2, 10);
        bw.write_bit(1);
        bw.write_bits(u32::from(BLOCK_SKIP), 4);
        bw.align_to_32();
        let data = bw.finish();

        let (mut cur, prev) = planes(0xEE);
        let mut bundles = Bundles::new(16, 16, true);
        let mut br = BitCursor::new(&data);
        PlaneDecoder::new(&mut br, &mut bundles, &mut cur, &prev)
            .decode(2, 2, false)
            .unwrap();

        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(cur.at(x, y), prev.at(x, y), "({}, {})", x, y);
            }
        }
        // 可见区域外未被写入
        assert_eq!(cur.at(16, 0), 0xEE);
        assert_eq!(br.pos() % 32, 0);
    }

    #[test]
    fn test_运动补偿越界报错且不写入() {
        let mut bw = BitWriter::new();
        write_tables(&mut bw);
        bw.write_bits(2, 10); // 块类型: 2 个 Motion
        bw.write_bit(1);
        bw.write_bits(u32::from(BLOCK_MOTION), 4);
        bw.write_bits(0, 10); // 子块类型
        bw.write_bits(0, 10); // 颜色
        bw.write_bits(0, 10); // 图案
        for _ in 0..2 {
            // x / y 偏移: 单值 -15
            bw.write_bits(2, 10);
            bw.write_bit(1);
            bw.write_bits(15, 4);
            bw.write_bit(1);
        }
        for _ in 0..3 {
            bw.write_bits(0, 10);
        }
        let data = bw.finish();

        let (mut cur, prev) = planes(0x55);
        let mut bundles = Bundles::new(16, 16, true);
        let mut br = BitCursor::new(&data);
        let err = PlaneDecoder::new(&mut br, &mut bundles, &mut cur, &prev)
            .decode(2, 2, false)
            .unwrap_err();
        assert!(matches!(err, YingError::Bounds(_)));
        assert!(cur.data.iter().all(|&v| v == 0x55));
    }

    #[test]
    fn test_运动补偿平移() {
        let mut bw = BitWriter::new();
        write_tables(&mut bw);
        bw.write_bits(2, 10);
        bw.write_bit(1);
        bw.write_bits(u32::from(BLOCK_MOTION), 4);
        for _ in 0..3 {
            bw.write_bits(0, 10);
        }
        // x 偏移 +3, y 偏移 +2
        for v in [3, 2] {
            bw.write_bits(2, 10);
            bw.write_bit(1);
            bw.write_bits(v, 4);
            bw.write_bit(0);
        }
        for _ in 0..3 {
            bw.write_bits(0, 10);
        }
        // 第二行全部 Skip
        write_row_types(&mut bw, 2, u32::from(BLOCK_SKIP));
        let data = bw.finish();

        let (mut cur, prev) = planes(0);
        let mut bundles = Bundles::new(16, 16, true);
        let mut br = BitCursor::new(&data);
        PlaneDecoder::new(&mut br, &mut bundles, &mut cur, &prev)
            .decode(2, 2, false)
            .unwrap();
        for y in 0..8 {
            for x in 0..16 {
                assert_eq!(cur.at(x, y), prev.at(x + 3, y + 2));
            }
        }
    }

    #[test]
    fn test_未知块类型() {
        let mut bw = BitWriter::new();
        write_tables(&mut bw);
        write_row_types(&mut bw, 2, 11);
        let data = bw.finish();

        let (mut cur, prev) = planes(0);
        let mut bundles = Bundles::new(16, 16, true);
        let mut br = BitCursor::new(&data);
        let err = PlaneDecoder::new(&mut br, &mut bundles, &mut cur, &prev)
            .decode(2, 2, false)
            .unwrap_err();
        assert!(matches!(err, YingError::Format(_)));
    }

    #[test]
    fn test_scaled填充覆盖16x16() {
        let mut bw = BitWriter::new();
        write_tables(&mut bw);
        // 第 0 行: 块类型 Scaled x1, 子块 Fill x1, 颜色 0x90
        bw.write_bits(1, 10);
        bw.write_bit(1);
        bw.write_bits(u32::from(BLOCK_SCALED), 4);
        bw.write_bits(1, 10);
        bw.write_bit(1);
        bw.write_bits(u32::from(BLOCK_FILL), 4);
        bw.write_bits(1, 10);
        bw.write_bit(1);
        bw.write_bits(1, 4);
        bw.write_bits(0, 4);
        for _ in 0..6 {
            bw.write_bits(0, 10);
        }
        // 第 1 行: 占位 Scaled, 跳过两列; 子块与颜色通道读到个数 0
        bw.write_bits(1, 10);
        bw.write_bit(1);
        bw.write_bits(u32::from(BLOCK_SCALED), 4);
        bw.write_bits(0, 10);
        bw.write_bits(0, 10);
        let data = bw.finish();

        let (mut cur, prev) = planes(0);
        let mut bundles = Bundles::new(16, 16, true);
        let mut br = BitCursor::new(&data);
        PlaneDecoder::new(&mut br, &mut bundles, &mut cur, &prev)
            .decode(2, 2, false)
            .unwrap();
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(cur.at(x, y), 0x90);
            }
        }
        assert_eq!(cur.at(16, 16), 0);
    }

    #[test]
    fn test_pattern块() {
        let mut bw = BitWriter::new();
        write_tables(&mut bw);
        // 16x8 平面, 1 行 2 块: Pattern + Raw
        bw.write_bits(2, 10);
        bw.write_bit(0);
        bw.write_bits(u32::from(BLOCK_PATTERN), 4);
        bw.write_bits(u32::from(BLOCK_RAW), 4);
        bw.write_bits(0, 10); // 子块类型
        // 颜色: 2 个 Pattern 颜色 + 64 个 Raw 像素, 关闭偏置后按原值写入
        bw.write_bits(66, 10);
        bw.write_bit(0);
        bw.write_bits(0, 4);
        bw.write_bits(0x1, 4);
        bw.write_bits(0xF, 4);
        bw.write_bits(0xF, 4);
        for i in 0..64u32 {
            bw.write_bits(0, 4);
            bw.write_bits(i & 0xF, 4);
        }
        // 图案: 每行 0b0101_0101
        bw.write_bits(8, 10);
        for _ in 0..8 {
            bw.write_bits(0x5, 4);
            bw.write_bits(0x5, 4);
        }
        for _ in 0..5 {
            bw.write_bits(0, 10);
        }
        let data = bw.finish();

        let mut cur = Plane::new(16, 8, false, 0);
        let prev = Plane::new(16, 8, false, 0);
        let mut bundles = Bundles::new(16, 8, false);
        let mut br = BitCursor::new(&data);
        PlaneDecoder::new(&mut br, &mut bundles, &mut cur, &prev)
            .decode(2, 1, false)
            .unwrap();
        for y in 0..8 {
            for x in 0..8 {
                let expected = if x % 2 == 0 { 0xFF } else { 0x01 };
                assert_eq!(cur.at(x, y), expected, "({}, {})", x, y);
                assert_eq!(cur.at(x + 8, y), ((y * 8 + x) & 0xF) as u8);
            }
        }
    }
}
