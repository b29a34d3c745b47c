//! Bink 变换引擎: 系数树读取与 8x8 整数 IDCT.
//!
//! 系数按位平面从高到低编码. 待处理项保存在一个双端队列中:
//! 分裂出的单系数插到队首 (本位平面内不再访问), 展开的四元组追加到队尾.

use std::collections::VecDeque;

use ying_core::{BitCursor, YingResult};

use super::tables::{BINK_INTER_QUANT, BINK_INTRA_QUANT, BINK_SCAN};

/// 系数列表项, 携带起始的列表位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    /// 已处理完, 不消耗位
    Empty,
    /// 4 个系数加后续 12 个系数的子树
    Tree(usize),
    /// 待展开为 4 个四元组
    Branches(usize),
    /// 连续 4 个系数
    Quad(usize),
    /// 单个系数
    Single(usize),
}

struct CoeffList {
    entries: VecDeque<Entry>,
}

impl CoeffList {
    fn dct() -> Self {
        Self::with_seeds(&[
            Entry::Tree(4),
            Entry::Tree(24),
            Entry::Tree(44),
            Entry::Single(1),
            Entry::Single(2),
            Entry::Single(3),
        ])
    }

    fn residue() -> Self {
        Self::with_seeds(&[Entry::Tree(4), Entry::Tree(24), Entry::Tree(44), Entry::Quad(0)])
    }

    fn with_seeds(seeds: &[Entry]) -> Self {
        let mut entries = VecDeque::with_capacity(128);
        entries.extend(seeds.iter().copied());
        Self { entries }
    }

    /// 遍历一个位平面
    ///
    /// `emit` 解出一个系数, 返回 `false` 时立即停止; 此时本函数也返回 `false`.
    fn walk<F>(&mut self, br: &mut BitCursor<'_>, mut emit: F) -> YingResult<bool>
    where
        F: FnMut(&mut BitCursor<'_>, usize) -> YingResult<bool>,
    {
        let mut pos = 0usize;
        while pos < self.entries.len() {
            let entry = self.entries[pos];
            if entry == Entry::Empty || !br.flag()? {
                pos += 1;
                continue;
            }
            match entry {
                Entry::Empty => {}
                Entry::Tree(c) => {
                    // 原位变为 Branches, 下一轮继续读它的位
                    self.entries[pos] = Entry::Branches(c + 4);
                    if !self.split_quad(br, c, &mut pos, &mut emit)? {
                        return Ok(false);
                    }
                }
                Entry::Quad(c) => {
                    self.entries[pos] = Entry::Empty;
                    pos += 1;
                    if !self.split_quad(br, c, &mut pos, &mut emit)? {
                        return Ok(false);
                    }
                }
                Entry::Branches(c) => {
                    self.entries[pos] = Entry::Quad(c);
                    for i in 1..4 {
                        self.entries.push_back(Entry::Quad(c + i * 4));
                    }
                }
                Entry::Single(c) => {
                    self.entries[pos] = Entry::Empty;
                    pos += 1;
                    if !emit(br, c)? {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }

    /// 四元组中每个系数读 1 位: 1 延后为单系数, 0 立即解出
    fn split_quad<F>(
        &mut self,
        br: &mut BitCursor<'_>,
        start: usize,
        pos: &mut usize,
        emit: &mut F,
    ) -> YingResult<bool>
    where
        F: FnMut(&mut BitCursor<'_>, usize) -> YingResult<bool>,
    {
        for c in start..start + 4 {
            if br.flag()? {
                self.entries.push_front(Entry::Single(c));
                *pos += 1;
            } else if !emit(br, c)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// `(c * q) >> 11`, 按 32 位回绕相乘
#[inline]
fn dequant(coeff: i16, q: i32) -> i16 {
    (i32::from(coeff).wrapping_mul(q) >> 11) as i16
}

/// 读取一个 DCT 块的 AC 系数并反量化
///
/// `block[0]` 须已放入 DC 值.
pub(crate) fn read_dct_coeffs(
    br: &mut BitCursor<'_>,
    block: &mut [i16; 64],
    intra: bool,
) -> YingResult<()> {
    let mut list = CoeffList::dct();
    let mut coded: Vec<usize> = Vec::with_capacity(64);

    let mut bits = br.bits(4)? as i32 - 1;
    while bits >= 0 {
        let mask = 1i32 << bits;
        let width = bits as u32;
        list.walk(br, |br, c| {
            let t = if width == 0 {
                if br.flag()? { -1 } else { 1 }
            } else {
                let v = (br.bits(width)? as i32) | mask;
                if br.flag()? { -v } else { v }
            };
            block[BINK_SCAN[c]] = t as i16;
            coded.push(c);
            Ok(true)
        })?;
        bits -= 1;
    }

    let quant_idx = br.bits(4)? as usize;
    let quant = if intra {
        &BINK_INTRA_QUANT[quant_idx]
    } else {
        &BINK_INTER_QUANT[quant_idx]
    };
    block[0] = dequant(block[0], quant[0]);
    for &c in &coded {
        let idx = BINK_SCAN[c];
        block[idx] = dequant(block[idx], quant[c]);
    }
    Ok(())
}

/// 读取运动补偿后的残差块
///
/// 每解出或细化一个系数消耗 1 点预算, 预算小于 0 时立即结束.
pub(crate) fn read_residue(
    br: &mut BitCursor<'_>,
    block: &mut [i16; 64],
    mut masks_count: i32,
) -> YingResult<()> {
    let mut list = CoeffList::residue();
    let mut nonzero: Vec<usize> = Vec::with_capacity(64);

    let mut mask = 1i16 << br.bits(3)?;
    while mask != 0 {
        // 先细化已有的非零系数
        for &idx in &nonzero {
            if !br.flag()? {
                continue;
            }
            if block[idx] < 0 {
                block[idx] -= mask;
            } else {
                block[idx] += mask;
            }
            masks_count -= 1;
            if masks_count < 0 {
                return Ok(());
            }
        }

        let m = mask;
        let finished = list.walk(br, |br, c| {
            let idx = BINK_SCAN[c];
            nonzero.push(idx);
            block[idx] = if br.flag()? { -m } else { m };
            masks_count -= 1;
            Ok(masks_count >= 0)
        })?;
        if !finished {
            return Ok(());
        }
        mask >>= 1;
    }
    Ok(())
}

const A1: i32 = 2896;
const A2: i32 = 2217;
const A3: i32 = 3784;
const A4: i32 = -5352;

/// 8 点一维变换 (不含输出缩放)
#[inline(always)]
fn idct_1d(s: [i32; 8]) -> [i32; 8] {
    let a0 = s[0] + s[4];
    let a1 = s[0] - s[4];
    let a2 = s[2] + s[6];
    let a3 = (A1 * (s[2] - s[6])) >> 11;
    let a4 = s[5] + s[3];
    let a5 = s[5] - s[3];
    let a6 = s[1] + s[7];
    let a7 = s[1] - s[7];
    let b0 = a4 + a6;
    let b1 = (A3 * (a5 + a7)) >> 11;
    let b2 = ((A4 * a5) >> 11) - b0 + b1;
    let b3 = ((A1 * (a6 - a4)) >> 11) - b2;
    let b4 = ((A2 * a7) >> 11) + b3 - b1;
    [
        a0 + a2 + b0,
        a1 + a3 - a2 + b2,
        a1 - a3 + a2 + b3,
        a0 - a2 - b4,
        a0 - a2 + b4,
        a1 - a3 + a2 - b3,
        a1 + a3 - a2 - b2,
        a0 + a2 - b0,
    ]
}

/// 原地 8x8 IDCT: 先列后行, 行变换输出 `(x + 0x7F) >> 8`
pub(crate) fn idct(block: &mut [i16; 64]) {
    let mut temp = [0i16; 64];
    for col in 0..8 {
        let s: [i32; 8] = std::array::from_fn(|r| i32::from(block[col + r * 8]));
        // 快速检查: AC 全零时直接复制 DC
        if s[1..].iter().all(|&v| v == 0) {
            for r in 0..8 {
                temp[col + r * 8] = block[col];
            }
            continue;
        }
        let d = idct_1d(s);
        for r in 0..8 {
            temp[col + r * 8] = d[r] as i16;
        }
    }
    for row in 0..8 {
        let off = row * 8;
        let s: [i32; 8] = std::array::from_fn(|c| i32::from(temp[off + c]));
        let d = idct_1d(s);
        for c in 0..8 {
            block[off + c] = ((d[c] + 0x7F) >> 8) as i16;
        }
    }
}
