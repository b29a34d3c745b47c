//! Bink 自适应 Huffman 码表.
//!
//! 16 棵固定树在首次使用时构建并全局共享. 每个数据通道在每个平面开头
//! 读取一个树索引和一个 16 项符号置换, 解码得到的半字节经置换后输出.

use std::sync::LazyLock;

use ying_core::{BitCursor, YingError, YingResult};

use super::tables::{BINK_TREE_BITS, BINK_TREE_CODES};

/// 16 棵固定 Huffman 树
static TREES: LazyLock<[HuffTree; 16]> = LazyLock::new(|| {
    std::array::from_fn(|i| HuffTree::build(&BINK_TREE_CODES[i], &BINK_TREE_BITS[i]))
});

#[derive(Debug, Clone, Copy, Default)]
struct HuffNode {
    /// 读到 0 / 1 时的子节点
    child: [Option<u16>; 2],
    sym: Option<u8>,
}

/// 按码字展开的二叉树, 节点 0 为根
#[derive(Debug)]
struct HuffTree {
    nodes: Vec<HuffNode>,
}

impl HuffTree {
    fn build(codes: &[u8; 16], lens: &[u8; 16]) -> Self {
        let mut nodes = vec![HuffNode::default()];
        for (sym, (&code, &len)) in codes.iter().zip(lens.iter()).enumerate() {
            let mut idx = 0usize;
            // 码字低位先读
            for d in 0..len {
                let bit = usize::from((code >> d) & 1);
                idx = match nodes[idx].child[bit] {
                    Some(next) => usize::from(next),
                    None => {
                        nodes.push(HuffNode::default());
                        let next = nodes.len() - 1;
                        nodes[idx].child[bit] = Some(next as u16);
                        next
                    }
                };
            }
            nodes[idx].sym = Some(sym as u8);
        }
        Self { nodes }
    }

    fn decode(&self, br: &mut BitCursor<'_>) -> YingResult<u8> {
        let mut idx = 0usize;
        loop {
            let bit = br.bit()? as usize;
            idx = self.nodes[idx].child[bit]
                .map(usize::from)
                .ok_or_else(|| YingError::Format("Huffman 码字不在码表中".into()))?;
            if let Some(sym) = self.nodes[idx].sym {
                return Ok(sym);
            }
        }
    }
}

/// 单个数据通道的码表选择
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HuffmanTable {
    /// 固定树索引 (0 表示直接读取 4 位)
    pub(crate) index: u8,
    /// 符号置换
    pub(crate) symbols: [u8; 16],
}

impl Default for HuffmanTable {
    fn default() -> Self {
        Self {
            index: 0,
            symbols: identity(),
        }
    }
}

fn identity() -> [u8; 16] {
    std::array::from_fn(|i| i as u8)
}

impl HuffmanTable {
    /// 从码流读取树索引与符号置换
    pub(crate) fn read(br: &mut BitCursor<'_>) -> YingResult<Self> {
        let index = br.bits(4)? as u8;
        if index == 0 {
            return Ok(Self::default());
        }

        let symbols = if br.flag()? {
            read_symbol_list(br)?
        } else {
            read_shuffle(br)?
        };
        Ok(Self { index, symbols })
    }

    /// 解码一个符号 (0..=15)
    pub(crate) fn decode(&self, br: &mut BitCursor<'_>) -> YingResult<u8> {
        let nibble = if self.index == 0 {
            br.bits(4)? as u8
        } else {
            TREES[usize::from(self.index)].decode(br)?
        };
        Ok(self.symbols[usize::from(nibble)])
    }
}

/// 显式列出前 L+1 个符号, 其余按升序补齐
fn read_symbol_list(br: &mut BitCursor<'_>) -> YingResult<[u8; 16]> {
    let mut symbols = [0u8; 16];
    let mut used = [false; 16];
    let mut len = br.bits(3)? as usize;
    for slot in symbols.iter_mut().take(len + 1) {
        let sym = br.bits(4)? as u8;
        *slot = sym;
        used[usize::from(sym)] = true;
    }
    for (value, _) in used.iter().enumerate().filter(|(_, u)| !**u) {
        if len >= 15 {
            break;
        }
        len += 1;
        symbols[len] = value as u8;
    }
    Ok(symbols)
}

/// 从恒等排列出发做 D+1 轮相邻段归并
fn read_shuffle(br: &mut BitCursor<'_>) -> YingResult<[u8; 16]> {
    let depth = br.bits(2)? as usize;
    let mut input = identity();
    let mut output = [0u8; 16];
    for i in 0..=depth {
        let size = 1usize << i;
        for start in (0..16).step_by(size << 1) {
            let end = start + (size << 1);
            merge(br, &mut output[start..end], &input[start..end], size)?;
        }
        std::mem::swap(&mut input, &mut output);
    }
    Ok(input)
}

/// 每个输出位置读 1 位: 0 取左段, 1 取右段; 任一段取空后直接拷贝另一段
fn merge(br: &mut BitCursor<'_>, dst: &mut [u8], src: &[u8], size: usize) -> YingResult<()> {
    let (left, right) = src.split_at(size);
    let (mut l, mut r) = (0usize, 0usize);
    let mut out = 0usize;
    while l < size && r < size {
        if br.flag()? {
            dst[out] = right[r];
            r += 1;
        } else {
            dst[out] = left[l];
            l += 1;
        }
        out += 1;
    }
    for &v in left[l..].iter().chain(right[r..].iter()) {
        dst[out] = v;
        out += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ying_core::BitWriter;

    fn is_permutation(symbols: &[u8; 16]) -> bool {
        let mut seen = [false; 16];
        for &s in symbols {
            if s > 15 || seen[usize::from(s)] {
                return false;
            }
            seen[usize::from(s)] = true;
        }
        true
    }

    fn write_code(bw: &mut BitWriter, index: usize, nibble: usize) {
        bw.write_bits(
            u32::from(BINK_TREE_CODES[index][nibble]),
            u32::from(BINK_TREE_BITS[index][nibble]),
        );
    }

    #[test]
    fn test_固定树_码字与符号一一对应() {
        for index in 1..16 {
            let mut bw = BitWriter::new();
            for nibble in 0..16 {
                write_code(&mut bw, index, nibble);
            }
            let data = bw.finish();
            let mut br = BitCursor::new(&data);
            let table = HuffmanTable {
                index: index as u8,
                symbols: identity(),
            };
            for nibble in 0..16u8 {
                assert_eq!(table.decode(&mut br).unwrap(), nibble, "树 {}", index);
            }
        }
    }

    #[test]
    fn test_置换后仍为双射() {
        // 逆序置换下每个码字映射到 15 - nibble
        let mut symbols = identity();
        symbols.reverse();
        for index in 1..16 {
            let mut bw = BitWriter::new();
            for nibble in 0..16 {
                write_code(&mut bw, index, nibble);
            }
            let data = bw.finish();
            let mut br = BitCursor::new(&data);
            let table = HuffmanTable {
                index: index as u8,
                symbols,
            };
            let mut seen = [false; 16];
            for _ in 0..16 {
                let sym = table.decode(&mut br).unwrap();
                assert!(!seen[usize::from(sym)]);
                seen[usize::from(sym)] = true;
            }
        }
    }

    #[test]
    fn test_索引0为恒等() {
        let mut bw = BitWriter::new();
        bw.write_bits(0, 4);
        bw.write_bits(0xA, 4);
        let data = bw.finish();
        let mut br = BitCursor::new(&data);
        let table = HuffmanTable::read(&mut br).unwrap();
        assert_eq!(table, HuffmanTable::default());
        assert_eq!(table.decode(&mut br).unwrap(), 0xA);
    }

    #[test]
    fn test_显式符号列表() {
        let mut bw = BitWriter::new();
        bw.write_bits(3, 4); // 树 3
        bw.write_bit(1); // 显式列表
        bw.write_bits(2, 3); // 3 个符号
        for s in [7, 0, 12] {
            bw.write_bits(s, 4);
        }
        let data = bw.finish();
        let mut br = BitCursor::new(&data);
        let table = HuffmanTable::read(&mut br).unwrap();
        assert_eq!(table.index, 3);
        assert_eq!(
            table.symbols,
            [7, 0, 12, 1, 2, 3, 4, 5, 6, 8, 9, 10, 11, 13, 14, 15]
        );
        assert!(is_permutation(&table.symbols));
    }

    #[test]
    fn test_归并置换() {
        // 深度 0: 8 对相邻元素, 每对读 1 位; 置 1 的对交换
        let mut bw = BitWriter::new();
        bw.write_bits(5, 4);
        bw.write_bit(0);
        bw.write_bits(0, 2);
        for pair in 0..8 {
            bw.write_bit(u32::from(pair % 2 == 0));
        }
        let data = bw.finish();
        let mut br = BitCursor::new(&data);
        let table = HuffmanTable::read(&mut br).unwrap();
        assert_eq!(
            table.symbols,
            [1, 0, 2, 3, 5, 4, 6, 7, 9, 8, 10, 11, 13, 12, 14, 15]
        );
        assert_eq!(br.pos(), 4 + 1 + 2 + 8);
    }

    #[test]
    fn test_多轮归并结果为置换() {
        let mut bw = BitWriter::new();
        bw.write_bits(9, 4);
        bw.write_bit(0);
        bw.write_bits(3, 2);
        for i in 0..64u32 {
            bw.write_bit(((i * 7 + 3) % 5) & 1);
        }
        let data = bw.finish();
        let mut br = BitCursor::new(&data);
        let table = HuffmanTable::read(&mut br).unwrap();
        assert!(is_permutation(&table.symbols));
    }
}
