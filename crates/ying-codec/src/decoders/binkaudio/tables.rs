//! Bink 音频常量表.

/// 最大频带数
pub(crate) const MAX_BANDS: usize = 25;

/// 临界频率 (Hz), 用于划分频带边界
pub(crate) const CRITICAL_FREQS: [u32; MAX_BANDS] = [
    100, 200, 300, 400, 510, 630, 770, 920, 1080, 1270, 1480, 1720, 2000, 2320, 2700, 3150, 3700,
    4400, 5300, 6400, 7700, 9500, 12000, 15500, 24500,
];

/// 系数游程长度 (单位 8 个系数)
pub(crate) const RLE_LENGTHS: [usize; 16] = [2, 3, 4, 5, 6, 8, 9, 10, 11, 12, 13, 14, 15, 16, 32, 64];

/// 量化索引上限
pub(crate) const MAX_QUANT_INDEX: u32 = 95;

/// 量化步长的指数系数: 0.0664 / log10(e)
pub(crate) const QUANT_EXP_SCALE: f32 = 0.152_891_65;
