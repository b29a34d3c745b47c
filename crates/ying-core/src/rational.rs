//! 有理数类型, 用于帧率与时间基.
//!
//! 码流头部以 "分子/分母" 两个 u32 给出帧率, 时间基为其倒数.

use std::fmt;

/// 无符号有理数, 由分子和分母组成
///
/// 例如帧率 30000/1001 表示 29.97fps, 对应时间基 1001/30000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    /// 分子
    pub num: u32,
    /// 分母
    pub den: u32,
}

impl Rational {
    /// 创建新的有理数
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// 未定义 (分母为 0)
    pub const UNDEFINED: Self = Self { num: 0, den: 0 };

    /// 判断是否可用作帧率 (分子分母均非 0)
    pub const fn is_valid(&self) -> bool {
        self.num != 0 && self.den != 0
    }

    /// 转换为 f64 浮点数
    ///
    /// 如果分母为 0, 返回 `f64::NAN`.
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            return f64::NAN;
        }
        f64::from(self.num) / f64::from(self.den)
    }

    /// 对有理数进行约分
    pub fn reduce(self) -> Self {
        let g = gcd(self.num, self.den);
        if g == 0 {
            return self;
        }
        Self {
            num: self.num / g,
            den: self.den / g,
        }
    }

    /// 求倒数 (帧率 -> 时间基)
    pub const fn invert(self) -> Self {
        Self {
            num: self.den,
            den: self.num,
        }
    }

    /// 以本值为帧率, 计算第 `index` 帧的呈现时刻 (毫秒)
    ///
    /// 以 128 位整数运算, 结果向下取整, 超出 u64 时饱和. 分子为 0 时返回 `u64::MAX`.
    pub fn frame_time_ms(self, index: u64) -> u64 {
        if self.num == 0 {
            return u64::MAX;
        }
        let ms = u128::from(index) * 1000 * u128::from(self.den) / u128::from(self.num);
        u64::try_from(ms).unwrap_or(u64::MAX)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl From<(u32, u32)> for Rational {
    fn from((num, den): (u32, u32)) -> Self {
        Self { num, den }
    }
}

/// 求最大公约数 (欧几里得算法)
fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}
