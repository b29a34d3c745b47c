//! DCT-III (逆 DCT-II).
//!
//! `X[k] = 2/N * (x[0] / 2 + sum(x[n] * cos(pi * n * (2k + 1) / 2N)))`, n = 1..N.
//! 余弦按 `cos(pi * m / 2N)` 预先制表, m 对 4N 取模.

use std::f64::consts::PI;

/// 固定长度的 DCT-III 变换
#[derive(Debug, Clone)]
pub(crate) struct DctIII {
    len: usize,
    cos: Vec<f32>,
    scratch: Vec<f32>,
}

impl DctIII {
    /// 创建长度为 `1 << bits` 的变换
    pub(crate) fn new(bits: u32) -> Self {
        let len = 1usize << bits;
        let period = len * 4;
        let cos = (0..period)
            .map(|m| (PI * m as f64 / (2 * len) as f64).cos() as f32)
            .collect();
        Self {
            len,
            cos,
            scratch: vec![0.0; len],
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// 原地变换 `data[..len]`
    pub(crate) fn calc(&mut self, data: &mut [f32]) {
        let n = self.len;
        let period = n * 4;
        let scale = 2.0 / n as f64;
        for (k, out) in self.scratch.iter_mut().enumerate() {
            let step = 2 * k + 1;
            let mut m = 0usize;
            let mut sum = f64::from(data[0]) * 0.5;
            for &x in &data[1..n] {
                m += step;
                if m >= period {
                    m -= period;
                }
                sum += f64::from(x) * f64::from(self.cos[m]);
            }
            *out = (sum * scale) as f32;
        }
        data[..n].copy_from_slice(&self.scratch);
    }
}
