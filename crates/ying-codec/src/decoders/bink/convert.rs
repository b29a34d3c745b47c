//! YUVA 平面到打包 BGRA 的转换.
//!
//! 输出行自下而上存放: 图像第 y 行写到第 `height - 1 - y` 行.

use super::plane::Plane;

/// 定点 YUV -> RGB (系数按 2^10 缩放)
#[inline]
pub(crate) fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = i32::from(y);
    let u = i32::from(u) - 128;
    let v = i32::from(v) - 128;
    let r = y + ((1357 * v) >> 10);
    let g = y - ((691 * v) >> 10) - ((333 * u) >> 10);
    let b = y + ((1715 * u) >> 10);
    [r, g, b].map(|c| c.clamp(0, 255) as u8)
}

/// 把 Y/U/V/A 四个平面转换为 BGRA, 写入 `out`
///
/// 色度按 (x >> 1, y >> 1) 取样.
pub(crate) fn yuva_to_bgra(planes: &[Plane; 4], width: usize, height: usize, out: &mut [u8]) {
    let [py, pu, pv, pa] = planes;
    let linesize = width * 4;
    for y in 0..height {
        let row = &mut out[(height - 1 - y) * linesize..(height - y) * linesize];
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let [r, g, b] = yuv_to_rgb(py.at(x, y), pu.at(x >> 1, y >> 1), pv.at(x >> 1, y >> 1));
            px.copy_from_slice(&[b, g, r, pa.at(x, y)]);
        }
    }
}
