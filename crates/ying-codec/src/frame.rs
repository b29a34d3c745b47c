//! 解码后的帧数据 (Frame).

use ying_core::Rational;

/// 视频帧
///
/// 单平面打包 BGRA, 每像素 4 字节. 行按自下而上顺序存放:
/// 图像第 y 行位于缓冲区第 `height - 1 - y` 行.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// BGRA 像素数据
    pub data: Vec<u8>,
    /// 每行字节数
    pub linesize: usize,
    /// 宽度 (像素)
    pub width: u32,
    /// 高度 (像素)
    pub height: u32,
    /// 显示时间戳 (帧序号)
    pub pts: i64,
    /// 时间基
    pub time_base: Rational,
    /// 是否为关键帧
    pub is_keyframe: bool,
    /// 图片类型
    pub picture_type: PictureType,
}

impl VideoFrame {
    /// 创建全零的 BGRA 视频帧
    pub fn new(width: u32, height: u32) -> Self {
        let linesize = width as usize * 4;
        Self {
            data: vec![0; linesize * height as usize],
            linesize,
            width,
            height,
            pts: 0,
            time_base: Rational::UNDEFINED,
            is_keyframe: false,
            picture_type: PictureType::None,
        }
    }

    /// 按图像坐标 (原点左上) 取一个像素的 `[b, g, r, a]`
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let row = (self.height - 1 - y) as usize;
        let off = row * self.linesize + x as usize * 4;
        let px = self.data.get(off..off + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// 音频帧
///
/// 交错排列的有符号 16 位 PCM.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// 交错采样
    pub samples: Vec<i16>,
    /// 每声道采样数
    pub nb_samples: u32,
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 声道数
    pub channels: u32,
    /// 所属数据包的时间戳 (帧序号)
    pub pts: i64,
}

/// 帧 (视频帧或音频帧的统一包装)
#[derive(Debug, Clone)]
pub enum Frame {
    /// 视频帧
    Video(VideoFrame),
    /// 音频帧
    Audio(AudioFrame),
}

/// 图片类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PictureType {
    /// 未指定
    #[default]
    None,
    /// 关键帧, 不依赖参考平面
    I,
    /// 可能引用上一帧平面
    P,
}
