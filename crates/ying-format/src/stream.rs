//! 流信息定义.
//!
//! 描述容器中的一条视频流或音频流, 并可转换为解码器参数.

use ying_codec::{AudioCodecParams, CodecId, CodecParameters, CodecParamsType, VideoCodecParams};
use ying_core::{MediaType, Rational};

/// 流信息
#[derive(Debug, Clone)]
pub struct Stream {
    /// 流索引 (Bink: 0 为视频, 1.. 为各音轨)
    pub index: usize,
    /// 媒体类型
    pub media_type: MediaType,
    /// 编解码器标识
    pub codec_id: CodecId,
    /// 时间基
    pub time_base: Rational,
    /// 总帧数 (0 表示未知)
    pub nb_frames: u64,
    /// 编解码器私有数据
    pub extra_data: Vec<u8>,
    /// 流特定参数
    pub params: StreamParams,
}

/// 流特定参数
#[derive(Debug, Clone)]
pub enum StreamParams {
    /// 视频流参数
    Video(VideoStreamParams),
    /// 音频流参数
    Audio(AudioStreamParams),
}

/// 视频流参数
#[derive(Debug, Clone)]
pub struct VideoStreamParams {
    /// 宽度 (像素)
    pub width: u32,
    /// 高度 (像素)
    pub height: u32,
    /// 帧率
    pub frame_rate: Rational,
    /// 四字符码
    pub codec_tag: [u8; 4],
}

/// 音频流参数
#[derive(Debug, Clone)]
pub struct AudioStreamParams {
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 声道数
    pub channels: u32,
}

impl Stream {
    /// 生成打开解码器所需的参数
    pub fn codec_parameters(&self) -> CodecParameters {
        let params = match &self.params {
            StreamParams::Video(v) => CodecParamsType::Video(VideoCodecParams {
                width: v.width,
                height: v.height,
                frame_rate: v.frame_rate,
                codec_tag: v.codec_tag,
            }),
            StreamParams::Audio(a) => CodecParamsType::Audio(AudioCodecParams {
                sample_rate: a.sample_rate,
                channels: a.channels,
            }),
        };
        CodecParameters {
            codec_id: self.codec_id,
            extra_data: self.extra_data.clone(),
            params,
        }
    }
}
