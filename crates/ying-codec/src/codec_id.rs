//! 编解码器标识符.

use std::fmt;
use ying_core::MediaType;

/// 编解码器标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    /// Bink 视频
    BinkVideo,
    /// Bink 音频, DCT-III 合成
    BinkAudioDct,
    /// Bink 音频, RDFT 频域合成
    BinkAudioRdft,
}

impl CodecId {
    /// 获取编解码器对应的媒体类型
    pub const fn media_type(&self) -> MediaType {
        match self {
            Self::BinkVideo => MediaType::Video,
            Self::BinkAudioDct | Self::BinkAudioRdft => MediaType::Audio,
        }
    }

    /// 获取编解码器名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BinkVideo => "binkvideo",
            Self::BinkAudioDct => "binkaudio_dct",
            Self::BinkAudioRdft => "binkaudio_rdft",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
