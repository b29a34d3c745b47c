//! 输出端 trait.

use ying_codec::{AudioFrame, VideoFrame};

/// 视频帧呈现端
///
/// 帧只在调用期间借出, 需要保留时应自行拷贝.
pub trait PresentationSink {
    fn present(&mut self, frame: &VideoFrame);
}

/// 音频输出端, 每次接收一个块的交错 PCM
pub trait AudioSink {
    fn queue(&mut self, frame: &AudioFrame);
}

/// 丢弃所有音频
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudioSink;

impl AudioSink for NullAudioSink {
    fn queue(&mut self, _frame: &AudioFrame) {}
}
