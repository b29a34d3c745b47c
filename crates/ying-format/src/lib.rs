//! # ying-format
//!
//! Ying 解码器容器库, 提供字节源抽象和 Bink 文件解封装.
//!
//! 解封装器只依赖头部中的帧偏移表: 每个帧记录被切分为各音轨的音频包
//! 和一个视频包, 交给 `ying-codec` 中的解码器.

pub mod demuxer;
pub mod demuxers;
pub mod io;
pub mod stream;

// 重导出常用类型
pub use demuxer::Demuxer;
pub use demuxers::bink::{BinkAudioTrack, BinkDemuxer, BinkFrameEntry, BinkHeader};
pub use io::{FileBackend, IoBackend, IoContext, MemoryBackend};
pub use stream::{AudioStreamParams, Stream, StreamParams, VideoStreamParams};
