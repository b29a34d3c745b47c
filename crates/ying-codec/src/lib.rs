//! # ying-codec
//!
//! Ying 解码器库, 提供解码器框架与 Packet/Frame 抽象, 以及 Bink 视频/音频解码器.
//!
//! ## 支持的解码器
//!
//! - **视频**: Bink (修订版 f/g/h/i, 可选 alpha 平面)
//! - **音频**: Bink Audio DCT (RDFT 变体报告为不支持)
//!
//! ## 使用示例
//!
//! ```rust
//! use ying_codec::{CodecId, CodecRegistry};
//!
//! let mut reg = CodecRegistry::new();
//! ying_codec::register_all(&mut reg);
//!
//! let decoder = reg.create_decoder(CodecId::BinkVideo).unwrap();
//! assert_eq!(decoder.name(), "binkvideo");
//! ```

pub mod codec_id;
pub mod codec_parameters;
pub mod decoder;
pub mod decoders;
pub mod frame;
pub mod packet;
pub mod registry;

// 重导出常用类型
pub use codec_id::CodecId;
pub use codec_parameters::{AudioCodecParams, CodecParameters, CodecParamsType, VideoCodecParams};
pub use decoder::Decoder;
pub use frame::{AudioFrame, Frame, PictureType, VideoFrame};
pub use packet::Packet;
pub use registry::CodecRegistry;

/// 注册所有内置解码器
pub fn register_all(registry: &mut CodecRegistry) {
    decoders::register_all_decoders(registry);
}
