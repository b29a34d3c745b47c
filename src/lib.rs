//! # Ying (影)
//!
//! 纯 Rust 实现的 Bink 视频 (修订版 f/g/h/i) 与 Bink Audio 解码器.
//!
//! - **解封装**: 解析 Bink 头部、音轨表和帧偏移表, 把每帧拆分为音频包与视频包
//! - **视频**: 逐平面解码 8x8 块, 输出自底向上存储的 BGRA 帧
//! - **音频**: DCT 变体解码为交错的 16 位 PCM
//! - **驱动**: 按帧率节拍逐帧推进, 时钟和输出端由宿主提供
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use ying::driver::{DriverConfig, NullAudioSink, PresentationSink, StepOutcome, StreamDriver, SystemClock};
//! use ying::format::IoContext;
//!
//! struct Screen;
//! impl PresentationSink for Screen {
//!     fn present(&mut self, frame: &ying::codec::VideoFrame) {
//!         println!("帧 {} ({}x{})", frame.pts, frame.width, frame.height);
//!     }
//! }
//!
//! let io = IoContext::open_read("intro.bik").unwrap();
//! let mut driver = StreamDriver::new(io, SystemClock::new(), DriverConfig::default());
//! driver.open().unwrap();
//! while driver.step(&mut Screen, &mut NullAudioSink).unwrap() != StepOutcome::Finished {}
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `ying-core` | 错误类型、比特流读写、有理数 |
//! | `ying-codec` | 解码器框架与 Bink 视频/音频解码器 |
//! | `ying-format` | 字节源与 Bink 解封装器 |

/// 核心类型与工具
pub use ying_core as core;

/// 解码器框架
pub use ying_codec as codec;

/// 字节源与解封装
pub use ying_format as format;

pub mod driver;
pub mod logging;

/// 获取 Ying 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置解码器的注册表
pub fn default_codec_registry() -> ying_codec::CodecRegistry {
    let mut registry = ying_codec::CodecRegistry::new();
    ying_codec::register_all(&mut registry);
    registry
}
