//! # ying-core
//!
//! Ying 解码器核心库, 提供基础类型定义、错误处理和比特流工具.
//!
//! 上层的 `ying-codec` 与 `ying-format` 都建立在本 crate 之上.

pub mod bitreader;
pub mod bitwriter;
pub mod error;
pub mod media_type;
pub mod rational;

// 重导出常用类型
pub use bitreader::BitCursor;
pub use bitwriter::BitWriter;
pub use error::{YingError, YingResult};
pub use media_type::MediaType;
pub use rational::Rational;
