//! 统一错误类型定义.
//!
//! 所有 Ying crate 共用的错误类型, 支持跨模块传播.
//!
//! 码流相关错误分三类:
//! - [`YingError::Format`]: 头部或码流结构非法 (签名, 帧率, 大小不匹配, 未知块类型等)
//! - [`YingError::Bounds`]: 读写越界 (运动矢量越界, bundle 读越过写游标, DC 溢出等)
//! - [`YingError::Unsupported`]: 不支持的编码变体, 仅关闭对应输出, 不中止解码

use thiserror::Error;

/// Ying 统一错误类型
#[derive(Debug, Error)]
pub enum YingError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 码流或头部格式错误
    #[error("格式错误: {0}")]
    Format(String),

    /// 越界访问 (损坏的码流)
    #[error("越界访问: {0}")]
    Bounds(String),

    /// 不支持的编码变体
    #[error("不支持的功能: {0}")]
    Unsupported(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 数据不足, 需要更多输入
    #[error("数据不足, 需要更多输入")]
    NeedMoreData,

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 未找到指定的编解码器
    #[error("未找到编解码器: {0}")]
    CodecNotFound(String),

    /// 未找到指定的流
    #[error("未找到流: 索引 {0}")]
    StreamNotFound(usize),
}

impl YingError {
    /// 该错误是否应中止整个解码流程
    ///
    /// 仅 `Unsupported` 为非致命: 调用方关闭对应输出后可继续解码.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Unsupported(_) | Self::NeedMoreData)
    }
}

/// Ying 统一 Result 类型
pub type YingResult<T> = Result<T, YingError>;
