//! 解码器注册表.
//!
//! 按 `CodecId` 查找并实例化解码器.

use std::collections::HashMap;

use ying_core::{YingError, YingResult};

use crate::codec_id::CodecId;
use crate::decoder::Decoder;

/// 解码器工厂函数类型
pub type DecoderFactory = fn() -> YingResult<Box<dyn Decoder>>;

/// 解码器注册表
pub struct CodecRegistry {
    /// 解码器工厂映射
    decoders: HashMap<CodecId, Vec<DecoderEntry>>,
}

/// 解码器注册条目
struct DecoderEntry {
    /// 解码器名称
    name: String,
    /// 工厂函数
    factory: DecoderFactory,
}

impl CodecRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// 注册一个解码器
    pub fn register_decoder(
        &mut self,
        codec_id: CodecId,
        name: impl Into<String>,
        factory: DecoderFactory,
    ) {
        self.decoders
            .entry(codec_id)
            .or_default()
            .push(DecoderEntry {
                name: name.into(),
                factory,
            });
    }

    /// 创建指定编解码器 ID 的解码器实例
    ///
    /// 同一 ID 注册了多个实现时使用最先注册的.
    pub fn create_decoder(&self, codec_id: CodecId) -> YingResult<Box<dyn Decoder>> {
        let entry = self
            .decoders
            .get(&codec_id)
            .and_then(|entries| entries.first())
            .ok_or_else(|| YingError::CodecNotFound(format!("未找到 {} 的解码器", codec_id)))?;
        (entry.factory)()
    }

    /// 获取所有已注册的解码器名称
    pub fn list_decoders(&self) -> Vec<(CodecId, &str)> {
        let mut result = Vec::new();
        for (id, entries) in &self.decoders {
            for entry in entries {
                result.push((*id, entry.name.as_str()));
            }
        }
        result
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_注册所有解码器() {
        let mut registry = CodecRegistry::new();
        crate::register_all(&mut registry);
        assert_eq!(registry.list_decoders().len(), 3);
    }

    #[test]
    fn test_按codec_id创建解码器() {
        let mut registry = CodecRegistry::new();
        crate::register_all(&mut registry);

        for id in [
            CodecId::BinkVideo,
            CodecId::BinkAudioDct,
            CodecId::BinkAudioRdft,
        ] {
            match registry.create_decoder(id) {
                Ok(dec) => assert_eq!(dec.codec_id(), id),
                Err(err) => panic!("创建 {} 解码器失败: {}", id, err),
            }
        }
    }

    #[test]
    fn test_未注册的解码器返回错误() {
        let registry = CodecRegistry::new();
        assert!(matches!(
            registry.create_decoder(CodecId::BinkVideo),
            Err(YingError::CodecNotFound(_))
        ));
    }
}
