//! # 产物写出模块
//!
//! 引擎把编码完成的字节交给 `ArtifactSink`，由其负责持久化并返回产物记录。
//! 文件系统实现见 `crate::storage::DirectorySink`；这里提供内存实现，
//! 便于嵌入调用与测试。

use super::{CompressError, OutputArtifact, OutputFormat};

/// 产物写出能力。
pub trait ArtifactSink {
    /// 持久化字节；返回的记录中 `best_effort` 由引擎随后填写。
    fn persist(
        &mut self,
        bytes: &[u8],
        suggested_name: &str,
        format: OutputFormat,
    ) -> Result<OutputArtifact, CompressError>;
}

impl<S: ArtifactSink + ?Sized> ArtifactSink for &mut S {
    fn persist(
        &mut self,
        bytes: &[u8],
        suggested_name: &str,
        format: OutputFormat,
    ) -> Result<OutputArtifact, CompressError> {
        (**self).persist(bytes, suggested_name, format)
    }
}

/// 内存中的一份产物。
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub file_name: String,
    pub format: OutputFormat,
    pub bytes: Vec<u8>,
}

/// 把产物保存在内存中的 sink。
#[derive(Debug, Default)]
pub struct MemorySink {
    pub artifacts: Vec<StoredArtifact>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactSink for MemorySink {
    fn persist(
        &mut self,
        bytes: &[u8],
        suggested_name: &str,
        format: OutputFormat,
    ) -> Result<OutputArtifact, CompressError> {
        let file_name = format!("{}.{}", suggested_name, format.extension());
        self.artifacts.push(StoredArtifact {
            file_name: file_name.clone(),
            format,
            bytes: bytes.to_vec(),
        });

        Ok(OutputArtifact {
            file_name,
            location: "memory".to_string(),
            size_bytes: bytes.len() as u64,
            handle: None,
            best_effort: false,
            actual_format: format,
        })
    }
}
