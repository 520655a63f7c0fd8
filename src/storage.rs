//! 产物存储目录管理模块
//!
//! # 设计思路
//!
//! 统一管理压缩产物的落盘路径：PDF 写入 `Documents/ImagePro`，
//! JPG 写入 `Pictures/ImagePro`，均位于可配置的根目录下，目录不存在时自动创建。
//!
//! # 实现思路
//!
//! - 先写入同目录下的 `.part` 临时文件，写完再重命名为正式文件名，
//!   中途失败不会留下半截产物。
//! - 同名文件已存在时追加 `_{时间戳}` 后缀，不覆盖旧文件。
//! - 文件名中的路径分隔符与保留字符统一替换为 `_`。
//! - 所有可能失败的操作均返回 `Result`，不使用 `expect()` / `unwrap()`。

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::compressor::{ArtifactSink, CompressError, OutputArtifact, OutputFormat};
use crate::error::AppError;

const APP_FOLDER: &str = "ImagePro";

/// 格式对应的逻辑存储位置（相对根目录）。
pub fn collection_for(format: OutputFormat) -> String {
    match format {
        OutputFormat::Pdf => format!("Documents/{}", APP_FOLDER),
        OutputFormat::Jpg => format!("Pictures/{}", APP_FOLDER),
    }
}

/// 替换文件名中的非法字符，空名称回退为 `output`。
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "output".to_string()
    } else {
        cleaned
    }
}

/// 写入本地目录的产物 sink。
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    /// 以根目录创建 sink，根目录不存在时自动创建。
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, AppError> {
        let root = root.into();
        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| {
                AppError::Storage(format!("创建输出目录 '{}' 失败: {}", root.display(), e))
            })?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, format: OutputFormat) -> Result<PathBuf, CompressError> {
        let dir = self.root.join(collection_for(format));
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| {
                CompressError::Persist(format!("创建目录 '{}' 失败: {}", dir.display(), e))
            })?;
        }
        Ok(dir)
    }

    /// 选出不与现有文件冲突的文件名。
    fn available_file_name(dir: &Path, stem: &str, extension: &str) -> String {
        let preferred = format!("{}.{}", stem, extension);
        if !dir.join(&preferred).exists() {
            return preferred;
        }

        let timestamp = Local::now().format("%Y%m%d%H%M%S%f");
        format!("{}_{}.{}", stem, timestamp, extension)
    }
}

impl ArtifactSink for DirectorySink {
    fn persist(
        &mut self,
        bytes: &[u8],
        suggested_name: &str,
        format: OutputFormat,
    ) -> Result<OutputArtifact, CompressError> {
        let dir = self.collection_dir(format)?;
        let stem = sanitize_file_name(suggested_name);
        let file_name = Self::available_file_name(&dir, &stem, format.extension());
        let final_path = dir.join(&file_name);
        let pending_path = dir.join(format!("{}.part", file_name));

        if let Err(e) = fs::write(&pending_path, bytes) {
            let _ = fs::remove_file(&pending_path);
            return Err(CompressError::Persist(format!(
                "写入 '{}' 失败: {}",
                pending_path.display(),
                e
            )));
        }

        if let Err(e) = fs::rename(&pending_path, &final_path) {
            let _ = fs::remove_file(&pending_path);
            return Err(CompressError::Persist(format!(
                "提交 '{}' 失败: {}",
                final_path.display(),
                e
            )));
        }

        log::debug!("💾 已写出 {}（{} 字节）", final_path.display(), bytes.len());

        Ok(OutputArtifact {
            file_name,
            location: collection_for(format),
            size_bytes: bytes.len() as u64,
            handle: Some(final_path),
            best_effort: false,
            actual_format: format,
        })
    }
}
