//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义应用级统一的 `AppError` 枚举，命令行、设置加载与文件存储共用，
//! 替代分散的 `.map_err(|e| e.to_string())` 与 `format!(...)` 字符串错误。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `CompressError` 与 `std::io::Error` 提供 `From` 转换，无需手动 map。
//! - 实现 `Serialize` 将错误序列化为字符串，便于 `--json` 输出。

use serde::Serialize;

use crate::compressor::CompressError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 压缩引擎错误（格式 / 解码 / 编码 / 写出）
    #[error("{0}")]
    Compress(#[from] CompressError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 输出目录不可用
    #[error("存储目录不可用: {0}")]
    Storage(String),

    /// 设置文件不可用
    #[error("设置错误: {0}")]
    Config(String),

    /// 命令行参数非法
    #[error("参数错误: {0}")]
    InvalidArgument(String),
}

impl AppError {
    /// 是否为不支持的输出格式，调用方可据此提示改用 jpg / pdf 重试。
    pub fn is_unsupported_format(&self) -> bool {
        matches!(self, Self::Compress(CompressError::UnsupportedFormat { .. }))
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
