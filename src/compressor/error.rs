//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载压缩链路中的所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! ## 分级约定
//!
//! - `UnsupportedFormat` / `InvalidConfig`：整批致命，在任何解码前返回
//! - `Decode` / `ResourceLimit`：单项失败，编排层跳过该项继续
//! - `Encode`：单次尝试失败，搜索直接进入下一个缩放档
//! - `Persist`：单项写出失败，不影响其余产物
//! - `Cancelled`：宿主在条目边界请求取消
//!
//! “目标体积无法达到”不是错误，而是结果上的 `best_effort` 标记。

/// 压缩引擎统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum CompressError {
    #[error("不支持的输出格式：{format}（{reason}）")]
    UnsupportedFormat { format: String, reason: String },

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("编码错误：{0}")]
    Encode(String),

    #[error("文档组装错误：{0}")]
    Container(String),

    #[error("写出错误：{0}")]
    Persist(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("配置错误：{0}")]
    InvalidConfig(String),

    #[error("任务已取消")]
    Cancelled,
}

impl CompressError {
    pub(crate) fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
            reason: "仅支持 JPG 与 PDF 格式".to_string(),
        }
    }

    /// 稳定的错误码，供命令行输出与日志检索使用。
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::Decode(_) => "decode_failed",
            Self::Encode(_) => "encode_failed",
            Self::Container(_) => "container_failed",
            Self::Persist(_) => "persist_failed",
            Self::ResourceLimit(_) => "resource_limit",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Cancelled => "cancelled",
        }
    }

    /// 出错所处的流水线阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat { .. } | Self::InvalidConfig(_) => "validate",
            Self::Decode(_) | Self::ResourceLimit(_) => "decode",
            Self::Encode(_) => "encode",
            Self::Container(_) => "container",
            Self::Persist(_) => "persist",
            Self::Cancelled => "cancel",
        }
    }

    /// 是否会终止整批处理。
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat { .. } | Self::InvalidConfig(_) | Self::Cancelled
        )
    }
}
