//! # 压缩引擎模块（compressor）
//!
//! ## 设计思路
//!
//! 该模块将“输入加载 → 采样解码 → 预算搜索 → 页面装配 → 产物写出”
//! 按职责拆分为多个子模块，避免单文件膨胀与耦合。
//!
//! - `service`：异步入口，负责取消标志与进度节流
//! - `handler`：编排整条批处理流水线
//! - `pipeline`：负责采样系数计算与输入加载（含 PDF 展开）
//! - `search`：质量 × 分辨率预算搜索（smooth / aggressive）
//! - `budget`：PDF 页面预算划分与单页预处理
//! - `codec` / `container` / `sink`：三种注入能力及默认实现
//! - `config/error/source/progress`：配置、错误、中间数据模型、进度
//!
//! ## 新同事快速上手
//!
//! 可以按下面顺序理解调用链：
//!
//! ```text
//! main.rs / 宿主
//!    ↓
//! service.rs（spawn_blocking + 取消标志 + 进度节流）
//!    ↓
//! handler.rs（统一编排 + 阶段耗时日志）
//!    ├─ pipeline.rs（采样解码 / PDF 按页展开）
//!    ├─ search.rs（JPG：逐项预算搜索）
//!    ├─ budget.rs（PDF：页面预算 + 预降质）
//!    └─ sink.rs（写出产物）
//!    ↓
//! 返回 Vec<OutputArtifact>
//! ```
//!
//! ## 分层职责建议
//!
//! - 搜索参数变更优先改 `config.rs` 中的 `SearchProfile`
//! - 业务流程顺序变更优先改 `handler.rs`
//! - 更换编码器或容器格式：实现 `RasterCodec` / `PageContainer`

mod budget;
mod codec;
mod config;
mod container;
mod error;
mod handler;
mod pipeline;
mod progress;
mod search;
mod service;
mod sink;
mod source;

#[cfg(test)]
mod test_support;

pub use budget::{
    PageBudgetPlan, ProcessedPage, codec_budget_for_page, plan_page_budgets, process_page_for_container,
};
pub use codec::{JpegCodec, RasterCodec, apply_pixel_format};
pub use config::{CompressionMode, EngineConfig, FallbackPolicy, SearchProfile, parse_resize_filter};
pub use container::{PageContainer, PdfContainer, PdfPageDocument};
pub use error::CompressError;
pub use handler::CompressionEngine;
pub use pipeline::compute_sample_factor;
pub use progress::{LOADING_PHASE_END, ProgressReporter};
pub use search::{aggressive_fit, fit_to_budget, fit_with_mode, smooth_fit};
pub use service::{CompressionProgressPayload, CompressionService};
pub use sink::{ArtifactSink, MemorySink, StoredArtifact};
pub use source::{
    BudgetScope, CompressRequest, DocumentLayout, EncodeResult, OutputArtifact, OutputFormat, PixelFormat,
    RawInput, SourceImage,
};
