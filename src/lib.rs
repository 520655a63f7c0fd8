//! # 图片压缩工具 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 命令行 (clap + tokio)                     │
//! │                                                          │
//! │  Args ── settings (JSON) ── size (KB/MB)                 │
//! │    │          │                                          │
//! │    ↓          ↓                                          │
//! │  CompressionService (spawn_blocking + 取消 + 进度节流)    │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↕ Result<Vec<OutputArtifact>, CompressError>
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            压缩引擎 (同步)                         │
//! │                                                          │
//! │  ┌─ handler ──── 批处理编排 + 阶段耗时                     │
//! │  ├─ pipeline ─── 采样解码 / PDF 按页展开                   │
//! │  ├─ search ───── 质量 × 分辨率预算搜索                     │
//! │  ├─ budget ───── PDF 页面预算 + 预降质                     │
//! │  ├─ codec ────── RasterCodec (image + fast_image_resize)  │
//! │  ├─ container ── PageContainer (lopdf 写 / mupdf 渲染)     │
//! │  └─ sink ─────── ArtifactSink                            │
//! │                                                          │
//! │  storage ─────── DirectorySink (.part → rename)          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`compressor`] | 目标体积压缩引擎：解码、搜索、PDF 装配、异步服务 |
//! | [`error`] | 应用级统一错误类型 `AppError` |
//! | [`settings`] | JSON 设置文件到 `EngineConfig` 的覆盖 |
//! | [`size`] | 体积单位解析与格式化 |
//! | [`storage`] | 产物落盘目录与原子写出 |

pub mod compressor;
pub mod error;
pub mod settings;
pub mod size;
pub mod storage;
