//! # 批处理编排模块
//!
//! ## 设计思路
//!
//! `CompressionEngine` 只负责流程编排，不直接接触文件系统或界面。
//! 处理链路固定为：
//! 1. 解析目标格式（不支持的格式在任何解码前失败）
//! 2. 逐个加载输入，PDF 输入按页展开，解码失败的输入跳过
//! 3. 按输出格式与组织方式分派到 JPG / 合并 PDF / 分页 PDF
//! 4. 把产物交给 `ArtifactSink`，写出失败的产物跳过
//!
//! ## 实现思路
//!
//! - 编解码与容器以泛型能力注入，测试中可替换为确定性实现。
//! - 位图按值在阶段间移交，处理完一项立即释放。
//! - 合并模式的 `best_effort` 由显式累加器按页取“或”。
//! - 记录 `load/process/total` 阶段耗时，便于性能诊断。

use std::time::Instant;

use super::budget::{PageBudgetPlan, process_page_for_container};
use super::progress::ProgressReporter;
use super::search::fit_with_mode;
use super::{
    ArtifactSink, BudgetScope, CompressError, CompressRequest, CompressionMode, DocumentLayout, EngineConfig,
    JpegCodec, OutputArtifact, OutputFormat, PageContainer, PdfContainer, PixelFormat, RasterCodec, SourceImage,
};

/// 压缩引擎。
///
/// 持有一份已校验的配置与两种注入能力；单次调用内所有状态都在调用栈上。
pub struct CompressionEngine<C = JpegCodec, P = PdfContainer> {
    pub(super) config: EngineConfig,
    pub(super) codec: C,
    pub(super) container: P,
}

impl CompressionEngine {
    /// 以默认 JPEG / PDF 能力创建引擎。
    ///
    /// # 示例
    /// ```rust
    /// use image_resizer::compressor::{CompressionEngine, EngineConfig};
    ///
    /// let engine = CompressionEngine::new(EngineConfig::default())?;
    /// assert_eq!(engine.config().max_working_width, 4096);
    /// # Ok::<(), image_resizer::compressor::CompressError>(())
    /// ```
    pub fn new(config: EngineConfig) -> Result<Self, CompressError> {
        let codec = JpegCodec::from_config(&config);
        Self::with_capabilities(config, codec, PdfContainer)
    }
}

/// 合并模式下跨页累积的文档状态。
struct MergeAccumulator<D> {
    document: D,
    pages_added: u32,
    best_effort: bool,
}

impl<D> MergeAccumulator<D> {
    fn new(document: D) -> Self {
        Self {
            document,
            pages_added: 0,
            best_effort: false,
        }
    }

    fn record_page(&mut self, best_effort: bool) {
        self.pages_added += 1;
        self.best_effort |= best_effort;
    }
}

impl<C, P> CompressionEngine<C, P>
where
    C: RasterCodec,
    P: PageContainer,
{
    /// 以自定义能力创建引擎，配置先经过校验。
    pub fn with_capabilities(config: EngineConfig, codec: C, container: P) -> Result<Self, CompressError> {
        config.validate()?;
        Ok(Self {
            config,
            codec,
            container,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 批处理主入口。
    ///
    /// 返回成功写出的产物；单项解码 / 写出失败只减少产物数量，不会中断批次。
    pub fn compress_and_save<S, F>(
        &self,
        request: CompressRequest,
        sink: &mut S,
        on_progress: F,
    ) -> Result<Vec<OutputArtifact>, CompressError>
    where
        S: ArtifactSink + ?Sized,
        F: FnMut(f32, &str),
    {
        self.compress_and_save_with_hooks(request, sink, on_progress, || false)
    }

    /// 带取消检查的批处理入口，`is_cancelled` 在每个条目边界调用。
    ///
    /// 内存：原始字节在解码后立即释放，但所有解码后的位图会一直驻留到处理阶段，
    /// 因为 `Total` 预算要先知道展开后的总条目数（PDF 输入按页计）才能切分。
    /// 处理阶段逐项消费，每项在编码或装页后释放，峰值约为全部工作尺寸位图之和。
    pub fn compress_and_save_with_hooks<S, F, K>(
        &self,
        request: CompressRequest,
        sink: &mut S,
        on_progress: F,
        is_cancelled: K,
    ) -> Result<Vec<OutputArtifact>, CompressError>
    where
        S: ArtifactSink + ?Sized,
        F: FnMut(f32, &str),
        K: Fn() -> bool,
    {
        let total_start = Instant::now();
        let format = OutputFormat::parse(&request.target_format)?;
        let mode = CompressionMode::from_high_quality_flag(request.high_quality_mode);
        let pixel_format = if format == OutputFormat::Jpg && mode.is_high_quality() {
            PixelFormat::Reduced
        } else {
            PixelFormat::Full
        };
        let custom_name = request.custom_name().map(str::to_string);
        let layout = request.layout();
        let scope = request.budget_scope();
        let target = request.target_size_bytes;
        let mut progress = ProgressReporter::new(on_progress);

        log::info!(
            "🚀 开始压缩：输入 {} 个 格式={} 模式={} 目标={} 字节 布局={:?} 预算范围={:?}",
            request.inputs.len(),
            format.extension(),
            mode.as_str(),
            target,
            layout,
            scope
        );

        let load_start = Instant::now();
        let total_inputs = request.inputs.len();
        let mut sources: Vec<SourceImage> = Vec::new();
        for (index, input) in request.inputs.into_iter().enumerate() {
            if is_cancelled() {
                log::info!("⏹️ 加载阶段收到取消请求");
                return Err(CompressError::Cancelled);
            }
            match self.load_input(&input, pixel_format) {
                Ok(mut pages) => sources.append(&mut pages),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => log::warn!("⚠️ 跳过无法解码的输入 '{}'：{}", input.name, err),
            }
            progress.loading(index, total_inputs);
        }
        let load_ms = load_start.elapsed().as_millis();

        if sources.is_empty() {
            log::warn!("⚠️ 没有可处理的图片（加载耗时 {}ms）", load_ms);
            progress.finish("没有可处理的图片");
            return Ok(Vec::new());
        }

        let process_start = Instant::now();
        let artifacts = match (format, layout) {
            (OutputFormat::Pdf, DocumentLayout::Merge) => self.write_merged_document(
                sources,
                target,
                scope,
                custom_name.as_deref(),
                sink,
                &mut progress,
                &is_cancelled,
            )?,
            (OutputFormat::Pdf, DocumentLayout::Separate) => self.write_separate_documents(
                sources,
                target,
                scope,
                custom_name.as_deref(),
                sink,
                &mut progress,
                &is_cancelled,
            )?,
            (OutputFormat::Jpg, _) => self.write_images(
                sources,
                target,
                scope,
                mode,
                custom_name.as_deref(),
                sink,
                &mut progress,
                &is_cancelled,
            )?,
        };
        let process_ms = process_start.elapsed().as_millis();

        progress.finish("完成");
        log::info!(
            "✅ 压缩完成：产物 {} 个 - 耗时统计 load={}ms process={}ms total={}ms",
            artifacts.len(),
            load_ms,
            process_ms,
            total_start.elapsed().as_millis()
        );

        Ok(artifacts)
    }

    /// JPG 输出：每项独立搜索并写出。
    #[allow(clippy::too_many_arguments)]
    fn write_images<S, F, K>(
        &self,
        sources: Vec<SourceImage>,
        target: u64,
        scope: BudgetScope,
        mode: CompressionMode,
        custom_name: Option<&str>,
        sink: &mut S,
        progress: &mut ProgressReporter<F>,
        is_cancelled: &K,
    ) -> Result<Vec<OutputArtifact>, CompressError>
    where
        S: ArtifactSink + ?Sized,
        F: FnMut(f32, &str),
        K: Fn() -> bool,
    {
        let count = sources.len();
        let item_budget = match (target, scope) {
            (0, _) => 0,
            (total, BudgetScope::Total) => (total / count as u64).max(1),
            (total, BudgetScope::PerFile) => total,
        };

        let mut artifacts = Vec::with_capacity(count);
        for (index, source) in sources.into_iter().enumerate() {
            if is_cancelled() {
                log::info!("⏹️ 处理阶段收到取消请求（第 {} 项）", index + 1);
                return Err(CompressError::Cancelled);
            }

            let name = match custom_name {
                Some(base) => format!("{}_{}", base, index + 1),
                None => source.display_name(),
            };

            let encoded = fit_with_mode(&self.codec, source.image(), item_budget, mode, &self.config);
            drop(source);

            match encoded {
                Ok(result) => match sink.persist(&result.bytes, &name, OutputFormat::Jpg) {
                    Ok(artifact) => {
                        log::info!(
                            "🖼️ 写出图片 {}：{} 字节 scale={:.3} quality={} best_effort={}",
                            artifact.file_name,
                            artifact.size_bytes,
                            result.scale,
                            result.quality,
                            result.best_effort
                        );
                        artifacts.push(artifact.with_best_effort(result.best_effort));
                    }
                    Err(err) => log::warn!("⚠️ 产物 '{}' 写出失败：{}", name, err),
                },
                Err(err) => log::warn!("⚠️ 图片 '{}' 编码失败，已跳过：{}", name, err),
            }

            progress.processing(index, count);
        }

        Ok(artifacts)
    }

    /// 合并 PDF 输出：所有页面装入同一份文档。
    #[allow(clippy::too_many_arguments)]
    fn write_merged_document<S, F, K>(
        &self,
        sources: Vec<SourceImage>,
        target: u64,
        scope: BudgetScope,
        custom_name: Option<&str>,
        sink: &mut S,
        progress: &mut ProgressReporter<F>,
        is_cancelled: &K,
    ) -> Result<Vec<OutputArtifact>, CompressError>
    where
        S: ArtifactSink + ?Sized,
        F: FnMut(f32, &str),
        K: Fn() -> bool,
    {
        let count = sources.len();
        let plan = PageBudgetPlan::new(target, count, scope, &self.config);
        log::info!(
            "📑 合并 PDF：{} 页 文档预算={} 每页预算={}",
            count,
            plan.document_budget,
            plan.page_budget
        );

        let mut accumulator = MergeAccumulator::new(self.container.new_document());
        for (index, source) in sources.into_iter().enumerate() {
            if is_cancelled() {
                log::info!("⏹️ 处理阶段收到取消请求（第 {} 页）", index + 1);
                return Err(CompressError::Cancelled);
            }

            let page_name = source.display_name();
            let added = process_page_for_container(&self.codec, source.into_image(), plan.page_budget, &self.config)
                .and_then(|page| {
                    self.container
                        .add_page(&mut accumulator.document, &page.image, accumulator.pages_added)?;
                    Ok(page.best_effort)
                });

            match added {
                Ok(best_effort) => accumulator.record_page(best_effort),
                Err(err) => log::warn!("⚠️ 页面 '{}' 处理失败，已跳过：{}", page_name, err),
            }
            progress.processing(index, count);
        }

        if accumulator.pages_added == 0 {
            log::warn!("⚠️ 没有页面成功装入文档，不生成 PDF");
            return Ok(Vec::new());
        }

        let name = custom_name.unwrap_or("merged");
        let MergeAccumulator {
            document,
            pages_added,
            best_effort,
        } = accumulator;

        let bytes = match self.container.serialize(document) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("⚠️ 合并文档序列化失败：{}", err);
                return Ok(Vec::new());
            }
        };

        match sink.persist(&bytes, name, OutputFormat::Pdf) {
            Ok(artifact) => {
                log::info!(
                    "📄 写出合并 PDF {}：{} 页 {} 字节 best_effort={}",
                    artifact.file_name,
                    pages_added,
                    artifact.size_bytes,
                    best_effort
                );
                Ok(vec![artifact.with_best_effort(best_effort)])
            }
            Err(err) => {
                log::warn!("⚠️ 产物 '{}' 写出失败：{}", name, err);
                Ok(Vec::new())
            }
        }
    }

    /// 分页 PDF 输出：每页单独成一份文档，产物恒标记为 best_effort。
    #[allow(clippy::too_many_arguments)]
    fn write_separate_documents<S, F, K>(
        &self,
        sources: Vec<SourceImage>,
        target: u64,
        scope: BudgetScope,
        custom_name: Option<&str>,
        sink: &mut S,
        progress: &mut ProgressReporter<F>,
        is_cancelled: &K,
    ) -> Result<Vec<OutputArtifact>, CompressError>
    where
        S: ArtifactSink + ?Sized,
        F: FnMut(f32, &str),
        K: Fn() -> bool,
    {
        let count = sources.len();
        let plan = PageBudgetPlan::new(target, count, scope, &self.config);

        let mut artifacts = Vec::with_capacity(count);
        for (index, source) in sources.into_iter().enumerate() {
            if is_cancelled() {
                log::info!("⏹️ 处理阶段收到取消请求（第 {} 页）", index + 1);
                return Err(CompressError::Cancelled);
            }

            let name = format!("{}_{}", custom_name.unwrap_or(&source.origin_name), index + 1);
            let document = process_page_for_container(&self.codec, source.into_image(), plan.page_budget, &self.config)
                .and_then(|page| {
                    let mut document = self.container.new_document();
                    self.container.add_page(&mut document, &page.image, 0)?;
                    self.container.serialize(document)
                });

            match document {
                Ok(bytes) => match sink.persist(&bytes, &name, OutputFormat::Pdf) {
                    Ok(artifact) => {
                        log::info!("📄 写出单页 PDF {}：{} 字节", artifact.file_name, artifact.size_bytes);
                        artifacts.push(artifact.with_best_effort(true));
                    }
                    Err(err) => log::warn!("⚠️ 产物 '{}' 写出失败：{}", name, err),
                },
                Err(err) => log::warn!("⚠️ 页面 '{}' 处理失败，已跳过：{}", name, err),
            }
            progress.processing(index, count);
        }

        Ok(artifacts)
    }
}
