//! # 服务层
//!
//! ## 设计思路
//!
//! 引擎本身是同步、纯 CPU 的；`CompressionService` 为异步宿主提供入口：
//! 1. 批处理放到 `spawn_blocking` 中执行，不阻塞异步运行时
//! 2. 每个请求持有独立的取消标志，引擎在条目边界检查
//! 3. 进度回调经过节流后以结构化载荷上报
//!
//! ## 实现思路
//!
//! 对外仅暴露少量稳定 API：
//! - `process_request`：执行完整批处理
//! - `cancel`：请求取消指定任务
//! - `set_config` / `config_snapshot`：运行时替换配置

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::{ArtifactSink, CompressError, CompressRequest, CompressionEngine, EngineConfig, OutputArtifact};

const PROGRESS_MIN_INTERVAL: Duration = Duration::from_millis(50);
const PROGRESS_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(400);
const PROGRESS_MIN_PERCENT_DELTA: u8 = 1;
const PROGRESS_FORCE_PERCENT_DELTA: u8 = 5;

#[derive(Debug)]
struct ProgressThrottleState {
    last_emit_at: Option<Instant>,
    last_percent: u8,
}

impl ProgressThrottleState {
    fn new() -> Self {
        Self {
            last_emit_at: None,
            last_percent: 0,
        }
    }

    fn update(&mut self, percent: u8) {
        self.last_emit_at = Some(Instant::now());
        self.last_percent = percent;
    }
}

fn should_emit_progress(state: &ProgressThrottleState, percent: u8) -> bool {
    let Some(last_emit_at) = state.last_emit_at else {
        return true;
    };

    let elapsed = last_emit_at.elapsed();
    let delta = percent.saturating_sub(state.last_percent);

    if delta >= PROGRESS_FORCE_PERCENT_DELTA {
        return true;
    }

    if delta >= PROGRESS_MIN_PERCENT_DELTA && elapsed >= PROGRESS_MIN_INTERVAL {
        return true;
    }

    delta > 0 && elapsed >= PROGRESS_HEARTBEAT_INTERVAL
}

/// 上报给宿主的进度载荷。
#[derive(Debug, Clone, Serialize)]
pub struct CompressionProgressPayload {
    pub request_id: String,
    /// 0 ~ 100。
    pub progress: u8,
    pub message: String,
    /// `running` / `completed` / `cancelled` / `failed`。
    pub status: &'static str,
    pub stage: Option<&'static str>,
    pub error_code: Option<&'static str>,
    pub error_message: Option<String>,
}

impl CompressionProgressPayload {
    fn new(request_id: &str, progress: u8, message: impl Into<String>, status: &'static str) -> Self {
        Self {
            request_id: request_id.to_string(),
            progress,
            message: message.into(),
            status,
            stage: None,
            error_code: None,
            error_message: None,
        }
    }
}

/// 压缩服务。
pub struct CompressionService {
    engine: RwLock<Arc<CompressionEngine>>,
    cancel_flags: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl CompressionService {
    /// 使用默认配置创建服务。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use image_resizer::compressor::CompressionService;
    ///
    /// let service = CompressionService::new()?;
    /// # Ok::<(), image_resizer::compressor::CompressError>(())
    /// ```
    pub fn new() -> Result<Self, CompressError> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Result<Self, CompressError> {
        let engine = CompressionEngine::new(config)?;
        Ok(Self {
            engine: RwLock::new(Arc::new(engine)),
            cancel_flags: Mutex::new(HashMap::new()),
        })
    }

    /// 替换配置；进行中的请求继续使用旧配置。
    pub fn set_config(&self, config: EngineConfig) -> Result<(), CompressError> {
        let engine = Arc::new(CompressionEngine::new(config)?);
        let mut guard = self
            .engine
            .write()
            .map_err(|_| CompressError::ResourceLimit("引擎写入锁已中毒".to_string()))?;
        *guard = engine;
        log::info!("⚙️ 已更新压缩配置");
        Ok(())
    }

    pub fn config_snapshot(&self) -> Result<EngineConfig, CompressError> {
        Ok(self.engine_snapshot()?.config().clone())
    }

    fn engine_snapshot(&self) -> Result<Arc<CompressionEngine>, CompressError> {
        self.engine
            .read()
            .map(|engine| Arc::clone(&engine))
            .map_err(|_| CompressError::ResourceLimit("引擎读取锁已中毒".to_string()))
    }

    /// 在阻塞线程池中执行一次批处理。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use image_resizer::compressor::{CompressRequest, CompressionService, MemorySink, RawInput};
    ///
    /// # async fn demo() -> Result<(), image_resizer::compressor::CompressError> {
    /// let service = CompressionService::new()?;
    /// let input = RawInput::from_path(std::path::Path::new("photo.jpg"))?;
    /// let mut request = CompressRequest::new(vec![input], "jpg");
    /// request.target_size_bytes = 200 * 1024;
    /// let artifacts = service
    ///     .process_request("job-1".to_string(), request, MemorySink::new(), |_| {})
    ///     .await?;
    /// # let _ = artifacts;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn process_request<S, F>(
        &self,
        request_id: String,
        request: CompressRequest,
        sink: S,
        on_progress: F,
    ) -> Result<Vec<OutputArtifact>, CompressError>
    where
        S: ArtifactSink + Send + 'static,
        F: FnMut(CompressionProgressPayload) + Send + 'static,
    {
        let engine = self.engine_snapshot()?;
        let cancel_flag = Arc::new(AtomicBool::new(false));
        {
            let mut guard = self
                .cancel_flags
                .lock()
                .map_err(|_| CompressError::ResourceLimit("取消标志锁已中毒".to_string()))?;
            guard.insert(request_id.clone(), Arc::clone(&cancel_flag));
        }

        let task_id = request_id.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let mut sink = sink;
            let mut emit = on_progress;
            let mut throttle = ProgressThrottleState::new();

            let result = engine.compress_and_save_with_hooks(
                request,
                &mut sink,
                |value, message| {
                    let percent = (value * 100.0).round().clamp(0.0, 100.0) as u8;
                    if percent < 100 && !should_emit_progress(&throttle, percent) {
                        return;
                    }
                    throttle.update(percent);
                    emit(CompressionProgressPayload::new(&task_id, percent, message, "running"));
                },
                || cancel_flag.load(Ordering::SeqCst),
            );

            let final_payload = match &result {
                Ok(artifacts) => CompressionProgressPayload::new(
                    &task_id,
                    100,
                    format!("已生成 {} 个文件", artifacts.len()),
                    "completed",
                ),
                Err(CompressError::Cancelled) => {
                    let mut payload =
                        CompressionProgressPayload::new(&task_id, throttle.last_percent, "已取消", "cancelled");
                    payload.error_code = Some(CompressError::Cancelled.code());
                    payload
                }
                Err(err) => {
                    let mut payload =
                        CompressionProgressPayload::new(&task_id, throttle.last_percent, "压缩失败", "failed");
                    payload.stage = Some(err.stage());
                    payload.error_code = Some(err.code());
                    payload.error_message = Some(err.to_string());
                    payload
                }
            };
            emit(final_payload);

            result
        })
        .await;

        {
            let mut guard = self
                .cancel_flags
                .lock()
                .map_err(|_| CompressError::ResourceLimit("取消标志锁已中毒".to_string()))?;
            guard.remove(&request_id);
        }

        joined.map_err(|e| CompressError::ResourceLimit(format!("压缩任务异常终止：{}", e)))?
    }

    /// 请求取消；返回是否找到对应任务。
    pub fn cancel(&self, request_id: &str) -> Result<bool, CompressError> {
        let guard = self
            .cancel_flags
            .lock()
            .map_err(|_| CompressError::ResourceLimit("取消标志锁已中毒".to_string()))?;

        if let Some(flag) = guard.get(request_id) {
            flag.store(true, Ordering::SeqCst);
            log::info!("⏹️ 已请求取消任务 {}", request_id);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::{JpegCodec, MemorySink, RasterCodec, RawInput};
    use image::{DynamicImage, ImageBuffer, Rgb};

    fn jpeg_input(name: &str) -> RawInput {
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_fn(64, 48, |x, y| {
            Rgb([(x * 4) as u8, (y * 5) as u8, 128])
        }));
        let bytes = JpegCodec::default().encode(&image, 90).expect("encode fixture");
        RawInput::new(name, bytes)
    }

    #[test]
    fn throttle_emits_first_and_large_jumps() {
        let mut state = ProgressThrottleState::new();
        assert!(should_emit_progress(&state, 0));

        state.update(10);
        assert!(!should_emit_progress(&state, 11));
        assert!(should_emit_progress(&state, 15));
        assert!(!should_emit_progress(&state, 10));
    }

    #[tokio::test]
    async fn process_request_reports_completion() {
        let service = CompressionService::new().expect("service init failed");
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&statuses);

        let artifacts = service
            .process_request(
                "job-ok".to_string(),
                CompressRequest::new(vec![jpeg_input("a"), jpeg_input("b")], "jpg"),
                MemorySink::new(),
                move |payload| {
                    if let Ok(mut guard) = recorder.lock() {
                        guard.push((payload.status, payload.progress));
                    }
                },
            )
            .await
            .expect("process should succeed");

        assert_eq!(artifacts.len(), 2);
        let statuses = statuses.lock().expect("statuses lock");
        assert_eq!(statuses.last(), Some(&("completed", 100)));
        assert!(statuses.windows(2).all(|pair| pair[0].1 <= pair[1].1));
    }

    #[tokio::test]
    async fn cancel_stops_batch_at_next_boundary() {
        let service = Arc::new(CompressionService::new().expect("service init failed"));
        let canceller = Arc::clone(&service);

        let result = service
            .process_request(
                "job-cancel".to_string(),
                CompressRequest::new(vec![jpeg_input("a"), jpeg_input("b"), jpeg_input("c")], "jpg"),
                MemorySink::new(),
                move |payload| {
                    if payload.status == "running" {
                        let _ = canceller.cancel("job-cancel");
                    }
                },
            )
            .await;

        assert!(matches!(result, Err(CompressError::Cancelled)));
        assert!(!service.cancel("job-cancel").expect("cancel lookup"));
    }

    #[tokio::test]
    async fn unsupported_format_reports_failure_payload() {
        let service = CompressionService::new().expect("service init failed");
        let last = Arc::new(Mutex::new(None));
        let recorder = Arc::clone(&last);

        let result = service
            .process_request(
                "job-bad".to_string(),
                CompressRequest::new(vec![jpeg_input("a")], "webp"),
                MemorySink::new(),
                move |payload| {
                    if let Ok(mut guard) = recorder.lock() {
                        *guard = Some(payload);
                    }
                },
            )
            .await;

        assert!(matches!(result, Err(CompressError::UnsupportedFormat { .. })));
        let last = last.lock().expect("payload lock");
        let payload = last.as_ref().expect("final payload");
        assert_eq!(payload.status, "failed");
        assert_eq!(payload.error_code, Some("unsupported_format"));
    }

    #[test]
    fn set_config_rejects_invalid_values() {
        let service = CompressionService::new().expect("service init failed");
        let mut config = EngineConfig::default();
        config.codec_budget_ratio = 2.0;

        assert!(matches!(service.set_config(config), Err(CompressError::InvalidConfig(_))));
        assert_eq!(
            service.config_snapshot().expect("snapshot").codec_budget_ratio,
            0.40
        );
    }
}
