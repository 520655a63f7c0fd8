//! # 图片压缩工具 — 命令行入口
//!
//! 本文件仅负责参数解析、日志初始化与结果输出。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use image_resizer::compressor::{CompressRequest, CompressionMode, CompressionService, OutputArtifact, RawInput};
use image_resizer::error::AppError;
use image_resizer::settings::{EngineSettings, load_settings_from_path};
use image_resizer::size::{format_size, parse_size};
use image_resizer::storage::DirectorySink;

/// 把图片压缩到指定体积，输出 JPG 或 PDF。
#[derive(Parser, Debug)]
#[command(name = "image-resizer")]
#[command(about = "🗜️ Compress images to a target size as JPG or PDF")]
struct Args {
    /// 输入文件（图片或 PDF）
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// 目标体积
    #[arg(short, long, default_value = "0", help = "Target size: 200KB, 1.5MB, 300 (KB); 0 = unconstrained")]
    target: String,

    /// 输出格式
    #[arg(short, long, default_value = "jpg", help = "Output format: jpg or pdf")]
    format: String,

    /// 压缩模式
    #[arg(short, long, default_value = "smooth", help = "smooth (keep resolution) or aggressive (smallest files)")]
    mode: String,

    /// 产物基础名称
    #[arg(short, long, help = "Base name for output files")]
    name: Option<String>,

    /// PDF 每页单独输出
    #[arg(long, help = "PDF: write one document per page instead of merging")]
    separate: bool,

    /// 预算按文件计算
    #[arg(long, help = "Apply the target size to each file instead of the total")]
    per_file: bool,

    /// 输出根目录
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// JSON 设置文件
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 以 JSON 输出产物列表
    #[arg(long)]
    json: bool,
}

fn build_request(args: &Args) -> Result<CompressRequest, AppError> {
    let target_size_bytes = parse_size(&args.target)?;
    let mode = CompressionMode::from_str(&args.mode)?;

    let inputs = RawInput::load_paths(&args.inputs);
    if inputs.len() < args.inputs.len() {
        log::warn!("⚠️ {} 个输入无法读取，已跳过", args.inputs.len() - inputs.len());
    }

    let mut request = CompressRequest::new(inputs, args.format.clone());
    request.target_size_bytes = target_size_bytes;
    request.high_quality_mode = mode.is_high_quality();
    request.custom_base_name = args.name.clone();
    request.merge_mode = !args.separate;
    request.total_size_mode = !args.per_file;
    Ok(request)
}

fn print_artifacts(artifacts: &[OutputArtifact], json: bool) -> Result<(), AppError> {
    if json {
        let content = serde_json::to_string_pretty(artifacts)
            .map_err(|e| AppError::InvalidArgument(format!("序列化结果失败: {}", e)))?;
        println!("{}", content);
        return Ok(());
    }

    if artifacts.is_empty() {
        println!("没有生成任何文件");
        return Ok(());
    }

    for artifact in artifacts {
        let marker = if artifact.best_effort { "  ⚠️ best effort" } else { "" };
        println!(
            "{}  {}  {}{}",
            artifact.file_name,
            format_size(artifact.size_bytes),
            artifact
                .handle
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| artifact.location.clone()),
            marker
        );
    }
    Ok(())
}

async fn run(args: Args) -> Result<(), AppError> {
    let settings = match &args.config {
        Some(path) => load_settings_from_path(path)?,
        None => EngineSettings::default(),
    };
    let service = Arc::new(CompressionService::with_config(settings.to_engine_config()?)?);
    let request = build_request(&args)?;
    let sink = DirectorySink::new(&args.output_dir)?;
    log::info!("📁 输出根目录：{}", sink.root().display());

    let request_id = "cli".to_string();
    let canceller = Arc::clone(&service);
    let cancel_id = request_id.clone();
    let cancel_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("收到 Ctrl-C，将在当前条目结束后停止");
            let _ = canceller.cancel(&cancel_id);
        }
    });

    let result = service
        .process_request(request_id, request, sink, |payload| {
            eprintln!("[{:>3}%] {}", payload.progress, payload.message);
        })
        .await;
    cancel_task.abort();

    let artifacts = result?;
    print_artifacts(&artifacts, args.json)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("❌ {}", err);
            if err.is_unsupported_format() {
                eprintln!("提示：请改用 --format jpg 或 --format pdf 重试");
            }
            ExitCode::FAILURE
        }
    }
}
