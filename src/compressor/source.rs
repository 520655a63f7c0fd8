//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入类型”和“流水线中间结果”解耦：
//! - `RawInput` 表示已加载但未解码的字节
//! - `SourceImage` 表示解码后的位图，同一时刻只归属一个阶段
//! - `EncodeResult` 表示搜索阶段输出的编码字节
//! - `OutputArtifact` 表示已写出的产物记录
//!
//! `SourceImage` 按值在阶段间移交，被编码或装入页面后即离开作用域释放，
//! 任何提前返回的路径也同样会释放。

use std::path::Path;

use image::DynamicImage;
use serde::Serialize;

use super::CompressError;

/// 解码后的像素格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// RGB8，保留完整色深（不保留 alpha）。
    Full,
    /// RGB565 量化后的 RGB8，用于可接受色深损失的 JPG 高压缩路径。
    Reduced,
}

/// 加载阶段输出：原始字节与来源名称。
#[derive(Debug, Clone)]
pub struct RawInput {
    /// 原始文件字节。
    pub bytes: Vec<u8>,
    /// 来源名称（不含扩展名），用于产物命名。
    pub name: String,
}

impl RawInput {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            name: name.into(),
        }
    }

    /// 从本地文件读取，名称取文件名去掉扩展名。
    pub fn from_path(path: &Path) -> Result<Self, CompressError> {
        let bytes = std::fs::read(path).map_err(|e| {
            CompressError::Decode(format!("无法读取输入文件 '{}'：{}", path.display(), e))
        })?;

        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| "Unknown".to_string());

        Ok(Self { bytes, name })
    }

    /// 批量读取本地文件；读取失败的路径记录告警后跳过，不影响其余输入。
    pub fn load_paths<P: AsRef<Path>>(paths: &[P]) -> Vec<Self> {
        paths
            .iter()
            .filter_map(|path| match Self::from_path(path.as_ref()) {
                Ok(input) => Some(input),
                Err(err) => {
                    log::warn!("⚠️ 跳过无法读取的输入：{}", err);
                    None
                }
            })
            .collect()
    }
}

/// 解码阶段输出：内存中的位图及其来源信息。
#[derive(Debug)]
pub struct SourceImage {
    pub(crate) image: DynamicImage,
    /// 来源名称。
    pub origin_name: String,
    /// 页码（1 起），单张图片恒为 1。
    pub page_no: u32,
    /// 来源总页数，单张图片恒为 1。
    pub total_pages: u32,
    pub pixel_format: PixelFormat,
}

impl SourceImage {
    pub fn new(image: DynamicImage, origin_name: impl Into<String>, pixel_format: PixelFormat) -> Self {
        Self {
            image,
            origin_name: origin_name.into(),
            page_no: 1,
            total_pages: 1,
            pixel_format,
        }
    }

    pub(crate) fn with_page(mut self, page_no: u32, total_pages: u32) -> Self {
        self.page_no = page_no;
        self.total_pages = total_pages;
        self
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// 交出位图所有权。
    pub fn into_image(self) -> DynamicImage {
        self.image
    }

    /// 产物默认名称：多页来源追加页码。
    pub(crate) fn display_name(&self) -> String {
        if self.total_pages > 1 {
            format!("{}_{}", self.origin_name, self.page_no)
        } else {
            self.origin_name.clone()
        }
    }
}

/// 搜索阶段输出。
#[derive(Debug, Clone)]
pub struct EncodeResult {
    pub bytes: Vec<u8>,
    /// 目标体积未能无损达成（超出预算，或为达成预算降低了分辨率）。
    pub best_effort: bool,
    /// 最终采用的缩放系数。
    pub scale: f32,
    /// 最终采用的质量档。
    pub quality: u8,
}

impl EncodeResult {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// 输出格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpg,
    Pdf,
}

impl OutputFormat {
    /// 解析目标格式，不支持的格式在任何解码前直接失败。
    pub fn parse(format: &str) -> Result<Self, CompressError> {
        match format.trim().to_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpg),
            "pdf" => Ok(Self::Pdf),
            other => Err(CompressError::unsupported_format(other)),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Pdf => "pdf",
        }
    }

}

/// 批量预算的作用范围。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetScope {
    /// 所有产物合计不超过预算。
    Total,
    /// 每个产物各自不超过预算。
    PerFile,
}

/// PDF 输出的组织方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentLayout {
    /// 所有页面合并为一份文档。
    Merge,
    /// 每页单独成一份文档。
    Separate,
}

/// 一次批量压缩请求。
#[derive(Debug, Clone)]
pub struct CompressRequest {
    pub inputs: Vec<RawInput>,
    /// 目标体积（字节），0 表示不限制。
    pub target_size_bytes: u64,
    /// 目标格式字符串（`jpg` / `jpeg` / `pdf`）。
    pub target_format: String,
    pub high_quality_mode: bool,
    pub custom_base_name: Option<String>,
    pub merge_mode: bool,
    pub total_size_mode: bool,
}

impl CompressRequest {
    /// 以默认选项创建请求：不限体积、高质量模式、合并、合计预算。
    pub fn new(inputs: Vec<RawInput>, target_format: impl Into<String>) -> Self {
        Self {
            inputs,
            target_size_bytes: 0,
            target_format: target_format.into(),
            high_quality_mode: true,
            custom_base_name: None,
            merge_mode: true,
            total_size_mode: true,
        }
    }

    pub fn layout(&self) -> DocumentLayout {
        if self.merge_mode {
            DocumentLayout::Merge
        } else {
            DocumentLayout::Separate
        }
    }

    pub fn budget_scope(&self) -> BudgetScope {
        if self.total_size_mode {
            BudgetScope::Total
        } else {
            BudgetScope::PerFile
        }
    }

    /// 去除空白后的自定义名称，空串视为未设置。
    pub(crate) fn custom_name(&self) -> Option<&str> {
        self.custom_base_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// 已写出的产物记录，写出后不再修改。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputArtifact {
    pub file_name: String,
    /// 逻辑存储位置（如 `Pictures/ImagePro`）。
    pub location: String,
    pub size_bytes: u64,
    /// 持久化后的实际路径（内存型 sink 为空）。
    pub handle: Option<std::path::PathBuf>,
    pub best_effort: bool,
    pub actual_format: OutputFormat,
}

impl OutputArtifact {
    pub(crate) fn with_best_effort(mut self, best_effort: bool) -> Self {
        self.best_effort = best_effort;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_accepts_jpeg_alias_and_rejects_others() {
        assert_eq!(OutputFormat::parse("JPEG").unwrap(), OutputFormat::Jpg);
        assert_eq!(OutputFormat::parse(" pdf ").unwrap(), OutputFormat::Pdf);
        assert!(matches!(
            OutputFormat::parse("png"),
            Err(CompressError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn blank_custom_name_is_ignored() {
        let mut request = CompressRequest::new(Vec::new(), "jpg");
        request.custom_base_name = Some("   ".to_string());
        assert_eq!(request.custom_name(), None);

        request.custom_base_name = Some(" scan ".to_string());
        assert_eq!(request.custom_name(), Some("scan"));
    }

    #[test]
    fn unreadable_paths_are_skipped_when_loading() {
        let dir = std::env::temp_dir().join(format!(
            "image-resizer-source-test-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock error")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let present = dir.join("holiday.jpg");
        std::fs::write(&present, b"bytes").expect("write input");
        let missing = dir.join("missing.jpg");

        let inputs = RawInput::load_paths(&[missing.clone(), present, missing]);

        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].name, "holiday");
        assert_eq!(inputs[0].bytes, b"bytes");

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn display_name_appends_page_for_multi_page_sources() {
        let single = SourceImage::new(DynamicImage::new_rgb8(2, 2), "photo", PixelFormat::Full);
        assert_eq!(single.display_name(), "photo");

        let page = SourceImage::new(DynamicImage::new_rgb8(2, 2), "report", PixelFormat::Full)
            .with_page(3, 5);
        assert_eq!(page.display_name(), "report_3");
    }
}
