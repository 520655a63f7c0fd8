//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `EngineConfig`，保证运行时行为可观测、可调整、可测试。
//! 两种搜索策略（smooth / aggressive）只在衰减速度、质量区间与兜底方式上不同，
//! 统一抽象为 `SearchProfile`，由同一个搜索函数执行。
//!
//! ## 实现思路
//!
//! - `Default` 提供与线上一致的经验参数。
//! - `CompressionMode` 负责模式字符串解析与反向输出。
//! - `validate` 在引擎构建时拒绝越界参数，避免搜索循环失控。
//!
//! `codec_budget_ratio`（0.40）与 `max_bytes_per_pixel`（2.2）是针对
//! JPEG + PDF 组合调出的经验值，换用其他编码器或容器时需要重新标定。

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use super::CompressError;

/// 某个缩放档内质量二分搜索全部失败后的兜底方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// 搜索结束后以最低质量编码原尺寸图片。
    OriginalAtFloor,
    /// 每个缩放档都以最低质量编码一次，保留所有档中最小的结果。
    SmallestAcrossScales,
}

/// 一组质量 × 分辨率搜索参数。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchProfile {
    /// 每轮缩放系数的乘数。
    pub scale_decay: f32,
    /// 缩放系数降到该值（含）以下即停止。
    pub min_scale: f32,
    /// 质量二分搜索下界（含）。
    pub quality_low: u8,
    /// 质量二分搜索上界（含）。
    pub quality_high: u8,
    pub fallback: FallbackPolicy,
}

impl SearchProfile {
    /// 尽量保留分辨率，允许更低的质量档。
    pub const SMOOTH: Self = Self {
        scale_decay: 0.85,
        min_scale: 0.05,
        quality_low: 10,
        quality_high: 90,
        fallback: FallbackPolicy::OriginalAtFloor,
    };

    /// 更早牺牲分辨率，但保护质量下限，保证页面仍可辨认。
    pub const AGGRESSIVE: Self = Self {
        scale_decay: 0.6,
        min_scale: 0.01,
        quality_low: 40,
        quality_high: 95,
        fallback: FallbackPolicy::SmallestAcrossScales,
    };

    fn validate(&self, name: &str) -> Result<(), CompressError> {
        if !(self.scale_decay > 0.0 && self.scale_decay < 1.0) {
            return Err(CompressError::InvalidConfig(format!(
                "{name}.scale_decay 必须在 (0, 1) 之间：{}",
                self.scale_decay
            )));
        }
        if !(self.min_scale > 0.0 && self.min_scale < 1.0) {
            return Err(CompressError::InvalidConfig(format!(
                "{name}.min_scale 必须在 (0, 1) 之间：{}",
                self.min_scale
            )));
        }
        if self.quality_low == 0 || self.quality_high > 100 || self.quality_low > self.quality_high {
            return Err(CompressError::InvalidConfig(format!(
                "{name} 质量区间非法：{}~{}（要求 1 <= low <= high <= 100）",
                self.quality_low, self.quality_high
            )));
        }
        Ok(())
    }
}

/// 压缩模式（面向用户语义）。
///
/// - `Smooth`：画面平滑优先（界面上的 “Best”）
/// - `Aggressive`：体积优先，允许像素化（界面上的 “Very Good”）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMode {
    Smooth,
    Aggressive,
}

impl CompressionMode {
    /// 从外部字符串解析模式。
    ///
    /// # 示例
    /// ```rust
    /// use image_resizer::compressor::CompressionMode;
    ///
    /// let mode = CompressionMode::from_str("best")?;
    /// assert_eq!(mode.as_str(), "aggressive");
    /// # Ok::<(), image_resizer::compressor::CompressError>(())
    /// ```
    pub fn from_str(mode: &str) -> Result<Self, CompressError> {
        match mode.trim().to_lowercase().as_str() {
            "smooth" | "standard" => Ok(Self::Smooth),
            "aggressive" | "best" => Ok(Self::Aggressive),
            other => Err(CompressError::InvalidConfig(format!(
                "未知压缩模式：{}（可选：smooth / aggressive）",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Smooth => "smooth",
            Self::Aggressive => "aggressive",
        }
    }

    /// 高质量开关对应的模式：开启时走 aggressive 搜索。
    pub fn from_high_quality_flag(high_quality_mode: bool) -> Self {
        if high_quality_mode {
            Self::Aggressive
        } else {
            Self::Smooth
        }
    }

    pub fn is_high_quality(self) -> bool {
        matches!(self, Self::Aggressive)
    }
}

/// 压缩引擎配置。
///
/// 字段覆盖解码、搜索、PDF 预算分配三个阶段。
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 采样解码的工作尺寸宽度下限。
    pub max_working_width: u32,
    /// 采样解码的工作尺寸高度下限。
    pub max_working_height: u32,
    /// 完整解码前允许的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 完整解码预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 缩放滤镜策略。
    pub resize_filter: FilterType,
    pub smooth: SearchProfile,
    pub aggressive: SearchProfile,
    /// 搜索全部失败时使用的最低质量。
    pub fallback_quality: u8,
    /// 预算为 0（不限制）时的单次编码质量。
    pub unconstrained_quality: u8,
    /// 整份 PDF 预留给容器结构的字节数。
    pub container_overhead_bytes: u64,
    /// 扣除容器开销后的文档预算下限。
    pub min_document_budget: u64,
    /// 页面预算中分给 JPEG 预降质的比例（补偿 PDF 对像素数据的膨胀）。
    pub codec_budget_ratio: f64,
    /// 页面允许的最大“字节 / 像素”比，用于兜底降采样。
    pub max_bytes_per_pixel: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_working_width: 4096,
            max_working_height: 4096,
            max_decoded_pixels: 120_000_000,
            max_decoded_bytes: 480 * 1024 * 1024,
            resize_filter: FilterType::Triangle,
            smooth: SearchProfile::SMOOTH,
            aggressive: SearchProfile::AGGRESSIVE,
            fallback_quality: 1,
            unconstrained_quality: 100,
            container_overhead_bytes: 10 * 1024,
            min_document_budget: 2 * 1024,
            codec_budget_ratio: 0.40,
            max_bytes_per_pixel: 2.2,
        }
    }
}

impl EngineConfig {
    /// 取模式对应的搜索参数。
    pub fn profile(&self, mode: CompressionMode) -> &SearchProfile {
        match mode {
            CompressionMode::Smooth => &self.smooth,
            CompressionMode::Aggressive => &self.aggressive,
        }
    }

    /// 校验全部参数。
    pub fn validate(&self) -> Result<(), CompressError> {
        if self.max_working_width == 0 || self.max_working_height == 0 {
            return Err(CompressError::InvalidConfig("工作尺寸不能为 0".to_string()));
        }
        if self.max_decoded_pixels == 0 || self.max_decoded_bytes == 0 {
            return Err(CompressError::InvalidConfig("解码上限不能为 0".to_string()));
        }

        self.smooth.validate("smooth")?;
        self.aggressive.validate("aggressive")?;

        if !(1..=100).contains(&self.fallback_quality) {
            return Err(CompressError::InvalidConfig(
                "fallback_quality 必须在 1~100 之间".to_string(),
            ));
        }
        if !(1..=100).contains(&self.unconstrained_quality) {
            return Err(CompressError::InvalidConfig(
                "unconstrained_quality 必须在 1~100 之间".to_string(),
            ));
        }
        if self.min_document_budget == 0 {
            return Err(CompressError::InvalidConfig(
                "min_document_budget 必须大于 0".to_string(),
            ));
        }
        if !(self.codec_budget_ratio > 0.0 && self.codec_budget_ratio <= 1.0) {
            return Err(CompressError::InvalidConfig(
                "codec_budget_ratio 必须在 (0, 1] 之间".to_string(),
            ));
        }
        if !(self.max_bytes_per_pixel > 0.0 && self.max_bytes_per_pixel.is_finite()) {
            return Err(CompressError::InvalidConfig(
                "max_bytes_per_pixel 必须为正数".to_string(),
            ));
        }

        Ok(())
    }
}

/// 解析滤镜名称。
pub fn parse_resize_filter(name: &str) -> Result<FilterType, CompressError> {
    match name.trim().to_lowercase().as_str() {
        "nearest" => Ok(FilterType::Nearest),
        "triangle" | "bilinear" => Ok(FilterType::Triangle),
        "catmullrom" | "catmull_rom" => Ok(FilterType::CatmullRom),
        "gaussian" => Ok(FilterType::Gaussian),
        "lanczos3" => Ok(FilterType::Lanczos3),
        other => Err(CompressError::InvalidConfig(format!(
            "未知缩放滤镜：{}（可选：nearest / triangle / catmullrom / gaussian / lanczos3）",
            other
        ))),
    }
}
