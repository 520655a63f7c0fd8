//! # 质量搜索模块
//!
//! ## 设计思路
//!
//! 在“质量 × 分辨率”空间中寻找不超过预算的编码结果：
//! 外层按衰减系数逐步缩小分辨率，内层对质量档做二分搜索，取当前分辨率下
//! 满足预算的最高质量。smooth 与 aggressive 只是 `SearchProfile` 不同。
//!
//! ## 实现思路
//!
//! 1. 预算为 0：单次以 `unconstrained_quality` 编码，不做搜索
//! 2. 缩放系数从 1.0 开始，直到小于等于 `min_scale`
//! 3. 某档命中即返回，`best_effort = scale < 1.0`
//! 4. 单次编码失败立即放弃该档的二分搜索，不在相同参数上重试
//! 5. 全部落空时按 `FallbackPolicy` 兜底，结果恒为 `best_effort = true`
//!
//! 搜索是纯 CPU 的同步循环，不做任何挂起或加锁。

use std::borrow::Cow;

use image::DynamicImage;

use super::{CompressError, CompressionMode, EncodeResult, EngineConfig, FallbackPolicy, RasterCodec, SearchProfile};

/// 预算内质量最高的 smooth 搜索。
pub fn smooth_fit<C: RasterCodec + ?Sized>(
    codec: &C,
    image: &DynamicImage,
    budget: u64,
    config: &EngineConfig,
) -> Result<EncodeResult, CompressError> {
    fit_to_budget(codec, image, budget, &config.smooth, config)
}

/// 体积优先的 aggressive 搜索。
pub fn aggressive_fit<C: RasterCodec + ?Sized>(
    codec: &C,
    image: &DynamicImage,
    budget: u64,
    config: &EngineConfig,
) -> Result<EncodeResult, CompressError> {
    fit_to_budget(codec, image, budget, &config.aggressive, config)
}

/// 按模式选择搜索参数。
pub fn fit_with_mode<C: RasterCodec + ?Sized>(
    codec: &C,
    image: &DynamicImage,
    budget: u64,
    mode: CompressionMode,
    config: &EngineConfig,
) -> Result<EncodeResult, CompressError> {
    fit_to_budget(codec, image, budget, config.profile(mode), config)
}

/// 参数化的预算搜索。
pub fn fit_to_budget<C: RasterCodec + ?Sized>(
    codec: &C,
    image: &DynamicImage,
    budget: u64,
    profile: &SearchProfile,
    config: &EngineConfig,
) -> Result<EncodeResult, CompressError> {
    if budget == 0 {
        let bytes = codec.encode(image, config.unconstrained_quality)?;
        return Ok(EncodeResult {
            bytes,
            best_effort: false,
            scale: 1.0,
            quality: config.unconstrained_quality,
        });
    }

    let (width, height) = (image.width(), image.height());
    let mut scale = 1.0_f32;
    let mut smallest: Option<EncodeResult> = None;

    while scale > profile.min_scale {
        let scaled: Cow<'_, DynamicImage> = if scale == 1.0 {
            Cow::Borrowed(image)
        } else {
            let target_width = ((width as f32 * scale) as u32).max(1);
            let target_height = ((height as f32 * scale) as u32).max(1);
            match codec.resize(image, target_width, target_height) {
                Ok(resized) => Cow::Owned(resized),
                Err(err) => {
                    log::debug!("缩放失败（scale={:.3}），跳过该档：{}", scale, err);
                    scale *= profile.scale_decay;
                    continue;
                }
            }
        };

        if let Some((bytes, quality)) = search_quality(codec, &scaled, budget, profile) {
            log::debug!(
                "🎯 命中预算：scale={:.3} quality={} size={} budget={}",
                scale,
                quality,
                bytes.len(),
                budget
            );
            return Ok(EncodeResult {
                bytes,
                best_effort: scale < 1.0,
                scale,
                quality,
            });
        }

        if profile.fallback == FallbackPolicy::SmallestAcrossScales {
            match codec.encode(&scaled, config.fallback_quality) {
                Ok(bytes) if smallest.as_ref().is_none_or(|best| bytes.len() < best.bytes.len()) => {
                    smallest = Some(EncodeResult {
                        bytes,
                        best_effort: true,
                        scale,
                        quality: config.fallback_quality,
                    });
                }
                Ok(_) => {}
                Err(err) => log::debug!("最低质量编码失败（scale={:.3}）：{}", scale, err),
            }
        }

        scale *= profile.scale_decay;
    }

    if let Some(best) = smallest {
        log::debug!("预算不可达，返回各档最小结果：size={} budget={}", best.bytes.len(), budget);
        return Ok(best);
    }

    let bytes = codec.encode(image, config.fallback_quality)?;
    log::debug!("预算不可达，原尺寸最低质量兜底：size={} budget={}", bytes.len(), budget);
    Ok(EncodeResult {
        bytes,
        best_effort: true,
        scale: 1.0,
        quality: config.fallback_quality,
    })
}

/// 在单一分辨率上二分搜索满足预算的最高质量。
///
/// 编码失败时放弃本档，返回此前找到的结果（若有）。
fn search_quality<C: RasterCodec + ?Sized>(
    codec: &C,
    image: &DynamicImage,
    budget: u64,
    profile: &SearchProfile,
) -> Option<(Vec<u8>, u8)> {
    let mut low = profile.quality_low as i32;
    let mut high = profile.quality_high as i32;
    let mut best: Option<(Vec<u8>, u8)> = None;

    while low <= high {
        let mid = (low + high) / 2;
        let quality = mid as u8;
        match codec.encode(image, quality) {
            Ok(bytes) if bytes.len() as u64 <= budget => {
                best = Some((bytes, quality));
                low = mid + 1;
            }
            Ok(_) => high = mid - 1,
            Err(err) => {
                log::debug!("编码失败（quality={}），放弃当前缩放档：{}", quality, err);
                break;
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::JpegCodec;
    use crate::compressor::test_support::FakeCodec;
    use image::{ImageBuffer, Rgb};

    fn blank(width: u32, height: u32) -> DynamicImage {
        DynamicImage::new_rgb8(width, height)
    }

    #[test]
    fn smooth_picks_highest_quality_that_fits_at_full_scale() {
        let codec = FakeCodec::default();
        let config = EngineConfig::default();

        // 8 + 10000 * q / 50 <= 5000 → q = 24
        let result = smooth_fit(&codec, &blank(100, 100), 5_000, &config).expect("fit");

        assert_eq!(result.quality, 24);
        assert_eq!(result.scale, 1.0);
        assert!(!result.best_effort);
        assert!(result.len() as u64 <= 5_000);
    }

    #[test]
    fn smooth_marks_downscaled_result_as_best_effort() {
        let codec = FakeCodec::default();
        let config = EngineConfig::default();

        // 100x100 最低质量 2008 字节超预算，85x85 时 q=10 为 1453 字节
        let result = smooth_fit(&codec, &blank(100, 100), 1_500, &config).expect("fit");

        assert!(result.best_effort);
        assert!(result.scale < 1.0);
        assert_eq!(result.quality, 10);
        assert!(result.len() as u64 <= 1_500);
    }

    #[test]
    fn smooth_falls_back_to_original_at_floor_quality() {
        let codec = FakeCodec::default();
        let config = EngineConfig::default();

        let result = smooth_fit(&codec, &blank(100, 100), 5, &config).expect("fit");

        assert!(result.best_effort);
        assert_eq!(result.quality, 1);
        assert_eq!(result.scale, 1.0);
        assert_eq!(result.len(), 8 + 10_000 / 50);
    }

    #[test]
    fn aggressive_keeps_quality_floor_and_shrinks_faster() {
        let codec = FakeCodec::default();
        let config = EngineConfig::default();

        // 100x100 最低 q40 需要 8008 字节；60x60 时 q=69 为 4976 字节
        let result = aggressive_fit(&codec, &blank(100, 100), 5_000, &config).expect("fit");

        assert!(result.best_effort);
        assert_eq!(result.quality, 69);
        assert!((result.scale - 0.6).abs() < 1e-6);
        assert_eq!(result.len(), 8 + 3_600 * 69 / 50);
    }

    #[test]
    fn aggressive_returns_smallest_buffer_seen_across_scales() {
        let codec = FakeCodec::default();
        let config = EngineConfig::default();
        let image = blank(100, 100);

        let aggressive = aggressive_fit(&codec, &image, 5, &config).expect("fit");
        let smooth = smooth_fit(&codec, &image, 5, &config).expect("fit");

        assert!(aggressive.best_effort);
        assert_eq!(aggressive.len(), 8);
        assert!(aggressive.len() <= smooth.len());
    }

    #[test]
    fn zero_budget_is_single_unconstrained_pass() {
        let codec = FakeCodec::default();
        let config = EngineConfig::default();

        let result = smooth_fit(&codec, &blank(40, 40), 0, &config).expect("fit");

        assert!(!result.best_effort);
        assert_eq!(result.quality, 100);
        assert_eq!(codec.encode_calls(), 1);
    }

    #[test]
    fn encode_failure_abandons_scale_without_retry() {
        // 质量高于 30 的编码全部失败：二分搜索首个中点（50）即失败，直接进入下一档
        let codec = FakeCodec::failing_above(30);
        let config = EngineConfig::default();

        let result = smooth_fit(&codec, &blank(100, 100), 1_000_000, &config).expect("fit");

        assert!(result.best_effort);
        assert_eq!(result.quality, 1);
    }

    #[test]
    fn real_jpeg_search_respects_budget() {
        let codec = JpegCodec::default();
        let config = EngineConfig::default();
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_fn(320, 240, |x, y| {
            Rgb([(x * 7 % 255) as u8, (y * 3 % 255) as u8, ((x ^ y) % 255) as u8])
        }));
        let budget = 12 * 1024;

        for result in [
            smooth_fit(&codec, &image, budget, &config).expect("smooth"),
            aggressive_fit(&codec, &image, budget, &config).expect("aggressive"),
        ] {
            assert!(result.len() as u64 <= budget || result.best_effort);
            if !result.best_effort {
                assert_eq!(result.scale, 1.0);
            }
        }
    }
}
