//! # 编解码能力模块
//!
//! ## 设计思路
//!
//! 搜索算法只依赖“编码 / 解码 / 缩放”三种原语，不关心具体编码器。
//! 将原语抽象为 `RasterCodec`，默认实现 `JpegCodec` 基于 `image` 与
//! `fast_image_resize`，测试中可注入确定性的假编码器。
//!
//! ## 实现思路
//!
//! 1. 先读 header 尺寸并按像素 / 内存上限快速拒绝
//! 2. 完整解码后按 2 的幂采样系数降采样
//! 3. 按调用方要求转换像素格式（RGB8 或 RGB565 量化），常驻位图一律不带 alpha
//! 4. 缩放优先走 `fast_image_resize`，失败回退 `image::resize_exact`

use std::io::Cursor;

use fast_image_resize as fr;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageBuffer, ImageReader, Rgb, Rgba};

use super::{CompressError, EngineConfig, PixelFormat};

/// 光栅编解码能力。
///
/// 所有方法都是同步、纯 CPU 的；同一输入与参数必须产生逐字节相同的输出。
pub trait RasterCodec {
    /// 只读取图片头中的宽高，不解码像素。
    fn decode_bounds(&self, bytes: &[u8]) -> Result<(u32, u32), CompressError>;

    /// 按采样系数解码，并转换为指定像素格式。
    ///
    /// `image` 的解码器不支持解码期缩放，默认实现先完整解码再降采样，
    /// 因此峰值内存由解码前的像素 / 内存上限约束，而不是由采样系数约束；
    /// 采样只决定之后常驻的位图大小。
    fn decode_scaled(
        &self,
        bytes: &[u8],
        sample_factor: u32,
        pixel_format: PixelFormat,
    ) -> Result<DynamicImage, CompressError>;

    /// 完整解码一段已编码字节。
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CompressError>;

    /// 以给定质量（1~100）编码。
    fn encode(&self, image: &DynamicImage, quality: u8) -> Result<Vec<u8>, CompressError>;

    /// 缩放到指定尺寸。
    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> Result<DynamicImage, CompressError>;
}

/// 基于 `image` JPEG 编码器的默认实现。
#[derive(Debug, Clone)]
pub struct JpegCodec {
    resize_filter: FilterType,
    max_decoded_pixels: u64,
    max_decoded_bytes: u64,
}

impl JpegCodec {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            resize_filter: config.resize_filter,
            max_decoded_pixels: config.max_decoded_pixels,
            max_decoded_bytes: config.max_decoded_bytes,
        }
    }

    /// 校验像素数量是否超过配置上限。
    fn validate_pixel_limits(&self, width: u32, height: u32) -> Result<(), CompressError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| CompressError::ResourceLimit("图片像素数溢出".to_string()))?;

        if pixels > self.max_decoded_pixels {
            return Err(CompressError::ResourceLimit(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels, self.max_decoded_pixels
            )));
        }

        Ok(())
    }

    fn validate_decoded_memory_limits(&self, width: u32, height: u32) -> Result<(), CompressError> {
        let estimated = (width as u64)
            .checked_mul(height as u64)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| CompressError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

        if estimated > self.max_decoded_bytes {
            return Err(CompressError::ResourceLimit(format!(
                "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                self.max_decoded_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }

    fn resize_with_fast_image_resize(
        &self,
        image: &DynamicImage,
        target_width: u32,
        target_height: u32,
    ) -> Result<DynamicImage, CompressError> {
        let has_alpha = image.color().has_alpha();
        let (src_width, src_height) = image.dimensions();
        let (pixel_type, raw) = if has_alpha {
            (fr::PixelType::U8x4, image.to_rgba8().into_raw())
        } else {
            (fr::PixelType::U8x3, image.to_rgb8().into_raw())
        };

        let src_image = fr::images::Image::from_vec_u8(src_width, src_height, raw, pixel_type)
            .map_err(|e| CompressError::Encode(format!("构建源图像缓冲失败：{}", e)))?;

        let mut dst_image = fr::images::Image::new(target_width, target_height, pixel_type);

        let mut resizer = fr::Resizer::new();
        let options = fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(
            to_fast_filter(self.resize_filter),
        ));

        resizer
            .resize(&src_image, &mut dst_image, Some(&options))
            .map_err(|e| CompressError::Encode(format!("fast_image_resize 执行失败：{}", e)))?;

        let pixels = dst_image.into_vec();
        let resized = if has_alpha {
            ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(target_width, target_height, pixels)
                .map(DynamicImage::ImageRgba8)
        } else {
            ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(target_width, target_height, pixels)
                .map(DynamicImage::ImageRgb8)
        };

        resized.ok_or_else(|| CompressError::Encode("fast_image_resize 输出缓冲长度异常".to_string()))
    }
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl RasterCodec for JpegCodec {
    fn decode_bounds(&self, bytes: &[u8]) -> Result<(u32, u32), CompressError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| CompressError::Decode(format!("无法识别图片格式：{}", e)))?;

        reader
            .into_dimensions()
            .map_err(|e| CompressError::Decode(format!("无法读取图片尺寸：{}", e)))
    }

    fn decode_scaled(
        &self,
        bytes: &[u8],
        sample_factor: u32,
        pixel_format: PixelFormat,
    ) -> Result<DynamicImage, CompressError> {
        let (header_width, header_height) = self.decode_bounds(bytes)?;
        self.validate_pixel_limits(header_width, header_height)?;
        self.validate_decoded_memory_limits(header_width, header_height)?;

        let decoded = self.decode(bytes)?;
        let (raw_width, raw_height) = decoded.dimensions();
        self.validate_pixel_limits(raw_width, raw_height)?;

        let sample_factor = sample_factor.max(1);
        let sampled = if sample_factor > 1 {
            let target_width = (raw_width / sample_factor).max(1);
            let target_height = (raw_height / sample_factor).max(1);
            log::debug!(
                "🧩 采样解码：{}x{} -> {}x{}（sample={}）",
                raw_width,
                raw_height,
                target_width,
                target_height,
                sample_factor
            );
            self.resize(&decoded, target_width, target_height)?
        } else {
            decoded
        };

        Ok(apply_pixel_format(sampled, pixel_format))
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CompressError> {
        image::load_from_memory(bytes)
            .map_err(|e| CompressError::Decode(format!("图片解码失败：{}", e)))
    }

    fn encode(&self, image: &DynamicImage, quality: u8) -> Result<Vec<u8>, CompressError> {
        let quality = quality.clamp(1, 100);
        let mut buffer = Vec::new();

        {
            let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
            let result = match image {
                DynamicImage::ImageRgb8(rgb) => encoder.encode_image(rgb),
                other => encoder.encode_image(&other.to_rgb8()),
            };
            result.map_err(|e| CompressError::Encode(format!("JPEG 编码失败（quality={}）：{}", quality, e)))?;
        }

        Ok(buffer)
    }

    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> Result<DynamicImage, CompressError> {
        let width = width.max(1);
        let height = height.max(1);

        if image.dimensions() == (width, height) {
            return Ok(image.clone());
        }

        match self.resize_with_fast_image_resize(image, width, height) {
            Ok(resized) => Ok(resized),
            Err(err) => {
                log::warn!(
                    "⚠️ fast_image_resize 缩放失败，回退 image::resize_exact：{}",
                    err
                );
                Ok(image.resize_exact(width, height, self.resize_filter))
            }
        }
    }
}

/// 转换像素格式。
///
/// JPEG 编码器和 PDF 页面都不使用 alpha，两种格式都输出 RGB8，
/// 编码时直接走 `ImageRgb8` 分支，不再逐次复制。
/// `Reduced` 额外将每个通道截断到 5/6/5 位后再展开回 8 位，模拟 RGB565 的色深损失。
pub fn apply_pixel_format(image: DynamicImage, pixel_format: PixelFormat) -> DynamicImage {
    match pixel_format {
        PixelFormat::Full => match image {
            DynamicImage::ImageRgb8(_) => image,
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        },
        PixelFormat::Reduced => {
            let mut rgb = image.to_rgb8();
            for pixel in rgb.pixels_mut() {
                let [r, g, b] = pixel.0;
                pixel.0 = [
                    (r & 0xF8) | (r >> 5),
                    (g & 0xFC) | (g >> 6),
                    (b & 0xF8) | (b >> 5),
                ];
            }
            DynamicImage::ImageRgb8(rgb)
        }
    }
}

fn to_fast_filter(filter: FilterType) -> fr::FilterType {
    match filter {
        FilterType::Nearest => fr::FilterType::Box,
        FilterType::Triangle => fr::FilterType::Bilinear,
        FilterType::CatmullRom => fr::FilterType::CatmullRom,
        FilterType::Gaussian => fr::FilterType::Mitchell,
        FilterType::Lanczos3 => fr::FilterType::Lanczos3,
    }
}
