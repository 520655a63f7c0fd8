//! # 解码流水线模块
//!
//! ## 设计思路
//!
//! 将“字节 → 工作尺寸位图”的过程集中管理：先只读 header 尺寸，
//! 计算 2 的幂采样系数，再完整解码。工作尺寸以 4096x4096 为界，
//! 保证后续搜索的内存与耗时可控。
//!
//! ## 实现思路
//!
//! 1. 空输入直接判为解码失败
//! 2. PDF 输入按页展开，每页取最大的嵌入图片，再套用同样的工作尺寸约束
//! 3. 其余输入读取 header 尺寸 → 计算采样系数 → 采样解码 → 像素格式转换

use image::DynamicImage;

use super::codec::apply_pixel_format;
use super::{CompressError, CompressionEngine, PageContainer, PixelFormat, RasterCodec, RawInput, SourceImage};

/// 计算 2 的幂采样系数。
///
/// 只要任一边超过工作尺寸就开始加倍，直到半尺寸除以系数后任一边低于工作尺寸。
/// 解码结果因此每边都不小于工作尺寸的一半左右，不会被过度缩小。
pub fn compute_sample_factor(width: u32, height: u32, max_width: u32, max_height: u32) -> u32 {
    let mut factor = 1u32;
    if height > max_height || width > max_width {
        let half_height = height / 2;
        let half_width = width / 2;
        while factor < (1 << 30) && half_height / factor >= max_height && half_width / factor >= max_width {
            factor *= 2;
        }
    }
    factor
}

impl<C, P> CompressionEngine<C, P>
where
    C: RasterCodec,
    P: PageContainer,
{
    /// 采样解码单张图片到工作尺寸。
    pub(crate) fn decode_sampled(&self, bytes: &[u8], pixel_format: PixelFormat) -> Result<DynamicImage, CompressError> {
        let (width, height) = self.codec.decode_bounds(bytes)?;
        let factor = compute_sample_factor(
            width,
            height,
            self.config.max_working_width,
            self.config.max_working_height,
        );
        let image = self.codec.decode_scaled(bytes, factor, pixel_format)?;

        log::debug!(
            "✅ 图片解码成功 - 原始尺寸: {}x{} 采样系数: {} 工作尺寸: {}x{}",
            width,
            height,
            factor,
            image.width(),
            image.height()
        );
        Ok(image)
    }

    /// 把已解码的 PDF 页面约束到工作尺寸。
    fn bound_page(&self, page: DynamicImage, pixel_format: PixelFormat) -> Result<DynamicImage, CompressError> {
        let factor = compute_sample_factor(
            page.width(),
            page.height(),
            self.config.max_working_width,
            self.config.max_working_height,
        );
        let page = if factor > 1 {
            let width = (page.width() / factor).max(1);
            let height = (page.height() / factor).max(1);
            self.codec.resize(&page, width, height)?
        } else {
            page
        };
        Ok(apply_pixel_format(page, pixel_format))
    }

    /// 加载一个输入；PDF 展开为每页一张位图。
    pub(crate) fn load_input(&self, input: &RawInput, pixel_format: PixelFormat) -> Result<Vec<SourceImage>, CompressError> {
        if input.bytes.is_empty() {
            return Err(CompressError::Decode(format!("输入 '{}' 为空", input.name)));
        }

        if self.container.is_container(&input.bytes) {
            let pages = self.container.decode_pages(&input.bytes)?;
            let total_pages = pages.len() as u32;
            log::info!("📄 PDF 输入 '{}' 共解出 {} 页", input.name, total_pages);

            let mut sources = Vec::with_capacity(pages.len());
            for (index, page) in pages.into_iter().enumerate() {
                let image = self.bound_page(page, pixel_format)?;
                sources.push(
                    SourceImage::new(image, input.name.clone(), pixel_format)
                        .with_page(index as u32 + 1, total_pages),
                );
            }
            return Ok(sources);
        }

        let image = self.decode_sampled(&input.bytes, pixel_format)?;
        Ok(vec![SourceImage::new(image, input.name.clone(), pixel_format)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::test_support::{FakeCodec, fake_input};
    use crate::compressor::{EngineConfig, PdfContainer};
    use image::{ImageBuffer, Rgb};

    #[test]
    fn small_images_are_not_sampled() {
        assert_eq!(compute_sample_factor(800, 600, 4096, 4096), 1);
        assert_eq!(compute_sample_factor(4096, 4096, 4096, 4096), 1);
    }

    #[test]
    fn sample_factor_halves_until_below_working_size() {
        assert_eq!(compute_sample_factor(4000, 3000, 4096, 4096), 1);
        assert_eq!(compute_sample_factor(16384, 16384, 4096, 4096), 4);
        assert_eq!(compute_sample_factor(10000, 9000, 4096, 4096), 2);
    }

    #[test]
    fn one_long_side_alone_does_not_force_sampling() {
        assert_eq!(compute_sample_factor(20000, 1000, 4096, 4096), 1);
    }

    fn fake_engine() -> CompressionEngine<FakeCodec, PdfContainer> {
        CompressionEngine::with_capabilities(EngineConfig::default(), FakeCodec::default(), PdfContainer)
            .expect("engine")
    }

    #[test]
    fn empty_input_is_decode_error() {
        let engine = fake_engine();
        let input = RawInput::new("empty", Vec::new());

        assert!(matches!(
            engine.load_input(&input, PixelFormat::Full),
            Err(CompressError::Decode(_))
        ));
    }

    #[test]
    fn oversized_input_is_sampled_to_working_size() {
        let config = EngineConfig {
            max_working_width: 100,
            max_working_height: 100,
            ..EngineConfig::default()
        };
        let engine = CompressionEngine::with_capabilities(config, FakeCodec::default(), PdfContainer)
            .expect("engine");
        let input = RawInput::new("huge", fake_input(1000, 800));

        let sources = engine.load_input(&input, PixelFormat::Full).expect("load");

        assert_eq!(sources.len(), 1);
        assert_eq!((sources[0].width(), sources[0].height()), (125, 100));
        assert_eq!(sources[0].display_name(), "huge");
    }

    #[test]
    fn pdf_input_expands_to_pages() {
        let container = PdfContainer;
        let mut document = container.new_document();
        for index in 0..2u32 {
            let page = DynamicImage::ImageRgb8(ImageBuffer::from_fn(24, 16, |x, y| {
                Rgb([(x * 10) as u8, (y * 10) as u8, index as u8 * 100])
            }));
            container.add_page(&mut document, &page, index).expect("add page");
        }
        let bytes = container.serialize(document).expect("serialize");

        let engine = fake_engine();
        let sources = engine
            .load_input(&RawInput::new("scan", bytes), PixelFormat::Full)
            .expect("load pdf");

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[1].page_no, 2);
        assert_eq!(sources[1].total_pages, 2);
        assert_eq!(sources[1].display_name(), "scan_2");
    }
}
