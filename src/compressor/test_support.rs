//! 单元测试共用的确定性编解码器。

use std::sync::atomic::{AtomicUsize, Ordering};

use image::DynamicImage;

use super::{CompressError, PixelFormat, RasterCodec};

/// 输出长度为 `8 + w * h * q / 50` 的假编码器，前 8 字节记录宽高。
#[derive(Debug, Default)]
pub(crate) struct FakeCodec {
    fail_above: Option<u8>,
    encode_calls: AtomicUsize,
}

impl FakeCodec {
    /// 质量高于 `quality` 的编码全部失败。
    pub(crate) fn failing_above(quality: u8) -> Self {
        Self {
            fail_above: Some(quality),
            encode_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn encode_calls(&self) -> usize {
        self.encode_calls.load(Ordering::SeqCst)
    }

    fn read_header(bytes: &[u8]) -> Result<(u32, u32), CompressError> {
        if bytes.len() < 8 {
            return Err(CompressError::Decode("假编码头部不完整".to_string()));
        }
        let width = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let height = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if width == 0 || height == 0 {
            return Err(CompressError::Decode("假编码尺寸为 0".to_string()));
        }
        Ok((width, height))
    }
}

impl RasterCodec for FakeCodec {
    fn decode_bounds(&self, bytes: &[u8]) -> Result<(u32, u32), CompressError> {
        Self::read_header(bytes)
    }

    fn decode_scaled(
        &self,
        bytes: &[u8],
        sample_factor: u32,
        _pixel_format: PixelFormat,
    ) -> Result<DynamicImage, CompressError> {
        let (width, height) = Self::read_header(bytes)?;
        let factor = sample_factor.max(1);
        Ok(DynamicImage::new_rgb8((width / factor).max(1), (height / factor).max(1)))
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CompressError> {
        let (width, height) = Self::read_header(bytes)?;
        Ok(DynamicImage::new_rgb8(width, height))
    }

    fn encode(&self, image: &DynamicImage, quality: u8) -> Result<Vec<u8>, CompressError> {
        self.encode_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_above.is_some_and(|limit| quality > limit) {
            return Err(CompressError::Encode(format!("质量 {} 编码失败", quality)));
        }

        let (width, height) = (image.width(), image.height());
        let body = width as u64 * height as u64 * quality as u64 / 50;
        let mut bytes = Vec::with_capacity(8 + body as usize);
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        bytes.resize(8 + body as usize, 0);
        Ok(bytes)
    }

    fn resize(&self, _image: &DynamicImage, width: u32, height: u32) -> Result<DynamicImage, CompressError> {
        Ok(DynamicImage::new_rgb8(width.max(1), height.max(1)))
    }
}

/// 生成假编码器可解码的输入字节。
pub(crate) fn fake_input(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(8);
    bytes.extend_from_slice(&width.to_le_bytes());
    bytes.extend_from_slice(&height.to_le_bytes());
    bytes
}
