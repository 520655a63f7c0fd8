//! # 页面容器模块（PDF）
//!
//! ## 设计思路
//!
//! 容器只负责“位图 → 页面 → 文档字节”的装配，以及把已有 PDF 的每一页读成位图，
//! 不参与任何体积决策。抽象为 `PageContainer`，默认实现写出用 `lopdf`，读取用 `mupdf`。
//!
//! ## 实现思路
//!
//! - 写入：每页一个 8 位 DeviceRGB 图像 XObject（原始像素，序列化时统一 Flate 压缩），
//!   页面尺寸等于位图像素尺寸。
//! - 读取：用 `mupdf` 逐页光栅化（文字、矢量与内嵌图片都会绘制），
//!   1 点对应 1 像素，背景为白色。渲染失败的页面跳过。

use image::{DynamicImage, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use mupdf::{Colorspace, Matrix, Pixmap};

use super::CompressError;

const PDF_VERSION: &str = "1.5";
const PAGE_RENDER_SCALE: f32 = 1.0;

/// 页面容器能力。
pub trait PageContainer {
    type Document;

    fn new_document(&self) -> Self::Document;

    /// 追加一页，页面内容为整张位图。
    fn add_page(
        &self,
        document: &mut Self::Document,
        image: &DynamicImage,
        page_index: u32,
    ) -> Result<(), CompressError>;

    /// 序列化为最终字节。
    fn serialize(&self, document: Self::Document) -> Result<Vec<u8>, CompressError>;

    /// 是否为本容器格式。
    fn is_container(&self, bytes: &[u8]) -> bool;

    /// 把每一页渲染为位图，页序与文档一致。
    fn decode_pages(&self, bytes: &[u8]) -> Result<Vec<DynamicImage>, CompressError>;
}

/// PDF 容器：`lopdf` 负责写出，`mupdf` 负责读取时的页面渲染。
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfContainer;

/// 装配中的 PDF 文档。
pub struct PdfPageDocument {
    document: Document,
    pages_id: ObjectId,
    page_ids: Vec<ObjectId>,
}

impl PdfPageDocument {
    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }
}

impl PageContainer for PdfContainer {
    type Document = PdfPageDocument;

    fn new_document(&self) -> PdfPageDocument {
        let mut document = Document::with_version(PDF_VERSION);
        let pages_id = document.new_object_id();
        PdfPageDocument {
            document,
            pages_id,
            page_ids: Vec::new(),
        }
    }

    fn add_page(
        &self,
        document: &mut PdfPageDocument,
        image: &DynamicImage,
        page_index: u32,
    ) -> Result<(), CompressError> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(CompressError::Container("页面尺寸为 0".to_string()));
        }

        let image_stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            rgb.into_raw(),
        );
        let image_id = document.document.add_object(image_stream);
        let image_name = format!("Im{}", page_index + 1);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Integer(width as i64),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(height as i64),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(image_name.as_bytes().to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_bytes = content
            .encode()
            .map_err(|e| CompressError::Container(format!("页面内容编码失败：{}", e)))?;
        let content_id = document
            .document
            .add_object(Stream::new(dictionary! {}, content_bytes));

        let page_id = document.document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => document.pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(width as i64),
                Object::Integer(height as i64),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    image_name.as_str() => image_id,
                },
            },
        });
        document.page_ids.push(page_id);

        Ok(())
    }

    fn serialize(&self, document: PdfPageDocument) -> Result<Vec<u8>, CompressError> {
        let PdfPageDocument {
            mut document,
            pages_id,
            page_ids,
        } = document;

        if page_ids.is_empty() {
            return Err(CompressError::Container("文档没有任何页面".to_string()));
        }

        let count = page_ids.len() as i64;
        let kids: Vec<Object> = page_ids.into_iter().map(Object::Reference).collect();
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.trailer.set("Root", catalog_id);
        document.compress();

        let mut out = Vec::new();
        document
            .save_to(&mut out)
            .map_err(|e| CompressError::Container(format!("PDF 序列化失败：{}", e)))?;
        Ok(out)
    }

    fn is_container(&self, bytes: &[u8]) -> bool {
        infer::get(bytes).is_some_and(|kind| kind.mime_type() == "application/pdf")
            || bytes.starts_with(b"%PDF-")
    }

    fn decode_pages(&self, bytes: &[u8]) -> Result<Vec<DynamicImage>, CompressError> {
        let document = mupdf::Document::from_bytes(bytes, "application/pdf")
            .map_err(|e| CompressError::Decode(format!("PDF 解析失败：{}", e)))?;
        let page_count = document
            .page_count()
            .map_err(|e| CompressError::Decode(format!("PDF 页数读取失败：{}", e)))?;

        let mut pages = Vec::with_capacity(page_count.max(0) as usize);
        for page_index in 0..page_count {
            match render_page(&document, page_index) {
                Ok(image) => pages.push(image),
                Err(err) => log::warn!("⚠️ PDF 第 {} 页渲染失败，已跳过：{}", page_index + 1, err),
            }
        }

        if pages.is_empty() {
            return Err(CompressError::Decode("PDF 中没有可渲染的页面".to_string()));
        }

        Ok(pages)
    }
}

/// 以 1 像素 / 点渲染整页到不透明 RGB 位图，未绘制区域为白色。
fn render_page(document: &mupdf::Document, page_index: i32) -> Result<DynamicImage, CompressError> {
    let page = document
        .load_page(page_index)
        .map_err(|e| CompressError::Decode(format!("页面加载失败：{}", e)))?;
    let transform = Matrix::new_scale(PAGE_RENDER_SCALE, PAGE_RENDER_SCALE);
    let pixmap = page
        .to_pixmap(&transform, &Colorspace::device_rgb(), false, false)
        .map_err(|e| CompressError::Decode(format!("页面光栅化失败：{}", e)))?;

    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let pixels = pixmap_to_rgb(&pixmap)?;
    RgbImage::from_raw(width, height, pixels)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| CompressError::Decode("页面像素缓冲长度异常".to_string()))
}

/// 去掉行尾填充与多余通道，得到紧凑的 RGB8 数据。
fn pixmap_to_rgb(pixmap: &Pixmap) -> Result<Vec<u8>, CompressError> {
    let channels = pixmap.n() as usize;
    if channels < 3 {
        return Err(CompressError::Decode(format!("不支持的页面通道数：{}", channels)));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * channels;
    if samples.len() < stride.saturating_mul(height) || row_bytes > stride {
        return Err(CompressError::Decode("页面像素缓冲长度异常".to_string()));
    }

    let mut out = Vec::with_capacity(width * height * 3);
    for row in samples.chunks(stride).take(height) {
        let row = &row[..row_bytes];
        if channels == 3 {
            out.extend_from_slice(row);
        } else {
            for pixel in row.chunks_exact(channels) {
                out.extend_from_slice(&pixel[..3]);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageBuffer, Rgb};

    fn page_image(width: u32, height: u32, seed: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([seed, (x % 255) as u8, (y % 255) as u8])
        }))
    }

    #[test]
    fn serialized_document_round_trips_every_page() {
        let container = PdfContainer;
        let mut document = container.new_document();
        container
            .add_page(&mut document, &page_image(64, 48, 10), 0)
            .expect("add first page");
        container
            .add_page(&mut document, &page_image(30, 90, 200), 1)
            .expect("add second page");
        assert_eq!(document.page_count(), 2);

        let bytes = container.serialize(document).expect("serialize");
        assert!(container.is_container(&bytes));

        let pages = container.decode_pages(&bytes).expect("decode pages");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].dimensions(), (64, 48));
        assert_eq!(pages[1].dimensions(), (30, 90));
        let red = pages[1].to_rgb8().get_pixel(15, 45).0[0];
        assert!(red.abs_diff(200) <= 2, "red channel {}", red);
    }

    fn text_only_pdf(text: &str) -> Vec<u8> {
        let mut document = Document::with_version(PDF_VERSION);
        let pages_id = document.new_object_id();
        let font_id = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 36.into()]),
                Operation::new("Td", vec![20.into(), 40.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = document.add_object(Stream::new(dictionary! {}, content.encode().expect("encode content")));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 200.into(), 100.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        document.save_to(&mut out).expect("save text pdf");
        out
    }

    #[test]
    fn text_only_page_is_rendered_on_white() {
        let container = PdfContainer;
        let bytes = text_only_pdf("Hello");

        let pages = container.decode_pages(&bytes).expect("render text page");

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].dimensions(), (200, 100));
        let rgb = pages[0].to_rgb8();
        assert_eq!(rgb.get_pixel(199, 0).0, [255, 255, 255]);
        assert!(rgb.pixels().any(|pixel| pixel.0.iter().all(|&c| c < 128)));
    }

    #[test]
    fn empty_document_cannot_be_serialized() {
        let container = PdfContainer;
        let document = container.new_document();

        assert!(matches!(
            container.serialize(document),
            Err(CompressError::Container(_))
        ));
    }

    #[test]
    fn non_pdf_bytes_are_not_containers() {
        let container = PdfContainer;

        assert!(!container.is_container(b"GIF89a......"));
        assert!(matches!(
            container.decode_pages(b"plain text"),
            Err(CompressError::Decode(_))
        ));
    }
}
