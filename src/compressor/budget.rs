//! # PDF 页面预算模块
//!
//! ## 设计思路
//!
//! PDF 容器会在像素数据之外引入对象表、页面字典与 Flate 流等开销，
//! 单纯把总预算按页数均分并不能保证最终文档不超标。因此：
//!
//! 1. 先从总预算扣除固定的容器开销，并设置文档预算下限
//! 2. 每页只把一部分页面预算交给 JPEG 搜索做预降质
//! 3. 预降质后的位图若像素数仍超过“字节 / 像素”上限，再按面积比降采样
//!
//! ## 实现思路
//!
//! - `plan_page_budgets` 只做整数运算，结果可直接用于断言
//! - `process_page_for_container` 的输出是可直接装入页面的位图，
//!   而不是编码字节：容器会以自己的方式重新编码像素

use image::DynamicImage;

use super::search::aggressive_fit;
use super::{BudgetScope, CompressError, EngineConfig, RasterCodec};

/// 一份文档的预算划分。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBudgetPlan {
    /// 扣除容器开销后的文档预算。
    pub document_budget: u64,
    /// 每页预算，0 表示不限制。
    pub page_budget: u64,
}

impl PageBudgetPlan {
    /// 按预算范围划分文档预算。
    pub fn new(total_budget: u64, page_count: usize, scope: BudgetScope, config: &EngineConfig) -> Self {
        if total_budget == 0 {
            return Self {
                document_budget: 0,
                page_budget: 0,
            };
        }

        let document_budget = total_budget
            .saturating_sub(config.container_overhead_bytes)
            .max(config.min_document_budget);
        let page_budget = match scope {
            BudgetScope::Total => document_budget / page_count.max(1) as u64,
            BudgetScope::PerFile => document_budget,
        };

        Self {
            document_budget,
            page_budget,
        }
    }
}

/// 以默认容器开销计算每页预算。
///
/// - 总预算为 0 时返回 0（不限制）
/// - `Total`：`max(B - 10240, 2048) / n`
/// - `PerFile`：`max(B - 10240, 2048)`
pub fn plan_page_budgets(total_budget: u64, page_count: usize, scope: BudgetScope) -> u64 {
    PageBudgetPlan::new(total_budget, page_count, scope, &EngineConfig::default()).page_budget
}

/// 单页预降质时交给 aggressive 搜索的预算：`page_budget * codec_budget_ratio`，至少 1 字节。
pub fn codec_budget_for_page(page_budget: u64, config: &EngineConfig) -> u64 {
    ((page_budget as f64 * config.codec_budget_ratio) as u64).max(1)
}

/// 装页前的单页处理结果。
#[derive(Debug)]
pub struct ProcessedPage {
    pub image: DynamicImage,
    /// 预降质或兜底降采样改变了分辨率 / 质量。
    pub best_effort: bool,
}

/// 把单页位图处理为适合装入容器的版本。
///
/// 预算为 0 时原样返回。否则以 `page_budget * codec_budget_ratio` 为预算做
/// aggressive 搜索，并把结果重新解码为位图；若像素数仍超过
/// `page_budget / max_bytes_per_pixel`，按 `sqrt(上限 / 当前)` 等比降采样。
pub fn process_page_for_container<C: RasterCodec + ?Sized>(
    codec: &C,
    image: DynamicImage,
    page_budget: u64,
    config: &EngineConfig,
) -> Result<ProcessedPage, CompressError> {
    if page_budget == 0 {
        return Ok(ProcessedPage {
            image,
            best_effort: false,
        });
    }

    let codec_budget = codec_budget_for_page(page_budget, config);
    let fitted = aggressive_fit(codec, &image, codec_budget, config)?;
    drop(image);

    let mut best_effort = fitted.best_effort;
    let mut page = codec.decode(&fitted.bytes)?;
    drop(fitted);

    let max_pixels = page_budget as f64 / config.max_bytes_per_pixel;
    let current_pixels = page.width() as f64 * page.height() as f64;
    if current_pixels > max_pixels {
        let factor = (max_pixels / current_pixels).sqrt();
        let width = ((page.width() as f64 * factor).floor() as u32).max(1);
        let height = ((page.height() as f64 * factor).floor() as u32).max(1);
        log::debug!(
            "页面像素超限（{:.0} > {:.0}），降采样到 {}x{}",
            current_pixels,
            max_pixels,
            width,
            height
        );
        page = codec.resize(&page, width, height)?;
        best_effort = true;
    }

    Ok(ProcessedPage {
        image: page,
        best_effort,
    })
}
