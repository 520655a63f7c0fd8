//! # 进度上报
//!
//! 进度值落在 [0, 1]：加载阶段占 0 ~ 0.10，处理阶段线性占满剩余部分。
//! 上报值永不回退；回调在调用线程上同步执行。

/// 加载阶段结束时的进度值。
pub const LOADING_PHASE_END: f32 = 0.10;

/// 单调递增的进度上报器。
pub struct ProgressReporter<F>
where
    F: FnMut(f32, &str),
{
    callback: F,
    last: f32,
}

impl<F> ProgressReporter<F>
where
    F: FnMut(f32, &str),
{
    pub fn new(callback: F) -> Self {
        Self { callback, last: 0.0 }
    }

    /// 上报任意进度值，会被夹到 `[上次值, 1.0]`。
    pub fn report(&mut self, value: f32, message: &str) {
        let value = if value.is_finite() { value } else { self.last };
        let value = value.clamp(self.last, 1.0);
        self.last = value;
        (self.callback)(value, message);
    }

    /// 加载阶段：第 `index` 个输入加载完成。
    pub fn loading(&mut self, index: usize, total: usize) {
        let value = LOADING_PHASE_END * (index + 1) as f32 / total.max(1) as f32;
        self.report(value, &format!("正在加载 {}/{}", index + 1, total));
    }

    /// 处理阶段：第 `index` 项处理完成。
    pub fn processing(&mut self, index: usize, total: usize) {
        let value = LOADING_PHASE_END + (1.0 - LOADING_PHASE_END) * (index + 1) as f32 / total.max(1) as f32;
        self.report(value, &format!("正在处理 {}/{}", index + 1, total));
    }

    pub fn finish(&mut self, message: &str) {
        self.report(1.0, message);
    }

    pub fn last(&self) -> f32 {
        self.last
    }
}
