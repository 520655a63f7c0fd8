//! 体积单位解析与格式化。
//!
//! 单位按 1024 进制；不带单位的数字视为 KB，`0` 表示不限制。

use crate::error::AppError;

const KIB: f64 = 1024.0;

/// 解析目标体积，如 `500KB`、`2 MB`、`1.5mb`、`300`。
pub fn parse_size(text: &str) -> Result<u64, AppError> {
    let normalized = text.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(AppError::InvalidArgument("目标体积不能为空".to_string()));
    }

    let split_at = normalized
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(normalized.len());
    let (number, unit) = normalized.split_at(split_at);

    let value: f64 = number
        .parse()
        .map_err(|_| AppError::InvalidArgument(format!("无法解析目标体积 '{}'", text)))?;
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::InvalidArgument(format!("目标体积必须为非负数：'{}'", text)));
    }

    let multiplier = match unit.trim() {
        "" | "k" | "kb" | "kib" => KIB,
        "m" | "mb" | "mib" => KIB * KIB,
        "b" => 1.0,
        other => {
            return Err(AppError::InvalidArgument(format!(
                "未知体积单位 '{}'（可选：KB / MB）",
                other
            )));
        }
    };

    Ok((value * multiplier).round() as u64)
}

/// 格式化为 `"512.00 KB"`，不小于 1 MB 时追加 `"(1.50 MB)"`。
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 KB".to_string();
    }

    let kb = bytes as f64 / KIB;
    if kb >= KIB {
        format!("{:.2} KB ({:.2} MB)", kb, kb / KIB)
    } else {
        format!("{:.2} KB", kb)
    }
}
