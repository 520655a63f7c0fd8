//! 引擎设置文件模块
//!
//! # 设计思路
//!
//! 允许用户通过 JSON 文件覆盖 `EngineConfig` 的部分字段；
//! 未出现的字段保留默认值，覆盖后统一走 `EngineConfig::validate`。
//!
//! # 实现思路
//!
//! - 文件不存在视为“没有覆盖”，返回默认设置。
//! - JSON 格式错误、字段非法均返回 `AppError::Config`，不静默吞掉。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::compressor::{EngineConfig, SearchProfile, parse_resize_filter};
use crate::error::AppError;

/// 设置文件内容，所有字段可选。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub max_working_width: Option<u32>,
    pub max_working_height: Option<u32>,
    pub max_decoded_pixels: Option<u64>,
    pub max_decoded_bytes: Option<u64>,
    /// `nearest` / `triangle` / `catmullrom` / `gaussian` / `lanczos3`
    pub resize_filter: Option<String>,
    pub smooth: Option<SearchProfile>,
    pub aggressive: Option<SearchProfile>,
    pub fallback_quality: Option<u8>,
    pub unconstrained_quality: Option<u8>,
    pub container_overhead_bytes: Option<u64>,
    pub min_document_budget: Option<u64>,
    pub codec_budget_ratio: Option<f64>,
    pub max_bytes_per_pixel: Option<f64>,
}

impl EngineSettings {
    /// 把覆盖项写入配置并校验。
    pub fn apply_to(&self, config: &mut EngineConfig) -> Result<(), AppError> {
        if let Some(value) = self.max_working_width {
            config.max_working_width = value;
        }
        if let Some(value) = self.max_working_height {
            config.max_working_height = value;
        }
        if let Some(value) = self.max_decoded_pixels {
            config.max_decoded_pixels = value;
        }
        if let Some(value) = self.max_decoded_bytes {
            config.max_decoded_bytes = value;
        }
        if let Some(name) = self.resize_filter.as_deref() {
            config.resize_filter = parse_resize_filter(name).map_err(|e| AppError::Config(e.to_string()))?;
        }
        if let Some(profile) = self.smooth {
            config.smooth = profile;
        }
        if let Some(profile) = self.aggressive {
            config.aggressive = profile;
        }
        if let Some(value) = self.fallback_quality {
            config.fallback_quality = value;
        }
        if let Some(value) = self.unconstrained_quality {
            config.unconstrained_quality = value;
        }
        if let Some(value) = self.container_overhead_bytes {
            config.container_overhead_bytes = value;
        }
        if let Some(value) = self.min_document_budget {
            config.min_document_budget = value;
        }
        if let Some(value) = self.codec_budget_ratio {
            config.codec_budget_ratio = value;
        }
        if let Some(value) = self.max_bytes_per_pixel {
            config.max_bytes_per_pixel = value;
        }

        config.validate().map_err(|e| AppError::Config(e.to_string()))
    }

    /// 生成最终引擎配置。
    pub fn to_engine_config(&self) -> Result<EngineConfig, AppError> {
        let mut config = EngineConfig::default();
        self.apply_to(&mut config)?;
        Ok(config)
    }
}

/// 从指定路径读取设置。
pub fn load_settings_from_path(path: &Path) -> Result<EngineSettings, AppError> {
    if !path.exists() {
        log::info!("设置文件 '{}' 不存在，使用默认配置", path.display());
        return Ok(EngineSettings::default());
    }

    let content = fs::read_to_string(path)?;
    serde_json::from_str::<EngineSettings>(&content)
        .map_err(|e| AppError::Config(format!("解析设置文件 '{}' 失败: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::FallbackPolicy;
    use image::imageops::FilterType;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir() -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock error")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("image-resizer-settings-test-{nanos}"));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = unique_temp_dir();
        let loaded = load_settings_from_path(&dir.join("absent.json")).expect("load");

        assert_eq!(loaded, EngineSettings::default());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn partial_settings_override_only_named_fields() {
        let dir = unique_temp_dir();
        let path = dir.join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "resize_filter": "lanczos3",
                "codec_budget_ratio": 0.5,
                "aggressive": {
                    "scale_decay": 0.5,
                    "min_scale": 0.02,
                    "quality_low": 30,
                    "quality_high": 90,
                    "fallback": "smallest_across_scales"
                }
            }"#,
        )
        .expect("write settings");

        let config = load_settings_from_path(&path)
            .expect("load")
            .to_engine_config()
            .expect("apply");

        assert_eq!(config.resize_filter, FilterType::Lanczos3);
        assert_eq!(config.codec_budget_ratio, 0.5);
        assert_eq!(config.aggressive.quality_low, 30);
        assert_eq!(config.aggressive.fallback, FallbackPolicy::SmallestAcrossScales);
        assert_eq!(config.smooth, SearchProfile::SMOOTH);
        assert_eq!(config.max_bytes_per_pixel, 2.2);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn malformed_json_is_config_error() {
        let dir = unique_temp_dir();
        let path = dir.join("settings.json");
        std::fs::write(&path, "not-json").expect("write invalid settings");

        assert!(matches!(load_settings_from_path(&path), Err(AppError::Config(_))));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn out_of_range_override_is_rejected() {
        let settings = EngineSettings {
            fallback_quality: Some(0),
            ..EngineSettings::default()
        };

        assert!(matches!(settings.to_engine_config(), Err(AppError::Config(_))));
    }

    #[test]
    fn unknown_filter_is_rejected() {
        let settings = EngineSettings {
            resize_filter: Some("sinc".to_string()),
            ..EngineSettings::default()
        };

        assert!(matches!(settings.to_engine_config(), Err(AppError::Config(_))));
    }
}
