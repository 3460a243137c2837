//! Application Configuration
//!
//! Host-facing settings stored in TOML format.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Artifact output settings
    pub output: OutputSettings,
    /// Thumbnail settings
    pub thumbnail: ThumbnailSettings,
    /// OCR engine settings
    pub ocr: OcrSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output: OutputSettings::default(),
            thumbnail: ThumbnailSettings::default(),
            ocr: OcrSettings::default(),
        }
    }
}

/// Where recognition artifacts are written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Root directory for `<base>.png` / `<base>.json` artifacts,
    /// relative paths resolve against the process working directory
    pub root: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("output"),
        }
    }
}

/// Preview generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailSettings {
    /// Maximum thumbnail dimension on either axis, in pixels
    pub max_dim: u32,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self { max_dim: 64 }
    }
}

/// Recognition engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrSettings {
    /// Override for the model cache directory (default: per-user data dir)
    pub models_dir: Option<PathBuf>,
    /// Binarization threshold for the detection probability map (0.0 - 1.0)
    pub det_threshold: f32,
    /// Minimum mean score for a detected text box (0.0 - 1.0)
    pub box_threshold: f32,
    /// Expansion ratio applied to detected boxes before recognition
    pub unclip_ratio: f32,
    /// Longest image side fed to detection, larger inputs are scaled down
    pub max_side: u32,
    /// Minimum detected box dimension in pixels, smaller boxes are noise
    pub min_box_size: u32,
    /// Intra-op thread count for ONNX sessions
    pub intra_threads: usize,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            models_dir: None,
            det_threshold: 0.3,
            box_threshold: 0.6,
            unclip_ratio: 1.6,
            max_side: 960,
            min_box_size: 3,
            intra_threads: 4,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert_eq!(config.output.root, PathBuf::from("output"));
        assert_eq!(config.thumbnail.max_dim, 64);

        assert!(config.ocr.models_dir.is_none());
        assert!((config.ocr.det_threshold - 0.3).abs() < 0.01);
        assert!((config.ocr.box_threshold - 0.6).abs() < 0.01);
        assert_eq!(config.ocr.max_side, 960);
        assert_eq!(config.ocr.intra_threads, 4);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AppConfig::default();

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.output.root, parsed.output.root);
        assert_eq!(config.thumbnail.max_dim, parsed.thumbnail.max_dim);
        assert_eq!(config.ocr.max_side, parsed.ocr.max_side);
    }

    #[test]
    fn test_config_with_custom_values() {
        let mut config = AppConfig::default();
        config.output.root = PathBuf::from("/tmp/artifacts");
        config.thumbnail.max_dim = 128;
        config.ocr.max_side = 1280;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.output.root, PathBuf::from("/tmp/artifacts"));
        assert_eq!(parsed.thumbnail.max_dim, 128);
        assert_eq!(parsed.ocr.max_side, 1280);
    }

    #[test]
    fn test_save_and_load_config() {
        let config = AppConfig::default();

        let temp_file = NamedTempFile::new().unwrap();

        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(config.output.root, loaded.output.root);
        assert_eq!(config.ocr.intra_threads, loaded.ocr.intra_threads);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
