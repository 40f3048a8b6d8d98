use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::classify::DEFAULT_SCREENSHOT_THRESHOLD;
use crate::dedupe::phash::DEFAULT_SIMILARITY_THRESHOLD;
use crate::dedupe::{HashSampling, SimilarityMethod};
use crate::scanner::{ScanOptions, DEFAULT_BATCH_SIZE};
use crate::store::DEFAULT_ASSET_LIMIT;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub trash: TrashConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrashConfig {
    #[serde(default = "default_trash_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,

    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,
}

fn default_trash_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("snapsweep/.trash")
}

fn default_max_age_days() -> u32 {
    30
}

fn default_max_size_bytes() -> u64 {
    1024 * 1024 * 1024 // 1GB
}

impl Default for TrashConfig {
    fn default() -> Self {
        Self {
            path: default_trash_path(),
            max_age_days: default_max_age_days(),
            max_size_bytes: default_max_size_bytes(),
        }
    }
}

/// Named screenshot thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Conservative,
    Balanced,
    Aggressive,
}

impl Sensitivity {
    pub fn screenshot_threshold(&self) -> f64 {
        match self {
            Sensitivity::Conservative => 0.6,
            Sensitivity::Balanced => 0.4,
            Sensitivity::Aggressive => 0.25,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "conservative" => Some(Sensitivity::Conservative),
            "balanced" => Some(Sensitivity::Balanced),
            "aggressive" => Some(Sensitivity::Aggressive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,

    #[serde(default = "default_true")]
    pub deep_scan: bool,

    #[serde(default = "default_true")]
    pub include_visual_similarity: bool,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_asset_limit")]
    pub asset_limit: usize,

    #[serde(default = "default_screenshot_threshold")]
    pub screenshot_threshold: f64,

    /// Overrides `screenshot_threshold` when set.
    #[serde(default)]
    pub sensitivity: Option<Sensitivity>,

    #[serde(default)]
    pub similarity_method: SimilarityMethod,

    #[serde(default)]
    pub hash_sampling: HashSampling,

    /// Percent threshold for perceptual similarity.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    #[serde(default)]
    pub parallel_blur: bool,

    /// Files or directories whose photos count as favorites.
    #[serde(default)]
    pub favorites: Vec<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_asset_limit() -> usize {
    DEFAULT_ASSET_LIMIT
}

fn default_screenshot_threshold() -> f64 {
    DEFAULT_SCREENSHOT_THRESHOLD
}

fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_image_extensions() -> Vec<String> {
    vec![
        "jpg".to_string(),
        "jpeg".to_string(),
        "png".to_string(),
        "gif".to_string(),
        "webp".to_string(),
        "bmp".to_string(),
        "tiff".to_string(),
        "tif".to_string(),
    ]
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            image_extensions: default_image_extensions(),
            deep_scan: true,
            include_visual_similarity: true,
            batch_size: default_batch_size(),
            asset_limit: default_asset_limit(),
            screenshot_threshold: default_screenshot_threshold(),
            sensitivity: None,
            similarity_method: SimilarityMethod::default(),
            hash_sampling: HashSampling::default(),
            similarity_threshold: default_similarity_threshold(),
            parallel_blur: false,
            favorites: Vec::new(),
        }
    }
}

impl ScannerConfig {
    pub fn screenshot_threshold(&self) -> f64 {
        self.sensitivity
            .map(|s| s.screenshot_threshold())
            .unwrap_or(self.screenshot_threshold)
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            deep_scan: self.deep_scan,
            include_visual_similarity: self.include_visual_similarity,
            batch_size: self.batch_size,
            asset_limit: self.asset_limit,
            screenshot_threshold: self.screenshot_threshold(),
            similarity_method: self.similarity_method,
            hash_sampling: self.hash_sampling,
            similarity_threshold: self.similarity_threshold,
            parallel_blur: self.parallel_blur,
        }
    }
}

impl Config {
    /// Load from `SNAPSWEEP_CONFIG` or the default location, writing
    /// defaults there on first run.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("SNAPSWEEP_CONFIG") {
            return Self::load_from(Path::new(&path));
        }

        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("snapsweep")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        let options = config.scanner.scan_options();
        assert_eq!(options, ScanOptions::default());
        assert_eq!(config.trash.max_age_days, 30);
    }

    #[test]
    fn test_sensitivity_overrides_threshold() {
        let config: Config = toml::from_str(
            r#"
            [scanner]
            screenshot_threshold = 0.5
            sensitivity = "aggressive"
            "#,
        )
        .unwrap();
        assert_eq!(config.scanner.scan_options().screenshot_threshold, 0.25);

        let config: Config = toml::from_str("[scanner]\nscreenshot_threshold = 0.5\n").unwrap();
        assert_eq!(config.scanner.scan_options().screenshot_threshold, 0.5);
    }

    #[test]
    fn test_sensitivity_presets() {
        assert_eq!(Sensitivity::Conservative.screenshot_threshold(), 0.6);
        assert_eq!(Sensitivity::Balanced.screenshot_threshold(), 0.4);
        assert_eq!(Sensitivity::parse("Aggressive"), Some(Sensitivity::Aggressive));
        assert_eq!(Sensitivity::parse("wild"), None);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.scanner.deep_scan = false;
        config.scanner.similarity_method = SimilarityMethod::Perceptual;
        config.scanner.favorites = vec![PathBuf::from("/photos/keep")];
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert!(!loaded.scanner.deep_scan);
        assert_eq!(loaded.scanner.similarity_method, SimilarityMethod::Perceptual);
        assert_eq!(loaded.scanner.favorites, vec![PathBuf::from("/photos/keep")]);
    }

    #[test]
    fn test_load_from_reports_bad_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scanner\n").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }
}
