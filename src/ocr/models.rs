//! Model acquisition and caching
//!
//! PaddleOCR ONNX models are fetched once into a per-user cache directory
//! and reused across runs.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// A required model asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// Text detection model (DBNet)
    Detection,
    /// Text recognition model (CRNN)
    Recognition,
    /// Character dictionary for recognition
    Dictionary,
}

impl ModelKind {
    /// Cache filename for this asset
    pub fn filename(&self) -> &'static str {
        match self {
            ModelKind::Detection => "det.onnx",
            ModelKind::Recognition => "rec.onnx",
            ModelKind::Dictionary => "dict.txt",
        }
    }

    /// Download URL (PaddleOCR models from Hugging Face, monkt/paddleocr-onnx)
    pub fn download_url(&self) -> &'static str {
        match self {
            ModelKind::Detection => {
                "https://huggingface.co/monkt/paddleocr-onnx/resolve/main/detection/v3/det.onnx"
            }
            ModelKind::Recognition => {
                "https://huggingface.co/monkt/paddleocr-onnx/resolve/main/languages/english/rec.onnx"
            }
            ModelKind::Dictionary => {
                "https://huggingface.co/monkt/paddleocr-onnx/resolve/main/languages/english/dict.txt"
            }
        }
    }

    /// Plausible on-disk size range, used as a cheap integrity check
    pub fn expected_size_range(&self) -> (u64, u64) {
        match self {
            ModelKind::Detection => (2_000_000, 5_000_000),
            ModelKind::Recognition => (7_000_000, 10_000_000),
            ModelKind::Dictionary => (500, 10_000),
        }
    }

    /// Display name for log messages
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::Detection => "text detection",
            ModelKind::Recognition => "text recognition",
            ModelKind::Dictionary => "character dictionary",
        }
    }
}

/// Record of a fetched asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedModel {
    pub filename: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub fetched_at_unix: u64,
}

/// Manifest of everything present in the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelManifest {
    pub models: Vec<FetchedModel>,
}

/// Downloads and caches model assets in a fixed directory
pub struct ModelHub {
    dir: PathBuf,
}

impl ModelHub {
    /// Hub rooted in the per-user data directory
    pub fn new() -> Result<Self> {
        let proj_dirs = directories::ProjectDirs::from("io", "textdrop", "textdrop")
            .context("could not determine data directory")?;
        let dir = proj_dirs.data_dir().join("models");
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Hub rooted in a specific directory
    pub fn with_dir(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// On-disk path for an asset
    pub fn path(&self, kind: ModelKind) -> PathBuf {
        self.dir.join(kind.filename())
    }

    /// Whether an asset is present and of plausible size
    pub fn is_cached(&self, kind: ModelKind) -> bool {
        let path = self.path(kind);
        match std::fs::metadata(&path) {
            Ok(meta) => {
                let (min, max) = kind.expected_size_range();
                meta.len() >= min && meta.len() <= max
            }
            Err(_) => false,
        }
    }

    /// Return the path for an asset, fetching it first if missing
    pub fn ensure(&self, kind: ModelKind) -> Result<PathBuf> {
        let path = self.path(kind);
        if self.is_cached(kind) {
            debug!("{} model cached at {:?}", kind.display_name(), path);
            return Ok(path);
        }

        info!("Fetching {} model", kind.display_name());
        let rt = Runtime::new().context("failed to create tokio runtime")?;
        let sha256 = rt.block_on(self.fetch(kind, &path))?;

        if !self.is_cached(kind) {
            anyhow::bail!(
                "downloaded {} model failed the size check",
                kind.display_name()
            );
        }
        self.record(kind, &path, sha256)?;

        info!("Fetched {} model to {:?}", kind.display_name(), path);
        Ok(path)
    }

    /// Stream an asset to `<path>.tmp`, then rename into place. Returns the
    /// SHA-256 of the downloaded bytes.
    async fn fetch(&self, kind: ModelKind, path: &Path) -> Result<String> {
        let url = kind.download_url();
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .context("failed to create HTTP client")?;

        let response = client
            .get(url)
            .send()
            .await
            .context("failed to send download request")?;
        if !response.status().is_success() {
            anyhow::bail!("download failed with status {}: {}", response.status(), url);
        }

        let tmp_path = path.with_extension("tmp");
        let mut file =
            std::fs::File::create(&tmp_path).context("failed to create temp file")?;
        let mut hasher = Sha256::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("error reading download stream")?;
            file.write_all(&chunk).context("failed to write temp file")?;
            hasher.update(&chunk);
        }
        file.flush().context("failed to flush temp file")?;
        drop(file);

        std::fs::rename(&tmp_path, path)
            .context("failed to move downloaded file into place")?;

        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Update the cache manifest after a successful fetch
    fn record(&self, kind: ModelKind, path: &Path, sha256: String) -> Result<()> {
        let mut manifest = self.load_manifest().unwrap_or_default();
        let size_bytes = std::fs::metadata(path)?.len();

        let entry = FetchedModel {
            filename: kind.filename().to_string(),
            size_bytes,
            sha256,
            fetched_at_unix: unix_now(),
        };

        if let Some(existing) = manifest
            .models
            .iter_mut()
            .find(|m| m.filename == entry.filename)
        {
            *existing = entry;
        } else {
            manifest.models.push(entry);
        }

        let manifest_path = self.dir.join("manifest.json");
        let content = serde_json::to_string_pretty(&manifest)?;
        std::fs::write(manifest_path, content)?;
        Ok(())
    }

    /// Load the cache manifest, empty if absent
    pub fn load_manifest(&self) -> Result<ModelManifest> {
        let manifest_path = self.dir.join("manifest.json");
        if !manifest_path.exists() {
            return Ok(ModelManifest::default());
        }
        let content = std::fs::read_to_string(&manifest_path)?;
        let manifest: ModelManifest = serde_json::from_str(&content)?;
        Ok(manifest)
    }
}

/// Seconds since the Unix epoch
fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
