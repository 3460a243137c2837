//! Artifact persistence
//!
//! Each recognition pass leaves two files under the output root, keyed by
//! the source file's base name: `<base>.png` (annotated image) and
//! `<base>.json` (structured document). Overwrites are last-write-wins.

use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};
use crate::ocr::RecognitionResult;

/// Locations of the persisted artifact pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub image_path: PathBuf,
    pub json_path: PathBuf,
}

/// Persist a recognition result under `output_dir` as `<base_name>.png` and
/// `<base_name>.json`.
///
/// Both files stage through `.tmp` siblings and rename into place only after
/// both writes succeed, so a failed persist never leaves one artifact
/// without the other.
pub fn persist(
    result: &RecognitionResult,
    output_dir: &Path,
    base_name: &str,
) -> Result<ArtifactPaths> {
    std::fs::create_dir_all(output_dir).map_err(|e| Error::io(output_dir, e))?;

    let image_path = output_dir.join(format!("{base_name}.png"));
    let json_path = output_dir.join(format!("{base_name}.json"));
    let image_tmp = output_dir.join(format!("{base_name}.png.tmp"));
    let json_tmp = output_dir.join(format!("{base_name}.json.tmp"));

    let staged = stage(result, &image_tmp, &json_tmp);
    if let Err(e) = staged {
        let _ = std::fs::remove_file(&image_tmp);
        let _ = std::fs::remove_file(&json_tmp);
        return Err(e);
    }

    std::fs::rename(&image_tmp, &image_path).map_err(|e| Error::io(&image_path, e))?;
    std::fs::rename(&json_tmp, &json_path).map_err(|e| Error::io(&json_path, e))?;

    debug!("Persisted artifacts {:?} / {:?}", image_path, json_path);

    Ok(ArtifactPaths {
        image_path,
        json_path,
    })
}

fn stage(result: &RecognitionResult, image_tmp: &Path, json_tmp: &Path) -> Result<()> {
    result
        .annotated_image()
        .save_with_format(image_tmp, ImageFormat::Png)
        .map_err(|e| Error::io(image_tmp, std::io::Error::other(e)))?;

    let content = serde_json::to_string_pretty(result.document())
        .map_err(|e| Error::io(json_tmp, std::io::Error::other(e)))?;
    std::fs::write(json_tmp, content).map_err(|e| Error::io(json_tmp, e))?;

    Ok(())
}
