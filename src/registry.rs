//! Image registry
//!
//! In-memory set of tracked image files, keyed by filesystem path and kept
//! in insertion order for stable listing. The registry owns each entry's
//! thumbnail and recognition state; it never outlives the process.

use image::RgbaImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;
use crate::thumbnail;

/// File extensions accepted for registration
const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "gif"];

/// Per-entry recognition state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryStatus {
    /// Registered, never submitted for recognition
    #[default]
    Unrecognized,
    /// Submitted; a recognition pass is queued or running
    Recognizing,
    /// Last recognition pass succeeded
    Recognized,
    /// Last recognition pass failed, see `last_error`
    Failed,
}

/// A tracked image file
#[derive(Debug, Clone)]
pub struct ImageEntry {
    /// Filesystem path, unique key within the registry
    pub path: PathBuf,
    /// Base name derived from `path`
    pub display_name: String,
    /// Byte length at registration time, advisory only
    pub size_bytes: u64,
    /// Bounded preview bitmap, regenerated only on registration
    pub thumbnail: RgbaImage,
    /// Recognition state machine value
    pub status: EntryStatus,
    /// Ordered recognized text lines, non-empty only when `Recognized`
    pub recognized_lines: Vec<String>,
    /// Human-readable description of the last failure
    pub last_error: Option<String>,
}

impl ImageEntry {
    /// Human-readable file size for display
    pub fn display_size(&self) -> String {
        format_file_size(self.size_bytes)
    }

    /// Recognized lines joined by newline for display
    pub fn display_text(&self) -> String {
        self.recognized_lines.join("\n")
    }

    pub(crate) fn mark_recognizing(&mut self) {
        self.status = EntryStatus::Recognizing;
    }

    pub(crate) fn mark_recognized(&mut self, lines: Vec<String>) {
        self.status = EntryStatus::Recognized;
        self.recognized_lines = lines;
        self.last_error = None;
    }

    pub(crate) fn mark_failed(&mut self, message: String) {
        self.status = EntryStatus::Failed;
        self.recognized_lines.clear();
        self.last_error = Some(message);
    }
}

/// Insertion-ordered registry of tracked images
#[derive(Debug)]
pub struct PathRegistry {
    entries: Vec<ImageEntry>,
    thumbnail_max_dim: u32,
}

impl PathRegistry {
    /// Create a registry whose entries carry thumbnails bounded to
    /// `thumbnail_max_dim` pixels on either axis
    pub fn new(thumbnail_max_dim: u32) -> Self {
        Self {
            entries: Vec::new(),
            thumbnail_max_dim,
        }
    }

    /// Register a path if not already present.
    ///
    /// Returns `Ok(true)` when a new entry was created. Duplicate paths and
    /// non-image extensions are dropped with `Ok(false)`. Constructing the
    /// entry decodes the file for its thumbnail, so an unreadable or
    /// undecodable image fails registration with `ImageLoad`.
    pub fn add(&mut self, path: &Path) -> Result<bool> {
        if !is_supported_image(path) {
            debug!("Ignoring non-image path {:?}", path);
            return Ok(false);
        }
        if self.contains(path) {
            debug!("Path already registered: {:?}", path);
            return Ok(false);
        }

        let thumbnail = thumbnail::generate(path, self.thumbnail_max_dim)?;
        let size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or_default();
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        info!(
            "Registered {} ({})",
            display_name,
            format_file_size(size_bytes)
        );

        self.entries.push(ImageEntry {
            path: path.to_path_buf(),
            display_name,
            size_bytes,
            thumbnail,
            status: EntryStatus::Unrecognized,
            recognized_lines: Vec::new(),
            last_error: None,
        });

        Ok(true)
    }

    /// Remove the entry for `path` if present; silently a no-op otherwise
    pub fn remove(&mut self, path: &Path) -> Option<ImageEntry> {
        if let Some(pos) = self.entries.iter().position(|e| e.path == path) {
            Some(self.entries.remove(pos))
        } else {
            None
        }
    }

    /// Remove all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries in insertion order
    pub fn list(&self) -> &[ImageEntry] {
        &self.entries
    }

    /// Look up an entry by path
    pub fn get(&self, path: &Path) -> Option<&ImageEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub(crate) fn get_mut(&mut self, path: &Path) -> Option<&mut ImageEntry> {
        self.entries.iter_mut().find(|e| e.path == path)
    }

    /// Whether `path` is registered
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether a path carries one of the accepted image extensions
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

/// Format a byte count for display (B / KB / MB / GB)
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use tempfile::tempdir;

    fn write_test_image(path: &Path) {
        let img = RgbaImage::from_pixel(8, 8, image::Rgba([200, 100, 50, 255]));
        img.save(path).unwrap();
    }

    #[test]
    fn test_add_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        write_test_image(&path);

        let mut registry = PathRegistry::new(64);
        assert!(registry.add(&path).unwrap());
        assert!(!registry.add(&path).unwrap());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_add_rejects_non_image_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "text").unwrap();

        let mut registry = PathRegistry::new(64);
        assert!(!registry.add(&path).unwrap());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_add_undecodable_image_fails_without_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();

        let mut registry = PathRegistry::new(64);
        assert!(registry.add(&path).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        write_test_image(&path);

        let mut registry = PathRegistry::new(64);
        registry.add(&path).unwrap();

        assert!(registry.remove(&path).is_some());
        assert!(!registry.contains(&path));
        // second remove is a silent no-op
        assert!(registry.remove(&path).is_none());
    }

    #[test]
    fn test_clear_empties_any_size() {
        let dir = tempdir().unwrap();
        let mut registry = PathRegistry::new(64);

        registry.clear();
        assert!(registry.is_empty());

        for name in ["a.png", "b.jpg", "c.bmp"] {
            let path = dir.path().join(name);
            write_test_image(&path);
            registry.add(&path).unwrap();
        }
        assert_eq!(registry.len(), 3);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_list_preserves_insertion_order() {
        let dir = tempdir().unwrap();
        let mut registry = PathRegistry::new(64);

        let names = ["z.png", "a.png", "m.png"];
        for name in names {
            let path = dir.path().join(name);
            write_test_image(&path);
            registry.add(&path).unwrap();
        }

        let listed: Vec<_> = registry.list().iter().map(|e| e.display_name.clone()).collect();
        assert_eq!(listed, names);
    }

    #[test]
    fn test_entry_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("photo.PNG");
        write_test_image(&path);

        let mut registry = PathRegistry::new(32);
        registry.add(&path).unwrap();

        let entry = registry.get(&path).unwrap();
        assert_eq!(entry.display_name, "photo.PNG");
        assert!(entry.size_bytes > 0);
        assert_eq!(entry.status, EntryStatus::Unrecognized);
        assert!(entry.recognized_lines.is_empty());
        assert!(entry.last_error.is_none());
        assert!(entry.thumbnail.width() <= 32 && entry.thumbnail.height() <= 32);
    }

    #[test]
    fn test_supported_extensions_case_insensitive() {
        assert!(is_supported_image(Path::new("/x/a.png")));
        assert!(is_supported_image(Path::new("/x/a.JPEG")));
        assert!(is_supported_image(Path::new("/x/a.Gif")));
        assert!(!is_supported_image(Path::new("/x/a.tiff")));
        assert!(!is_supported_image(Path::new("/x/noext")));
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(2048), "2.0 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
