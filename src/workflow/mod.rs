//! Recognition workflow
//!
//! Drives one recognition pass per request: load pixels, invoke the
//! engine, persist artifacts, read the text back, and record the outcome
//! on the entry. Failures are converted into entry state here; nothing
//! propagates past this boundary as a fault.

pub mod worker;

pub use worker::{RecognitionEvent, RecognitionWorker};

use parking_lot::Mutex;
use std::path::Path;
use tracing::{error, info, warn};

use crate::artifact::{self, ArtifactPaths};
use crate::error::Result;
use crate::extract;
use crate::ocr::RecognitionEngine;
use crate::registry::PathRegistry;
use crate::thumbnail;

/// Result value of one recognition pass
#[derive(Debug, Clone)]
pub enum RecognizeOutcome {
    /// The entry is `Recognized`; artifacts are on disk
    Recognized {
        lines: Vec<String>,
        artifacts: ArtifactPaths,
    },
    /// The entry is `Failed` with this message as its `last_error`
    Failed { message: String },
    /// The path was not in the registry; nothing changed
    NotRegistered,
}

/// Run one full recognition pass for a registered path.
///
/// The entry moves to `Recognizing`, then to `Recognized` or `Failed`. The
/// registry lock is held only around the state transitions, never across
/// the engine call or file I/O.
pub fn recognize_one(
    engine: &dyn RecognitionEngine,
    registry: &Mutex<PathRegistry>,
    output_root: &Path,
    path: &Path,
) -> RecognizeOutcome {
    {
        let mut registry = registry.lock();
        match registry.get_mut(path) {
            Some(entry) => entry.mark_recognizing(),
            None => {
                warn!("Recognition requested for unregistered path {:?}", path);
                return RecognizeOutcome::NotRegistered;
            }
        }
    }

    let outcome = run_pipeline(engine, output_root, path);

    let mut registry = registry.lock();
    match outcome {
        Ok((lines, artifacts)) => {
            info!(
                "Recognized {:?}: {} lines",
                path.file_name().unwrap_or_default(),
                lines.len()
            );
            match registry.get_mut(path) {
                Some(entry) => entry.mark_recognized(lines.clone()),
                None => warn!("Entry for {:?} removed while recognition was in flight", path),
            }
            RecognizeOutcome::Recognized { lines, artifacts }
        }
        Err(e) => {
            let message = e.to_string();
            error!("Recognition failed for {:?}: {}", path, message);
            if let Some(entry) = registry.get_mut(path) {
                entry.mark_failed(message.clone());
            }
            RecognizeOutcome::Failed { message }
        }
    }
}

/// The fallible part: decode, recognize, persist, read back
fn run_pipeline(
    engine: &dyn RecognitionEngine,
    output_root: &Path,
    path: &Path,
) -> Result<(Vec<String>, ArtifactPaths)> {
    let image = thumbnail::load_image(path)?.to_rgb8();
    let result = engine.recognize(&image)?;
    let artifacts = artifact::persist(&result, output_root, &base_name(path))?;
    let lines = extract::read_recognized_lines(&artifacts.json_path)?;
    Ok((lines, artifacts))
}

/// Source file name with its extension stripped
fn base_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::ocr::{RecognitionResult, TextLine};
    use crate::registry::EntryStatus;
    use image::{Rgba, RgbaImage, RgbImage};
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::tempdir;

    /// Engine that always recognizes the same lines
    struct StubEngine {
        lines: Vec<String>,
    }

    impl StubEngine {
        fn new(lines: &[&str]) -> Self {
            Self {
                lines: lines.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    impl RecognitionEngine for StubEngine {
        fn recognize(&self, image: &RgbImage) -> Result<RecognitionResult> {
            let lines: Vec<TextLine> = self
                .lines
                .iter()
                .enumerate()
                .map(|(i, text)| TextLine {
                    text: text.clone(),
                    score: 0.99,
                    bounds: (0, i as u32 * 4, 4, 3),
                })
                .collect();
            Ok(RecognitionResult::from_text_lines(image, &lines))
        }
    }

    /// Engine that always fails
    struct FailingEngine;

    impl RecognitionEngine for FailingEngine {
        fn recognize(&self, _image: &RgbImage) -> Result<RecognitionResult> {
            Err(Error::Recognition(anyhow::anyhow!("model exploded")))
        }
    }

    /// Engine whose document carries a malformed rec_texts field
    struct BadDocumentEngine;

    impl RecognitionEngine for BadDocumentEngine {
        fn recognize(&self, image: &RgbImage) -> Result<RecognitionResult> {
            Ok(RecognitionResult::new(
                image.clone(),
                json!({ "rec_texts": 42 }),
            ))
        }
    }

    fn registered_image(dir: &Path, name: &str) -> (Mutex<PathRegistry>, PathBuf) {
        let path = dir.join(name);
        let img = RgbaImage::from_pixel(16, 16, Rgba([255, 255, 255, 255]));
        img.save(&path).unwrap();

        let mut registry = PathRegistry::new(64);
        registry.add(&path).unwrap();
        (Mutex::new(registry), path)
    }

    #[test]
    fn test_recognize_one_happy_path() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("output");
        let (registry, path) = registered_image(dir.path(), "sample.png");

        let engine = StubEngine::new(&["A", "B"]);
        let outcome = recognize_one(&engine, &registry, &out, &path);

        match outcome {
            RecognizeOutcome::Recognized { lines, artifacts } => {
                assert_eq!(lines, vec!["A", "B"]);
                assert!(artifacts.image_path.exists());
                assert!(artifacts.json_path.exists());
                assert_eq!(artifacts.image_path, out.join("sample.png"));
                assert_eq!(artifacts.json_path, out.join("sample.json"));

                let doc: serde_json::Value = serde_json::from_str(
                    &std::fs::read_to_string(&artifacts.json_path).unwrap(),
                )
                .unwrap();
                assert_eq!(doc.get("rec_texts").unwrap(), &json!(["A", "B"]));
            }
            other => panic!("expected Recognized, got {:?}", other),
        }

        let registry = registry.lock();
        let entry = registry.get(&path).unwrap();
        assert_eq!(entry.status, EntryStatus::Recognized);
        assert_eq!(entry.recognized_lines, vec!["A", "B"]);
        assert_eq!(entry.display_text(), "A\nB");
        assert!(entry.last_error.is_none());
    }

    #[test]
    fn test_failing_engine_marks_failed_without_artifacts() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("output");
        let (registry, path) = registered_image(dir.path(), "sample.png");

        let outcome = recognize_one(&FailingEngine, &registry, &out, &path);

        assert!(matches!(outcome, RecognizeOutcome::Failed { .. }));
        assert!(!out.join("sample.png").exists());
        assert!(!out.join("sample.json").exists());

        let registry = registry.lock();
        let entry = registry.get(&path).unwrap();
        assert_eq!(entry.status, EntryStatus::Failed);
        assert!(entry.recognized_lines.is_empty());
        assert!(!entry.last_error.as_deref().unwrap_or_default().is_empty());
    }

    #[test]
    fn test_deleted_file_fails_with_image_load_message() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("output");
        let (registry, path) = registered_image(dir.path(), "sample.png");

        std::fs::remove_file(&path).unwrap();

        let engine = StubEngine::new(&["A"]);
        match recognize_one(&engine, &registry, &out, &path) {
            RecognizeOutcome::Failed { message } => {
                assert!(message.contains("cannot load image"));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        assert_eq!(
            registry.lock().get(&path).unwrap().status,
            EntryStatus::Failed
        );
    }

    #[test]
    fn test_unregistered_path_is_not_registered() {
        let dir = tempdir().unwrap();
        let registry = Mutex::new(PathRegistry::new(64));

        let engine = StubEngine::new(&["A"]);
        let outcome = recognize_one(
            &engine,
            &registry,
            &dir.path().join("output"),
            &dir.path().join("ghost.png"),
        );
        assert!(matches!(outcome, RecognizeOutcome::NotRegistered));
    }

    #[test]
    fn test_parse_failure_after_persist_marks_failed() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("output");
        let (registry, path) = registered_image(dir.path(), "sample.png");

        let outcome = recognize_one(&BadDocumentEngine, &registry, &out, &path);

        // read-back failure counts as overall failure even though the
        // artifact pair was written
        assert!(matches!(outcome, RecognizeOutcome::Failed { .. }));
        assert!(out.join("sample.png").exists());
        assert!(out.join("sample.json").exists());

        let registry = registry.lock();
        let entry = registry.get(&path).unwrap();
        assert_eq!(entry.status, EntryStatus::Failed);
        assert!(entry
            .last_error
            .as_deref()
            .unwrap_or_default()
            .contains("result document"));
    }

    #[test]
    fn test_rerun_overwrites_lines_and_artifacts() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("output");
        let (registry, path) = registered_image(dir.path(), "sample.png");

        recognize_one(&StubEngine::new(&["old line"]), &registry, &out, &path);
        recognize_one(&StubEngine::new(&["new one", "new two"]), &registry, &out, &path);

        let registry_guard = registry.lock();
        let entry = registry_guard.get(&path).unwrap();
        assert_eq!(entry.recognized_lines, vec!["new one", "new two"]);
        drop(registry_guard);

        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join("sample.json")).unwrap())
                .unwrap();
        assert_eq!(
            doc.get("rec_texts").unwrap(),
            &json!(["new one", "new two"])
        );
        // one artifact pair only, never appended versions
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 2);
    }

    #[test]
    fn test_failed_entry_can_be_resubmitted() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("output");
        let (registry, path) = registered_image(dir.path(), "sample.png");

        recognize_one(&FailingEngine, &registry, &out, &path);
        assert_eq!(
            registry.lock().get(&path).unwrap().status,
            EntryStatus::Failed
        );

        let outcome = recognize_one(&StubEngine::new(&["ok"]), &registry, &out, &path);
        assert!(matches!(outcome, RecognizeOutcome::Recognized { .. }));

        let registry = registry.lock();
        let entry = registry.get(&path).unwrap();
        assert_eq!(entry.status, EntryStatus::Recognized);
        assert!(entry.last_error.is_none());
    }

    #[test]
    fn test_persist_extract_roundtrip_arbitrary_lines() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("output");

        let texts = [
            "plain",
            "with\nembedded newline",
            "\u{8fd9}\u{662f}\u{4e2d}\u{6587}",
            "mixed caf\u{e9} \u{2713}",
            "  leading and trailing  ",
        ];
        let source = RgbImage::from_pixel(8, 8, image::Rgb([0, 0, 0]));
        let lines: Vec<TextLine> = texts
            .iter()
            .map(|t| TextLine {
                text: t.to_string(),
                score: 0.5,
                bounds: (0, 0, 2, 2),
            })
            .collect();

        let result = RecognitionResult::from_text_lines(&source, &lines);
        let artifacts = artifact::persist(&result, &out, "roundtrip").unwrap();
        let read = extract::read_recognized_lines(&artifacts.json_path).unwrap();

        assert_eq!(read, texts);
    }
}
