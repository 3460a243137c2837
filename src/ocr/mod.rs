//! Recognition layer
//!
//! Wraps the OCR capability behind a narrow call boundary: one image in,
//! one `RecognitionResult` or typed failure out. The shipped backend is
//! PaddleOCR via ONNX Runtime; tests substitute stub engines.

pub mod models;
pub mod paddle;

pub use models::{ModelHub, ModelKind};
pub use paddle::PaddleEngine;

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use once_cell::sync::OnceCell;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::config::OcrSettings;
use crate::error::Result;

/// Process-wide engine instance; expensive to build, lives for the process
static ENGINE: OnceCell<Arc<dyn RecognitionEngine>> = OnceCell::new();

/// The recognition call boundary
pub trait RecognitionEngine: Send + Sync {
    /// Run recognition on RGB pixel data
    fn recognize(&self, image: &RgbImage) -> Result<RecognitionResult>;
}

/// A single recognized text line with its location in the source image
#[derive(Debug, Clone)]
pub struct TextLine {
    /// Recognized text
    pub text: String,
    /// Recognition confidence (0.0 - 1.0)
    pub score: f32,
    /// Bounding box (x, y, width, height) in source coordinates
    pub bounds: (u32, u32, u32, u32),
}

/// Opaque recognition output
///
/// Exposes exactly what the workflow needs: a renderable annotated image
/// and a serializable structured document. The document always carries a
/// `rec_texts` array; any other fields pass through persistence untouched.
#[derive(Debug, Clone)]
pub struct RecognitionResult {
    annotated: RgbImage,
    document: serde_json::Value,
}

impl RecognitionResult {
    pub fn new(annotated: RgbImage, document: serde_json::Value) -> Self {
        Self {
            annotated,
            document,
        }
    }

    /// Build a result from recognized lines: boxes drawn over the source
    /// image, document carrying `rec_texts` / `rec_scores` / `rec_boxes`.
    pub fn from_text_lines(source: &RgbImage, lines: &[TextLine]) -> Self {
        let mut annotated = source.clone();
        for line in lines {
            let (x, y, w, h) = line.bounds;
            if w == 0 || h == 0 {
                continue;
            }
            draw_hollow_rect_mut(
                &mut annotated,
                Rect::at(x as i32, y as i32).of_size(w, h),
                Rgb([255, 0, 0]),
            );
        }

        let document = json!({
            "input_shape": [source.height(), source.width()],
            "rec_texts": lines.iter().map(|l| l.text.clone()).collect::<Vec<_>>(),
            "rec_scores": lines.iter().map(|l| l.score).collect::<Vec<_>>(),
            "rec_boxes": lines
                .iter()
                .map(|l| [l.bounds.0, l.bounds.1, l.bounds.2, l.bounds.3])
                .collect::<Vec<_>>(),
        });

        Self {
            annotated,
            document,
        }
    }

    /// The annotated image representation
    pub fn annotated_image(&self) -> &RgbImage {
        &self.annotated
    }

    /// The serializable structured document
    pub fn document(&self) -> &serde_json::Value {
        &self.document
    }
}

/// Get the process-wide engine, building the PaddleOCR backend on first
/// call. Concurrent first calls are serialized; later calls are cheap.
pub fn global(settings: &OcrSettings) -> Result<Arc<dyn RecognitionEngine>> {
    ENGINE
        .get_or_try_init(|| -> Result<Arc<dyn RecognitionEngine>> {
            info!("Initializing process-wide recognition engine");
            let engine = PaddleEngine::load(settings)?;
            Ok(Arc::new(engine))
        })
        .map(Arc::clone)
}

/// Install a specific engine as the process-wide instance.
///
/// Returns false if an engine was already installed; the existing instance
/// stays in place.
pub fn install_global(engine: Arc<dyn RecognitionEngine>) -> bool {
    ENGINE.set(engine).is_ok()
}
