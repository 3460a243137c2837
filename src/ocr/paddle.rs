//! PaddleOCR backend over ONNX Runtime
//!
//! DBNet text detection followed by CTC recognition with a character
//! dictionary. Sessions are built once at load time; `recognize` is safe to
//! call from any thread.

use anyhow::{Context, Result as AnyResult};
use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::region_labelling::{connected_components, Connectivity};
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::OcrSettings;
use crate::error::{Error, Result};
use crate::ocr::models::{ModelHub, ModelKind};
use crate::ocr::{RecognitionEngine, RecognitionResult, TextLine};

/// ImageNet normalization used by the detection model
const DET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const DET_STD: [f32; 3] = [0.229, 0.224, 0.225];
/// Detection input dims must land on this grid
const DET_STRIDE: u32 = 32;
/// Fixed input height of the recognition model
const REC_HEIGHT: u32 = 48;
const REC_MIN_WIDTH: u32 = 16;
const REC_MAX_WIDTH: u32 = 512;

/// PaddleOCR engine: detection + recognition ONNX sessions and dictionary
pub struct PaddleEngine {
    det: Mutex<Session>,
    rec: Mutex<Session>,
    dict: Vec<String>,
    settings: OcrSettings,
}

impl PaddleEngine {
    /// Build the engine, fetching models into the cache if needed.
    /// Expensive; callers are expected to do this once per process
    /// (see `ocr::global`).
    pub fn load(settings: &OcrSettings) -> Result<Self> {
        Self::load_inner(settings).map_err(Error::Recognition)
    }

    fn load_inner(settings: &OcrSettings) -> AnyResult<Self> {
        let hub = match &settings.models_dir {
            Some(dir) => ModelHub::with_dir(dir.clone())?,
            None => ModelHub::new()?,
        };

        let det_path = hub.ensure(ModelKind::Detection)?;
        let rec_path = hub.ensure(ModelKind::Recognition)?;
        let dict_path = hub.ensure(ModelKind::Dictionary)?;

        let det = build_session(&det_path, settings.intra_threads)?;
        let rec = build_session(&rec_path, settings.intra_threads)?;
        let dict = load_dictionary(&dict_path)?;

        info!("PaddleOCR engine ready ({} dictionary entries)", dict.len());

        Ok(Self {
            det: Mutex::new(det),
            rec: Mutex::new(rec),
            dict,
            settings: settings.clone(),
        })
    }

    /// Find text boxes in the source image, in top-to-bottom reading order,
    /// in source coordinates.
    fn detect(&self, image: &RgbImage) -> AnyResult<Vec<(u32, u32, u32, u32)>> {
        let (orig_w, orig_h) = image.dimensions();
        if orig_w == 0 || orig_h == 0 {
            return Ok(vec![]);
        }

        // bound the longest side, then snap onto the stride grid
        let scale = (self.settings.max_side as f32 / orig_w.max(orig_h) as f32).min(1.0);
        let target_w = round_to_stride((orig_w as f32 * scale) as u32);
        let target_h = round_to_stride((orig_h as f32 * scale) as u32);
        let resized = imageops::resize(image, target_w, target_h, imageops::FilterType::Triangle);

        let mut input = Array4::<f32>::zeros((1, 3, target_h as usize, target_w as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let v = pixel.0[c] as f32 / 255.0;
                input[[0, c, y as usize, x as usize]] = (v - DET_MEAN[c]) / DET_STD[c];
            }
        }

        let (dims, probs) = run_session(&self.det, input)?;
        anyhow::ensure!(
            dims.len() == 4 && dims[0] == 1,
            "unexpected detection output shape {:?}",
            dims
        );
        let (map_h, map_w) = (dims[2], dims[3]);

        let mut mask = GrayImage::new(map_w as u32, map_h as u32);
        for y in 0..map_h {
            for x in 0..map_w {
                if probs[y * map_w + x] > self.settings.det_threshold {
                    mask.put_pixel(x as u32, y as u32, Luma([255u8]));
                }
            }
        }

        let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

        let mut regions: HashMap<u32, Region> = HashMap::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let id = label.0[0];
            if id == 0 {
                continue;
            }
            let prob = probs[y as usize * map_w + x as usize];
            regions
                .entry(id)
                .and_modify(|r| r.absorb(x, y, prob))
                .or_insert_with(|| Region::seed(x, y, prob));
        }

        let scale_x = orig_w as f32 / map_w as f32;
        let scale_y = orig_h as f32 / map_h as f32;
        let min_size = self.settings.min_box_size;

        let mut boxes = Vec::new();
        for region in regions.values() {
            if region.width() < min_size || region.height() < min_size {
                continue;
            }
            if region.mean_score() < self.settings.box_threshold {
                continue;
            }

            let (bx, by, bw, bh) = expand_box(
                region.min_x,
                region.min_y,
                region.max_x,
                region.max_y,
                self.settings.unclip_ratio,
                map_w as u32,
                map_h as u32,
            );

            let x = ((bx as f32 * scale_x) as u32).min(orig_w - 1);
            let y = ((by as f32 * scale_y) as u32).min(orig_h - 1);
            let w = ((bw as f32 * scale_x).ceil() as u32).clamp(1, orig_w - x);
            let h = ((bh as f32 * scale_y).ceil() as u32).clamp(1, orig_h - y);
            boxes.push((x, y, w, h));
        }

        // top-to-bottom, then left-to-right
        boxes.sort_by_key(|&(x, y, _, _)| (y, x));

        debug!("Detection found {} text boxes", boxes.len());
        Ok(boxes)
    }

    /// Recognize the text inside one detected box
    fn recognize_crop(
        &self,
        image: &RgbImage,
        bounds: (u32, u32, u32, u32),
    ) -> AnyResult<(String, f32)> {
        let (x, y, w, h) = bounds;
        let crop = imageops::crop_imm(image, x, y, w, h).to_image();

        let target_w = ((w as f32 * REC_HEIGHT as f32 / h as f32).round() as u32)
            .clamp(REC_MIN_WIDTH, REC_MAX_WIDTH);
        let resized = imageops::resize(&crop, target_w, REC_HEIGHT, imageops::FilterType::Triangle);

        let mut input = Array4::<f32>::zeros((1, 3, REC_HEIGHT as usize, target_w as usize));
        for (px, py, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, py as usize, px as usize]] =
                    (pixel.0[c] as f32 / 255.0 - 0.5) / 0.5;
            }
        }

        let (dims, logits) = run_session(&self.rec, input)?;
        anyhow::ensure!(
            dims.len() == 3 && dims[0] == 1,
            "unexpected recognition output shape {:?}",
            dims
        );

        Ok(ctc_decode(&logits, dims[1], dims[2], &self.dict))
    }
}

impl RecognitionEngine for PaddleEngine {
    fn recognize(&self, image: &RgbImage) -> Result<RecognitionResult> {
        let start = Instant::now();

        let boxes = self.detect(image).map_err(Error::Recognition)?;

        let mut lines = Vec::with_capacity(boxes.len());
        for bounds in boxes {
            let (text, score) = self
                .recognize_crop(image, bounds)
                .map_err(Error::Recognition)?;
            if text.is_empty() {
                continue;
            }
            lines.push(TextLine {
                text,
                score,
                bounds,
            });
        }

        debug!(
            "Recognition complete in {:?}: {} text lines",
            start.elapsed(),
            lines.len()
        );

        Ok(RecognitionResult::from_text_lines(image, &lines))
    }
}

/// Bounding box accumulator for one connected component of the
/// binarized probability map
struct Region {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    score_sum: f32,
    count: f32,
}

impl Region {
    fn seed(x: u32, y: u32, prob: f32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            score_sum: prob,
            count: 1.0,
        }
    }

    fn absorb(&mut self, x: u32, y: u32, prob: f32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.score_sum += prob;
        self.count += 1.0;
    }

    fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    fn mean_score(&self) -> f32 {
        self.score_sum / self.count
    }
}

fn build_session(model_path: &Path, intra_threads: usize) -> AnyResult<Session> {
    info!("Loading ONNX model from {:?}", model_path);
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .with_intra_threads(intra_threads)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .commit_from_file(model_path)
        .context("failed to load ONNX model")?;
    Ok(session)
}

fn load_dictionary(path: &Path) -> AnyResult<Vec<String>> {
    let content =
        std::fs::read_to_string(path).context("failed to read character dictionary")?;
    let dict: Vec<String> = content.lines().map(|l| l.to_string()).collect();
    anyhow::ensure!(!dict.is_empty(), "character dictionary is empty");
    Ok(dict)
}

/// Run one NCHW float tensor through a session, returning the first
/// output's dims and data
fn run_session(session: &Mutex<Session>, input: Array4<f32>) -> AnyResult<(Vec<usize>, Vec<f32>)> {
    let shape: [usize; 4] = [
        input.shape()[0],
        input.shape()[1],
        input.shape()[2],
        input.shape()[3],
    ];
    let (data, _offset) = input.into_raw_vec_and_offset();
    let value = Value::from_array((shape, data))?;

    let mut session = session.lock();
    let input_name = session.inputs()[0].name().to_string();
    let outputs = session.run(ort::inputs![input_name => value])?;

    let first_key = outputs.keys().next().context("model produced no outputs")?;
    let (out_shape, out_data) = outputs[first_key].try_extract_tensor::<f32>()?;

    let dims: Vec<usize> = out_shape.iter().map(|&d| d as usize).collect();
    Ok((dims, out_data.to_vec()))
}

/// Snap a detection input dimension onto the stride grid, never below one
/// stride
fn round_to_stride(dim: u32) -> u32 {
    dim.max(DET_STRIDE).div_ceil(DET_STRIDE) * DET_STRIDE
}

/// Grow a component's bounding box before recognition, clamped to the map.
/// The pad approximates the polygon unclip used by DBNet postprocessing:
/// area * ratio / perimeter.
fn expand_box(
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    ratio: f32,
    map_w: u32,
    map_h: u32,
) -> (u32, u32, u32, u32) {
    let w = (max_x - min_x + 1) as f32;
    let h = (max_y - min_y + 1) as f32;
    let pad = (w * h * ratio / (2.0 * (w + h))).ceil() as i64;

    let x0 = (min_x as i64 - pad).max(0) as u32;
    let y0 = (min_y as i64 - pad).max(0) as u32;
    let x1 = ((max_x as i64 + pad).max(0) as u32).min(map_w - 1);
    let y1 = ((max_y as i64 + pad).max(0) as u32).min(map_h - 1);

    (x0, y0, x1 - x0 + 1, y1 - y0 + 1)
}

/// Greedy CTC decode: argmax per step, drop blanks (class 0) and repeats,
/// average the kept confidences
fn ctc_decode(logits: &[f32], steps: usize, classes: usize, dict: &[String]) -> (String, f32) {
    let mut text = String::new();
    let mut score_sum = 0.0f32;
    let mut kept = 0usize;
    let mut prev = 0usize;

    for t in 0..steps {
        let row = &logits[t * classes..(t + 1) * classes];
        let mut idx = 0usize;
        let mut max = f32::NEG_INFINITY;
        for (i, &v) in row.iter().enumerate() {
            if v > max {
                max = v;
                idx = i;
            }
        }

        if idx != 0 && idx != prev {
            if let Some(ch) = dict_char(dict, idx, classes) {
                text.push_str(&ch);
                score_sum += max;
                kept += 1;
            }
        }
        prev = idx;
    }

    let score = if kept == 0 { 0.0 } else { score_sum / kept as f32 };
    (text, score)
}

/// Map a CTC class index to its character. Class 0 is the blank; the last
/// class beyond the dictionary is the appended space.
fn dict_char(dict: &[String], idx: usize, classes: usize) -> Option<String> {
    if idx == classes - 1 && idx > dict.len() {
        return Some(" ".to_string());
    }
    dict.get(idx - 1).cloned()
}
