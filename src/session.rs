//! UI-facing session
//!
//! The surface a presentation layer binds to: register dropped files, queue
//! recognition passes, drain completion events, and snapshot entries for
//! listing. The session owns the registry and the background worker; the
//! host owns windows and widgets.

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use crate::config::AppConfig;
use crate::error::Result;
use crate::ocr::RecognitionEngine;
use crate::registry::{ImageEntry, PathRegistry};
use crate::workflow::{RecognitionEvent, RecognitionWorker};

pub struct RecognitionSession {
    registry: Arc<Mutex<PathRegistry>>,
    worker: RecognitionWorker,
}

impl RecognitionSession {
    /// Build a session over a recognition engine. The engine is usually the
    /// process-wide instance from [`crate::ocr::global`].
    pub fn new(config: &AppConfig, engine: Arc<dyn RecognitionEngine>) -> Self {
        let registry = Arc::new(Mutex::new(PathRegistry::new(config.thumbnail.max_dim)));
        let worker =
            RecognitionWorker::spawn(engine, Arc::clone(&registry), config.output.root.clone());

        Self { registry, worker }
    }

    /// Register a dropped file; `Ok(true)` when a new entry appeared.
    /// Duplicate paths and non-image extensions are dropped silently.
    pub fn add_file(&self, path: &Path) -> Result<bool> {
        self.registry.lock().add(path)
    }

    /// Remove a file from the registry; true when an entry was removed
    pub fn remove_file(&self, path: &Path) -> bool {
        self.registry.lock().remove(path).is_some()
    }

    /// Remove every entry
    pub fn clear_all(&self) {
        self.registry.lock().clear();
    }

    /// Queue a recognition pass for a registered path. Returns false for an
    /// unknown path; a request for an entry already recognizing is queued
    /// behind it, never run in parallel.
    pub fn recognize(&self, path: &Path) -> bool {
        if !self.registry.lock().contains(path) {
            warn!("recognize() called for unregistered path {:?}", path);
            return false;
        }
        self.worker.submit(path.to_path_buf())
    }

    /// Completion events for the hosting UI to drain
    pub fn events(&self) -> &Receiver<RecognitionEvent> {
        self.worker.events()
    }

    /// Point-in-time copy of the entries, in insertion order
    pub fn snapshot(&self) -> Vec<ImageEntry> {
        self.registry.lock().list().to_vec()
    }

    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }
}
