//! Background recognition worker
//!
//! One thread drains a request queue so the hosting UI never blocks on the
//! engine; requests are serialized by construction, which also means two
//! requests for the same path can never run at once. Outcomes come back as
//! events on a channel.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::debug;

use crate::ocr::RecognitionEngine;
use crate::registry::PathRegistry;
use crate::workflow::{recognize_one, RecognizeOutcome};

/// Progress and completion notifications for the hosting UI
#[derive(Debug, Clone)]
pub enum RecognitionEvent {
    /// A recognition pass started for this path
    Started { path: PathBuf },
    /// Recognition finished; the lines are also recorded on the entry
    Recognized { path: PathBuf, lines: Vec<String> },
    /// Recognition failed; the message is also recorded on the entry
    Failed { path: PathBuf, message: String },
}

/// Handle to the worker thread; dropping it drains the queue and joins
pub struct RecognitionWorker {
    requests: Option<Sender<PathBuf>>,
    events: Receiver<RecognitionEvent>,
    handle: Option<JoinHandle<()>>,
}

impl RecognitionWorker {
    /// Spawn the worker thread over a shared registry
    pub fn spawn(
        engine: Arc<dyn RecognitionEngine>,
        registry: Arc<Mutex<PathRegistry>>,
        output_root: PathBuf,
    ) -> Self {
        let (request_tx, request_rx) = unbounded::<PathBuf>();
        let (event_tx, event_rx) = unbounded();

        let handle = std::thread::spawn(move || {
            debug!("Recognition worker started");
            for path in request_rx.iter() {
                let _ = event_tx.send(RecognitionEvent::Started { path: path.clone() });

                let event = match recognize_one(engine.as_ref(), &registry, &output_root, &path)
                {
                    RecognizeOutcome::Recognized { lines, .. } => {
                        RecognitionEvent::Recognized { path, lines }
                    }
                    RecognizeOutcome::Failed { message } => {
                        RecognitionEvent::Failed { path, message }
                    }
                    RecognizeOutcome::NotRegistered => RecognitionEvent::Failed {
                        path,
                        message: "path is not registered".to_string(),
                    },
                };
                let _ = event_tx.send(event);
            }
            debug!("Recognition worker stopped");
        });

        Self {
            requests: Some(request_tx),
            events: event_rx,
            handle: Some(handle),
        }
    }

    /// Queue a recognition pass; false once the worker has shut down
    pub fn submit(&self, path: PathBuf) -> bool {
        self.requests
            .as_ref()
            .map(|tx| tx.send(path).is_ok())
            .unwrap_or(false)
    }

    /// Event stream for the hosting UI to drain
    pub fn events(&self) -> &Receiver<RecognitionEvent> {
        &self.events
    }
}

impl Drop for RecognitionWorker {
    fn drop(&mut self) {
        // closing the request channel lets the thread drain and exit
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
