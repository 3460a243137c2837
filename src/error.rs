//! Failure taxonomy for the recognition core
//!
//! Every failure is recoverable per-entry: the workflow converts these into
//! a `Failed` entry status instead of letting them escape to the host.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by registry, recognition, and artifact operations
#[derive(Debug, Error)]
pub enum Error {
    /// The file is missing, unreadable, or not a decodable image
    #[error("cannot load image {}: {source}", path.display())]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The recognition engine failed on valid pixel data
    #[error("recognition failed: {0}")]
    Recognition(#[source] anyhow::Error),

    /// The output directory or an artifact file could not be written
    #[error("cannot write artifact {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persisted result document is missing or malformed
    #[error("malformed result document {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    pub(crate) fn image_load(path: &std::path::Path, source: image::ImageError) -> Self {
        Self::ImageLoad {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn parse(path: &std::path::Path, source: impl Into<anyhow::Error>) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            source: source.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
