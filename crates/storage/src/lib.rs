//! Project and configuration persistence
//!
//! [`ProjectStore`] reads and atomically writes project containers and flat
//! text sheets. [`ConfigStore`] keeps the engine configuration in the
//! platform data directory.

mod config;
mod disk;
mod project;

pub use config::ConfigStore;
pub use disk::{Disk, OsDisk};
pub use project::{NewPage, ProjectStore};

use doc_model::ModelError;
use scanlate_core::{DecodeError, EncodeError, ExportError, SessionError};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("failed to read {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: std::io::Error },
    #[error("failed to save {}: {source}", path.display())]
    SaveFailed { path: PathBuf, source: std::io::Error },
    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("invalid project container: {0}")]
    Decode(#[from] DecodeError),
    #[error("cannot encode project: {0}")]
    Encode(#[from] EncodeError),
    #[error("cannot export text: {0}")]
    Export(#[from] ExportError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

pub type StorageResult<T> = Result<T, StorageError>;
