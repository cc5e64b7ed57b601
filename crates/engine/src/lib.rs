pub mod segments;
pub mod session;
pub mod sync;
pub mod tree;

use std::path::PathBuf;

use catalog::{CatalogError, FormatError};
use project_settings::SettingsError;
use weblate::WeblateError;

pub use segments::{ImageStatus, SegmentManager};
pub use session::{ProjectSession, SegmentView};
pub use sync::{
    run_sync, CancellationFlag, RemoteService, SyncEvent, SyncHandle, SyncPlan, SyncReport,
    SyncTask,
};
pub use tree::{build_tree, ImageLeaf, ProjectTree, TranslationUnit};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Missing folders, unreadable project file, invalid patterns.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("malformed catalog {}: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    #[error("cannot find catalog for image: {image}")]
    NotFound { image: String },

    #[error("upload error: {0}")]
    Upload(#[from] WeblateError),

    #[error("catalog storage error: {0}")]
    Storage(CatalogError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("a screenshot sync is still running")]
    SyncInProgress,

    #[error("sync cancelled")]
    Cancelled,

    #[error("no project is open")]
    NoProject,
}

impl From<CatalogError> for EngineError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Format { path, source } => Self::Format { path, source },
            other => Self::Storage(other),
        }
    }
}

impl From<SettingsError> for EngineError {
    fn from(err: SettingsError) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
