//! Error types shared by the document model, the gallery engine and the
//! pipeline orchestrator.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while building or running a report.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    /// A step read a context field that no earlier step produced.
    #[error("missing prerequisite: context field '{0}' has not been produced")]
    MissingPrerequisite(&'static str),
    /// A placeholder token had zero occurrences. Warn-level only.
    #[error("placeholder '{0}' not found in document")]
    PlaceholderNotFound(String),
    #[error("document service error: {0}")]
    DocumentService(String),
    #[error("failed to fetch image '{url}': {reason}")]
    ImageFetch { url: String, reason: String },
    #[error("PDF export failed: {0}")]
    Export(String),
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("file store error: {0}")]
    FileStore(String),
    #[error("content source error: {0}")]
    ContentSource(String),
    #[error("failed to persist report result: {0}")]
    Persist(String),
    #[error("unknown step '{0}'")]
    UnknownStep(String),
    #[error("step '{step}' timed out after {after:?}")]
    StepTimeout { step: String, after: Duration },
    /// An edit was registered out of strictly descending start-offset order,
    /// or overlapped the previously registered region.
    #[error("edit at offset {start} violates descending order (previous edit started at {previous})")]
    BatchOrder { start: usize, previous: usize },
    #[error("invalid edit: {0}")]
    InvalidEdit(String),
    #[error("{0}")]
    Validation(String),
}

impl PipelineError {
    /// Short machine-readable kind, used in run outcomes.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::MissingPrerequisite(_) => "MissingPrerequisite",
            PipelineError::PlaceholderNotFound(_) => "PlaceholderNotFound",
            PipelineError::DocumentService(_) => "DocumentServiceError",
            PipelineError::ImageFetch { .. } => "ImageFetchError",
            PipelineError::Export(_) => "ExportError",
            PipelineError::Upload(_) => "UploadError",
            PipelineError::FileStore(_) => "FileStoreError",
            PipelineError::ContentSource(_) => "ContentSourceError",
            PipelineError::Persist(_) => "PersistError",
            PipelineError::UnknownStep(_) => "UnknownStep",
            PipelineError::StepTimeout { .. } => "StepTimeout",
            PipelineError::BatchOrder { .. } => "BatchOrder",
            PipelineError::InvalidEdit(_) => "InvalidEdit",
            PipelineError::Validation(_) => "ValidationError",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
