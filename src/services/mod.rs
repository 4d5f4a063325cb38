//! External collaborators of the pipeline.
//!
//! Each collaborator is a trait injected into the orchestrator. Calls
//! return `Result<_, String>`; the pipeline maps failures onto its own error
//! kinds. Implementations:
//! - `memory` - in-process document store, file store, exporter, content
//!   source and image table
//! - `http` - image fetching over HTTP(S) and `data:` URIs
//! - `serialized` - per-document serialization wrapper for a shared
//!   document service

pub mod http;
pub mod memory;
pub mod models;
pub mod serialized;

use std::sync::Arc;

use async_trait::async_trait;

use crate::document::{DocumentTree, EditOp};

pub use http::HttpImageFetcher;
pub use memory::{MemoryContentSource, MemoryDrive, StaticImageFetcher};
pub use models::{FetchedImage, ReportInputs, ReportLinks, StoredFile};
pub use serialized::SerializedDocumentService;

#[async_trait]
pub trait DocumentService: Send + Sync {
    async fn get_snapshot(&self, document_id: &str) -> Result<DocumentTree, String>;
    /// Apply `ops` in array order as one all-or-nothing unit.
    async fn apply_batch(&self, document_id: &str, ops: &[EditOp]) -> Result<(), String>;
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn copy_template(&self, template_id: &str) -> Result<StoredFile, String>;
    async fn move_to(&self, file_id: &str, folder_id: &str) -> Result<(), String>;
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_report_inputs(&self, report_id: &str) -> Result<ReportInputs, String>;
    /// Record the final artifact links against the report.
    async fn persist_result(&self, report_id: &str, links: &ReportLinks) -> Result<(), String>;
}

#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export_as_pdf(&self, document_id: &str) -> Result<Vec<u8>, String>;
    async fn upload(&self, bytes: &[u8], filename: &str, folder_id: &str)
        -> Result<String, String>;
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, String>;
}

/// Collaborator handles shared by every run of one orchestrator.
#[derive(Clone)]
pub struct Services {
    pub documents: Arc<dyn DocumentService>,
    pub files: Arc<dyn FileStore>,
    pub content: Arc<dyn ContentSource>,
    pub exporter: Arc<dyn Exporter>,
    pub images: Arc<dyn ImageFetcher>,
}

impl Services {
    /// Wire every collaborator to in-memory implementations sharing one
    /// drive.
    pub fn in_memory(
        drive: Arc<MemoryDrive>,
        content: Arc<MemoryContentSource>,
        images: Arc<dyn ImageFetcher>,
    ) -> Self {
        Self {
            documents: Arc::new(SerializedDocumentService::new(drive.clone())),
            files: drive.clone(),
            content,
            exporter: drive,
            images,
        }
    }
}
