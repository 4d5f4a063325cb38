//! In-process collaborators.
//!
//! `MemoryDrive` plays document service, file store and exporter over one
//! shared set of documents, so a copied template is immediately editable
//! and exportable. Ids and links are sequential and deterministic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::models::{FetchedImage, ReportInputs, ReportLinks, StoredFile};
use super::{ContentSource, DocumentService, Exporter, FileStore, ImageFetcher};
use crate::document::{Document, DocumentTree, EditOp, TemplateBlock};

const PDF_HEADER: &[u8] = b"%PDF-1.4\n% report-forge text export\n";

#[derive(Debug, Default)]
pub struct MemoryDrive {
    templates: RwLock<HashMap<String, Document>>,
    documents: RwLock<HashMap<String, Document>>,
    folders: RwLock<HashMap<String, String>>,
    uploads: RwLock<HashMap<String, Vec<u8>>>,
    next_id: AtomicUsize,
    batches_applied: AtomicUsize,
}

impl MemoryDrive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_template(&self, template_id: &str, blocks: &[TemplateBlock]) {
        self.templates.write().insert(
            template_id.to_string(),
            Document::from_blocks(template_id, blocks),
        );
    }

    pub fn document(&self, document_id: &str) -> Option<Document> {
        self.documents.read().get(document_id).cloned()
    }

    pub fn folder_of(&self, file_id: &str) -> Option<String> {
        self.folders.read().get(file_id).cloned()
    }

    pub fn uploaded(&self, link: &str) -> Option<Vec<u8>> {
        self.uploads.read().get(link).cloned()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.read().len()
    }

    /// Number of batches successfully applied across all documents.
    pub fn batches_applied(&self) -> usize {
        self.batches_applied.load(Ordering::SeqCst)
    }

    fn document_link(document_id: &str) -> String {
        format!("memory://documents/{}", document_id)
    }
}

#[async_trait]
impl DocumentService for MemoryDrive {
    async fn get_snapshot(&self, document_id: &str) -> Result<DocumentTree, String> {
        self.documents
            .read()
            .get(document_id)
            .map(Document::snapshot)
            .ok_or_else(|| format!("document '{}' not found", document_id))
    }

    async fn apply_batch(&self, document_id: &str, ops: &[EditOp]) -> Result<(), String> {
        let mut documents = self.documents.write();
        let document = documents
            .get_mut(document_id)
            .ok_or_else(|| format!("document '{}' not found", document_id))?;
        document.apply_batch(ops).map_err(|e| e.to_string())?;
        self.batches_applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl FileStore for MemoryDrive {
    async fn copy_template(&self, template_id: &str) -> Result<StoredFile, String> {
        let template = self
            .templates
            .read()
            .get(template_id)
            .cloned()
            .ok_or_else(|| format!("template '{}' not found", template_id))?;
        let id = format!("doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.documents
            .write()
            .insert(id.clone(), template.duplicate(id.clone()));
        log::debug!("copied template {} to {}", template_id, id);
        Ok(StoredFile {
            link: Self::document_link(&id),
            id,
        })
    }

    async fn move_to(&self, file_id: &str, folder_id: &str) -> Result<(), String> {
        if !self.documents.read().contains_key(file_id) {
            return Err(format!("file '{}' not found", file_id));
        }
        self.folders
            .write()
            .insert(file_id.to_string(), folder_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl Exporter for MemoryDrive {
    /// Text stand-in for a rendered PDF: a PDF header followed by the
    /// document's plain text.
    async fn export_as_pdf(&self, document_id: &str) -> Result<Vec<u8>, String> {
        let snapshot = self.get_snapshot(document_id).await?;
        let mut bytes = PDF_HEADER.to_vec();
        bytes.extend_from_slice(snapshot.plain_text().as_bytes());
        Ok(bytes)
    }

    async fn upload(&self, bytes: &[u8], filename: &str, folder_id: &str) -> Result<String, String> {
        let safe_name = sanitize_filename::sanitize(filename);
        if safe_name.is_empty() {
            return Err(format!("invalid filename '{}'", filename));
        }
        let link = format!("memory://folders/{}/{}", folder_id, safe_name);
        self.uploads.write().insert(link.clone(), bytes.to_vec());
        Ok(link)
    }
}

/// Report inputs held in memory, plus the results persisted against them.
#[derive(Debug, Default)]
pub struct MemoryContentSource {
    inputs: RwLock<HashMap<String, ReportInputs>>,
    persisted: RwLock<HashMap<String, ReportLinks>>,
}

impl MemoryContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, report_id: &str, inputs: ReportInputs) {
        self.inputs.write().insert(report_id.to_string(), inputs);
    }

    pub fn persisted(&self, report_id: &str) -> Option<ReportLinks> {
        self.persisted.read().get(report_id).cloned()
    }
}

#[async_trait]
impl ContentSource for MemoryContentSource {
    async fn fetch_report_inputs(&self, report_id: &str) -> Result<ReportInputs, String> {
        self.inputs
            .read()
            .get(report_id)
            .cloned()
            .ok_or_else(|| format!("report '{}' not found", report_id))
    }

    async fn persist_result(&self, report_id: &str, links: &ReportLinks) -> Result<(), String> {
        self.persisted
            .write()
            .insert(report_id.to_string(), links.clone());
        Ok(())
    }
}

/// Image fetcher backed by a fixed table of known image dimensions.
#[derive(Debug, Default, Clone)]
pub struct StaticImageFetcher {
    images: HashMap<String, (u32, u32)>,
}

impl StaticImageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, url: impl Into<String>, width: u32, height: u32) -> Self {
        self.images.insert(url.into(), (width, height));
        self
    }

    pub fn insert(&mut self, url: impl Into<String>, width: u32, height: u32) {
        self.images.insert(url.into(), (width, height));
    }
}

#[async_trait]
impl ImageFetcher for StaticImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, String> {
        let (width, height) = self
            .images
            .get(url)
            .copied()
            .ok_or_else(|| format!("no image at '{}'", url))?;
        if width == 0 || height == 0 {
            return Err(format!("image at '{}' has zero size", url));
        }
        let mime_type = mime_guess::from_path(url)
            .first()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_else(|| "image/png".to_string());
        Ok(FetchedImage {
            uri: url.to_string(),
            width,
            height,
            mime_type,
        })
    }
}
