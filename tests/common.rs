//! Shared fixtures and collaborator doubles for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use report_forge::document::{DocumentTree, EditOp, TemplateBlock};
use report_forge::pipeline::{LogEntry, RunOutcome};
use report_forge::services::{
    ContentSource, DocumentService, Exporter, FetchedImage, ImageFetcher, MemoryContentSource,
    MemoryDrive, ReportInputs, ReportLinks, SerializedDocumentService, StaticImageFetcher,
};
use report_forge::{ForgeConfig, Orchestrator, Services};

pub const REPORT_ID: &str = "vase-1";

/// Three `{{title}}` tokens (one inside a table cell), two composite
/// sections, a scalar field and a gallery.
pub fn vase_template() -> Vec<TemplateBlock> {
    vec![
        TemplateBlock::text("{{title}}"),
        TemplateBlock::text("Catalogued {{date}}"),
        TemplateBlock::table(vec![
            vec![
                vec![TemplateBlock::text("Object")],
                vec![TemplateBlock::text("{{title}}")],
            ],
            vec![
                vec![TemplateBlock::text("Material")],
                vec![TemplateBlock::text("{{material}}")],
            ],
        ]),
        TemplateBlock::text("Summary of {{title}}"),
        TemplateBlock::text("{{dimensions}}"),
        TemplateBlock::text("{{marks}}"),
        TemplateBlock::text("Photographs"),
        TemplateBlock::text("{{gallery}}"),
        TemplateBlock::text("End of report"),
    ]
}

pub fn gallery_urls(count: usize) -> Vec<String> {
    (1..=count)
        .map(|i| format!("https://cdn.test/vase/{i}.jpg"))
        .collect()
}

pub fn vase_inputs(gallery: usize) -> ReportInputs {
    let mut inputs = ReportInputs {
        title: "Vase".to_string(),
        date: "2026-10-19".to_string(),
        gallery_urls: gallery_urls(gallery),
        ..ReportInputs::default()
    };
    inputs
        .fields
        .insert("material".to_string(), json!("Porcelain"));
    inputs
        .fields
        .insert("dimensions".to_string(), json!({"heightCm": 32, "widthCm": 18}));
    inputs
        .fields
        .insert("marks".to_string(), json!(["Six-character mark", "Glaze chip"]));
    inputs
}

pub fn static_images(urls: &[String]) -> StaticImageFetcher {
    let mut fetcher = StaticImageFetcher::new();
    for url in urls {
        fetcher.insert(url.clone(), 640, 480);
    }
    fetcher
}

pub struct Harness {
    pub drive: Arc<MemoryDrive>,
    pub content: Arc<MemoryContentSource>,
    pub images: Arc<dyn ImageFetcher>,
    pub config: ForgeConfig,
}

impl Harness {
    /// Vase template and inputs with `gallery` resolvable gallery images.
    pub fn new(gallery: usize) -> Self {
        let config = ForgeConfig::default();
        let drive = Arc::new(MemoryDrive::new());
        drive.add_template(&config.template_id, &vase_template());
        let content = Arc::new(MemoryContentSource::new());
        let inputs = vase_inputs(gallery);
        let images = Arc::new(static_images(&inputs.gallery_urls));
        content.insert(REPORT_ID, inputs);
        Self {
            drive,
            content,
            images,
            config,
        }
    }

    pub fn services(&self) -> Services {
        Services::in_memory(self.drive.clone(), self.content.clone(), self.images.clone())
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.services(), self.config.clone())
    }

    pub async fn snapshot(&self, document_id: &str) -> DocumentTree {
        self.drive.get_snapshot(document_id).await.unwrap()
    }
}

/// Image count of every paragraph that holds images, in document order.
pub fn image_rows(snapshot: &DocumentTree) -> Vec<usize> {
    snapshot
        .paragraphs()
        .iter()
        .map(|p| p.image_count())
        .filter(|count| *count > 0)
        .collect()
}

pub fn step_entries(outcome: &RunOutcome) -> Vec<&LogEntry> {
    outcome.logs.iter().filter(|e| e.step.is_some()).collect()
}

pub fn step_names(outcome: &RunOutcome) -> Vec<String> {
    step_entries(outcome)
        .into_iter()
        .filter_map(|e| e.step.clone())
        .collect()
}

// ============================================================================
// Collaborator doubles
// ============================================================================

/// Document service that rejects every batch inserting an image.
pub struct NoImagesDocumentService {
    pub inner: Arc<MemoryDrive>,
}

#[async_trait]
impl DocumentService for NoImagesDocumentService {
    async fn get_snapshot(&self, document_id: &str) -> Result<DocumentTree, String> {
        self.inner.get_snapshot(document_id).await
    }

    async fn apply_batch(&self, document_id: &str, ops: &[EditOp]) -> Result<(), String> {
        if ops.iter().any(|op| matches!(op, EditOp::InsertImage { .. })) {
            return Err("image insertion quota exceeded".to_string());
        }
        self.inner.apply_batch(document_id, ops).await
    }
}

/// Exporter whose PDF conversion always fails.
pub struct BrokenExporter;

#[async_trait]
impl Exporter for BrokenExporter {
    async fn export_as_pdf(&self, _document_id: &str) -> Result<Vec<u8>, String> {
        Err("converter unavailable".to_string())
    }

    async fn upload(&self, _bytes: &[u8], _filename: &str, _folder_id: &str) -> Result<String, String> {
        Err("not reachable".to_string())
    }
}

/// Image fetcher that answers after `delay`.
pub struct SlowImageFetcher {
    pub delay: Duration,
}

#[async_trait]
impl ImageFetcher for SlowImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, String> {
        tokio::time::sleep(self.delay).await;
        Ok(FetchedImage {
            uri: url.to_string(),
            width: 640,
            height: 480,
            mime_type: "image/jpeg".to_string(),
        })
    }
}

/// Content source that records how many fetches overlap.
pub struct TrackingContentSource {
    pub inner: Arc<MemoryContentSource>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl TrackingContentSource {
    pub fn new(inner: Arc<MemoryContentSource>) -> Self {
        Self {
            inner,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ContentSource for TrackingContentSource {
    async fn fetch_report_inputs(&self, report_id: &str) -> Result<ReportInputs, String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(25)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.inner.fetch_report_inputs(report_id).await
    }

    async fn persist_result(&self, report_id: &str, links: &ReportLinks) -> Result<(), String> {
        self.inner.persist_result(report_id, links).await
    }
}

/// Services over `harness` with individual collaborators swapped out.
pub fn services_with(
    harness: &Harness,
    documents: Option<Arc<dyn DocumentService>>,
    exporter: Option<Arc<dyn Exporter>>,
    images: Option<Arc<dyn ImageFetcher>>,
) -> Services {
    let documents = documents.unwrap_or_else(|| harness.drive.clone() as Arc<dyn DocumentService>);
    Services {
        documents: Arc::new(SerializedDocumentService::new(documents)),
        files: harness.drive.clone(),
        content: harness.content.clone(),
        exporter: exporter.unwrap_or_else(|| harness.drive.clone() as Arc<dyn Exporter>),
        images: images.unwrap_or_else(|| harness.images.clone()),
    }
}
