use std::sync::Arc;

use serde_json::json;

use super::*;
use crate::config::ForgeConfig;
use crate::document::{find_tokens, TemplateBlock};
use crate::error::PipelineError;
use crate::services::{
    DocumentService, FileStore, MemoryContentSource, MemoryDrive, ReportInputs, Services,
    StaticImageFetcher,
};

struct Fixture {
    drive: Arc<MemoryDrive>,
    content: Arc<MemoryContentSource>,
    orchestrator: Orchestrator,
}

fn fixture(blocks: &[TemplateBlock], inputs: ReportInputs, images: StaticImageFetcher) -> Fixture {
    let config = ForgeConfig::default();
    let drive = Arc::new(MemoryDrive::new());
    drive.add_template(&config.template_id, blocks);
    let content = Arc::new(MemoryContentSource::new());
    content.insert("report-1", inputs);
    let services = Services::in_memory(drive.clone(), content.clone(), Arc::new(images));
    Fixture {
        drive,
        content,
        orchestrator: Orchestrator::new(services, config),
    }
}

fn stop_after(step: &str) -> RunOptions {
    RunOptions {
        stop_after: Some(step.to_string()),
        ..RunOptions::default()
    }
}

fn step_entries<'a>(outcome: &'a RunOutcome, step: &str) -> Vec<&'a LogEntry> {
    outcome
        .logs
        .iter()
        .filter(|entry| entry.step.as_deref() == Some(step))
        .collect()
}

#[test]
fn test_step_table_order_and_criticality() {
    let names: Vec<&str> = Orchestrator::list_steps().iter().map(|s| s.name).collect();
    assert_eq!(
        names,
        vec![
            "fetch_inputs",
            "clone_template",
            "move_to_folder",
            "replace_sections",
            "replace_fields",
            "adjust_title_size",
            "insert_images",
            "insert_gallery",
            "export_pdf",
            "upload_pdf",
            "persist_links",
        ]
    );
    let non_critical: Vec<&str> = STEPS
        .iter()
        .filter(|s| !s.is_critical())
        .map(|s| s.name)
        .collect();
    assert_eq!(
        non_critical,
        vec!["adjust_title_size", "insert_images", "insert_gallery"]
    );
    assert_eq!(step_index("replace_fields"), Some(4));
    assert_eq!(step_index("Replace_Fields"), None);
}

#[test]
fn test_fold_applies_criticality() {
    let err = PipelineError::Export("disk full".to_string());
    assert_eq!(
        StepOutcome::fold(Criticality::Critical, Err(err.clone())),
        StepOutcome::Abort(err.clone())
    );
    assert!(matches!(
        StepOutcome::fold(Criticality::NonCritical, Err(err)),
        StepOutcome::Warn(message) if message.starts_with("ExportError")
    ));
    assert_eq!(
        StepOutcome::fold(Criticality::Critical, Ok(StepReport::Warning("w".to_string()))),
        StepOutcome::Warn("w".to_string())
    );
    assert_eq!(
        StepOutcome::fold(Criticality::Critical, Ok(StepReport::Skipped("none".to_string()))),
        StepOutcome::Continue("skipped: none".to_string())
    );
}

#[test]
fn test_title_font_size_thresholds() {
    assert_eq!(title_font_size(4), 28.0);
    assert_eq!(title_font_size(30), 28.0);
    assert_eq!(title_font_size(31), 22.0);
    assert_eq!(title_font_size(60), 22.0);
    assert_eq!(title_font_size(61), 18.0);
}

#[test]
fn test_context_reports_missing_prerequisites() {
    let mut ctx = PipelineContext::new();
    assert_eq!(
        ctx.document_id(),
        Err(PipelineError::MissingPrerequisite("document_id"))
    );
    assert_eq!(ctx.pdf_bytes(), Err(PipelineError::MissingPrerequisite("pdf_bytes")));
    assert_eq!(ctx.links(), Default::default());

    ctx.set_document("doc-1".to_string(), "memory://documents/doc-1".to_string());
    assert_eq!(ctx.document_id(), Ok("doc-1"));
    assert_eq!(ctx.links().document_id.as_deref(), Some("doc-1"));
}

#[test]
fn test_context_serializes_pdf_as_base64() {
    let mut ctx = PipelineContext::new();
    ctx.set_pdf(b"%PDF".to_vec(), "report.pdf".to_string());
    let value = serde_json::to_value(&ctx).unwrap();
    assert_eq!(value["pdfBytes"], json!("JVBERg=="));
    assert!(value.get("documentId").is_none());

    let restored: PipelineContext = serde_json::from_value(value).unwrap();
    assert_eq!(restored.pdf_bytes(), Ok(&b"%PDF"[..]));
}

#[test]
fn test_run_log_tags_entries() {
    let mut log = RunLog::new("session-1");
    log.info("started");
    log.step("export_pdf", LogLevel::Warn, "slow");
    let entries = log.into_entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].step, None);
    assert_eq!(entries[1].step.as_deref(), Some("export_pdf"));
    assert_eq!(entries[1].level, LogLevel::Warn);
    assert!(entries[0].timestamp <= entries[1].timestamp);
}

#[tokio::test]
async fn test_sections_then_fields() {
    let mut inputs = ReportInputs {
        title: "Ming Vase".to_string(),
        date: "2026-10-19".to_string(),
        ..ReportInputs::default()
    };
    inputs.fields.insert(
        "details".to_string(),
        json!({"object_type": "Vase", "heightCm": 32}),
    );
    inputs.fields.insert("marks".to_string(), json!("A  B"));
    inputs.fields.insert("signed".to_string(), json!(true));
    let fx = fixture(
        &[
            TemplateBlock::text("{{title}}"),
            TemplateBlock::text("Details:"),
            TemplateBlock::text("{{details}}"),
            TemplateBlock::text("Marks {{marks}} signed {{signed}}"),
            TemplateBlock::text("{{date}}"),
        ],
        inputs,
        StaticImageFetcher::new(),
    );

    let outcome = fx
        .orchestrator
        .run(RunRequest::new("report-1").with_options(stop_after("replace_fields")))
        .await;
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.completed_steps.len(), 5);
    assert_eq!(outcome.context.sections_replaced(), Ok(1));
    assert_eq!(outcome.context.fields_replaced(), Ok(4));

    let document_id = outcome.context.document_id().unwrap();
    let snapshot = fx.drive.get_snapshot(document_id).await.unwrap();
    assert_eq!(
        snapshot.plain_text(),
        "Ming Vase\nDetails:\nHeight cm: 32\nObject type: Vase\nMarks A B signed Yes\n19 October 2026\n"
    );
    assert!(find_tokens(&snapshot).is_empty());
    assert_eq!(fx.drive.folder_of(document_id).as_deref(), Some("reports"));
}

#[tokio::test]
async fn test_failed_named_image_removes_its_token() {
    let mut inputs = ReportInputs {
        title: "Vase".to_string(),
        ..ReportInputs::default()
    };
    inputs
        .images
        .insert("hero".to_string(), "https://cdn.test/hero.jpg".to_string());
    inputs
        .images
        .insert("logo".to_string(), "https://cdn.test/missing.png".to_string());
    let fx = fixture(
        &[
            TemplateBlock::text("{{hero}}"),
            TemplateBlock::text("{{title}} {{logo}}"),
        ],
        inputs,
        StaticImageFetcher::new().with_image("https://cdn.test/hero.jpg", 800, 600),
    );

    let outcome = fx
        .orchestrator
        .run(RunRequest::new("report-1").with_options(stop_after("insert_images")))
        .await;
    assert!(outcome.success);
    assert_eq!(outcome.context.images_inserted(), Ok(1));
    let entries = step_entries(&outcome, "insert_images");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].level, LogLevel::Warn);
    assert!(entries[0].message.contains("logo"));

    let snapshot = fx
        .drive
        .get_snapshot(outcome.context.document_id().unwrap())
        .await
        .unwrap();
    let images = snapshot.images();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].uri, "https://cdn.test/hero.jpg");
    assert_eq!(images[0].width, 400.0);
    assert_eq!(images[0].height, 300.0);
    assert_eq!(snapshot.plain_text(), "\u{FFFC}\nVase \n");
}

#[tokio::test]
async fn test_gallery_without_valid_images_only_removes_placeholder() {
    let inputs = ReportInputs {
        title: "Vase".to_string(),
        gallery_urls: vec!["https://cdn.test/broken.jpg".to_string()],
        ..ReportInputs::default()
    };
    let fx = fixture(
        &[TemplateBlock::text("Photos: {{gallery}}")],
        inputs,
        StaticImageFetcher::new(),
    );

    let outcome = fx
        .orchestrator
        .run(RunRequest::new("report-1").with_options(stop_after("insert_gallery")))
        .await;
    assert!(outcome.success);
    assert_eq!(outcome.context.gallery_inserted(), Ok(0));
    assert_eq!(step_entries(&outcome, "insert_gallery")[0].level, LogLevel::Warn);

    let snapshot = fx
        .drive
        .get_snapshot(outcome.context.document_id().unwrap())
        .await
        .unwrap();
    assert_eq!(snapshot.plain_text(), "Photos: \n");
    assert_eq!(snapshot.count_images(), 0);
}

#[tokio::test]
async fn test_title_is_sized_and_bold() {
    let inputs = ReportInputs {
        title: "Vase".to_string(),
        ..ReportInputs::default()
    };
    let fx = fixture(
        &[TemplateBlock::text("Report: {{title}}")],
        inputs,
        StaticImageFetcher::new(),
    );

    let outcome = fx
        .orchestrator
        .run(RunRequest::new("report-1").with_options(stop_after("adjust_title_size")))
        .await;
    assert!(outcome.success);

    let snapshot = fx
        .drive
        .get_snapshot(outcome.context.document_id().unwrap())
        .await
        .unwrap();
    let paragraph = snapshot.paragraphs()[0];
    let styled: Vec<_> = paragraph
        .elements
        .iter()
        .filter_map(|element| match element {
            crate::document::ParagraphElement::TextRun(run) if run.style.font_size.is_some() => {
                Some((run.content.clone(), run.style.font_size, run.style.bold))
            }
            _ => None,
        })
        .collect();
    assert_eq!(styled, vec![("Vase".to_string(), Some(28.0), Some(true))]);
}

#[tokio::test]
async fn test_title_restyle_ignores_earlier_matches_in_body() {
    let inputs = ReportInputs {
        title: "Vase".to_string(),
        date: "2026-10-19".to_string(),
        ..ReportInputs::default()
    };
    let fx = fixture(
        &[
            TemplateBlock::text("Vase catalogue {{date}}"),
            TemplateBlock::text("{{title}}"),
        ],
        inputs,
        StaticImageFetcher::new(),
    );

    let outcome = fx
        .orchestrator
        .run(RunRequest::new("report-1").with_options(stop_after("adjust_title_size")))
        .await;
    assert!(outcome.success);
    assert_eq!(step_entries(&outcome, "adjust_title_size")[0].level, LogLevel::Info);
    let range = outcome.context.title_range().unwrap();
    assert_eq!(range.start_offset, "Vase catalogue 19 October 2026\n".len());

    let snapshot = fx
        .drive
        .get_snapshot(outcome.context.document_id().unwrap())
        .await
        .unwrap();
    let sized: Vec<(usize, String)> = snapshot
        .paragraphs()
        .iter()
        .enumerate()
        .flat_map(|(index, paragraph)| {
            paragraph.elements.iter().filter_map(move |element| match element {
                crate::document::ParagraphElement::TextRun(run) if run.style.font_size.is_some() => {
                    Some((index, run.content.clone()))
                }
                _ => None,
            })
        })
        .collect();
    assert_eq!(sized, vec![(1, "Vase".to_string())]);
}

#[tokio::test]
async fn test_critical_failure_writes_annotation() {
    let fx = fixture(
        &[TemplateBlock::text("Body")],
        ReportInputs::default(),
        StaticImageFetcher::new(),
    );
    let file = fx.drive.copy_template("template").await.unwrap();
    let mut ctx = PipelineContext::new();
    ctx.set_document(file.id.clone(), file.link.clone());

    let outcome = fx
        .orchestrator
        .run(RunRequest::new("report-1").resume_at("replace_fields", ctx))
        .await;
    assert!(!outcome.success);
    let error = outcome.error.as_ref().unwrap();
    assert_eq!(error.kind, "MissingPrerequisite");
    assert_eq!(error.step.as_deref(), Some("replace_fields"));
    assert_eq!(outcome.links.document_id.as_deref(), Some(file.id.as_str()));
    assert!(outcome.completed_steps.is_empty());

    let text = fx.drive.get_snapshot(&file.id).await.unwrap().plain_text();
    assert!(text.starts_with("[Report generation failed at step 'replace_fields'"));
    assert!(text.ends_with("Body\n"));
    assert!(fx.content.persisted("report-1").is_none());
}

#[tokio::test]
async fn test_annotation_failure_is_only_logged() {
    let config = ForgeConfig {
        error_anchor_offset: 10_000,
        ..ForgeConfig::default()
    };
    let drive = Arc::new(MemoryDrive::new());
    drive.add_template("template", &[TemplateBlock::text("Body")]);
    let content = Arc::new(MemoryContentSource::new());
    let services = Services::in_memory(drive.clone(), content, Arc::new(StaticImageFetcher::new()));
    let orchestrator = Orchestrator::new(services, config);
    let file = drive.copy_template("template").await.unwrap();
    let mut ctx = PipelineContext::new();
    ctx.set_document(file.id.clone(), file.link);

    let outcome = orchestrator
        .run(RunRequest::new("report-1").resume_at("export_pdf", ctx))
        .await;
    assert!(!outcome.success);
    assert_eq!(outcome.error.unwrap().kind, "MissingPrerequisite");
    assert!(outcome
        .logs
        .iter()
        .any(|entry| entry.level == LogLevel::Warn
            && entry.step.is_none()
            && entry.message.starts_with("could not write error annotation")));
    assert_eq!(
        drive.get_snapshot(&file.id).await.unwrap().plain_text(),
        "Body\n"
    );
}

#[tokio::test]
async fn test_rejected_requests_run_nothing() {
    let fx = fixture(
        &[TemplateBlock::text("Body")],
        ReportInputs {
            title: "Vase".to_string(),
            ..ReportInputs::default()
        },
        StaticImageFetcher::new(),
    );

    let unknown = fx
        .orchestrator
        .run(RunRequest::new("report-1").resume_at("polish", PipelineContext::new()))
        .await;
    assert!(!unknown.success);
    assert_eq!(unknown.error.unwrap().kind, "UnknownStep");
    assert!(unknown.logs.iter().all(|entry| entry.step.is_none()));

    let unknown_stop = fx
        .orchestrator
        .run(RunRequest::new("report-1").with_options(stop_after("polish")))
        .await;
    assert_eq!(unknown_stop.error.unwrap().kind, "UnknownStep");

    let backwards = fx
        .orchestrator
        .run(
            RunRequest::new("report-1")
                .resume_at("export_pdf", PipelineContext::new())
                .with_options(stop_after("clone_template")),
        )
        .await;
    assert_eq!(backwards.error.unwrap().kind, "ValidationError");
    assert_eq!(fx.drive.batches_applied(), 0);
}
