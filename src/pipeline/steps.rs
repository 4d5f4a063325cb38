//! The fixed, ordered step table and the step implementations.
//!
//! A step reads what it needs from the context (failing with
//! `MissingPrerequisite` if an earlier step has not run), talks to the
//! collaborators, and records its product in the context only on success.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;

use super::context::PipelineContext;
use crate::config::ForgeConfig;
use crate::document::{
    find_tokens, scan_placeholders, token_for, EditOp, OffsetSpace, Occurrence, Range, TextStyle,
};
use crate::error::{PipelineError, Result};
use crate::gallery::{layout_gallery, realize_gallery, GalleryImage, GALLERY_PLACEHOLDER};
use crate::render::format::{format_report_date, format_text, is_composite, pdf_filename, render_section};
use crate::render::ReplacementPlan;
use crate::services::{FetchedImage, ReportInputs, Services};
use crate::validation::Validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    /// Failure aborts the run.
    Critical,
    /// Failure is logged as a warning and the run continues.
    NonCritical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    FetchInputs,
    CloneTemplate,
    MoveToFolder,
    ReplaceSections,
    ReplaceFields,
    AdjustTitleSize,
    InsertImages,
    InsertGallery,
    ExportPdf,
    UploadPdf,
    PersistLinks,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StepDescriptor {
    pub name: &'static str,
    pub kind: StepKind,
    pub criticality: Criticality,
    pub description: &'static str,
}

pub const STEPS: [StepDescriptor; 11] = [
    StepDescriptor {
        name: "fetch_inputs",
        kind: StepKind::FetchInputs,
        criticality: Criticality::Critical,
        description: "Fetch and validate the report inputs",
    },
    StepDescriptor {
        name: "clone_template",
        kind: StepKind::CloneTemplate,
        criticality: Criticality::Critical,
        description: "Copy the template into a new document",
    },
    StepDescriptor {
        name: "move_to_folder",
        kind: StepKind::MoveToFolder,
        criticality: Criticality::Critical,
        description: "File the new document under the report folder",
    },
    StepDescriptor {
        name: "replace_sections",
        kind: StepKind::ReplaceSections,
        criticality: Criticality::Critical,
        description: "Substitute composite section placeholders",
    },
    StepDescriptor {
        name: "replace_fields",
        kind: StepKind::ReplaceFields,
        criticality: Criticality::Critical,
        description: "Substitute scalar field placeholders",
    },
    StepDescriptor {
        name: "adjust_title_size",
        kind: StepKind::AdjustTitleSize,
        criticality: Criticality::NonCritical,
        description: "Size the rendered title by its length",
    },
    StepDescriptor {
        name: "insert_images",
        kind: StepKind::InsertImages,
        criticality: Criticality::NonCritical,
        description: "Replace named image placeholders with images",
    },
    StepDescriptor {
        name: "insert_gallery",
        kind: StepKind::InsertGallery,
        criticality: Criticality::NonCritical,
        description: "Lay out the image gallery in a grid",
    },
    StepDescriptor {
        name: "export_pdf",
        kind: StepKind::ExportPdf,
        criticality: Criticality::Critical,
        description: "Export the document as PDF",
    },
    StepDescriptor {
        name: "upload_pdf",
        kind: StepKind::UploadPdf,
        criticality: Criticality::Critical,
        description: "Upload the PDF next to the document",
    },
    StepDescriptor {
        name: "persist_links",
        kind: StepKind::PersistLinks,
        criticality: Criticality::Critical,
        description: "Record the artifact links against the report",
    },
];

/// Position of `name` in the canonical order.
pub fn step_index(name: &str) -> Option<usize> {
    STEPS.iter().position(|step| step.name == name)
}

/// What a step did, before criticality is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum StepReport {
    Done(String),
    Skipped(String),
    /// Completed, but something the caller should know about went wrong.
    Warning(String),
}

/// Everything a step may use besides the context.
pub struct StepEnv<'a> {
    pub services: &'a Services,
    pub config: &'a ForgeConfig,
    pub report_id: &'a str,
}

impl StepDescriptor {
    pub fn is_critical(&self) -> bool {
        self.criticality == Criticality::Critical
    }

    pub async fn execute(&self, env: &StepEnv<'_>, ctx: &mut PipelineContext) -> Result<StepReport> {
        match self.kind {
            StepKind::FetchInputs => fetch_inputs(env, ctx).await,
            StepKind::CloneTemplate => clone_template(env, ctx).await,
            StepKind::MoveToFolder => move_to_folder(env, ctx).await,
            StepKind::ReplaceSections => replace_sections(env, ctx).await,
            StepKind::ReplaceFields => replace_fields(env, ctx).await,
            StepKind::AdjustTitleSize => adjust_title_size(env, ctx).await,
            StepKind::InsertImages => insert_images(env, ctx).await,
            StepKind::InsertGallery => insert_gallery(env, ctx).await,
            StepKind::ExportPdf => export_pdf(env, ctx).await,
            StepKind::UploadPdf => upload_pdf(env, ctx).await,
            StepKind::PersistLinks => persist_links(env, ctx).await,
        }
    }
}

// ============================================================================
// Setup
// ============================================================================

async fn fetch_inputs(env: &StepEnv<'_>, ctx: &mut PipelineContext) -> Result<StepReport> {
    let inputs = env
        .services
        .content
        .fetch_report_inputs(env.report_id)
        .await
        .map_err(PipelineError::ContentSource)?;
    inputs.check().map_err(PipelineError::Validation)?;

    let message = format!(
        "fetched '{}': {} fields, {} sections, {} images, {} gallery urls",
        inputs.title,
        inputs.fields.len(),
        inputs.sections.len(),
        inputs.images.len(),
        inputs.gallery_urls.len()
    );
    ctx.set_inputs(inputs);
    Ok(StepReport::Done(message))
}

async fn clone_template(env: &StepEnv<'_>, ctx: &mut PipelineContext) -> Result<StepReport> {
    let file = env
        .services
        .files
        .copy_template(&env.config.template_id)
        .await
        .map_err(PipelineError::FileStore)?;
    let message = format!(
        "copied template '{}' to document '{}'",
        env.config.template_id, file.id
    );
    ctx.set_document(file.id, file.link);
    Ok(StepReport::Done(message))
}

async fn move_to_folder(env: &StepEnv<'_>, ctx: &mut PipelineContext) -> Result<StepReport> {
    let document_id = ctx.document_id()?.to_string();
    env.services
        .files
        .move_to(&document_id, &env.config.folder_id)
        .await
        .map_err(PipelineError::FileStore)?;
    ctx.set_folder_id(env.config.folder_id.clone());
    Ok(StepReport::Done(format!(
        "moved '{}' to folder '{}'",
        document_id, env.config.folder_id
    )))
}

// ============================================================================
// Text substitution
// ============================================================================

/// Composite fields rendered as sections, overridden by explicit sections.
fn section_texts(fields: &BTreeMap<String, Value>, sections: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut texts: BTreeMap<String, String> = fields
        .iter()
        .filter(|(_, value)| is_composite(value))
        .map(|(name, value)| (name.clone(), render_section(value)))
        .collect();
    for (name, text) in sections {
        texts.insert(name.clone(), format_text(text));
    }
    texts
}

/// Scalar fields, with the report title and date taking precedence over
/// fields of the same name.
fn field_values(inputs: &ReportInputs) -> BTreeMap<String, Value> {
    let mut fields: BTreeMap<String, Value> = inputs
        .fields
        .iter()
        .filter(|(_, value)| !is_composite(value))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    fields.insert("title".to_string(), Value::String(inputs.title.clone()));
    if !inputs.date.trim().is_empty() {
        fields.insert(
            "date".to_string(),
            Value::String(format_report_date(&inputs.date)),
        );
    }
    fields
}

fn not_found_note(missing: &[String]) -> String {
    if missing.is_empty() {
        return String::new();
    }
    for name in missing {
        debug!("{}", PipelineError::PlaceholderNotFound(token_for(name)));
    }
    format!("; placeholders not found: {}", missing.join(", "))
}

async fn replace_sections(env: &StepEnv<'_>, ctx: &mut PipelineContext) -> Result<StepReport> {
    let document_id = ctx.document_id()?.to_string();
    let inputs = ctx.inputs()?;
    let texts = section_texts(&inputs.fields, &inputs.sections);
    if texts.is_empty() {
        ctx.set_sections_replaced(0);
        return Ok(StepReport::Skipped("no composite sections".to_string()));
    }

    let documents = &env.services.documents;
    let snapshot = documents
        .get_snapshot(&document_id)
        .await
        .map_err(PipelineError::DocumentService)?;
    let mut plan = ReplacementPlan::default();
    for (name, text) in texts {
        plan.add(&snapshot, &name, text);
    }

    let replaced = plan.len();
    let missing = std::mem::take(&mut plan.missing);
    if !plan.is_empty() {
        documents
            .apply_batch(&document_id, &plan.into_batch()?)
            .await
            .map_err(PipelineError::DocumentService)?;
    }
    ctx.set_sections_replaced(replaced);

    let message = format!("replaced {} section occurrences{}", replaced, not_found_note(&missing));
    Ok(if missing.is_empty() {
        StepReport::Done(message)
    } else {
        StepReport::Warning(message)
    })
}

async fn replace_fields(env: &StepEnv<'_>, ctx: &mut PipelineContext) -> Result<StepReport> {
    let document_id = ctx.document_id()?.to_string();
    let inputs = ctx.inputs()?;
    let fields = field_values(inputs);

    // The section pass changed the document; offsets must come from a fresh
    // snapshot.
    let documents = &env.services.documents;
    let snapshot = documents
        .get_snapshot(&document_id)
        .await
        .map_err(PipelineError::DocumentService)?;

    let mut reserved: BTreeSet<String> = fields.keys().cloned().collect();
    reserved.extend(inputs.images.keys().cloned());
    reserved.insert(GALLERY_PLACEHOLDER.to_string());
    let leftover: Vec<String> = find_tokens(&snapshot)
        .into_iter()
        .filter(|name| !reserved.contains(name))
        .collect();

    let mut plan = ReplacementPlan::for_fields(&snapshot, &fields);
    let replaced = plan.len();
    let missing = std::mem::take(&mut plan.missing);
    let title_range = scan_placeholders(&snapshot, &token_for("title"))
        .first()
        .and_then(|first| plan.landing(*first));
    if !plan.is_empty() {
        documents
            .apply_batch(&document_id, &plan.into_batch()?)
            .await
            .map_err(PipelineError::DocumentService)?;
    }
    ctx.set_fields_replaced(replaced);
    if let Some(range) = title_range {
        ctx.set_title_range(range);
    }

    let mut message = format!("replaced {} field occurrences{}", replaced, not_found_note(&missing));
    if !leftover.is_empty() {
        message.push_str(&format!("; unfilled tokens: {}", leftover.join(", ")));
    }
    Ok(if missing.is_empty() && leftover.is_empty() {
        StepReport::Done(message)
    } else {
        StepReport::Warning(message)
    })
}

/// Font size for a title of `len` characters.
pub fn title_font_size(len: usize) -> f32 {
    match len {
        0..=30 => 28.0,
        31..=60 => 22.0,
        _ => 18.0,
    }
}

async fn adjust_title_size(env: &StepEnv<'_>, ctx: &mut PipelineContext) -> Result<StepReport> {
    let document_id = ctx.document_id()?;
    let title = format_text(&ctx.inputs()?.title);
    if title.is_empty() {
        return Ok(StepReport::Skipped("empty title".to_string()));
    }

    let Ok(range) = ctx.title_range() else {
        return Ok(StepReport::Skipped("no title placeholder was filled".to_string()));
    };

    // Only the text the first title placeholder became, never a match
    // elsewhere in the body.
    let documents = &env.services.documents;
    let snapshot = documents
        .get_snapshot(document_id)
        .await
        .map_err(PipelineError::DocumentService)?;
    let Some(first) = scan_placeholders(&snapshot, &title)
        .into_iter()
        .find(|hit| *hit == range)
    else {
        return Ok(StepReport::Warning(format!(
            "title '{}' is no longer at {}..{}",
            title, range.start_offset, range.end_offset
        )));
    };

    let size = title_font_size(title.chars().count());
    let mut space = OffsetSpace::new();
    space.restyle(Range::from(first), TextStyle::font_size(size).with_bold(true))?;
    documents
        .apply_batch(document_id, &space.into_ops())
        .await
        .map_err(PipelineError::DocumentService)?;
    Ok(StepReport::Done(format!("title set to {}pt bold", size)))
}

// ============================================================================
// Images
// ============================================================================

/// Fetch every URL with bounded parallelism and a per-image timeout,
/// preserving input order.
async fn fetch_images(env: &StepEnv<'_>, urls: Vec<String>) -> Vec<(String, Result<FetchedImage>)> {
    let fetcher = env.services.images.clone();
    let limit = env.config.fetch_timeout;

    stream::iter(urls)
        .map(|url| {
            let fetcher = fetcher.clone();
            async move {
                let result = match tokio::time::timeout(limit, fetcher.fetch(&url)).await {
                    Ok(Ok(image)) => Ok(image),
                    Ok(Err(reason)) => Err(PipelineError::ImageFetch {
                        url: url.clone(),
                        reason,
                    }),
                    Err(_) => Err(PipelineError::ImageFetch {
                        url: url.clone(),
                        reason: format!("timed out after {:?}", limit),
                    }),
                };
                if let Err(e) = &result {
                    warn!("{}", e);
                }
                (url, result)
            }
        })
        .buffered(env.config.fetch_concurrency.max(1))
        .collect()
        .await
}

enum Replacement {
    Image(GalleryImage),
    Remove,
}

async fn insert_images(env: &StepEnv<'_>, ctx: &mut PipelineContext) -> Result<StepReport> {
    let document_id = ctx.document_id()?.to_string();
    let images = ctx.inputs()?.images.clone();
    if images.is_empty() {
        ctx.set_images_inserted(0);
        return Ok(StepReport::Skipped("no named images".to_string()));
    }

    let documents = &env.services.documents;
    let snapshot = documents
        .get_snapshot(&document_id)
        .await
        .map_err(PipelineError::DocumentService)?;

    let mut wanted = Vec::new();
    let mut missing = Vec::new();
    for (name, url) in images {
        let occurrences = scan_placeholders(&snapshot, &token_for(&name));
        if occurrences.is_empty() {
            missing.push(name);
        } else {
            wanted.push((name, url, occurrences));
        }
    }

    let fetched = fetch_images(env, wanted.iter().map(|(_, url, _)| url.clone()).collect()).await;
    let mut entries: Vec<(Occurrence, Replacement)> = Vec::new();
    let mut failed = Vec::new();
    for ((name, _, occurrences), (_, result)) in wanted.into_iter().zip(fetched) {
        for occurrence in occurrences {
            let replacement = match &result {
                Ok(image) => Replacement::Image(GalleryImage::scaled(
                    name.as_str(),
                    image,
                    env.config.feature_image_width,
                )),
                Err(_) => Replacement::Remove,
            };
            entries.push((occurrence, replacement));
        }
        if let Err(e) = result {
            failed.push(format!("{} ({})", name, e));
        }
    }

    entries.sort_by(|a, b| b.0.start_offset.cmp(&a.0.start_offset));
    let mut space = OffsetSpace::new();
    let mut inserted = 0;
    for (occurrence, replacement) in &entries {
        match replacement {
            Replacement::Image(image) => {
                space.replace_with_image(*occurrence, &image.uri, image.width, image.height)?;
                inserted += 1;
            }
            Replacement::Remove => space.delete(*occurrence)?,
        }
    }
    if !space.is_empty() {
        documents
            .apply_batch(&document_id, &space.into_ops())
            .await
            .map_err(PipelineError::DocumentService)?;
    }
    ctx.set_images_inserted(inserted);

    let mut message = format!("inserted {} images{}", inserted, not_found_note(&missing));
    if !failed.is_empty() {
        message.push_str(&format!("; dropped: {}", failed.join(", ")));
    }
    Ok(if missing.is_empty() && failed.is_empty() {
        StepReport::Done(message)
    } else {
        StepReport::Warning(message)
    })
}

async fn insert_gallery(env: &StepEnv<'_>, ctx: &mut PipelineContext) -> Result<StepReport> {
    let document_id = ctx.document_id()?.to_string();
    let urls = ctx.inputs()?.gallery_urls.clone();

    let documents = &env.services.documents;
    let snapshot = documents
        .get_snapshot(&document_id)
        .await
        .map_err(PipelineError::DocumentService)?;
    let occurrences = scan_placeholders(&snapshot, &token_for(GALLERY_PLACEHOLDER));
    let Some(origin) = occurrences.iter().map(|o| o.start_offset).min() else {
        ctx.set_gallery_inserted(0);
        return Ok(if urls.is_empty() {
            StepReport::Skipped("no gallery".to_string())
        } else {
            StepReport::Warning(format!(
                "{}; {} gallery images not placed",
                PipelineError::PlaceholderNotFound(token_for(GALLERY_PLACEHOLDER)),
                urls.len()
            ))
        });
    };

    let mut dropped = Vec::new();
    let mut images = Vec::new();
    for (index, (url, result)) in fetch_images(env, urls).await.into_iter().enumerate() {
        match result {
            Ok(image) => images.push(GalleryImage::scaled(
                format!("gallery[{}]", index),
                &image,
                env.config.gallery_image_width,
            )),
            Err(e) => dropped.push(format!("{} ({})", url, e)),
        }
    }
    let plan = layout_gallery(&images, env.config.grid_width, origin)?;

    // Every placeholder goes; the gallery lands where the first one was.
    let mut space = OffsetSpace::new();
    let mut descending = occurrences;
    descending.sort_by(|a, b| b.start_offset.cmp(&a.start_offset));
    for occurrence in descending {
        space.delete(occurrence)?;
    }
    documents
        .apply_batch(&document_id, &space.into_ops())
        .await
        .map_err(PipelineError::DocumentService)?;

    let realized = realize_gallery(
        documents.as_ref(),
        &document_id,
        &plan,
        env.config.gallery_batch_size,
    )
    .await;
    ctx.set_gallery_inserted(realized.images_inserted);

    let mut message = format!(
        "placed {} of {} images in {} rows of {}",
        realized.images_inserted,
        images.len() + dropped.len(),
        plan.rows(),
        plan.grid_width
    );
    if !dropped.is_empty() {
        message.push_str(&format!("; dropped: {}", dropped.join(", ")));
    }
    if !realized.failures.is_empty() {
        message.push_str(&format!("; {}", realized.failures.join("; ")));
    }
    Ok(if dropped.is_empty() && realized.failures.is_empty() {
        StepReport::Done(message)
    } else {
        StepReport::Warning(message)
    })
}

// ============================================================================
// Export
// ============================================================================

async fn export_pdf(env: &StepEnv<'_>, ctx: &mut PipelineContext) -> Result<StepReport> {
    let document_id = ctx.document_id()?;
    let inputs = ctx.inputs()?;
    let filename = pdf_filename(&inputs.title, &inputs.date);

    let bytes = env
        .services
        .exporter
        .export_as_pdf(document_id)
        .await
        .map_err(PipelineError::Export)?;
    if bytes.is_empty() {
        return Err(PipelineError::Export("exporter returned an empty PDF".to_string()));
    }

    let message = format!("exported {} bytes as {}", bytes.len(), filename);
    ctx.set_pdf(bytes, filename);
    Ok(StepReport::Done(message))
}

async fn upload_pdf(env: &StepEnv<'_>, ctx: &mut PipelineContext) -> Result<StepReport> {
    let link = env
        .services
        .exporter
        .upload(ctx.pdf_bytes()?, ctx.pdf_filename()?, ctx.folder_id()?)
        .await
        .map_err(PipelineError::Upload)?;
    let message = format!("uploaded PDF to {}", link);
    ctx.set_pdf_link(link);
    Ok(StepReport::Done(message))
}

async fn persist_links(env: &StepEnv<'_>, ctx: &mut PipelineContext) -> Result<StepReport> {
    ctx.pdf_link()?;
    let links = ctx.links();
    env.services
        .content
        .persist_result(env.report_id, &links)
        .await
        .map_err(PipelineError::Persist)?;
    ctx.set_persisted_at(Utc::now());
    Ok(StepReport::Done(format!(
        "persisted links for report '{}'",
        env.report_id
    )))
}

/// Error annotation written into a document whose run aborted.
pub(crate) fn failure_annotation(at: usize, step: &str, error: &PipelineError) -> EditOp {
    EditOp::InsertText {
        at,
        text: format!(
            "[Report generation failed at step '{}': {}]\n",
            step, error
        ),
    }
}
