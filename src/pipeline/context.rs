//! Shared state threaded through the steps of one run.
//!
//! Every field is owned by exactly one step, which sets it after it
//! succeeds. Fields are never cleared. Reading a field no step has produced
//! yet is a `MissingPrerequisite` error, so a resumed run with an incomplete
//! context fails loudly instead of re-deriving anything.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Occurrence;
use crate::error::{PipelineError, Result};
use crate::services::{ReportInputs, ReportLinks};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inputs: Option<ReportInputs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    document_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    folder_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sections_replaced: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fields_replaced: Option<usize>,
    /// Where the first title placeholder's text landed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title_range: Option<Occurrence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    images_inserted: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gallery_inserted: Option<usize>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "base64_bytes"
    )]
    pdf_bytes: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pdf_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pdf_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    persisted_at: Option<DateTime<Utc>>,
    /// Free-form values for callers that resume runs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, Value>,
}

fn required<'a, T: ?Sized>(value: Option<&'a T>, field: &'static str) -> Result<&'a T> {
    value.ok_or(PipelineError::MissingPrerequisite(field))
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Getters
    // ========================================================================

    pub fn inputs(&self) -> Result<&ReportInputs> {
        required(self.inputs.as_ref(), "inputs")
    }

    pub fn document_id(&self) -> Result<&str> {
        required(self.document_id.as_deref(), "document_id")
    }

    pub fn document_link(&self) -> Result<&str> {
        required(self.document_link.as_deref(), "document_link")
    }

    pub fn folder_id(&self) -> Result<&str> {
        required(self.folder_id.as_deref(), "folder_id")
    }

    pub fn sections_replaced(&self) -> Result<usize> {
        self.sections_replaced
            .ok_or(PipelineError::MissingPrerequisite("sections_replaced"))
    }

    pub fn fields_replaced(&self) -> Result<usize> {
        self.fields_replaced
            .ok_or(PipelineError::MissingPrerequisite("fields_replaced"))
    }

    pub fn title_range(&self) -> Result<Occurrence> {
        self.title_range
            .ok_or(PipelineError::MissingPrerequisite("title_range"))
    }

    pub fn images_inserted(&self) -> Result<usize> {
        self.images_inserted
            .ok_or(PipelineError::MissingPrerequisite("images_inserted"))
    }

    pub fn gallery_inserted(&self) -> Result<usize> {
        self.gallery_inserted
            .ok_or(PipelineError::MissingPrerequisite("gallery_inserted"))
    }

    pub fn pdf_bytes(&self) -> Result<&[u8]> {
        required(self.pdf_bytes.as_deref(), "pdf_bytes")
    }

    pub fn pdf_filename(&self) -> Result<&str> {
        required(self.pdf_filename.as_deref(), "pdf_filename")
    }

    pub fn pdf_link(&self) -> Result<&str> {
        required(self.pdf_link.as_deref(), "pdf_link")
    }

    pub fn persisted_at(&self) -> Result<DateTime<Utc>> {
        self.persisted_at
            .ok_or(PipelineError::MissingPrerequisite("persisted_at"))
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Whatever artifact links exist so far.
    pub fn links(&self) -> ReportLinks {
        ReportLinks {
            document_id: self.document_id.clone(),
            document_link: self.document_link.clone(),
            folder_id: self.folder_id.clone(),
            pdf_link: self.pdf_link.clone(),
        }
    }

    // ========================================================================
    // Setters, one per owning step
    // ========================================================================

    pub(crate) fn set_inputs(&mut self, inputs: ReportInputs) {
        self.inputs = Some(inputs);
    }

    pub(crate) fn set_document(&mut self, id: String, link: String) {
        self.document_id = Some(id);
        self.document_link = Some(link);
    }

    pub(crate) fn set_folder_id(&mut self, folder_id: String) {
        self.folder_id = Some(folder_id);
    }

    pub(crate) fn set_sections_replaced(&mut self, count: usize) {
        self.sections_replaced = Some(count);
    }

    pub(crate) fn set_fields_replaced(&mut self, count: usize) {
        self.fields_replaced = Some(count);
    }

    pub(crate) fn set_title_range(&mut self, range: Occurrence) {
        self.title_range = Some(range);
    }

    pub(crate) fn set_images_inserted(&mut self, count: usize) {
        self.images_inserted = Some(count);
    }

    pub(crate) fn set_gallery_inserted(&mut self, count: usize) {
        self.gallery_inserted = Some(count);
    }

    pub(crate) fn set_pdf(&mut self, bytes: Vec<u8>, filename: String) {
        self.pdf_bytes = Some(bytes);
        self.pdf_filename = Some(filename);
    }

    pub(crate) fn set_pdf_link(&mut self, link: String) {
        self.pdf_link = Some(link);
    }

    pub(crate) fn set_persisted_at(&mut self, at: DateTime<Utc>) {
        self.persisted_at = Some(at);
    }
}

/// PDF buffers travel as base64 strings in serialized contexts.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_str(&BASE64.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|encoded| BASE64.decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}
