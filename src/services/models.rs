use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything the content source knows about one report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportInputs {
    pub title: String,
    #[serde(default)]
    pub date: String,
    /// Field values keyed by placeholder name.
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    /// Named images keyed by placeholder name.
    #[serde(default)]
    pub images: BTreeMap<String, String>,
    #[serde(default)]
    pub gallery_urls: Vec<String>,
    /// Pre-rendered composite sections keyed by placeholder name.
    #[serde(default)]
    pub sections: BTreeMap<String, String>,
}

/// A file created in the file store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: String,
    pub link: String,
}

/// A fetched and validated image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedImage {
    pub uri: String,
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
}

/// Final artifact locations of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportLinks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_link: Option<String>,
}
