//! Mutation batch builder: occurrences plus values in, descending-offset
//! edit batches out.

use std::collections::BTreeMap;

use serde_json::Value;

use super::format::format_value;
use crate::document::{scan_placeholders, token_for, DocumentTree, EditOp, OffsetSpace, Occurrence};
use crate::error::Result;

/// Build the batch replacing every occurrence with the formatted `value`.
///
/// Occurrences are processed from the highest start offset down, each as a
/// `DeleteRange` followed by an `InsertText` at the same start. Objects and
/// arrays produce an empty batch.
pub fn build_replacement_batch(occurrences: &[Occurrence], value: &Value) -> Result<Vec<EditOp>> {
    match format_value(value) {
        Some(text) => build_text_batch(occurrences, &text),
        None => Ok(Vec::new()),
    }
}

/// Same as [`build_replacement_batch`] for text that is already formatted.
pub fn build_text_batch(occurrences: &[Occurrence], text: &str) -> Result<Vec<EditOp>> {
    let entries: Vec<(Occurrence, String)> = occurrences
        .iter()
        .map(|occurrence| (*occurrence, text.to_string()))
        .collect();
    descending_batch(entries)
}

/// Sort `(occurrence, replacement)` pairs by start offset, highest first, and
/// register them in an [`OffsetSpace`].
pub fn descending_batch(mut entries: Vec<(Occurrence, String)>) -> Result<Vec<EditOp>> {
    entries.sort_by(|a, b| b.0.start_offset.cmp(&a.0.start_offset));
    entries.dedup_by(|a, b| a.0 == b.0);

    let mut space = OffsetSpace::new();
    for (occurrence, text) in &entries {
        space.replace_text(*occurrence, text)?;
    }
    Ok(space.into_ops())
}

/// Every substitution one pass will make against a single snapshot.
#[derive(Debug, Default)]
pub struct ReplacementPlan {
    entries: Vec<(Occurrence, String)>,
    /// Names with zero occurrences.
    pub missing: Vec<String>,
    /// Names whose value is composite and was left for the section pass.
    pub skipped: Vec<String>,
}

impl ReplacementPlan {
    /// Scan `snapshot` for each field's token and pair every hit with the
    /// field's formatted value.
    pub fn for_fields(snapshot: &DocumentTree, fields: &BTreeMap<String, Value>) -> Self {
        let mut plan = Self::default();
        for (name, value) in fields {
            match format_value(value) {
                Some(text) => plan.add(snapshot, name, text),
                None => plan.skipped.push(name.clone()),
            }
        }
        plan
    }

    /// Scan for `{{name}}` and queue `text` for every occurrence.
    pub fn add(&mut self, snapshot: &DocumentTree, name: &str, text: String) {
        let occurrences = scan_placeholders(snapshot, &token_for(name));
        if occurrences.is_empty() {
            self.missing.push(name.to_string());
            return;
        }
        self.entries
            .extend(occurrences.into_iter().map(|occurrence| (occurrence, text.clone())));
    }

    /// Number of occurrences that will be replaced.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Where the replacement text for `occurrence` ends up once the whole
    /// plan has applied. Replacements before it shift it by their length
    /// change. `None` when the plan does not touch `occurrence`.
    pub fn landing(&self, occurrence: Occurrence) -> Option<Occurrence> {
        let (_, text) = self.entries.iter().find(|(hit, _)| *hit == occurrence)?;
        let shift: isize = self
            .entries
            .iter()
            .filter(|(hit, _)| hit.start_offset < occurrence.start_offset)
            .map(|(hit, text)| text.chars().count() as isize - hit.len() as isize)
            .sum();
        let start = occurrence.start_offset.checked_add_signed(shift)?;
        Some(Occurrence::new(start, start + text.chars().count()))
    }

    pub fn into_batch(self) -> Result<Vec<EditOp>> {
        descending_batch(self.entries)
    }
}
