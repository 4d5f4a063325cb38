//! Edit operations and the descending-order batch builder.

use serde::{Deserialize, Serialize};

use super::model::TextStyle;
use crate::error::{PipelineError, Result};

/// A located placeholder match. Only valid against the snapshot it was read
/// from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub start_offset: usize,
    pub end_offset: usize,
}

impl Occurrence {
    pub fn new(start_offset: usize, end_offset: usize) -> Self {
        Self {
            start_offset,
            end_offset,
        }
    }

    pub fn len(&self) -> usize {
        self.end_offset - self.start_offset
    }

    pub fn is_empty(&self) -> bool {
        self.start_offset == self.end_offset
    }
}

/// Half-open offset range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: usize,
    pub end: usize,
}

impl From<Occurrence> for Range {
    fn from(occurrence: Occurrence) -> Self {
        Range {
            start: occurrence.start_offset,
            end: occurrence.end_offset,
        }
    }
}

/// One offset-addressed mutation. Operations in a batch apply atomically as
/// a unit but sequentially among themselves, so emission order matters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum EditOp {
    DeleteRange {
        start: usize,
        end: usize,
    },
    InsertText {
        at: usize,
        text: String,
    },
    InsertImage {
        at: usize,
        uri: String,
        width: f32,
        height: f32,
    },
    UpdateStyle {
        range: Range,
        style: TextStyle,
    },
}

impl EditOp {
    /// Offset the operation starts at.
    pub fn start(&self) -> usize {
        match self {
            EditOp::DeleteRange { start, .. } => *start,
            EditOp::InsertText { at, .. } | EditOp::InsertImage { at, .. } => *at,
            EditOp::UpdateStyle { range, .. } => range.start,
        }
    }

    /// Number of offsets this operation adds to the document. Deletions and
    /// style updates add none.
    pub fn inserted_len(&self) -> usize {
        match self {
            EditOp::InsertText { text, .. } => text.chars().count(),
            EditOp::InsertImage { .. } => 1,
            EditOp::DeleteRange { .. } | EditOp::UpdateStyle { .. } => 0,
        }
    }
}

/// Live offset space for one batch.
///
/// Every region must be registered at a start offset strictly below the
/// previously registered one and must end at or before it. Under that rule
/// no operation shifts the target of an operation emitted after it, so all
/// occurrences read from one snapshot stay valid for the whole batch.
#[derive(Debug, Default)]
pub struct OffsetSpace {
    ops: Vec<EditOp>,
    floor: Option<usize>,
}

impl OffsetSpace {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim(&mut self, start: usize, end: usize) -> Result<()> {
        if end < start {
            return Err(PipelineError::InvalidEdit(format!(
                "range end {end} precedes start {start}"
            )));
        }
        if let Some(previous) = self.floor {
            if start >= previous || end > previous {
                return Err(PipelineError::BatchOrder { start, previous });
            }
        }
        self.floor = Some(start);
        Ok(())
    }

    /// Replace an occurrence with text. An empty `text` only deletes.
    pub fn replace_text(&mut self, occurrence: Occurrence, text: &str) -> Result<()> {
        self.claim(occurrence.start_offset, occurrence.end_offset)?;
        self.ops.push(EditOp::DeleteRange {
            start: occurrence.start_offset,
            end: occurrence.end_offset,
        });
        if !text.is_empty() {
            self.ops.push(EditOp::InsertText {
                at: occurrence.start_offset,
                text: text.to_string(),
            });
        }
        Ok(())
    }

    pub fn delete(&mut self, occurrence: Occurrence) -> Result<()> {
        self.replace_text(occurrence, "")
    }

    /// Replace an occurrence with a single inline image.
    pub fn replace_with_image(
        &mut self,
        occurrence: Occurrence,
        uri: &str,
        width: f32,
        height: f32,
    ) -> Result<()> {
        self.claim(occurrence.start_offset, occurrence.end_offset)?;
        self.ops.push(EditOp::DeleteRange {
            start: occurrence.start_offset,
            end: occurrence.end_offset,
        });
        self.ops.push(EditOp::InsertImage {
            at: occurrence.start_offset,
            uri: uri.to_string(),
            width,
            height,
        });
        Ok(())
    }

    pub fn insert_text(&mut self, at: usize, text: &str) -> Result<()> {
        self.claim(at, at)?;
        if !text.is_empty() {
            self.ops.push(EditOp::InsertText {
                at,
                text: text.to_string(),
            });
        }
        Ok(())
    }

    pub fn restyle(&mut self, range: Range, style: TextStyle) -> Result<()> {
        self.claim(range.start, range.end)?;
        self.ops.push(EditOp::UpdateStyle { range, style });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<EditOp> {
        self.ops
    }
}
