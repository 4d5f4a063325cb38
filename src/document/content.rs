//! In-memory linear content space.
//!
//! Every unit occupies exactly one offset: characters (paragraphs end with
//! `'\n'`), inline images, and the structural markers that open tables, rows
//! and cells and close tables. Snapshots are derived from the unit stream on
//! demand.

use serde::{Deserialize, Serialize};

use super::model::{
    Block, DocumentTree, InlineImage, Paragraph, ParagraphElement, Table, TableCell, TableRow,
    TextRun, TextStyle,
};
use super::ops::EditOp;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq)]
enum Unit {
    Char { ch: char, style: TextStyle },
    Image { uri: String, width: f32, height: f32 },
    TableStart,
    RowStart,
    CellStart,
    TableEnd,
}

impl Unit {
    fn is_structural(&self) -> bool {
        matches!(
            self,
            Unit::TableStart | Unit::RowStart | Unit::CellStart | Unit::TableEnd
        )
    }
}

/// Template description used to seed a document: plain paragraphs (a string
/// may hold several, separated by newlines) and nested tables given as
/// rows of cells of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateBlock {
    Text(String),
    Table { table: Vec<Vec<Vec<TemplateBlock>>> },
}

impl TemplateBlock {
    pub fn text(text: impl Into<String>) -> Self {
        TemplateBlock::Text(text.into())
    }

    pub fn table(rows: Vec<Vec<Vec<TemplateBlock>>>) -> Self {
        TemplateBlock::Table { table: rows }
    }
}

/// A mutable document held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: String,
    units: Vec<Unit>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            units: Vec::new(),
        }
    }

    pub fn from_blocks(id: impl Into<String>, blocks: &[TemplateBlock]) -> Self {
        let mut document = Self::new(id);
        push_template_blocks(&mut document.units, blocks);
        document
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Same content under a new id, used when a template is copied.
    pub fn duplicate(&self, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            units: self.units.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Apply a batch atomically: either every operation applies, in order,
    /// or the document is left untouched.
    pub fn apply_batch(&mut self, ops: &[EditOp]) -> Result<()> {
        let mut staged = self.units.clone();
        for (index, op) in ops.iter().enumerate() {
            apply_op(&mut staged, op).map_err(|err| match err {
                PipelineError::InvalidEdit(reason) => {
                    PipelineError::InvalidEdit(format!("operation {index}: {reason}"))
                }
                other => other,
            })?;
        }
        self.units = staged;
        Ok(())
    }

    pub fn snapshot(&self) -> DocumentTree {
        let mut index = 0;
        let body = parse_blocks(&self.units, &mut index, false);
        DocumentTree {
            document_id: self.id.clone(),
            body,
            end_offset: self.units.len(),
        }
    }
}

fn push_template_blocks(units: &mut Vec<Unit>, blocks: &[TemplateBlock]) {
    for block in blocks {
        match block {
            TemplateBlock::Text(text) => {
                for line in text.split('\n') {
                    units.extend(line.chars().map(|ch| Unit::Char {
                        ch,
                        style: TextStyle::default(),
                    }));
                    units.push(Unit::Char {
                        ch: '\n',
                        style: TextStyle::default(),
                    });
                }
            }
            TemplateBlock::Table { table } => {
                units.push(Unit::TableStart);
                for row in table {
                    units.push(Unit::RowStart);
                    for cell in row {
                        units.push(Unit::CellStart);
                        push_template_blocks(units, cell);
                    }
                }
                units.push(Unit::TableEnd);
            }
        }
    }
}

// ============================================================================
// Edit application
// ============================================================================

fn apply_op(units: &mut Vec<Unit>, op: &EditOp) -> Result<()> {
    match op {
        EditOp::DeleteRange { start, end } => {
            check_range(units, *start, *end)?;
            if units[*start..*end].iter().any(Unit::is_structural) {
                return Err(PipelineError::InvalidEdit(format!(
                    "range {start}..{end} crosses a table boundary"
                )));
            }
            units.drain(*start..*end);
        }
        EditOp::InsertText { at, text } => {
            check_insertion_point(units, *at)?;
            if text.is_empty() {
                return Err(PipelineError::InvalidEdit(format!(
                    "empty text insert at {at}"
                )));
            }
            let style = inherited_style(units, *at);
            let inserted: Vec<Unit> = text
                .chars()
                .map(|ch| Unit::Char {
                    ch,
                    style: style.clone(),
                })
                .collect();
            units.splice(*at..*at, inserted);
        }
        EditOp::InsertImage {
            at,
            uri,
            width,
            height,
        } => {
            check_insertion_point(units, *at)?;
            if *width <= 0.0 || *height <= 0.0 {
                return Err(PipelineError::InvalidEdit(format!(
                    "image at {at} has non-positive size {width}x{height}"
                )));
            }
            units.insert(
                *at,
                Unit::Image {
                    uri: uri.clone(),
                    width: *width,
                    height: *height,
                },
            );
        }
        EditOp::UpdateStyle { range, style } => {
            check_range(units, range.start, range.end)?;
            for unit in &mut units[range.start..range.end] {
                if let Unit::Char { style: current, .. } = unit {
                    current.merge(style);
                }
            }
        }
    }
    Ok(())
}

fn check_range(units: &[Unit], start: usize, end: usize) -> Result<()> {
    if start >= end || end > units.len() {
        return Err(PipelineError::InvalidEdit(format!(
            "range {start}..{end} is empty or outside 0..{}",
            units.len()
        )));
    }
    Ok(())
}

fn check_insertion_point(units: &[Unit], at: usize) -> Result<()> {
    if at > units.len() {
        return Err(PipelineError::InvalidEdit(format!(
            "offset {at} is past the end of the document ({})",
            units.len()
        )));
    }
    if at > 0 && matches!(units[at - 1], Unit::TableStart | Unit::RowStart) {
        return Err(PipelineError::InvalidEdit(format!(
            "offset {at} is inside table structure"
        )));
    }
    Ok(())
}

/// Inserted text takes the style of the preceding character in the same
/// paragraph, else of the following character.
fn inherited_style(units: &[Unit], at: usize) -> TextStyle {
    if at > 0 {
        if let Unit::Char { ch, style } = &units[at - 1] {
            if *ch != '\n' {
                return style.clone();
            }
        }
    }
    match units.get(at) {
        Some(Unit::Char { style, .. }) => style.clone(),
        _ => TextStyle::default(),
    }
}

// ============================================================================
// Snapshot construction
// ============================================================================

fn ends_cell(unit: &Unit) -> bool {
    matches!(unit, Unit::CellStart | Unit::RowStart | Unit::TableEnd)
}

fn parse_blocks(units: &[Unit], index: &mut usize, in_cell: bool) -> Vec<Block> {
    let mut blocks = Vec::new();
    while *index < units.len() {
        let unit = &units[*index];
        if in_cell && ends_cell(unit) {
            break;
        }
        match unit {
            Unit::TableStart => blocks.push(Block::Table(parse_table(units, index))),
            Unit::RowStart | Unit::CellStart | Unit::TableEnd => {
                // Stray marker outside a table; skip it so parsing advances.
                *index += 1;
            }
            _ => blocks.push(Block::Paragraph(parse_paragraph(units, index))),
        }
    }
    blocks
}

fn parse_table(units: &[Unit], index: &mut usize) -> Table {
    let start_offset = *index;
    *index += 1;
    let mut rows = Vec::new();
    while matches!(units.get(*index), Some(Unit::RowStart)) {
        let row_start = *index;
        *index += 1;
        let mut cells = Vec::new();
        while matches!(units.get(*index), Some(Unit::CellStart)) {
            let cell_start = *index;
            *index += 1;
            let content = parse_blocks(units, index, true);
            cells.push(TableCell {
                start_offset: cell_start,
                end_offset: *index,
                content,
            });
        }
        rows.push(TableRow {
            start_offset: row_start,
            end_offset: *index,
            cells,
        });
    }
    if matches!(units.get(*index), Some(Unit::TableEnd)) {
        *index += 1;
    }
    Table {
        start_offset,
        end_offset: *index,
        rows,
    }
}

fn parse_paragraph(units: &[Unit], index: &mut usize) -> Paragraph {
    let start_offset = *index;
    let mut elements: Vec<ParagraphElement> = Vec::new();

    while *index < units.len() {
        let offset = *index;
        match &units[offset] {
            Unit::Char { ch, style } => {
                let extends_run = match elements.last_mut() {
                    Some(ParagraphElement::TextRun(run)) if run.style == *style => {
                        run.content.push(*ch);
                        run.end_offset = offset + 1;
                        true
                    }
                    _ => false,
                };
                if !extends_run {
                    elements.push(ParagraphElement::TextRun(TextRun {
                        start_offset: offset,
                        end_offset: offset + 1,
                        content: ch.to_string(),
                        style: style.clone(),
                    }));
                }
                *index += 1;
                if *ch == '\n' {
                    break;
                }
            }
            Unit::Image { uri, width, height } => {
                elements.push(ParagraphElement::InlineImage(InlineImage {
                    offset,
                    uri: uri.clone(),
                    width: *width,
                    height: *height,
                }));
                *index += 1;
            }
            _ => break,
        }
    }

    Paragraph {
        start_offset,
        end_offset: *index,
        elements,
    }
}
