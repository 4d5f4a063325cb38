//! Snapshot types: a read-only view of a document's block structure with
//! absolute offsets, as returned by the document service.

use serde::{Deserialize, Serialize};

/// Character-level styling. `None` fields mean "inherit / unchanged".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
}

impl TextStyle {
    pub fn font_size(size: f32) -> Self {
        Self {
            font_size: Some(size),
            ..Self::default()
        }
    }

    pub fn with_bold(mut self, bold: bool) -> Self {
        self.bold = Some(bold);
        self
    }

    /// Overlay every field set in `patch` onto `self`.
    pub fn merge(&mut self, patch: &TextStyle) {
        if patch.bold.is_some() {
            self.bold = patch.bold;
        }
        if patch.italic.is_some() {
            self.italic = patch.italic;
        }
        if patch.font_size.is_some() {
            self.font_size = patch.font_size;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bold.is_none() && self.italic.is_none() && self.font_size.is_none()
    }
}

/// A read-only copy of a document's structure at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTree {
    pub document_id: String,
    pub body: Vec<Block>,
    /// One past the last addressable offset.
    pub end_offset: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paragraph {
    pub start_offset: usize,
    pub end_offset: usize,
    pub elements: Vec<ParagraphElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ParagraphElement {
    TextRun(TextRun),
    InlineImage(InlineImage),
}

/// Consecutive characters sharing one style. `content` includes the
/// paragraph's trailing newline when the run ends the paragraph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRun {
    pub start_offset: usize,
    pub end_offset: usize,
    pub content: String,
    #[serde(default)]
    pub style: TextStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineImage {
    pub offset: usize,
    pub uri: String,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub start_offset: usize,
    pub end_offset: usize,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub start_offset: usize,
    pub end_offset: usize,
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCell {
    pub start_offset: usize,
    pub end_offset: usize,
    pub content: Vec<Block>,
}

impl DocumentTree {
    /// Text of the whole document. Images render as U+FFFC, table cells are
    /// separated by tabs and rows end with a newline.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        push_blocks_text(&self.body, &mut out);
        out
    }

    /// Inline images in document order, including those nested in tables.
    pub fn images(&self) -> Vec<&InlineImage> {
        let mut found = Vec::new();
        collect_images(&self.body, &mut found);
        found
    }

    pub fn count_images(&self) -> usize {
        self.images().len()
    }

    /// Top-level and nested paragraphs in document order.
    pub fn paragraphs(&self) -> Vec<&Paragraph> {
        let mut found = Vec::new();
        collect_paragraphs(&self.body, &mut found);
        found
    }
}

impl Paragraph {
    pub fn text(&self) -> String {
        self.elements
            .iter()
            .map(|element| match element {
                ParagraphElement::TextRun(run) => run.content.clone(),
                ParagraphElement::InlineImage(_) => '\u{FFFC}'.to_string(),
            })
            .collect()
    }

    pub fn image_count(&self) -> usize {
        self.elements
            .iter()
            .filter(|element| matches!(element, ParagraphElement::InlineImage(_)))
            .count()
    }
}

fn push_blocks_text(blocks: &[Block], out: &mut String) {
    for block in blocks {
        match block {
            Block::Paragraph(paragraph) => out.push_str(&paragraph.text()),
            Block::Table(table) => {
                for row in &table.rows {
                    for (i, cell) in row.cells.iter().enumerate() {
                        if i > 0 {
                            out.push('\t');
                        }
                        let mut cell_text = String::new();
                        push_blocks_text(&cell.content, &mut cell_text);
                        out.push_str(cell_text.trim_end_matches('\n'));
                    }
                    out.push('\n');
                }
            }
        }
    }
}

fn collect_images<'a>(blocks: &'a [Block], found: &mut Vec<&'a InlineImage>) {
    for block in blocks {
        match block {
            Block::Paragraph(paragraph) => {
                for element in &paragraph.elements {
                    if let ParagraphElement::InlineImage(image) = element {
                        found.push(image);
                    }
                }
            }
            Block::Table(table) => {
                for cell in table.rows.iter().flat_map(|row| row.cells.iter()) {
                    collect_images(&cell.content, found);
                }
            }
        }
    }
}

fn collect_paragraphs<'a>(blocks: &'a [Block], found: &mut Vec<&'a Paragraph>) {
    for block in blocks {
        match block {
            Block::Paragraph(paragraph) => found.push(paragraph),
            Block::Table(table) => {
                for cell in table.rows.iter().flat_map(|row| row.cells.iter()) {
                    collect_paragraphs(&cell.content, found);
                }
            }
        }
    }
}
