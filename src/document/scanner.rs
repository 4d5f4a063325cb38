//! Placeholder scanner.
//!
//! A pure recursive visitor over an immutable snapshot: paragraphs are
//! searched run by run, tables recurse through every row and cell into the
//! nested blocks.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

use super::model::{Block, DocumentTree, Paragraph, ParagraphElement};
use super::ops::Occurrence;

lazy_static! {
    static ref TOKEN_PATTERN: Regex =
        Regex::new(r"\{\{([A-Za-z0-9_.:-]+)\}\}").expect("token pattern is valid");
    static ref NAME_PATTERN: Regex =
        Regex::new(r"^[A-Za-z0-9_.:-]+$").expect("name pattern is valid");
}

/// Render the bracketed token for a placeholder name.
pub fn token_for(name: &str) -> String {
    format!("{{{{{name}}}}}")
}

/// Every exact, case-sensitive occurrence of `token`, in document order.
///
/// Adjacent text runs inside one paragraph are searched as a single string,
/// so a token split across two differently styled runs is still found.
pub fn scan_placeholders(snapshot: &DocumentTree, token: &str) -> Vec<Occurrence> {
    let mut found = Vec::new();
    if token.is_empty() {
        return found;
    }
    scan_blocks(&snapshot.body, token, &mut found);
    found
}

fn scan_blocks(blocks: &[Block], token: &str, found: &mut Vec<Occurrence>) {
    for block in blocks {
        match block {
            Block::Paragraph(paragraph) => scan_paragraph(paragraph, token, found),
            Block::Table(table) => {
                for row in &table.rows {
                    for cell in &row.cells {
                        scan_blocks(&cell.content, token, found);
                    }
                }
            }
        }
    }
}

fn scan_paragraph(paragraph: &Paragraph, token: &str, found: &mut Vec<Occurrence>) {
    // Contiguous text segment: (start offset, end offset, text).
    let mut segment: Option<(usize, usize, String)> = None;

    for element in &paragraph.elements {
        match element {
            ParagraphElement::TextRun(run) => match segment.as_mut() {
                Some((_, end, text)) if *end == run.start_offset => {
                    text.push_str(&run.content);
                    *end = run.end_offset;
                }
                _ => {
                    if let Some(done) = segment.take() {
                        match_segment(&done, token, found);
                    }
                    segment = Some((run.start_offset, run.end_offset, run.content.clone()));
                }
            },
            ParagraphElement::InlineImage(_) => {
                if let Some(done) = segment.take() {
                    match_segment(&done, token, found);
                }
            }
        }
    }
    if let Some(done) = segment.take() {
        match_segment(&done, token, found);
    }
}

fn match_segment(segment: &(usize, usize, String), token: &str, found: &mut Vec<Occurrence>) {
    let (start, _, text) = segment;
    let token_len = token.chars().count();
    for (byte_index, _) in text.match_indices(token) {
        let char_index = text[..byte_index].chars().count();
        let offset = start + char_index;
        found.push(Occurrence::new(offset, offset + token_len));
    }
}

/// Distinct placeholder names still present anywhere in the document.
pub fn find_tokens(snapshot: &DocumentTree) -> BTreeSet<String> {
    snapshot
        .paragraphs()
        .iter()
        .flat_map(|paragraph| {
            let text = paragraph.text();
            TOKEN_PATTERN
                .captures_iter(&text)
                .map(|captures| captures[1].to_string())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Whether `name` is usable inside a `{{...}}` token.
pub fn is_valid_token_name(name: &str) -> bool {
    NAME_PATTERN.is_match(name)
}
