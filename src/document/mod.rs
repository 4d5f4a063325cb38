//! Document module - the addressable content space and everything that reads
//! or mutates it:
//! - `model` - snapshot tree types (blocks, runs, tables, cells)
//! - `ops` - edit operations and the descending-order `OffsetSpace`
//! - `content` - in-memory linear document that applies batches
//! - `scanner` - recursive placeholder search

pub mod content;
pub mod model;
pub mod ops;
pub mod scanner;

#[cfg(test)]
mod tests;

pub use content::{Document, TemplateBlock};
pub use model::{
    Block, DocumentTree, InlineImage, Paragraph, ParagraphElement, Table, TableCell, TableRow,
    TextRun, TextStyle,
};
pub use ops::{EditOp, OffsetSpace, Occurrence, Range};
pub use scanner::{find_tokens, is_valid_token_name, scan_placeholders, token_for};
