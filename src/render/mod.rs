//! Render module - turns report values into edit batches.
//!
//! - `format` - text normalisation, composite sections, dates, filenames
//! - `batch` - descending-offset replacement batches

pub mod batch;
pub mod format;


pub use batch::{build_replacement_batch, build_text_batch, descending_batch, ReplacementPlan};
pub use format::{
    format_report_date, format_text, format_value, is_composite, pdf_filename, render_section, slugify,
};
