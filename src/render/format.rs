//! Value formatting for placeholder substitution.
//!
//! Shared helpers for text normalisation, composite-section rendering, date
//! formatting and export filenames.

use chrono::{DateTime, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref INLINE_WHITESPACE: Regex =
        Regex::new(r"[ \t\u{00A0}\u{000B}\u{000C}]+").expect("whitespace pattern is valid");
}

/// Paragraph break in the linear content model.
pub const PARAGRAPH_BREAK: &str = "\n";

const SECTION_BULLET: &str = "• ";

/// Collapse whitespace runs to one space and turn every line break into a
/// single paragraph break. Blank lines vanish; the result is trimmed.
pub fn format_text(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .split('\n')
        .map(|line| INLINE_WHITESPACE.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(PARAGRAPH_BREAK)
}

/// Text for a scalar value. Objects and arrays return `None`: they must be
/// pre-rendered with [`render_section`] rather than stringified.
pub fn format_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(format_text(text)),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(true) => Some("Yes".to_string()),
        Value::Bool(false) => Some("No".to_string()),
        Value::Null => Some(String::new()),
        Value::Object(_) | Value::Array(_) => None,
    }
}

pub fn is_composite(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

/// Pre-render a composite value as a block of paragraphs.
///
/// Arrays become one bulleted line per element, objects one `Key: value`
/// line per entry. Nested composites are flattened onto their line.
pub fn render_section(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| format!("{SECTION_BULLET}{}", inline_value(item)))
            .filter(|line| line.len() > SECTION_BULLET.len())
            .collect::<Vec<_>>()
            .join(PARAGRAPH_BREAK),
        Value::Object(entries) => entries
            .iter()
            .filter_map(|(key, item)| {
                let rendered = inline_value(item);
                if rendered.is_empty() {
                    None
                } else {
                    Some(format!("{}: {}", humanize_key(key), rendered))
                }
            })
            .collect::<Vec<_>>()
            .join(PARAGRAPH_BREAK),
        scalar => format_value(scalar).unwrap_or_default(),
    }
}

/// Render any value on a single line.
fn inline_value(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(inline_value)
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(entries) => entries
            .iter()
            .map(|(key, item)| format!("{} {}", humanize_key(key), inline_value(item)))
            .collect::<Vec<_>>()
            .join(", "),
        scalar => format_value(scalar)
            .unwrap_or_default()
            .replace(PARAGRAPH_BREAK, " "),
    }
}

/// `object_type` / `objectType` -> `Object type`.
pub fn humanize_key(key: &str) -> String {
    let mut words = String::new();
    let mut previous_lower = false;
    for ch in key.chars() {
        if ch == '_' || ch == '-' || ch == '.' {
            words.push(' ');
            previous_lower = false;
            continue;
        }
        if ch.is_uppercase() && previous_lower {
            words.push(' ');
        }
        previous_lower = ch.is_lowercase() || ch.is_ascii_digit();
        words.extend(ch.to_lowercase());
    }
    let collapsed = INLINE_WHITESPACE.replace_all(words.trim(), " ").to_string();
    let mut chars = collapsed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Format a report date (e.g. "2026-10-19" -> "19 October 2026").
///
/// RFC 3339 timestamps are reduced to their date; anything unparseable is
/// returned trimmed and unchanged.
pub fn format_report_date(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.format("%-d %B %Y").to_string();
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return timestamp.date_naive().format("%-d %B %Y").to_string();
    }
    trimmed.to_string()
}

/// Lowercase, dash-joined filename stem. Characters that are reserved in
/// filenames become word breaks; `fallback` is used when nothing is left.
pub fn slugify(name: &str, fallback: &str) -> String {
    let options = sanitize_filename::Options {
        replacement: "-",
        ..sanitize_filename::Options::default()
    };
    let slug = sanitize_filename::sanitize_with_options(name.trim(), options)
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}

/// Export filename for a report: `<title>-<date>.pdf`.
pub fn pdf_filename(title: &str, date: &str) -> String {
    let stem = slugify(title, "report");
    let date_part = slugify(date, "");
    if date_part.is_empty() {
        format!("{stem}.pdf")
    } else {
        format!("{stem}-{date_part}.pdf")
    }
}
