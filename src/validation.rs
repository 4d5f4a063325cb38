//! Input validation for run requests and report inputs.
//!
//! Produces descriptive errors that name the offending field and, where it
//! helps, how to fix it. Every problem is collected before anything runs.

use std::fmt;

use crate::document::is_valid_token_name;
use crate::pipeline::RunRequest;
use crate::services::ReportInputs;

/// Validation error with a field path and a readable message.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// The field that failed validation
    pub field: String,
    pub message: String,
    /// Suggestion for how to fix the error
    pub suggestion: Option<String>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Create error for empty required field
    pub fn empty_field(field: &str, label: &str) -> Self {
        Self::new(field, format!("{} must not be empty", label))
            .with_suggestion(format!("Provide a non-empty {}", label.to_lowercase()))
    }

    pub fn invalid_token_name(field: &str, name: &str) -> Self {
        Self::new(field, format!("'{}' is not a valid placeholder name", name))
            .with_suggestion("Use letters, digits and _ . : - only, e.g. object_type")
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, ". {}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Collection of validation errors with formatted output.
#[derive(Debug, Default)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// One numbered line per error.
    pub fn to_message(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }

        let mut parts = vec![format!(
            "validation failed: {} problem(s) found",
            self.errors.len()
        )];
        for (i, error) in self.errors.iter().enumerate() {
            parts.push(format!("{}. {}", i + 1, error));
        }
        parts.join("\n")
    }

    /// Ok if no errors, Err with the formatted message otherwise.
    pub fn into_result(self) -> Result<(), String> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self.to_message())
        }
    }
}

/// Something that can check itself before a run starts.
pub trait Validator {
    fn validate(&self, errors: &mut ValidationErrors);

    fn check(&self) -> Result<(), String> {
        let mut errors = ValidationErrors::new();
        self.validate(&mut errors);
        errors.into_result()
    }
}

// ============================================================================
// Validation functions
// ============================================================================

/// Validate that a string is not empty after trimming
pub fn validate_required(value: &str, field: &str, label: &str, errors: &mut ValidationErrors) {
    if value.trim().is_empty() {
        errors.add(ValidationError::empty_field(field, label));
    }
}

pub fn validate_token_names<'a>(
    names: impl IntoIterator<Item = &'a String>,
    field: &str,
    errors: &mut ValidationErrors,
) {
    for name in names {
        if !is_valid_token_name(name) {
            errors.add(ValidationError::invalid_token_name(
                &format!("{}.{}", field, name),
                name,
            ));
        }
    }
}

impl Validator for ReportInputs {
    fn validate(&self, errors: &mut ValidationErrors) {
        validate_required(&self.title, "title", "Title", errors);
        validate_token_names(self.fields.keys(), "fields", errors);
        validate_token_names(self.images.keys(), "images", errors);
        validate_token_names(self.sections.keys(), "sections", errors);
        for (index, url) in self.gallery_urls.iter().enumerate() {
            validate_required(url, &format!("galleryUrls[{}]", index), "Gallery URL", errors);
        }
    }
}

impl Validator for RunRequest {
    fn validate(&self, errors: &mut ValidationErrors) {
        validate_required(&self.report_id, "reportId", "Report id", errors);
        if self.options.grid_width == Some(0) {
            errors.add(
                ValidationError::new("options.gridWidth", "grid width must be at least 1")
                    .with_suggestion("Use 1 for a single column"),
            );
        }
        if let Some(template_id) = &self.options.template_id {
            validate_required(template_id, "options.templateId", "Template id", errors);
        }
        if let Some(folder_id) = &self.options.folder_id {
            validate_required(folder_id, "options.folderId", "Folder id", errors);
        }
    }
}
