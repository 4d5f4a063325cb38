//! report-forge: builds report documents by cloning a template and filling
//! its placeholders, images and gallery through offset-addressed edits.

pub mod config;
pub mod document;
pub mod error;
pub mod gallery;
pub mod pipeline;
pub mod render;
pub mod services;
pub mod validation;

pub use crate::config::{ConfigError, ForgeConfig};
pub use crate::error::{PipelineError, Result};
pub use crate::pipeline::{Orchestrator, PipelineContext, RunOptions, RunOutcome, RunRequest};
pub use crate::services::Services;
