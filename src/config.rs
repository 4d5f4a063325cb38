//! Runtime configuration, read from the environment (and `.env`).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// Template document copied for every report.
    pub template_id: String,
    /// Folder the report document and its PDF are filed under.
    pub folder_id: String,
    /// Gallery images per row.
    pub grid_width: usize,
    /// Gallery images per document-service batch.
    pub gallery_batch_size: usize,
    pub step_timeout: Duration,
    pub fetch_timeout: Duration,
    /// Parallel image downloads within one step.
    pub fetch_concurrency: usize,
    /// Offset the error annotation is written at when a run aborts.
    pub error_anchor_offset: usize,
    pub max_concurrent_runs: usize,
    pub gallery_image_width: f32,
    pub feature_image_width: f32,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            template_id: "template".to_string(),
            folder_id: "reports".to_string(),
            grid_width: 3,
            gallery_batch_size: 12,
            step_timeout: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(20),
            fetch_concurrency: 4,
            error_anchor_offset: 0,
            max_concurrent_runs: 4,
            gallery_image_width: 160.0,
            feature_image_width: 400.0,
        }
    }
}

impl ForgeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            template_id: required("REPORT_TEMPLATE_ID")?,
            folder_id: required("REPORT_FOLDER_ID")?,
            grid_width: parsed("REPORT_GRID_WIDTH", defaults.grid_width)?,
            gallery_batch_size: parsed("REPORT_GALLERY_BATCH_SIZE", defaults.gallery_batch_size)?,
            step_timeout: Duration::from_secs(parsed(
                "REPORT_STEP_TIMEOUT_SECS",
                defaults.step_timeout.as_secs(),
            )?),
            fetch_timeout: Duration::from_secs(parsed(
                "REPORT_FETCH_TIMEOUT_SECS",
                defaults.fetch_timeout.as_secs(),
            )?),
            fetch_concurrency: parsed("REPORT_FETCH_CONCURRENCY", defaults.fetch_concurrency)?,
            error_anchor_offset: parsed(
                "REPORT_ERROR_ANCHOR_OFFSET",
                defaults.error_anchor_offset,
            )?,
            max_concurrent_runs: parsed(
                "REPORT_MAX_CONCURRENT_RUNS",
                defaults.max_concurrent_runs,
            )?,
            gallery_image_width: parsed(
                "REPORT_GALLERY_IMAGE_WIDTH",
                defaults.gallery_image_width,
            )?,
            feature_image_width: parsed(
                "REPORT_FEATURE_IMAGE_WIDTH",
                defaults.feature_image_width,
            )?,
        }
        .checked()?)
    }

    fn checked(self) -> Result<Self, ConfigError> {
        if self.grid_width == 0 {
            return Err(ConfigError::Invalid {
                key: "REPORT_GRID_WIDTH",
                value: "0".to_string(),
            });
        }
        if self.gallery_batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "REPORT_GALLERY_BATCH_SIZE",
                value: "0".to_string(),
            });
        }
        Ok(self)
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            value: raw.clone(),
        }),
        Err(_) => Ok(default),
    }
}
