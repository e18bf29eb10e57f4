//! Configuration for an inference run.
//!
//! Use [`InferenceConfig::builder()`] to assemble one; unset fields take the
//! CLI defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default location of the results table.
pub const DEFAULT_OUTPUT_PATH: &str = "resultados_inferencia_limpio.csv";

/// Default identifier column carried to the front of the results.
pub const DEFAULT_ID_COLUMN: &str = "ID";

/// Default number of rows shown in the console preview.
pub const DEFAULT_PREVIEW_ROWS: usize = 10;

/// Configuration for one inference run.
///
/// # Example
///
/// ```rust,ignore
/// use lex_inference::InferenceConfig;
///
/// let config = InferenceConfig::builder()
///     .input_path("test_inferencia.csv")
///     .pipeline_path("random_forest_pipeline.pkl")
///     .id_column("customer_id")
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Raw input table (CSV with header row).
    pub input_path: PathBuf,

    /// Serialized pipeline artifact.
    pub pipeline_path: PathBuf,

    /// Where the results table is written.
    /// Default: `resultados_inferencia_limpio.csv`
    pub output_path: PathBuf,

    /// Identifier column preserved at the front of the results if the raw
    /// table has it.
    /// Default: `ID`
    pub id_column: String,

    /// Rows shown in the console preview.
    /// Default: 10
    pub preview_rows: usize,

    /// Optional path for a JSON run summary.
    /// Default: None
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_path: Option<PathBuf>,
}

impl InferenceConfig {
    /// Create a new configuration builder.
    pub fn builder() -> InferenceConfigBuilder {
        InferenceConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.input_path.as_os_str().is_empty() {
            return Err(ConfigValidationError::EmptyPath("input_path"));
        }
        if self.pipeline_path.as_os_str().is_empty() {
            return Err(ConfigValidationError::EmptyPath("pipeline_path"));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(ConfigValidationError::EmptyPath("output_path"));
        }
        if self.id_column.trim().is_empty() {
            return Err(ConfigValidationError::EmptyIdColumn);
        }
        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("'{0}' must not be empty")]
    EmptyPath(&'static str),

    #[error("Identifier column name must not be empty")]
    EmptyIdColumn,

    #[error("No configuration provided")]
    MissingConfig,
}

impl From<ConfigValidationError> for crate::error::InferenceError {
    fn from(err: ConfigValidationError) -> Self {
        crate::error::InferenceError::InvalidConfig(err.to_string())
    }
}

/// Builder for [`InferenceConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct InferenceConfigBuilder {
    input_path: Option<PathBuf>,
    pipeline_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    id_column: Option<String>,
    preview_rows: Option<usize>,
    summary_path: Option<PathBuf>,
}

impl InferenceConfigBuilder {
    pub fn input_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_path = Some(path.into());
        self
    }

    pub fn pipeline_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.pipeline_path = Some(path.into());
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Set the identifier column name (case-sensitive).
    pub fn id_column(mut self, name: impl Into<String>) -> Self {
        self.id_column = Some(name.into());
        self
    }

    /// Set the number of preview rows. Zero prints only the header.
    pub fn preview_rows(mut self, rows: usize) -> Self {
        self.preview_rows = Some(rows);
        self
    }

    /// Also write the run summary as JSON to this path.
    pub fn summary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.summary_path = Some(path.into());
        self
    }

    /// Build the configuration, validating it.
    pub fn build(self) -> Result<InferenceConfig, ConfigValidationError> {
        let config = InferenceConfig {
            input_path: self.input_path.unwrap_or_default(),
            pipeline_path: self.pipeline_path.unwrap_or_default(),
            output_path: self
                .output_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH)),
            id_column: self
                .id_column
                .unwrap_or_else(|| DEFAULT_ID_COLUMN.to_string()),
            preview_rows: self.preview_rows.unwrap_or(DEFAULT_PREVIEW_ROWS),
            summary_path: self.summary_path,
        };

        config.validate()?;
        Ok(config)
    }
}

static_assertions::assert_impl_all!(InferenceConfig: Send, Sync);
