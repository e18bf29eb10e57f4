//! Error types for the inference runner.
//!
//! Every fatal condition of a run is an [`InferenceError`]. Besides the usual
//! `error_code()` it carries the process exit status the CLI must use:
//! missing files exit with `1`, everything else with `2`.

use serde::Serialize;
use serde::ser::SerializeStruct;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Which of the two required inputs is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// The raw CSV table.
    Table,
    /// The serialized pipeline artifact.
    Pipeline,
}

/// The main error type for inference runs.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum InferenceError {
    /// A required input was missing when the run started.
    #[error("{}", missing_input_message(*kind, path))]
    InputNotFound { kind: InputKind, path: PathBuf },

    /// A file disappeared or could not be found while the run was in progress.
    #[error("{0}")]
    FileNotFound(String),

    /// The input table could not be decoded.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The pipeline artifact could not be loaded.
    #[error("Failed to load pipeline: {0}")]
    PipelineLoad(String),

    /// `predict` raised.
    #[error("Prediction failed: {0}")]
    Prediction(String),

    /// `predict` returned a different number of labels than there are rows.
    #[error("Pipeline returned {actual} predictions for {expected} rows")]
    RowCountMismatch { expected: usize, actual: usize },

    /// The results table could not be written.
    #[error("Failed to write results to '{path}': {reason}")]
    OutputWrite { path: PathBuf, reason: String },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No pipeline backend is compiled into this build.
    #[error("No pipeline backend available: {0}")]
    BackendUnavailable(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<InferenceError>,
    },
}

fn missing_input_message(kind: InputKind, path: &Path) -> String {
    match kind {
        InputKind::Table => format!(
            "Archivo '{}' no encontrado. Coloca el archivo en el directorio actual o indica la ruta correcta.",
            path.display()
        ),
        InputKind::Pipeline => {
            format!("Archivo de pipeline '{}' no encontrado.", path.display())
        }
    }
}

impl InferenceError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        InferenceError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get a stable error code for machine consumers.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InputNotFound { .. } => "INPUT_NOT_FOUND",
            Self::FileNotFound(_) => "FILE_NOT_FOUND",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::PipelineLoad(_) => "PIPELINE_LOAD_FAILED",
            Self::Prediction(_) => "PREDICTION_FAILED",
            Self::RowCountMismatch { .. } => "ROW_COUNT_MISMATCH",
            Self::OutputWrite { .. } => "OUTPUT_WRITE_FAILED",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// True for missing-file conditions, whether caught up front or mid-run.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::InputNotFound { .. } | Self::FileNotFound(_) => true,
            Self::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            Self::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Process exit status for this error: `1` for missing files, `2` otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.is_not_found() { 1 } else { 2 }
    }
}

/// Errors are serialized as `{ "code", "exit_code", "message" }`.
impl Serialize for InferenceError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("InferenceError", 3)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("exit_code", &self.exit_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for inference operations.
pub type Result<T> = std::result::Result<T, InferenceError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| InferenceError::Polars(e).with_context(context))
    }
}
