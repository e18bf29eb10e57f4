//! Error types for the lex-sklearn crate.
//!
//! [`SklearnError`] is returned by every public operation. Python exceptions
//! raised inside the embedded interpreter are mapped onto its variants by
//! [`map_python_error`](crate::python::conversion::map_python_error), so callers
//! can tell a missing artifact apart from a model that rejects its input.

use thiserror::Error;

/// Specific kinds of Arrow conversion errors.
///
/// DataFrames cross the Rust/Python boundary as Arrow IPC file bytes; each
/// direction of that transfer can fail independently.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ArrowConversionKind {
    /// Failed to serialize a Polars DataFrame to Arrow IPC bytes.
    #[error("serialization failed: {0}")]
    Serialize(String),

    /// Failed to deserialize Arrow IPC bytes to a Polars DataFrame.
    #[error("deserialization failed: {0}")]
    Deserialize(String),

    /// A Python value could not be mapped to the expected Rust type.
    #[error("type conversion failed: {0}")]
    TypeConversion(String),
}

/// The main error type for lex-sklearn operations.
///
/// # Error Conversion
///
/// Python exceptions are converted to the closest variant:
/// - `FileNotFoundError` → [`Io`](Self::Io) with kind `NotFound`
/// - `ModuleNotFoundError` / `ImportError` → [`MissingModule`](Self::MissingModule)
/// - `ValueError` / `KeyError` / `TypeError` → [`InvalidInput`](Self::InvalidInput)
/// - `AttributeError` → [`Unsupported`](Self::Unsupported)
/// - anything else → [`PythonError`](Self::PythonError)
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SklearnError {
    /// The serialized pipeline file does not exist.
    #[error("Pipeline file not found: {path}")]
    ModelNotFound {
        /// The path that was not found.
        path: String,
    },

    /// Unpickling needs a Python module that is not importable.
    ///
    /// Pipelines that embed custom transformers require the module defining
    /// them on `sys.path`; see [`add_sys_path`](crate::add_sys_path).
    #[error("Missing Python module: {0}")]
    MissingModule(String),

    /// The pipeline rejected the input table (missing columns, bad dtypes).
    #[error("Invalid input for pipeline: {0}")]
    InvalidInput(String),

    /// The pipeline does not expose the requested capability.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// A pipeline method returned something that is not shaped as expected.
    #[error("Unexpected pipeline output: {0}")]
    InvalidOutput(String),

    /// Catch-all for other Python exceptions.
    #[error("Python error ({exception}): {message}")]
    PythonError {
        /// Qualified name of the Python exception type.
        exception: String,
        /// The exception message.
        message: String,
    },

    /// Failed to initialize the Python runtime.
    ///
    /// Common causes:
    /// - `joblib`, `numpy`, `pandas` or `pyarrow` are not installed
    /// - `LEX_PYTHON_RUNTIME_DIR` points at an incomplete runtime
    #[error("Runtime initialization failed: {0}")]
    RuntimeInit(String),

    /// Failed to move data between Rust and Python via Arrow.
    #[error("Arrow conversion error: {0}")]
    ArrowConversion(#[from] ArrowConversionKind),

    /// I/O error while touching the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SklearnError {
    /// True when the error is caused by a file that does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::ModelNotFound { .. } => true,
            Self::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<pyo3::PyErr> for SklearnError {
    fn from(err: pyo3::PyErr) -> Self {
        SklearnError::PythonError {
            exception: "PyErr".to_string(),
            message: err.to_string(),
        }
    }
}
