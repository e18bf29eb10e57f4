//! # lex-sklearn
//!
//! Runs serialized scikit-learn pipelines from Rust.
//!
//! A pipeline trained in Python and dumped with `joblib.dump` is loaded into an
//! embedded interpreter (PyO3). Tables are Polars DataFrames on the Rust side
//! and pandas DataFrames on the Python side; they cross over as Arrow IPC.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lex_sklearn::{initialize, SklearnPipeline};
//!
//! initialize()?;
//! let pipeline = SklearnPipeline::load("random_forest_pipeline.pkl")?;
//! let labels = pipeline.predict(&df)?;
//! ```
//!
//! # Requirements
//!
//! The interpreter must be able to import `joblib`, `numpy`, `pandas`,
//! `pyarrow` and whatever the pickled pipeline references (usually
//! `sklearn`). A bundled runtime can be selected with `LEX_PYTHON_RUNTIME_DIR`;
//! see [`python::runtime`].

mod error;
mod pipeline;
pub mod python;
mod types;

// Error types
pub use error::{ArrowConversionKind, SklearnError};
// Pipeline handles
pub use pipeline::{CLEANING_STEP, CleaningStage, SklearnPipeline};
// Call outputs
pub use types::{CleanedOutput, ProbabilityArray};
// Runtime
pub use python::runtime::{RUNTIME_DIR_ENV, add_sys_path};

/// Initialize the Python runtime.
///
/// Idempotent; every call after the first returns the cached outcome.
///
/// # Errors
///
/// Returns [`SklearnError::RuntimeInit`] if the interpreter cannot start or a
/// required module is missing.
#[must_use = "initialization errors should be handled"]
pub fn initialize() -> Result<(), SklearnError> {
    python::runtime::initialize()
}

/// Check whether [`initialize()`] has completed successfully.
#[must_use = "the initialization status should be checked"]
pub fn is_initialized() -> bool {
    python::runtime::is_initialized()
}
