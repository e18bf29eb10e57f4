//! Batch Inference Runner
//!
//! Applies a pre-trained prediction pipeline to a CSV table and writes a
//! results table built on the pipeline's cleaned view of the data.
//!
//! # Overview
//!
//! - **Input validation**: missing input files are reported before anything
//!   heavy starts
//! - **Cleaned output**: the pipeline's `cleaning` stage shapes the results;
//!   failures fall back to the raw table with a warning
//! - **Predictions**: always computed on the raw table by the full pipeline
//! - **Probabilities**: best-effort; omitted with a notice when unavailable
//! - **Report**: prediction count, distribution and a preview of the results
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lex_inference::{InferenceConfig, InferenceRunner, SklearnLoader, render_report};
//!
//! let config = InferenceConfig::builder()
//!     .input_path("test_inferencia.csv")
//!     .pipeline_path("random_forest_pipeline.pkl")
//!     .output_path("resultados_inferencia_limpio.csv")
//!     .build()?;
//!
//! let outcome = InferenceRunner::builder()
//!     .config(config)
//!     .on_event(|event| println!("{:?}", event))
//!     .build()?
//!     .run(&SklearnLoader::new())?;
//!
//! print!("{}", render_report(&outcome, 10)?);
//! ```
//!
//! # Pipeline Backends
//!
//! The runner only talks to a pipeline through the traits in [`capability`].
//! The `sklearn` feature (on by default) provides [`SklearnLoader`], which
//! loads joblib artifacts into an embedded Python interpreter. Any other
//! format can be supported by implementing [`PipelineLoader`] and
//! [`Predictor`].
//!
//! # Exit Codes
//!
//! [`InferenceError::exit_code()`] maps every failure to the CLI status:
//! `1` for missing files, `2` for everything else.

pub mod capability;
pub mod cleaning;
pub mod config;
pub mod error;
pub mod report;
pub mod results;
pub mod runner;
#[cfg(feature = "sklearn")]
pub mod sklearn;
pub mod table;

// Re-exports for convenient access
pub use capability::{
    CleanedData, Cleaner, PipelineLoader, Predictor, ProbabilityMatrix, ProbabilityOutcome,
};
pub use cleaning::{CleanedSource, CleanedTable, derive_cleaned_table};
pub use config::{
    ConfigValidationError, DEFAULT_ID_COLUMN, DEFAULT_OUTPUT_PATH, DEFAULT_PREVIEW_ROWS,
    InferenceConfig, InferenceConfigBuilder,
};
pub use error::{InferenceError, InputKind, Result as InferenceResult, ResultExt};
pub use report::{InferenceSummary, PredictionDistribution, preview_columns, render_report};
pub use results::{
    PREDICTION_COLUMN, PROBABILITY_COLUMN, PROBABILITY_NEGATIVE_COLUMN,
    PROBABILITY_POSITIVE_COLUMN, ProbabilityColumns, ResultsTable, assemble_results,
};
pub use runner::{
    ClosureRunObserver, InferenceOutcome, InferenceRunner, InferenceRunnerBuilder, RunEvent,
    RunObserver,
};
#[cfg(feature = "sklearn")]
pub use sklearn::{SklearnCleaner, SklearnLoader, SklearnPredictor};
pub use table::{read_table, write_table};
