//! The inference run.
//!
//! One straight-line sequence:
//!
//! 1. Validate that both input files exist
//! 2. Read the raw table
//! 3. Load the pipeline
//! 4. Derive the cleaned table (falls back to the raw table)
//! 5. Predict on the raw table (fatal on failure)
//! 6. Predict probabilities on the raw table (omitted on failure)
//! 7. Assemble and write the results table
//!
//! Progress is reported through [`RunEvent`]s delivered to an optional
//! [`RunObserver`].
//!
//! # Example
//!
//! ```rust,ignore
//! use lex_inference::{InferenceConfig, InferenceRunner};
//!
//! let runner = InferenceRunner::builder()
//!     .config(InferenceConfig::builder()
//!         .input_path("test_inferencia.csv")
//!         .pipeline_path("random_forest_pipeline.pkl")
//!         .build()?)
//!     .on_event(|event| println!("{:?}", event))
//!     .build()?;
//!
//! let outcome = runner.run(&loader)?;
//! println!("{}", lex_inference::render_report(&outcome, 10)?);
//! ```

use crate::capability::{PipelineLoader, ProbabilityMatrix, ProbabilityOutcome};
use crate::cleaning::{CleanedSource, derive_cleaned_table};
use crate::config::{ConfigValidationError, InferenceConfig};
use crate::error::{InferenceError, InputKind, Result};
use crate::report::{InferenceSummary, PredictionDistribution, preview_columns};
use crate::results::{ResultsTable, assemble_results, probability_shape_problem};
use crate::table::{read_table, write_table};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

// ============================================================================
// Events
// ============================================================================

/// Something that happened during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RawTableLoaded { path: PathBuf, shape: (usize, usize) },
    PipelineLoaded { description: String },
    /// The cleaning stage failed and the raw table is used instead.
    CleaningFallback { reason: String },
    CleanedTableDerived { shape: (usize, usize), source: CleanedSource },
    /// Probabilities will not be written.
    ProbabilitiesUnavailable { reason: Option<String> },
    ResultsWritten { path: PathBuf },
    SummaryWritten { path: PathBuf },
}

impl RunEvent {
    /// True for degraded-path events that should reach the user even when
    /// progress output is suppressed.
    pub fn is_notice(&self) -> bool {
        matches!(
            self,
            Self::CleaningFallback { .. } | Self::ProbabilitiesUnavailable { .. }
        )
    }
}

static_assertions::assert_impl_all!(RunEvent: Send, Sync);

/// Receives [`RunEvent`]s as the run progresses.
pub trait RunObserver: Send + Sync {
    fn on_event(&self, event: &RunEvent);
}

/// [`RunObserver`] backed by a closure.
pub struct ClosureRunObserver<F>
where
    F: Fn(&RunEvent) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureRunObserver<F>
where
    F: Fn(&RunEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> RunObserver for ClosureRunObserver<F>
where
    F: Fn(&RunEvent) + Send + Sync,
{
    fn on_event(&self, event: &RunEvent) {
        (self.callback)(event)
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct InferenceOutcome {
    /// The results table as written to disk.
    pub results: ResultsTable,
    /// Columns shown in the console preview; empty means all columns.
    pub preview_columns: Vec<String>,
    pub distribution: PredictionDistribution,
    pub summary: InferenceSummary,
}

/// Runs one pipeline over one input table.
///
/// Use [`InferenceRunner::builder()`] to create one.
pub struct InferenceRunner {
    config: InferenceConfig,
    observer: Option<Arc<dyn RunObserver>>,
}

static_assertions::assert_impl_all!(InferenceRunner: Send, Sync);

impl InferenceRunner {
    pub fn builder() -> InferenceRunnerBuilder {
        InferenceRunnerBuilder::default()
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Check that the input table and the pipeline exist, in that order.
    pub fn validate_inputs(&self) -> Result<()> {
        for (kind, path) in [
            (InputKind::Table, &self.config.input_path),
            (InputKind::Pipeline, &self.config.pipeline_path),
        ] {
            if !path.exists() {
                return Err(InferenceError::InputNotFound {
                    kind,
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }

    /// Execute the run, loading the pipeline with `loader`.
    ///
    /// Inputs are validated before the loader is touched, so a missing file
    /// never triggers backend start-up.
    pub fn run(&self, loader: &dyn PipelineLoader) -> Result<InferenceOutcome> {
        self.validate_inputs()?;
        let config = &self.config;
        let mut warnings = Vec::new();

        info!("Reading input table from {}", config.input_path.display());
        let raw = read_table(&config.input_path)?;
        debug!("Raw table shape: {:?}", raw.shape());
        self.emit(RunEvent::RawTableLoaded {
            path: config.input_path.clone(),
            shape: raw.shape(),
        });

        info!("Loading pipeline from {}", config.pipeline_path.display());
        let predictor = loader.load(&config.pipeline_path)?;
        let description = predictor.describe();
        self.emit(RunEvent::PipelineLoaded {
            description: description.clone(),
        });

        let cleaned = derive_cleaned_table(predictor.as_ref(), &raw);
        if let Some(reason) = cleaned.fallback_reason() {
            warnings.push(format!("Cleaning stage failed: {}", reason));
            self.emit(RunEvent::CleaningFallback {
                reason: reason.to_string(),
            });
        }
        self.emit(RunEvent::CleanedTableDerived {
            shape: cleaned.df.shape(),
            source: cleaned.source.clone(),
        });

        info!("Predicting {} rows", raw.height());
        let predictions = predictor.predict(&raw).map_err(prediction_error)?;
        if predictions.len() != raw.height() {
            return Err(InferenceError::RowCountMismatch {
                expected: raw.height(),
                actual: predictions.len(),
            });
        }

        let probabilities = self.usable_probabilities(predictor.predict_proba(&raw), raw.height());
        if probabilities.is_none() {
            warnings.push("Probabilities unavailable".to_string());
        }

        let mut results = assemble_results(
            &raw,
            &cleaned.df,
            &config.id_column,
            &predictions,
            probabilities.as_ref(),
        )?;

        info!("Writing results to {}", config.output_path.display());
        write_table(&mut results.df, &config.output_path)?;
        self.emit(RunEvent::ResultsWritten {
            path: config.output_path.clone(),
        });

        let distribution = PredictionDistribution::from_predictions(&predictions)?;
        let summary = InferenceSummary {
            generated_at: InferenceSummary::timestamp(),
            input_file: config.input_path.display().to_string(),
            pipeline_file: config.pipeline_path.display().to_string(),
            output_file: config.output_path.display().to_string(),
            pipeline: description,
            raw_shape: raw.shape(),
            cleaned_shape: cleaned.df.shape(),
            cleaned_source: cleaned.source,
            results_shape: results.df.shape(),
            prediction_count: predictions.len(),
            distribution: distribution.clone(),
            probability_columns: results
                .probability_columns
                .names()
                .iter()
                .map(|name| name.to_string())
                .collect(),
            warnings,
        };

        if let Some(path) = &config.summary_path {
            summary.write_json(path)?;
            self.emit(RunEvent::SummaryWritten { path: path.clone() });
        }

        Ok(InferenceOutcome {
            preview_columns: preview_columns(&results),
            results,
            distribution,
            summary,
        })
    }

    /// Keep probabilities only when they line up with the raw rows.
    fn usable_probabilities(
        &self,
        outcome: ProbabilityOutcome,
        rows: usize,
    ) -> Option<ProbabilityMatrix> {
        let reason = match outcome {
            ProbabilityOutcome::Supported(matrix) => match probability_shape_problem(&matrix, rows) {
                None => return Some(matrix),
                Some(problem) => Some(problem),
            },
            ProbabilityOutcome::Unsupported => None,
            ProbabilityOutcome::Failed(reason) => Some(reason),
        };

        match &reason {
            Some(reason) => info!("Probabilities unavailable: {}", reason),
            None => info!("Pipeline does not support probabilities"),
        }
        self.emit(RunEvent::ProbabilitiesUnavailable { reason });
        None
    }

    fn emit(&self, event: RunEvent) {
        if let Some(observer) = &self.observer {
            observer.on_event(&event);
        }
    }
}

/// Prediction failures are fatal; a missing file keeps its not-found class.
fn prediction_error(err: anyhow::Error) -> InferenceError {
    let err = match err.downcast::<InferenceError>() {
        Ok(inner) if inner.is_not_found() => return inner,
        Ok(inner) => return InferenceError::Prediction(inner.to_string()),
        Err(err) => err,
    };

    match err.downcast_ref::<std::io::Error>() {
        Some(io) if io.kind() == std::io::ErrorKind::NotFound => {
            InferenceError::FileNotFound(io.to_string())
        }
        _ => InferenceError::Prediction(format!("{:#}", err)),
    }
}

/// Builder for [`InferenceRunner`].
#[derive(Default)]
pub struct InferenceRunnerBuilder {
    config: Option<InferenceConfig>,
    observer: Option<Arc<dyn RunObserver>>,
}

impl InferenceRunnerBuilder {
    pub fn config(mut self, config: InferenceConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set an observer for run events.
    pub fn observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Set an event callback closure.
    ///
    /// ```rust,ignore
    /// let runner = InferenceRunner::builder()
    ///     .config(config)
    ///     .on_event(|event| {
    ///         if event.is_notice() {
    ///             eprintln!("{:?}", event);
    ///         }
    ///     })
    ///     .build()?;
    /// ```
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RunEvent) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(ClosureRunObserver::new(callback)));
        self
    }

    /// Build the runner.
    ///
    /// Returns an error if no configuration was given or it is invalid.
    pub fn build(self) -> std::result::Result<InferenceRunner, ConfigValidationError> {
        let config = self.config.ok_or(ConfigValidationError::MissingConfig)?;
        config.validate()?;

        Ok(InferenceRunner {
            config,
            observer: self.observer,
        })
    }
}
