//! scikit-learn backend.
//!
//! Adapts [`lex_sklearn::SklearnPipeline`] to the [`Predictor`] and
//! [`Cleaner`] capabilities.

use crate::capability::{
    CleanedData, Cleaner, PipelineLoader, Predictor, ProbabilityMatrix, ProbabilityOutcome,
};
use crate::error::{InferenceError, Result};
use lex_sklearn::{CleanedOutput, CleaningStage, SklearnError, SklearnPipeline};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Loads joblib artifacts into an embedded Python interpreter.
///
/// The interpreter is started on the first [`load`](PipelineLoader::load).
#[derive(Debug, Clone, Default)]
pub struct SklearnLoader {
    extra_paths: Vec<PathBuf>,
}

impl SklearnLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make modules in `path` importable before unpickling.
    ///
    /// Needed for pipelines that contain custom transformer classes.
    pub fn with_sys_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.extra_paths.push(path.into());
        self
    }
}

impl PipelineLoader for SklearnLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn Predictor>> {
        lex_sklearn::initialize().map_err(load_error)?;
        for entry in &self.extra_paths {
            lex_sklearn::add_sys_path(entry).map_err(load_error)?;
        }

        let pipeline = SklearnPipeline::load(path).map_err(load_error)?;
        let cleaner = pipeline.cleaning_stage().map(|stage| SklearnCleaner { stage });
        info!(
            "Loaded {:?} (cleaning stage: {})",
            pipeline,
            if cleaner.is_some() { "yes" } else { "no" }
        );

        Ok(Box::new(SklearnPredictor { pipeline, cleaner }))
    }
}

/// Classify a backend error raised while setting up or loading a pipeline.
fn load_error(err: SklearnError) -> InferenceError {
    if err.is_not_found() {
        return InferenceError::FileNotFound(err.to_string());
    }
    match err {
        SklearnError::RuntimeInit(reason) => InferenceError::BackendUnavailable(reason),
        other => InferenceError::PipelineLoad(other.to_string()),
    }
}

/// Keep missing files recognizable once the error is type-erased.
fn call_error(err: SklearnError) -> anyhow::Error {
    if err.is_not_found() {
        anyhow::Error::new(InferenceError::FileNotFound(err.to_string()))
    } else {
        anyhow::Error::new(err)
    }
}

/// A loaded scikit-learn pipeline.
#[derive(Debug)]
pub struct SklearnPredictor {
    pipeline: SklearnPipeline,
    cleaner: Option<SklearnCleaner>,
}

impl Predictor for SklearnPredictor {
    fn predict(&self, raw: &DataFrame) -> anyhow::Result<Series> {
        self.pipeline.predict(raw).map_err(call_error)
    }

    fn predict_proba(&self, raw: &DataFrame) -> ProbabilityOutcome {
        match self.pipeline.predict_proba(raw) {
            Ok(array) => {
                debug!(
                    "predict_proba returned {} rows x {} columns",
                    array.rows(),
                    array.columns()
                );
                let matrix = if array.is_two_dimensional() {
                    let (rows, columns) = (array.rows(), array.columns());
                    ProbabilityMatrix::from_row_major(array.into_values(), rows, columns)
                } else {
                    Ok(ProbabilityMatrix::from_vector(array.into_values()))
                };
                match matrix {
                    Ok(matrix) => ProbabilityOutcome::Supported(matrix),
                    Err(e) => ProbabilityOutcome::Failed(e.to_string()),
                }
            }
            Err(SklearnError::Unsupported(_)) => ProbabilityOutcome::Unsupported,
            Err(e) => ProbabilityOutcome::Failed(e.to_string()),
        }
    }

    fn cleaner(&self) -> Option<&dyn Cleaner> {
        self.cleaner.as_ref().map(|c| c as &dyn Cleaner)
    }

    fn describe(&self) -> String {
        let steps = self.pipeline.step_names();
        if steps.is_empty() {
            self.pipeline.class_name()
        } else {
            format!("{}({})", self.pipeline.class_name(), steps.join(", "))
        }
    }
}

/// The pipeline's `cleaning` step.
#[derive(Debug)]
pub struct SklearnCleaner {
    stage: CleaningStage,
}

impl Cleaner for SklearnCleaner {
    fn transform(&self, raw: &DataFrame) -> anyhow::Result<CleanedData> {
        Ok(match self.stage.transform(raw).map_err(call_error)? {
            CleanedOutput::Frame(df) => CleanedData::Table(df),
            CleanedOutput::Array(df) => CleanedData::Columns(
                df.take_columns()
                    .into_iter()
                    .map(Column::take_materialized_series)
                    .collect(),
            ),
        })
    }
}
