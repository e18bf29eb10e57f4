//! Capability traits through which the runner consumes a pipeline.
//!
//! A serialized pipeline is opaque. The runner only needs three things from
//! it, each expressed as a trait method:
//!
//! - [`Predictor::predict`] - required, failure is fatal
//! - [`Predictor::predict_proba`] - optional, failure degrades to "no probabilities"
//! - [`Predictor::cleaner`] - optional [`Cleaner`] whose output is used for reporting
//!
//! Implementations report errors through `anyhow::Result`; the runner only
//! ever surfaces their description.
//!
//! # Implementing a Backend
//!
//! ```rust,ignore
//! use lex_inference::capability::{Predictor, ProbabilityOutcome};
//!
//! struct Threshold(f64);
//!
//! impl Predictor for Threshold {
//!     fn predict(&self, raw: &DataFrame) -> anyhow::Result<Series> {
//!         let x = raw.column("x")?.f64()?;
//!         Ok(x.apply_values(|v| if v > self.0 { 1.0 } else { 0.0 }).into_series())
//!     }
//!
//!     fn describe(&self) -> String {
//!         format!("Threshold({})", self.0)
//!     }
//! }
//! ```

use crate::error::Result;
use anyhow::{anyhow, ensure};
use polars::prelude::*;
use std::path::Path;

/// The prediction capability of a loaded pipeline.
///
/// Calls are made sequentially from a single thread, so implementations need
/// not be `Sync`.
pub trait Predictor {
    /// Predict one label per row of `raw`, in row order.
    fn predict(&self, raw: &DataFrame) -> anyhow::Result<Series>;

    /// Estimate class probabilities for each row of `raw`.
    ///
    /// The default reports the capability as absent.
    fn predict_proba(&self, _raw: &DataFrame) -> ProbabilityOutcome {
        ProbabilityOutcome::Unsupported
    }

    /// The pipeline's cleaning stage, if it has one.
    fn cleaner(&self) -> Option<&dyn Cleaner> {
        None
    }

    /// Short human-readable description used in logs and the run summary.
    fn describe(&self) -> String;
}

/// A stage that normalizes the raw table.
pub trait Cleaner {
    fn transform(&self, raw: &DataFrame) -> anyhow::Result<CleanedData>;
}

/// Output of a [`Cleaner`].
#[derive(Debug, Clone)]
pub enum CleanedData {
    /// A table with its own column names.
    Table(DataFrame),
    /// Bare columns (array-like output); they are renamed `"0"`, `"1"`, ...
    Columns(Vec<Series>),
}

impl CleanedData {
    /// Coerce into a rectangular table.
    pub fn into_table(self) -> PolarsResult<DataFrame> {
        match self {
            Self::Table(df) => Ok(df),
            Self::Columns(columns) => {
                let columns = columns
                    .into_iter()
                    .enumerate()
                    .map(|(i, mut series)| {
                        series.rename(i.to_string().into());
                        Column::from(series)
                    })
                    .collect::<Vec<_>>();
                DataFrame::new(columns)
            }
        }
    }
}

/// Result of asking a pipeline for probabilities.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbabilityOutcome {
    /// Probabilities were produced.
    Supported(ProbabilityMatrix),
    /// The pipeline has no probability capability.
    Unsupported,
    /// The capability exists but the call failed.
    Failed(String),
}

impl ProbabilityOutcome {
    /// Collapse every non-success case to `None`.
    pub fn into_matrix(self) -> Option<ProbabilityMatrix> {
        match self {
            Self::Supported(matrix) => Some(matrix),
            Self::Unsupported | Self::Failed(_) => None,
        }
    }
}

/// Class probabilities, stored row-major.
///
/// A 2-D matrix with at least two columns is read as negative/positive class
/// in columns 0 and 1. Anything else (a flat vector or a single column) is
/// treated as one generic probability per row.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityMatrix {
    values: Vec<f64>,
    rows: usize,
    width: usize,
    two_dimensional: bool,
}

impl ProbabilityMatrix {
    /// Build a 2-D matrix from rows. All rows must have the same length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> anyhow::Result<Self> {
        let width = rows.first().map_or(0, Vec::len);
        ensure!(
            rows.iter().all(|row| row.len() == width),
            "probability rows have different lengths"
        );
        let row_count = rows.len();
        Ok(Self {
            values: rows.into_iter().flatten().collect(),
            rows: row_count,
            width,
            two_dimensional: true,
        })
    }

    /// Build a 2-D matrix from row-major values.
    pub fn from_row_major(values: Vec<f64>, rows: usize, width: usize) -> anyhow::Result<Self> {
        if values.len() != rows * width {
            return Err(anyhow!(
                "expected {} probability values for shape ({}, {}), got {}",
                rows * width,
                rows,
                width,
                values.len()
            ));
        }
        Ok(Self {
            values,
            rows,
            width,
            two_dimensional: true,
        })
    }

    /// Build a 1-D vector with one probability per row.
    pub fn from_vector(values: Vec<f64>) -> Self {
        Self {
            rows: values.len(),
            values,
            width: 1,
            two_dimensional: false,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns; `1` for a vector.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_two_dimensional(&self) -> bool {
        self.two_dimensional
    }

    /// True when the matrix carries separate negative/positive columns.
    pub fn has_class_pair(&self) -> bool {
        self.two_dimensional && self.width >= 2
    }

    /// Values of column `index`, top to bottom.
    pub fn column(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.width {
            return None;
        }
        Some(
            self.values
                .iter()
                .skip(index)
                .step_by(self.width)
                .copied()
                .collect(),
        )
    }

    /// All values in row-major order.
    pub fn flatten(&self) -> &[f64] {
        &self.values
    }
}

/// Loads a pipeline artifact into a [`Predictor`].
pub trait PipelineLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn Predictor>>;
}

impl<F> PipelineLoader for F
where
    F: Fn(&Path) -> Result<Box<dyn Predictor>>,
{
    fn load(&self, path: &Path) -> Result<Box<dyn Predictor>> {
        self(path)
    }
}
