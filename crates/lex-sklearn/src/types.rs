//! Plain Rust values returned by pipeline calls.

use polars::prelude::DataFrame;

/// Output of `predict_proba`, stored row-major.
///
/// scikit-learn classifiers return an `(n_samples, n_classes)` matrix; a few
/// estimators return a flat vector instead. Both shapes are kept distinct so
/// callers can decide how many columns to emit.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityArray {
    values: Vec<f64>,
    rows: usize,
    columns: usize,
    two_dimensional: bool,
}

impl ProbabilityArray {
    /// A flat vector with one value per row.
    pub fn one_dimensional(values: Vec<f64>, rows: usize) -> Self {
        Self {
            values,
            rows,
            columns: 1,
            two_dimensional: false,
        }
    }

    /// A `rows x columns` matrix given in row-major order.
    pub fn two_dimensional(values: Vec<f64>, rows: usize, columns: usize) -> Self {
        Self {
            values,
            rows,
            columns,
            two_dimensional: true,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn is_two_dimensional(&self) -> bool {
        self.two_dimensional
    }

    /// Row-major values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

/// Output of the `cleaning` step's `transform`.
#[derive(Debug, Clone)]
pub enum CleanedOutput {
    /// The step returned a pandas DataFrame; column names are its own.
    Frame(DataFrame),
    /// The step returned an array-like; columns are named `"0"`, `"1"`, ...
    Array(DataFrame),
}

impl CleanedOutput {
    pub fn into_dataframe(self) -> DataFrame {
        match self {
            Self::Frame(df) | Self::Array(df) => df,
        }
    }

    pub fn is_frame(&self) -> bool {
        matches!(self, Self::Frame(_))
    }
}
