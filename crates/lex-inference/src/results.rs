//! Assembly of the results table.
//!
//! Column order of the output:
//!
//! ```text
//! [ID] | cleaned columns... | Prediccion | Probabilidad_No_Default, Probabilidad_Default
//!                                        | or Probabilidad
//! ```
//!
//! Every column is aligned to the raw table by row position.

use crate::capability::ProbabilityMatrix;
use crate::error::{InferenceError, Result, ResultExt};
use polars::prelude::*;
use serde::Serialize;

pub const PREDICTION_COLUMN: &str = "Prediccion";
pub const PROBABILITY_NEGATIVE_COLUMN: &str = "Probabilidad_No_Default";
pub const PROBABILITY_POSITIVE_COLUMN: &str = "Probabilidad_Default";
pub const PROBABILITY_COLUMN: &str = "Probabilidad";

/// Which probability columns ended up in the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbabilityColumns {
    None,
    /// `Probabilidad_No_Default` and `Probabilidad_Default`.
    ClassPair,
    /// A single `Probabilidad` column.
    Single,
}

impl ProbabilityColumns {
    pub fn names(&self) -> &'static [&'static str] {
        match self {
            Self::None => &[],
            Self::ClassPair => &[PROBABILITY_NEGATIVE_COLUMN, PROBABILITY_POSITIVE_COLUMN],
            Self::Single => &[PROBABILITY_COLUMN],
        }
    }
}

/// The assembled output table.
#[derive(Debug, Clone)]
pub struct ResultsTable {
    pub df: DataFrame,
    /// The identifier column, if the results contain it.
    pub id_column: Option<String>,
    pub probability_columns: ProbabilityColumns,
}

/// Check that a probability matrix lines up with `rows` input rows.
///
/// Returns a description of the mismatch, if any.
pub fn probability_shape_problem(matrix: &ProbabilityMatrix, rows: usize) -> Option<String> {
    if matrix.has_class_pair() {
        (matrix.rows() != rows).then(|| {
            format!(
                "probability matrix has {} rows for {} input rows",
                matrix.rows(),
                rows
            )
        })
    } else {
        let values = matrix.flatten().len();
        (values != rows).then(|| {
            format!(
                "probability output has {} values for {} input rows",
                values, rows
            )
        })
    }
}

/// Build the results table.
///
/// Starts from `cleaned`, moves the identifier column from `raw` to the front
/// when `cleaned` lacks it, then appends predictions and probabilities.
/// `cleaned` must have one row per raw row.
pub fn assemble_results(
    raw: &DataFrame,
    cleaned: &DataFrame,
    id_column: &str,
    predictions: &Series,
    probabilities: Option<&ProbabilityMatrix>,
) -> Result<ResultsTable> {
    let rows = raw.height();
    if predictions.len() != rows {
        return Err(InferenceError::RowCountMismatch {
            expected: rows,
            actual: predictions.len(),
        });
    }

    let mut df = cleaned.clone();

    if has_column(raw, id_column) && !has_column(&df, id_column) {
        let id = raw.column(id_column).context("Copying identifier column")?.clone();
        df.insert_column(0, id)
            .context("Inserting identifier column")?;
    }

    let mut prediction = predictions.clone();
    prediction.rename(PREDICTION_COLUMN.into());
    df.with_column(prediction)
        .context("Appending predictions")?;

    let probability_columns = match probabilities {
        None => ProbabilityColumns::None,
        Some(matrix) if matrix.has_class_pair() => {
            for (index, name) in [PROBABILITY_NEGATIVE_COLUMN, PROBABILITY_POSITIVE_COLUMN]
                .into_iter()
                .enumerate()
            {
                let values = matrix.column(index).unwrap_or_default();
                df.with_column(Series::new(name.into(), values))
                    .context("Appending probabilities")?;
            }
            ProbabilityColumns::ClassPair
        }
        Some(matrix) => {
            df.with_column(Series::new(PROBABILITY_COLUMN.into(), matrix.flatten()))
                .context("Appending probabilities")?;
            ProbabilityColumns::Single
        }
    };

    let id_column = has_column(&df, id_column).then(|| id_column.to_string());

    Ok(ResultsTable {
        df,
        id_column,
        probability_columns,
    })
}

fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_index(name).is_some()
}
