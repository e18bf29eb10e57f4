//! Console report and run summary.

use crate::cleaning::CleanedSource;
use crate::error::{InferenceError, Result, ResultExt};
use crate::results::{PREDICTION_COLUMN, PROBABILITY_POSITIVE_COLUMN, ProbabilityColumns, ResultsTable};
use crate::runner::InferenceOutcome;
use chrono::Local;
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::path::Path;

/// Largest class code counted with buckets; larger codes fall back to value counts.
const MAX_BUCKET_CODE: u64 = 1_000_000;

// ============================================================================
// Prediction distribution
// ============================================================================

/// How often each predicted label occurs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "counts", rename_all = "snake_case")]
pub enum PredictionDistribution {
    /// Counts of class codes `0..=max`, indexed by code.
    Buckets(Vec<u64>),
    /// Counts of distinct labels, sorted by label.
    Counts(Vec<(String, u64)>),
}

impl PredictionDistribution {
    /// Count predictions.
    ///
    /// When every prediction is a non-negative integer (or a float, boolean or
    /// string that converts to one) the result is one bucket per code from 0
    /// to the largest code. Otherwise distinct non-null labels are counted and
    /// sorted, numerically when all of them are numbers.
    pub fn from_predictions(predictions: &Series) -> Result<Self> {
        if let Some(codes) = class_codes(predictions)? {
            let max = codes.iter().copied().max();
            if max.is_none_or(|max| max <= MAX_BUCKET_CODE) {
                let mut buckets = vec![0u64; max.map_or(0, |max| max as usize + 1)];
                for code in codes {
                    buckets[code as usize] += 1;
                }
                return Ok(Self::Buckets(buckets));
            }
        }
        value_counts(predictions).map(Self::Counts)
    }
}

fn class_codes(predictions: &Series) -> Result<Option<Vec<u64>>> {
    let dtype = predictions.dtype();

    let codes: Vec<Option<u64>> = if dtype.is_integer() || dtype == &DataType::Boolean {
        predictions
            .cast(&DataType::Int64)
            .context("Casting predictions")?
            .i64()
            .context("Casting predictions")?
            .into_iter()
            .map(|v| v.and_then(|v| u64::try_from(v).ok()))
            .collect()
    } else if dtype.is_float() {
        predictions
            .cast(&DataType::Float64)
            .context("Casting predictions")?
            .f64()
            .context("Casting predictions")?
            .into_iter()
            .map(|v| {
                v.filter(|v| v.is_finite() && v.trunc() >= 0.0)
                    .map(|v| v.trunc() as u64)
            })
            .collect()
    } else if dtype == &DataType::String {
        predictions
            .str()
            .context("Reading predictions")?
            .into_iter()
            .map(|v| v.and_then(|v| v.trim().parse::<u64>().ok()))
            .collect()
    } else {
        return Ok(None);
    };

    Ok(codes.into_iter().collect())
}

fn value_counts(predictions: &Series) -> Result<Vec<(String, u64)>> {
    let labels = predictions
        .cast(&DataType::String)
        .context("Formatting predictions")?;

    let mut counts: HashMap<&str, u64> = HashMap::new();
    for label in labels.str().context("Formatting predictions")?.into_iter().flatten() {
        *counts.entry(label).or_insert(0) += 1;
    }

    let mut counts: Vec<(String, u64)> = counts
        .into_iter()
        .map(|(label, count)| (label.to_string(), count))
        .collect();

    let numeric: Option<Vec<f64>> = counts.iter().map(|(label, _)| label.parse().ok()).collect();
    match numeric {
        Some(keys) => {
            let mut keyed: Vec<(f64, (String, u64))> = keys.into_iter().zip(counts).collect();
            keyed.sort_by(|(a, _), (b, _)| a.total_cmp(b));
            counts = keyed.into_iter().map(|(_, entry)| entry).collect();
        }
        None => counts.sort_unstable_by(|(a, _), (b, _)| a.cmp(b)),
    }
    Ok(counts)
}

impl fmt::Display for PredictionDistribution {
    /// Buckets print like a numpy integer array (`[3 5]`, `[ 3 15]`); value
    /// counts print one aligned `label count` pair per line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buckets(buckets) => {
                let width = buckets
                    .iter()
                    .map(|count| count.to_string().len())
                    .max()
                    .unwrap_or(0);
                let cells: Vec<String> = buckets
                    .iter()
                    .map(|count| format!("{:>width$}", count))
                    .collect();
                write!(f, "[{}]", cells.join(" "))
            }
            Self::Counts(counts) => {
                let width = counts.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
                let lines: Vec<String> = counts
                    .iter()
                    .map(|(label, count)| format!("{:<width$}    {}", label, count))
                    .collect();
                write!(f, "{}", lines.join("\n"))
            }
        }
    }
}

// ============================================================================
// Preview
// ============================================================================

/// Columns shown in the console preview.
///
/// Identifier (if present), `Prediccion`, and `Probabilidad_Default` when the
/// pipeline produced a class pair. Empty when none of these exist, in which
/// case the preview shows every column.
pub fn preview_columns(results: &ResultsTable) -> Vec<String> {
    let mut columns = Vec::new();
    if let Some(id) = &results.id_column {
        columns.push(id.clone());
    }
    if results.df.get_column_index(PREDICTION_COLUMN).is_some() {
        columns.push(PREDICTION_COLUMN.to_string());
    }
    if results.probability_columns == ProbabilityColumns::ClassPair {
        columns.push(PROBABILITY_POSITIVE_COLUMN.to_string());
    }
    columns
}

/// First `rows` rows of the preview selection.
pub fn preview_frame(results: &DataFrame, columns: &[String], rows: usize) -> Result<DataFrame> {
    let selected = if columns.is_empty() {
        results.clone()
    } else {
        results
            .select(columns.iter().map(String::as_str))
            .context("Selecting preview columns")?
    };
    Ok(selected.head(Some(rows)))
}

// ============================================================================
// Run summary
// ============================================================================

/// Machine-readable record of one run.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceSummary {
    /// Timestamp when the summary was generated (RFC 3339)
    pub generated_at: String,
    pub input_file: String,
    pub pipeline_file: String,
    pub output_file: String,
    /// Description of the loaded pipeline
    pub pipeline: String,
    pub raw_shape: (usize, usize),
    pub cleaned_shape: (usize, usize),
    pub cleaned_source: CleanedSource,
    pub results_shape: (usize, usize),
    pub prediction_count: usize,
    pub distribution: PredictionDistribution,
    /// Probability columns written to the results
    pub probability_columns: Vec<String>,
    /// Non-fatal problems encountered during the run
    pub warnings: Vec<String>,
}

impl InferenceSummary {
    /// Stamp the current local time.
    pub fn timestamp() -> String {
        Local::now().to_rfc3339()
    }

    /// Write the summary as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| InferenceError::OutputWrite {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

// ============================================================================
// Console report
// ============================================================================

/// Render the end-of-run console text: output location, prediction count,
/// distribution and the preview of the first `preview_rows` rows.
pub fn render_report(outcome: &InferenceOutcome, preview_rows: usize) -> Result<String> {
    let summary = &outcome.summary;
    let mut out = String::new();

    // writing to a String cannot fail
    let _ = writeln!(out, "Resultados (LIMPIO) guardados en '{}'", summary.output_file);
    let _ = writeln!(out, "Predicciones realizadas: {}", summary.prediction_count);
    match &outcome.distribution {
        PredictionDistribution::Buckets(_) => {
            let _ = writeln!(out, "Distribución de predicciones: {}", outcome.distribution);
        }
        PredictionDistribution::Counts(_) => {
            let _ = writeln!(out, "Distribución de predicciones:\n{}", outcome.distribution);
        }
    }

    let preview = preview_frame(&outcome.results.df, &outcome.preview_columns, preview_rows)?;
    let _ = writeln!(out, "\nPrimeras {} filas:", preview_rows);
    let _ = writeln!(out, "{}", preview);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_integer_buckets() {
        let preds = Series::new("p".into(), &[0i64, 1, 1, 0, 1, 1, 1, 0]);
        let distribution = PredictionDistribution::from_predictions(&preds).unwrap();
        assert_eq!(distribution, PredictionDistribution::Buckets(vec![3, 5]));
        assert_eq!(distribution.to_string(), "[3 5]");
    }

    #[test]
    fn test_buckets_include_unseen_codes() {
        let preds = Series::new("p".into(), &[2i32, 2]);
        let distribution = PredictionDistribution::from_predictions(&preds).unwrap();
        assert_eq!(distribution, PredictionDistribution::Buckets(vec![0, 0, 2]));
    }

    #[test]
    fn test_bucket_display_is_right_aligned() {
        let distribution = PredictionDistribution::Buckets(vec![3, 15]);
        assert_eq!(distribution.to_string(), "[ 3 15]");
        assert_eq!(PredictionDistribution::Buckets(vec![]).to_string(), "[]");
    }

    #[test]
    fn test_float_and_bool_predictions_are_bucketed() {
        let floats = Series::new("p".into(), &[0.0f64, 1.0, 1.0]);
        assert_eq!(
            PredictionDistribution::from_predictions(&floats).unwrap(),
            PredictionDistribution::Buckets(vec![1, 2])
        );

        let bools = Series::new("p".into(), &[true, false, true]);
        assert_eq!(
            PredictionDistribution::from_predictions(&bools).unwrap(),
            PredictionDistribution::Buckets(vec![1, 2])
        );
    }

    #[test]
    fn test_numeric_strings_are_bucketed() {
        let preds = Series::new("p".into(), &["1", "0", "1"]);
        assert_eq!(
            PredictionDistribution::from_predictions(&preds).unwrap(),
            PredictionDistribution::Buckets(vec![1, 2])
        );
    }

    #[test]
    fn test_string_labels_fall_back_to_sorted_counts() {
        let preds = Series::new("p".into(), &["si", "no", "si", "no", "si"]);
        let distribution = PredictionDistribution::from_predictions(&preds).unwrap();
        assert_eq!(
            distribution,
            PredictionDistribution::Counts(vec![("no".to_string(), 2), ("si".to_string(), 3)])
        );
        assert_eq!(distribution.to_string(), "no    2\nsi    3");
    }

    #[test]
    fn test_negative_codes_fall_back_to_numeric_order() {
        let preds = Series::new("p".into(), &[10i64, -1, 2, 10]);
        assert_eq!(
            PredictionDistribution::from_predictions(&preds).unwrap(),
            PredictionDistribution::Counts(vec![
                ("-1".to_string(), 1),
                ("2".to_string(), 1),
                ("10".to_string(), 2),
            ])
        );
    }

    #[test]
    fn test_many_distinct_labels_are_counted_once_each() {
        let codes: Vec<i64> = (0..40_000).map(|i| -i).chain([-7, -7]).collect();
        let preds = Series::new("p".into(), codes);

        let PredictionDistribution::Counts(counts) =
            PredictionDistribution::from_predictions(&preds).unwrap()
        else {
            panic!("negative codes must be value counts");
        };
        assert_eq!(counts.len(), 40_000);
        assert_eq!(counts[0], ("-39999".to_string(), 1));
        assert_eq!(counts[39_999], ("0".to_string(), 1));
        assert_eq!(counts.iter().find(|(label, _)| label == "-7").map(|(_, c)| *c), Some(3));
    }

    #[test]
    fn test_nulls_are_not_counted() {
        let preds = Series::new("p".into(), &[Some(1i64), None, Some(1)]);
        assert_eq!(
            PredictionDistribution::from_predictions(&preds).unwrap(),
            PredictionDistribution::Counts(vec![("1".to_string(), 2)])
        );
    }

    #[test]
    fn test_preview_columns() {
        let df = df! {
            "ID" => &[1i64, 2],
            "Prediccion" => &[0i64, 1],
            "Probabilidad_No_Default" => &[0.8f64, 0.3],
            "Probabilidad_Default" => &[0.2f64, 0.7],
        }
        .unwrap();
        let results = ResultsTable {
            df,
            id_column: Some("ID".to_string()),
            probability_columns: ProbabilityColumns::ClassPair,
        };

        assert_eq!(
            preview_columns(&results),
            vec!["ID", "Prediccion", "Probabilidad_Default"]
        );

        let preview = preview_frame(&results.df, &preview_columns(&results), 1).unwrap();
        assert_eq!(preview.shape(), (1, 3));
    }

    #[test]
    fn test_preview_single_probability_not_shown() {
        let df = df! {
            "x" => &[5i64, 7],
            "Prediccion" => &[0i64, 1],
            "Probabilidad" => &[0.2f64, 0.7],
        }
        .unwrap();
        let results = ResultsTable {
            df,
            id_column: None,
            probability_columns: ProbabilityColumns::Single,
        };
        assert_eq!(preview_columns(&results), vec!["Prediccion"]);
    }

    #[test]
    fn test_empty_preview_selection_shows_all_columns() {
        let df = df! { "a" => &[1i64, 2, 3], "b" => &[4i64, 5, 6] }.unwrap();
        let preview = preview_frame(&df, &[], 2).unwrap();
        assert_eq!(preview.shape(), (2, 2));
    }

    #[test]
    fn test_distribution_serialization() {
        let json = serde_json::to_string(&PredictionDistribution::Buckets(vec![3, 5])).unwrap();
        assert_eq!(json, r#"{"kind":"buckets","counts":[3,5]}"#);
    }
}
