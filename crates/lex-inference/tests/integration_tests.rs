//! Integration tests for the inference runner.
//!
//! Pipelines are in-memory fakes implementing the capability traits, so these
//! tests run without a Python interpreter.

use lex_inference::{
    CleanedData, CleanedSource, Cleaner, InferenceConfig, InferenceError, InferenceOutcome,
    InferenceResult, InferenceRunner, PredictionDistribution, Predictor, ProbabilityMatrix,
    ProbabilityOutcome, RunEvent, read_table, render_report,
};
use polars::prelude::*;
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ============================================================================
// Fake Pipelines
// ============================================================================

#[derive(Clone)]
enum FakeCleaner {
    DropColumn(&'static str),
    Fail(&'static str),
    Array,
}

impl Cleaner for FakeCleaner {
    fn transform(&self, raw: &DataFrame) -> anyhow::Result<CleanedData> {
        match self {
            Self::DropColumn(name) => Ok(CleanedData::Table(raw.drop(name)?)),
            Self::Fail(reason) => Err(anyhow::anyhow!("{}", reason)),
            Self::Array => {
                let x = raw.column("x")?.as_materialized_series().cast(&DataType::Float64)?;
                let doubled = (&x * 2.0).with_name("doubled".into());
                Ok(CleanedData::Columns(vec![x, doubled]))
            }
        }
    }
}

#[derive(Clone)]
struct FakePipeline {
    predict: fn(&DataFrame) -> anyhow::Result<Series>,
    predict_proba: fn(&DataFrame) -> ProbabilityOutcome,
    cleaner: Option<FakeCleaner>,
}

impl Predictor for FakePipeline {
    fn predict(&self, raw: &DataFrame) -> anyhow::Result<Series> {
        (self.predict)(raw)
    }

    fn predict_proba(&self, raw: &DataFrame) -> ProbabilityOutcome {
        (self.predict_proba)(raw)
    }

    fn cleaner(&self) -> Option<&dyn Cleaner> {
        self.cleaner.as_ref().map(|c| c as &dyn Cleaner)
    }

    fn describe(&self) -> String {
        "FakePipeline".to_string()
    }
}

fn scenario_predict(_raw: &DataFrame) -> anyhow::Result<Series> {
    Ok(Series::new("p".into(), &[0i64, 1]))
}

fn scenario_proba(_raw: &DataFrame) -> ProbabilityOutcome {
    ProbabilityOutcome::Supported(
        ProbabilityMatrix::from_rows(vec![vec![0.8, 0.2], vec![0.3, 0.7]]).unwrap(),
    )
}

fn failing_proba(_raw: &DataFrame) -> ProbabilityOutcome {
    ProbabilityOutcome::Failed("predict_proba is not available when voting='hard'".to_string())
}

fn no_proba(_raw: &DataFrame) -> ProbabilityOutcome {
    ProbabilityOutcome::Unsupported
}

/// Label is `ID % 2`.
fn parity_predict(raw: &DataFrame) -> anyhow::Result<Series> {
    let ids = raw.column("ID")?.as_materialized_series().cast(&DataType::Int64)?;
    Ok(ids.i64()?.apply_values(|id| id % 2).into_series())
}

/// Positive-class probability is `ID / 100`.
fn id_proba(raw: &DataFrame) -> ProbabilityOutcome {
    let rows = raw
        .column("ID")
        .unwrap()
        .as_materialized_series()
        .cast(&DataType::Float64)
        .unwrap()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .map(|id| vec![1.0 - id / 100.0, id / 100.0])
        .collect();
    ProbabilityOutcome::Supported(ProbabilityMatrix::from_rows(rows).unwrap())
}

fn fake(
    predict: fn(&DataFrame) -> anyhow::Result<Series>,
    predict_proba: fn(&DataFrame) -> ProbabilityOutcome,
) -> FakePipeline {
    FakePipeline {
        predict,
        predict_proba,
        cleaner: None,
    }
}

fn loader(pipeline: FakePipeline) -> impl Fn(&Path) -> InferenceResult<Box<dyn Predictor>> {
    move |_path: &Path| Ok(Box::new(pipeline.clone()) as Box<dyn Predictor>)
}

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

const SCENARIO_CSV: &str = "ID,x\n1,5\n2,7\n";

struct Workspace {
    dir: TempDir,
    input: PathBuf,
    pipeline: PathBuf,
    output: PathBuf,
}

fn workspace(csv: &str) -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.csv");
    let pipeline = dir.path().join("model.pkl");
    let output = dir.path().join("results.csv");
    std::fs::write(&input, csv).unwrap();
    std::fs::write(&pipeline, b"not a real pickle").unwrap();
    Workspace {
        dir,
        input,
        pipeline,
        output,
    }
}

fn fixture_workspace(name: &str) -> Workspace {
    let csv = std::fs::read_to_string(fixtures_path().join(name)).unwrap();
    workspace(&csv)
}

fn config(ws: &Workspace) -> InferenceConfig {
    InferenceConfig::builder()
        .input_path(&ws.input)
        .pipeline_path(&ws.pipeline)
        .output_path(&ws.output)
        .build()
        .unwrap()
}

/// Run with an event recorder attached.
fn run_recorded(
    config: InferenceConfig,
    pipeline: FakePipeline,
) -> (InferenceResult<InferenceOutcome>, Vec<RunEvent>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let runner = InferenceRunner::builder()
        .config(config)
        .on_event(move |event| sink.lock().unwrap().push(event.clone()))
        .build()
        .unwrap();

    let result = runner.run(&loader(pipeline));
    let events = events.lock().unwrap().clone();
    (result, events)
}

fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|c| c.to_string()).collect()
}

fn i64_values(df: &DataFrame, name: &str) -> Vec<i64> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .cast(&DataType::Int64)
        .unwrap()
        .i64()
        .unwrap()
        .into_no_null_iter()
        .collect()
}

fn f64_values(df: &DataFrame, name: &str) -> Vec<f64> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .cast(&DataType::Float64)
        .unwrap()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .collect()
}

fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-9, "expected {}, got {}", e, a);
    }
}

// ============================================================================
// Reference Scenarios
// ============================================================================

#[test]
fn test_scenario_with_class_probabilities() {
    let ws = workspace(SCENARIO_CSV);
    let (result, _) = run_recorded(config(&ws), fake(scenario_predict, scenario_proba));
    let outcome = result.unwrap();

    let written = read_table(&ws.output).unwrap();
    assert_eq!(
        column_names(&written),
        vec![
            "ID",
            "x",
            "Prediccion",
            "Probabilidad_No_Default",
            "Probabilidad_Default"
        ]
    );
    assert_eq!(i64_values(&written, "ID"), vec![1, 2]);
    assert_eq!(i64_values(&written, "x"), vec![5, 7]);
    assert_eq!(i64_values(&written, "Prediccion"), vec![0, 1]);
    assert_close(&f64_values(&written, "Probabilidad_No_Default"), &[0.8, 0.3]);
    assert_close(&f64_values(&written, "Probabilidad_Default"), &[0.2, 0.7]);

    assert_eq!(outcome.summary.prediction_count, 2);
    assert_eq!(
        outcome.preview_columns,
        vec!["ID", "Prediccion", "Probabilidad_Default"]
    );
}

#[test]
fn test_scenario_with_failing_probabilities() {
    let ws = workspace(SCENARIO_CSV);
    let (result, events) = run_recorded(config(&ws), fake(scenario_predict, failing_proba));
    let outcome = result.unwrap();

    let written = read_table(&ws.output).unwrap();
    assert_eq!(column_names(&written), vec!["ID", "x", "Prediccion"]);
    assert_eq!(i64_values(&written, "Prediccion"), vec![0, 1]);

    assert!(events.iter().any(|event| matches!(
        event,
        RunEvent::ProbabilitiesUnavailable { reason: Some(reason) } if reason.contains("voting")
    )));
    assert!(outcome.summary.probability_columns.is_empty());
    assert_eq!(outcome.preview_columns, vec!["ID", "Prediccion"]);
}

// ============================================================================
// Row Alignment and Fallback
// ============================================================================

#[test]
fn test_rows_stay_aligned_with_input() {
    let ws = fixture_workspace("credit_sample.csv");
    let (result, _) = run_recorded(config(&ws), fake(parity_predict, id_proba));
    result.unwrap();

    let raw = read_table(&ws.input).unwrap();
    let written = read_table(&ws.output).unwrap();
    assert_eq!(written.height(), raw.height());

    let ids = i64_values(&written, "ID");
    assert_eq!(ids, i64_values(&raw, "ID"));
    let expected_labels: Vec<i64> = ids.iter().map(|id| id % 2).collect();
    assert_eq!(i64_values(&written, "Prediccion"), expected_labels);
    let expected_proba: Vec<f64> = ids.iter().map(|id| *id as f64 / 100.0).collect();
    assert_close(&f64_values(&written, "Probabilidad_Default"), &expected_proba);
}

#[test]
fn test_without_cleaning_stage_raw_columns_are_kept() {
    let ws = fixture_workspace("credit_sample.csv");
    let (result, events) = run_recorded(config(&ws), fake(parity_predict, no_proba));
    let outcome = result.unwrap();

    let raw = read_table(&ws.input).unwrap();
    let written = read_table(&ws.output).unwrap();
    for name in raw.get_column_names() {
        assert!(
            written.column(name.as_str()).unwrap().as_materialized_series().equals(
                raw.column(name.as_str()).unwrap().as_materialized_series()
            ),
            "column {} differs",
            name
        );
    }
    assert_eq!(written.width(), raw.width() + 1);
    assert_eq!(outcome.summary.cleaned_source, CleanedSource::RawCopy);
    assert!(events.iter().any(|event| matches!(
        event,
        RunEvent::ProbabilitiesUnavailable { reason: None }
    )));
}

#[test]
fn test_failing_cleaning_stage_falls_back_with_warning() {
    let ws = workspace(SCENARIO_CSV);
    let mut pipeline = fake(scenario_predict, scenario_proba);
    pipeline.cleaner = Some(FakeCleaner::Fail("column 'x' has unexpected dtype"));

    let (result, events) = run_recorded(config(&ws), pipeline);
    let outcome = result.unwrap();

    assert!(events.iter().any(|event| matches!(
        event,
        RunEvent::CleaningFallback { reason } if reason.contains("unexpected dtype")
    )));
    assert!(matches!(
        outcome.summary.cleaned_source,
        CleanedSource::Fallback(_)
    ));

    let written = read_table(&ws.output).unwrap();
    assert_eq!(i64_values(&written, "x"), vec![5, 7]);
}

// ============================================================================
// Probability Shapes
// ============================================================================

fn single_column_proba(_raw: &DataFrame) -> ProbabilityOutcome {
    ProbabilityOutcome::Supported(ProbabilityMatrix::from_rows(vec![vec![0.4], vec![0.9]]).unwrap())
}

fn vector_proba(_raw: &DataFrame) -> ProbabilityOutcome {
    ProbabilityOutcome::Supported(ProbabilityMatrix::from_vector(vec![0.4, 0.9]))
}

fn short_proba(_raw: &DataFrame) -> ProbabilityOutcome {
    ProbabilityOutcome::Supported(ProbabilityMatrix::from_rows(vec![vec![0.5, 0.5]]).unwrap())
}

#[test]
fn test_single_column_probabilities() {
    for proba in [single_column_proba as fn(&DataFrame) -> ProbabilityOutcome, vector_proba] {
        let ws = workspace(SCENARIO_CSV);
        let (result, _) = run_recorded(config(&ws), fake(scenario_predict, proba));
        let outcome = result.unwrap();

        let written = read_table(&ws.output).unwrap();
        assert_eq!(column_names(&written), vec!["ID", "x", "Prediccion", "Probabilidad"]);
        assert_close(&f64_values(&written, "Probabilidad"), &[0.4, 0.9]);
        assert_eq!(outcome.preview_columns, vec!["ID", "Prediccion"]);
    }
}

#[test]
fn test_misaligned_probabilities_are_dropped() {
    let ws = workspace(SCENARIO_CSV);
    let (result, events) = run_recorded(config(&ws), fake(scenario_predict, short_proba));
    result.unwrap();

    let written = read_table(&ws.output).unwrap();
    assert_eq!(column_names(&written), vec!["ID", "x", "Prediccion"]);
    assert!(
        events
            .iter()
            .any(|event| matches!(event, RunEvent::ProbabilitiesUnavailable { reason: Some(_) }))
    );
}

// ============================================================================
// Identifier Handling
// ============================================================================

#[test]
fn test_identifier_restored_when_cleaning_drops_it() {
    let ws = fixture_workspace("credit_sample.csv");
    let mut pipeline = fake(parity_predict, id_proba);
    pipeline.cleaner = Some(FakeCleaner::DropColumn("ID"));

    let (result, _) = run_recorded(config(&ws), pipeline);
    let outcome = result.unwrap();

    let raw = read_table(&ws.input).unwrap();
    let written = read_table(&ws.output).unwrap();
    assert_eq!(column_names(&written)[0], "ID");
    assert_eq!(i64_values(&written, "ID"), i64_values(&raw, "ID"));
    assert_eq!(outcome.summary.cleaned_shape, (raw.height(), raw.width() - 1));
    assert_eq!(outcome.summary.cleaned_source, CleanedSource::CleaningStage);
}

#[test]
fn test_absent_identifier_is_not_added() {
    let ws = workspace("x\n5\n7\n");
    let (result, _) = run_recorded(config(&ws), fake(scenario_predict, scenario_proba));
    let outcome = result.unwrap();

    let written = read_table(&ws.output).unwrap();
    assert_eq!(
        column_names(&written),
        vec!["x", "Prediccion", "Probabilidad_No_Default", "Probabilidad_Default"]
    );
    assert_eq!(
        outcome.preview_columns,
        vec!["Prediccion", "Probabilidad_Default"]
    );
}

#[test]
fn test_custom_identifier_column() {
    let ws = workspace("customer_id,x\n10,5\n20,7\n");
    let config = InferenceConfig::builder()
        .input_path(&ws.input)
        .pipeline_path(&ws.pipeline)
        .output_path(&ws.output)
        .id_column("customer_id")
        .build()
        .unwrap();
    let mut pipeline = fake(scenario_predict, no_proba);
    pipeline.cleaner = Some(FakeCleaner::DropColumn("customer_id"));

    let (result, _) = run_recorded(config, pipeline);
    result.unwrap();

    let written = read_table(&ws.output).unwrap();
    assert_eq!(column_names(&written), vec!["customer_id", "x", "Prediccion"]);
    assert_eq!(i64_values(&written, "customer_id"), vec![10, 20]);
}

#[test]
fn test_array_cleaning_output_gets_positional_names() {
    let ws = workspace(SCENARIO_CSV);
    let mut pipeline = fake(scenario_predict, no_proba);
    pipeline.cleaner = Some(FakeCleaner::Array);

    let (result, _) = run_recorded(config(&ws), pipeline);
    result.unwrap();

    let written = read_table(&ws.output).unwrap();
    assert_eq!(column_names(&written), vec!["ID", "0", "1", "Prediccion"]);
    assert_close(&f64_values(&written, "1"), &[10.0, 14.0]);
}

// ============================================================================
// Fatal Errors
// ============================================================================

fn short_predict(_raw: &DataFrame) -> anyhow::Result<Series> {
    Ok(Series::new("p".into(), &[1i64]))
}

fn failing_predict(_raw: &DataFrame) -> anyhow::Result<Series> {
    Err(anyhow::anyhow!("columns are missing: {{'LIMIT_BAL'}}"))
}

#[test]
fn test_prediction_length_mismatch_is_fatal() {
    let ws = workspace(SCENARIO_CSV);
    let (result, _) = run_recorded(config(&ws), fake(short_predict, no_proba));

    let err = result.unwrap_err();
    assert!(matches!(
        err,
        InferenceError::RowCountMismatch {
            expected: 2,
            actual: 1
        }
    ));
    assert_eq!(err.exit_code(), 2);
    assert!(!ws.output.exists());
}

#[test]
fn test_prediction_failure_is_fatal() {
    let ws = workspace(SCENARIO_CSV);
    let (result, _) = run_recorded(config(&ws), fake(failing_predict, scenario_proba));

    let err = result.unwrap_err();
    assert_eq!(err.error_code(), "PREDICTION_FAILED");
    assert!(err.to_string().contains("LIMIT_BAL"));
    assert_eq!(err.exit_code(), 2);
    assert!(!ws.output.exists());
}

#[test]
fn test_missing_inputs_exit_with_one() {
    let ws = workspace(SCENARIO_CSV);
    std::fs::remove_file(&ws.pipeline).unwrap();

    let (result, events) = run_recorded(config(&ws), fake(scenario_predict, scenario_proba));
    let err = result.unwrap_err();
    assert_eq!(err.exit_code(), 1);
    assert!(err.to_string().contains("model.pkl"));
    assert!(events.is_empty());
    assert!(!ws.output.exists());
}

#[test]
fn test_unwritable_output_exits_with_two() {
    let ws = workspace(SCENARIO_CSV);
    let config = InferenceConfig::builder()
        .input_path(&ws.input)
        .pipeline_path(&ws.pipeline)
        .output_path(ws.dir.path().join("missing").join("results.csv"))
        .build()
        .unwrap();

    let (result, _) = run_recorded(config, fake(scenario_predict, scenario_proba));
    let err = result.unwrap_err();
    assert_eq!(err.error_code(), "OUTPUT_WRITE_FAILED");
    assert_eq!(err.exit_code(), 2);
}

// ============================================================================
// Report and Summary
// ============================================================================

fn label_predict(_raw: &DataFrame) -> anyhow::Result<Series> {
    Ok(Series::new("p".into(), &["si", "no"]))
}

#[test]
fn test_report_text() {
    let ws = workspace(SCENARIO_CSV);
    let (result, _) = run_recorded(config(&ws), fake(scenario_predict, scenario_proba));
    let outcome = result.unwrap();

    let report = render_report(&outcome, 10).unwrap();
    assert!(report.contains(&format!(
        "Resultados (LIMPIO) guardados en '{}'",
        ws.output.display()
    )));
    assert!(report.contains("Predicciones realizadas: 2"));
    assert!(report.contains("Distribución de predicciones: [1 1]"));
    assert!(report.contains("Primeras 10 filas:"));
    assert!(report.contains("Probabilidad_Default"));
    assert!(!report.contains("Probabilidad_No_Default"));
}

#[test]
fn test_string_labels_use_value_counts() {
    let ws = workspace(SCENARIO_CSV);
    let (result, _) = run_recorded(config(&ws), fake(label_predict, no_proba));
    let outcome = result.unwrap();

    assert_eq!(
        outcome.distribution,
        PredictionDistribution::Counts(vec![("no".to_string(), 1), ("si".to_string(), 1)])
    );
}

#[test]
fn test_summary_json_is_written() {
    let ws = workspace(SCENARIO_CSV);
    let summary_path = ws.dir.path().join("summary.json");
    let config = InferenceConfig::builder()
        .input_path(&ws.input)
        .pipeline_path(&ws.pipeline)
        .output_path(&ws.output)
        .summary_path(&summary_path)
        .build()
        .unwrap();

    let (result, events) = run_recorded(config, fake(scenario_predict, failing_proba));
    result.unwrap();

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary_path).unwrap()).unwrap();
    assert_eq!(summary["prediction_count"], 2);
    assert_eq!(summary["pipeline"], "FakePipeline");
    assert_eq!(summary["distribution"]["kind"], "buckets");
    assert_eq!(summary["cleaned_source"]["kind"], "raw_copy");
    assert!(summary["generated_at"].as_str().is_some());
    assert_eq!(summary["warnings"].as_array().unwrap().len(), 1);
    assert!(matches!(events.last(), Some(RunEvent::SummaryWritten { .. })));
}

#[test]
fn test_event_order() {
    let ws = workspace(SCENARIO_CSV);
    let mut pipeline = fake(scenario_predict, failing_proba);
    pipeline.cleaner = Some(FakeCleaner::Fail("boom"));

    let (result, events) = run_recorded(config(&ws), pipeline);
    result.unwrap();

    let kinds: Vec<&str> = events
        .iter()
        .map(|event| match event {
            RunEvent::RawTableLoaded { .. } => "raw",
            RunEvent::PipelineLoaded { .. } => "pipeline",
            RunEvent::CleaningFallback { .. } => "fallback",
            RunEvent::CleanedTableDerived { .. } => "cleaned",
            RunEvent::ProbabilitiesUnavailable { .. } => "no_proba",
            RunEvent::ResultsWritten { .. } => "written",
            RunEvent::SummaryWritten { .. } => "summary",
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["raw", "pipeline", "fallback", "cleaned", "no_proba", "written"]
    );
}
