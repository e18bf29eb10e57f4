//! CLI entry point for the batch inference runner.

use clap::Parser;
use dotenv::dotenv;
use lex_inference::{
    DEFAULT_ID_COLUMN, DEFAULT_OUTPUT_PATH, DEFAULT_PREVIEW_ROWS, InferenceConfig,
    InferenceError, InferenceRunner, PipelineLoader, RunEvent, render_report,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error};

#[derive(Parser, Debug)]
#[command(
    author = "Lex Machina Team",
    version,
    about = "Batch inference with a trained pipeline, exporting the cleaned table",
    long_about = "Runs a serialized scikit-learn pipeline over a CSV file and writes the\n\
                  pipeline's cleaned view of the data together with the predictions.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  LEX_PYTHON_RUNTIME_DIR    Bundled Python runtime to use instead of the system one\n  \
                  RUST_LOG                  Log filter (overrides --log-level)\n\n\
                  EXAMPLES:\n  \
                  lex-inference --csv test_inferencia.csv --pkl random_forest_pipeline.pkl\n\n  \
                  # Custom output and identifier column\n  \
                  lex-inference --csv data.csv --pkl model.pkl --out results.csv --id-col customer_id"
)]
struct Args {
    /// Path to the input CSV (raw data)
    #[arg(long)]
    csv: PathBuf,

    /// Path to the trained pipeline (.pkl, joblib)
    #[arg(long)]
    pkl: PathBuf,

    /// Path of the output CSV
    #[arg(long, default_value = DEFAULT_OUTPUT_PATH)]
    out: PathBuf,

    /// Identifier column kept at the front of the results (if present)
    #[arg(long, default_value = DEFAULT_ID_COLUMN)]
    id_col: String,

    /// Rows shown in the preview
    #[arg(long, default_value_t = DEFAULT_PREVIEW_ROWS)]
    head: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Suppress progress output (notices and the final report still print)
    #[arg(short, long)]
    quiet: bool,

    /// Also write a JSON run summary to this path
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Directory added to Python's module path before loading the pipeline
    ///
    /// Needed when the pipeline pickles custom transformer classes.
    /// May be given more than once.
    #[arg(long = "py-path")]
    py_path: Vec<PathBuf>,
}

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr; stdout carries the report.
fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Load environment variables from .env file
    dotenv().ok();

    init_logging(&args.log_level);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let inference_error = err.downcast_ref::<InferenceError>();
            error!(
                code = inference_error.map_or("UNCLASSIFIED", InferenceError::error_code),
                "Inference failed: {:#}", err
            );

            match inference_error {
                Some(e @ InferenceError::InputNotFound { .. }) => eprintln!("\n{}", e),
                Some(e) if e.is_not_found() => eprintln!("\nArchivo no encontrado: {}", e),
                _ => eprintln!("\nError al procesar inferencia: {:#}", err),
            }

            ExitCode::from(inference_error.map_or(2, InferenceError::exit_code))
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let mut config = InferenceConfig::builder()
        .input_path(&args.csv)
        .pipeline_path(&args.pkl)
        .output_path(&args.out)
        .id_column(&args.id_col)
        .preview_rows(args.head);
    if let Some(path) = &args.summary_json {
        config = config.summary_path(path);
    }

    let quiet = args.quiet;
    let runner = InferenceRunner::builder()
        .config(config.build()?)
        .on_event(move |event| print_event(event, quiet))
        .build()?;

    let loader = pipeline_loader(args);
    let outcome = runner.run(loader.as_ref())?;

    print!("{}", render_report(&outcome, args.head)?);
    Ok(())
}

/// Console output for run events.
///
/// Note: `println!`/`eprintln!` are used intentionally; this is the user-facing
/// progress output and must show regardless of the log level.
fn print_event(event: &RunEvent, quiet: bool) {
    match event {
        RunEvent::RawTableLoaded { path, shape } if !quiet => {
            println!("\n=== INFERENCIA EN ARCHIVO DE PRUEBA ===");
            println!("Archivo de entrada: {}", path.display());
            println!("Forma del archivo de prueba (crudo): {:?}", shape);
        }
        RunEvent::CleaningFallback { reason } => {
            eprintln!("[Aviso] No fue posible obtener el DataFrame limpio: {}", reason);
        }
        RunEvent::CleanedTableDerived { shape, .. } if !quiet => {
            println!("Forma del archivo de prueba (limpio): {:?}", shape);
        }
        RunEvent::ProbabilitiesUnavailable { .. } => {
            println!("[Aviso] El estimador no soporta predict_proba; no se guardarán probabilidades.");
        }
        RunEvent::SummaryWritten { path } if !quiet => {
            println!("Resumen guardado en '{}'", path.display());
        }
        other => debug!("{:?}", other),
    }
}

#[cfg(feature = "sklearn")]
fn pipeline_loader(args: &Args) -> Box<dyn PipelineLoader> {
    let loader = args
        .py_path
        .iter()
        .fold(lex_inference::SklearnLoader::new(), |loader, path| {
            loader.with_sys_path(path)
        });
    Box::new(loader)
}

#[cfg(not(feature = "sklearn"))]
fn pipeline_loader(_args: &Args) -> Box<dyn PipelineLoader> {
    use lex_inference::{InferenceResult, Predictor};
    use std::path::Path;

    Box::new(|_: &Path| -> InferenceResult<Box<dyn Predictor>> {
        Err(InferenceError::BackendUnavailable(
            "built without the `sklearn` feature".to_string(),
        ))
    })
}
