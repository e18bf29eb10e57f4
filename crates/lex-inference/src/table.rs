//! CSV input and output.

use crate::error::{InferenceError, Result};
use polars::prelude::*;
use std::fs::File;
use std::io::{Cursor, ErrorKind};
use std::path::Path;
use tracing::{debug, warn};

/// Read a CSV file with a header row.
///
/// Tries quote-aware parsing first, then plain parsing, then a pass over
/// pre-cleaned text for files with doubled quotes or blank lines. Column
/// types are inferred from every row. Content that is not valid UTF-8 is
/// rejected rather than repaired. A missing file is reported as
/// [`InferenceError::FileNotFound`] regardless of when it disappeared.
pub fn read_table(path: &Path) -> Result<DataFrame> {
    let content = std::fs::read(path).map_err(|e| not_found_or_io(path, e))?;

    // Strategy 1: standard loading with quote handling
    match CsvReadOptions::default()
        .with_infer_schema_length(None)
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_quote_char(Some(b'"')))
        .into_reader_with_file_handle(Cursor::new(content.clone()))
        .finish()
    {
        Ok(df) => return Ok(df),
        Err(e) => debug!("Standard loading failed: {}", e),
    }

    // Strategy 2: without quote handling
    match CsvReadOptions::default()
        .with_infer_schema_length(None)
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_quote_char(None))
        .into_reader_with_file_handle(Cursor::new(content.clone()))
        .finish()
    {
        Ok(df) => return Ok(df),
        Err(e) => debug!("Loading without quotes failed: {}", e),
    }

    // Strategy 3: pre-clean content
    let text = String::from_utf8(content).map_err(|e| {
        InferenceError::InvalidInput(format!(
            "'{}' is not valid UTF-8 (invalid byte at offset {})",
            path.display(),
            e.utf8_error().valid_up_to()
        ))
    })?;
    let cleaned = clean_csv_content(&text);
    if cleaned != text {
        warn!(
            "Read '{}' after collapsing doubled quotes and dropping blank lines",
            path.display()
        );
    }
    CsvReadOptions::default()
        .with_infer_schema_length(None)
        .with_has_header(true)
        .into_reader_with_file_handle(Cursor::new(cleaned.into_bytes()))
        .finish()
        .map_err(|e| {
            InferenceError::Polars(e).with_context(format!("Reading '{}'", path.display()))
        })
}

fn clean_csv_content(content: &str) -> String {
    content
        .replace("\"\"\"", "\"")
        .replace("\"\"", "\"")
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Write a table as CSV with a header row and no index column.
pub fn write_table(df: &mut DataFrame, path: &Path) -> Result<()> {
    let output_error = |reason: String| InferenceError::OutputWrite {
        path: path.to_path_buf(),
        reason,
    };

    // a missing parent directory is an unwritable output, not a missing input
    let file = File::create(path).map_err(|e| output_error(e.to_string()))?;

    CsvWriter::new(file)
        .include_header(true)
        .finish(df)
        .map_err(|e| output_error(e.to_string()))
}

fn not_found_or_io(path: &Path, err: std::io::Error) -> InferenceError {
    if err.kind() == ErrorKind::NotFound {
        InferenceError::FileNotFound(format!(
            "No such file or directory: '{}'",
            path.display()
        ))
    } else {
        InferenceError::Io(err).with_context(format!("Reading '{}'", path.display()))
    }
}
