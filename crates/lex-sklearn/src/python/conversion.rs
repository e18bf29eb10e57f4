//! Data conversion between Polars and the pandas/numpy objects a scikit-learn
//! pipeline consumes and returns.
//!
//! # Arrow IPC Strategy
//!
//! Tables travel as Arrow IPC **file** bytes in both directions:
//!
//! ```text
//! Polars DataFrame ─ IpcWriter ─▶ bytes ─ pyarrow.ipc.open_file ─▶ pandas DataFrame
//! pandas DataFrame ─ pyarrow.Table.from_pandas ─▶ RecordBatchFileWriter ─▶ bytes ─ IpcReader ─▶ Polars
//! ```
//!
//! The pandas index is dropped on the way back (`preserve_index=False`) so a
//! transformed frame never gains an `__index_level_0__` column.
//!
//! Label vectors and probability matrices are not tables; predictions are
//! wrapped in a one-column pandas frame so they reuse the Arrow path and keep
//! their dtype, while probabilities are coerced to `float64` with numpy and read
//! as a flat list plus shape.

use crate::error::{ArrowConversionKind, SklearnError};
use crate::types::ProbabilityArray;
use polars::prelude::*;
use pyo3::prelude::*;
use pyo3::types::{PyAnyMethods, PyBytes, PyBytesMethods, PyDict};
use std::io::Cursor;

/// Convert a Polars DataFrame to a pandas DataFrame.
///
/// # Errors
///
/// Returns [`ArrowConversionKind::Serialize`] if the frame cannot be written as
/// Arrow IPC, or a Python error if `pyarrow` fails to read it.
#[must_use = "the converted pandas DataFrame should be used"]
pub fn dataframe_to_python<'py>(
    py: Python<'py>,
    df: &DataFrame,
) -> Result<Bound<'py, PyAny>, SklearnError> {
    // IpcWriter::finish needs &mut
    let mut df = df.clone();
    let mut cursor = Cursor::new(Vec::new());
    IpcWriter::new(&mut cursor)
        .finish(&mut df)
        .map_err(|e| ArrowConversionKind::Serialize(e.to_string()))?;

    let py_bytes = PyBytes::new(py, &cursor.into_inner());
    let buffer = py.import("io")?.call_method1("BytesIO", (py_bytes,))?;
    let reader = py
        .import("pyarrow.ipc")?
        .call_method1("open_file", (buffer,))?;

    let pandas_df = reader.call_method0("read_all")?.call_method0("to_pandas")?;
    Ok(pandas_df)
}

/// Convert a pandas DataFrame to a Polars DataFrame.
///
/// Column labels are stringified by `pyarrow`, so a frame built from a bare
/// array comes back with columns `"0"`, `"1"`, ...
///
/// # Errors
///
/// Returns [`ArrowConversionKind::TypeConversion`] when the Arrow bytes cannot
/// be extracted, [`ArrowConversionKind::Deserialize`] when Polars rejects them,
/// or a Python error when `pyarrow` cannot represent a column (mixed-type
/// object columns, for instance).
#[must_use = "the converted Polars DataFrame should be used"]
pub fn python_to_dataframe(
    py: Python<'_>,
    py_df: &Bound<'_, PyAny>,
) -> Result<DataFrame, SklearnError> {
    let pyarrow = py.import("pyarrow")?;
    let pyarrow_ipc = py.import("pyarrow.ipc")?;

    let kwargs = PyDict::new(py);
    kwargs.set_item("preserve_index", false)?;
    let table = pyarrow
        .getattr("Table")?
        .call_method("from_pandas", (py_df,), Some(&kwargs))?;
    let schema = table.getattr("schema")?;

    let sink = py.import("io")?.call_method0("BytesIO")?;
    let writer = pyarrow_ipc.call_method1("RecordBatchFileWriter", (&sink, &schema))?;
    writer.call_method1("write_table", (&table,))?;
    writer.call_method0("close")?;

    let py_bytes = sink.call_method0("getvalue")?;
    let py_bytes: &Bound<'_, PyBytes> = py_bytes.cast().map_err(|e| {
        ArrowConversionKind::TypeConversion(format!("Failed to extract bytes: {}", e))
    })?;

    IpcReader::new(Cursor::new(py_bytes.as_bytes().to_vec()))
        .finish()
        .map_err(|e| ArrowConversionKind::Deserialize(e.to_string()).into())
}

/// Wrap any table-like transform output as a pandas DataFrame.
///
/// Returns the object itself when it already is one, along with `true`;
/// otherwise builds `pandas.DataFrame(obj)` (positional column labels) and
/// returns `false`. Sparse matrices are densified first.
pub fn ensure_pandas_frame<'py>(
    py: Python<'py>,
    obj: &Bound<'py, PyAny>,
) -> Result<(Bound<'py, PyAny>, bool), SklearnError> {
    let pandas = py.import("pandas")?;
    let frame_class = pandas.getattr("DataFrame")?;
    if obj.is_instance(&frame_class)? {
        return Ok((obj.clone(), true));
    }

    let dense = if obj.hasattr("toarray")? {
        obj.call_method0("toarray")?
    } else {
        obj.clone()
    };
    let frame = frame_class.call1((dense,))?;
    Ok((frame, false))
}

/// Convert the output of `predict` into a Polars Series.
///
/// The output is flattened with `numpy.ravel`, so a column vector of shape
/// `(n, 1)` yields `n` labels.
#[must_use = "the extracted predictions should be used"]
pub fn predictions_to_series(
    py: Python<'_>,
    py_predictions: &Bound<'_, PyAny>,
    name: &str,
) -> Result<Series, SklearnError> {
    let flat = py
        .import("numpy")?
        .call_method1("ravel", (py_predictions,))?;

    let columns = PyDict::new(py);
    columns.set_item(name, flat)?;
    let frame = py
        .import("pandas")?
        .call_method1("DataFrame", (columns,))?;

    let df = python_to_dataframe(py, &frame)?;
    let series = df
        .column(name)
        .map_err(|e| ArrowConversionKind::TypeConversion(e.to_string()))?
        .as_materialized_series()
        .clone();
    Ok(series)
}

/// Convert the output of `predict_proba` into a [`ProbabilityArray`].
///
/// # Errors
///
/// Returns [`SklearnError::InvalidOutput`] if the output is not numeric or has
/// more than two dimensions.
#[must_use = "the extracted probabilities should be used"]
pub fn probabilities_to_array(
    py: Python<'_>,
    py_probabilities: &Bound<'_, PyAny>,
) -> Result<ProbabilityArray, SklearnError> {
    let numpy = py.import("numpy")?;
    let kwargs = PyDict::new(py);
    kwargs.set_item("dtype", "float64")?;
    let array = numpy
        .call_method("asarray", (py_probabilities,), Some(&kwargs))
        .map_err(|e| SklearnError::InvalidOutput(format!("probabilities are not numeric: {}", e)))?;

    let shape: Vec<usize> = array.getattr("shape")?.extract()?;
    let values: Vec<f64> = array.call_method0("ravel")?.call_method0("tolist")?.extract()?;

    match shape.as_slice() {
        [rows] => Ok(ProbabilityArray::one_dimensional(values, *rows)),
        [rows, columns] => Ok(ProbabilityArray::two_dimensional(values, *rows, *columns)),
        other => Err(SklearnError::InvalidOutput(format!(
            "expected a 1-D or 2-D probability array, got shape {:?}",
            other
        ))),
    }
}

/// Map a Python exception onto a [`SklearnError`] variant.
#[must_use = "the mapped error should be returned or handled"]
pub fn map_python_error(py: Python<'_>, err: PyErr) -> SklearnError {
    let error_type = err
        .get_type(py)
        .qualname()
        .map(|s| s.to_string())
        .unwrap_or_default();

    classify_exception(&error_type, err.value(py).to_string())
}

fn classify_exception(error_type: &str, message: String) -> SklearnError {
    match error_type {
        // raised by the pipeline's own code, not a missing artifact
        "FileNotFoundError" => {
            SklearnError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, message))
        }
        "ModuleNotFoundError" | "ImportError" => SklearnError::MissingModule(message),
        "ValueError" | "KeyError" | "TypeError" => SklearnError::InvalidInput(message),
        "AttributeError" => SklearnError::Unsupported(message),
        _ => SklearnError::PythonError {
            exception: error_type.to_string(),
            message,
        },
    }
}
