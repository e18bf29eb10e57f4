//! Serialized scikit-learn pipeline wrapper.
//!
//! [`SklearnPipeline`] holds the object returned by `joblib.load` and exposes
//! the three calls an inference run needs: `predict`, `predict_proba` and the
//! `transform` of an optional step named `cleaning`.
//!
//! # Example
//!
//! ```rust,ignore
//! use lex_sklearn::{initialize, SklearnPipeline};
//!
//! initialize()?;
//! let pipeline = SklearnPipeline::load("random_forest_pipeline.pkl")?;
//!
//! let labels = pipeline.predict(&raw)?;
//! if pipeline.supports_predict_proba() {
//!     let probabilities = pipeline.predict_proba(&raw)?;
//! }
//! if let Some(stage) = pipeline.cleaning_stage() {
//!     let cleaned = stage.transform(&raw)?;
//! }
//! ```
//!
//! # Security
//!
//! Unpickling runs arbitrary code. Only load artifacts from trusted sources.

use crate::error::SklearnError;
use crate::python::conversion;
use crate::types::{CleanedOutput, ProbabilityArray};
use polars::prelude::{DataFrame, Series};
use pyo3::prelude::*;
use pyo3::types::PyAnyMethods;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Name of the optional pipeline step whose output is used for reporting.
pub const CLEANING_STEP: &str = "cleaning";

/// Name given to the Series returned by [`SklearnPipeline::predict`].
const PREDICTION_SERIES: &str = "prediction";

/// A pipeline loaded from a joblib/pickle artifact.
///
/// The object is GIL-independent; every method attaches to the interpreter
/// for the duration of the call.
pub struct SklearnPipeline {
    py_pipeline: Py<PyAny>,
}

static_assertions::assert_impl_all!(SklearnPipeline: Send);

impl fmt::Debug for SklearnPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SklearnPipeline")
            .field("class", &self.class_name())
            .field("steps", &self.step_names())
            .finish()
    }
}

impl SklearnPipeline {
    /// Load a pipeline with `joblib.load`.
    ///
    /// The file is checked on the Rust side first, so a missing path returns
    /// [`SklearnError::ModelNotFound`] without touching Python.
    ///
    /// # Errors
    ///
    /// - [`SklearnError::ModelNotFound`] if the file does not exist
    /// - [`SklearnError::MissingModule`] if the pickle references a module
    ///   that cannot be imported
    /// - [`SklearnError::PythonError`] for corrupt or incompatible artifacts
    #[must_use = "returns the loaded pipeline; use it or handle the error"]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SklearnError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(SklearnError::ModelNotFound {
                path: path.display().to_string(),
            });
        }

        let path_str = path.to_string_lossy().to_string();
        debug!("Loading pipeline with joblib: {}", path_str);

        Python::attach(|py| {
            let joblib = py.import("joblib")?;
            let py_pipeline = joblib
                .call_method1("load", (path_str,))
                .map_err(|e| conversion::map_python_error(py, e))?;

            Ok(SklearnPipeline {
                py_pipeline: py_pipeline.unbind(),
            })
        })
    }

    /// Run `pipeline.predict` on a table.
    ///
    /// The returned Series has one label per input row and keeps the dtype
    /// numpy produced (integer class codes, strings, booleans, ...).
    #[must_use = "returns the predictions; use them or handle the error"]
    pub fn predict(&self, df: &DataFrame) -> Result<Series, SklearnError> {
        Python::attach(|py| {
            let pandas_df = conversion::dataframe_to_python(py, df)?;
            let py_predictions = self
                .py_pipeline
                .bind(py)
                .call_method1("predict", (&pandas_df,))
                .map_err(|e| conversion::map_python_error(py, e))?;

            conversion::predictions_to_series(py, &py_predictions, PREDICTION_SERIES)
        })
    }

    /// True if the object exposes `predict_proba`.
    ///
    /// scikit-learn hides the method (via `available_if`) when the final
    /// estimator cannot produce probabilities, so `hasattr` is the capability
    /// check.
    pub fn supports_predict_proba(&self) -> bool {
        Python::attach(|py| {
            self.py_pipeline
                .bind(py)
                .hasattr("predict_proba")
                .unwrap_or(false)
        })
    }

    /// Run `pipeline.predict_proba` on a table.
    ///
    /// # Errors
    ///
    /// Returns [`SklearnError::Unsupported`] if the pipeline has no
    /// `predict_proba`, otherwise any error raised by the call.
    #[must_use = "returns the probabilities; use them or handle the error"]
    pub fn predict_proba(&self, df: &DataFrame) -> Result<ProbabilityArray, SklearnError> {
        if !self.supports_predict_proba() {
            return Err(SklearnError::Unsupported(
                "estimator does not implement predict_proba".to_string(),
            ));
        }

        Python::attach(|py| {
            let pandas_df = conversion::dataframe_to_python(py, df)?;
            let py_probabilities = self
                .py_pipeline
                .bind(py)
                .call_method1("predict_proba", (&pandas_df,))
                .map_err(|e| conversion::map_python_error(py, e))?;

            conversion::probabilities_to_array(py, &py_probabilities)
        })
    }

    /// Look up the step named `cleaning` in `named_steps`.
    ///
    /// Returns `None` when the object is not a `Pipeline` or has no such step.
    pub fn cleaning_stage(&self) -> Option<CleaningStage> {
        Python::attach(|py| {
            let named_steps = self.py_pipeline.bind(py).getattr("named_steps").ok()?;
            if !named_steps.contains(CLEANING_STEP).unwrap_or(false) {
                return None;
            }
            let step = named_steps.get_item(CLEANING_STEP).ok()?;
            Some(CleaningStage {
                py_step: step.unbind(),
            })
        })
    }

    /// Names of the pipeline steps, in order. Empty for a bare estimator.
    pub fn step_names(&self) -> Vec<String> {
        Python::attach(|py| {
            let Ok(named_steps) = self.py_pipeline.bind(py).getattr("named_steps") else {
                return Vec::new();
            };
            named_steps
                .call_method0("keys")
                .and_then(|keys| keys.try_iter())
                .map(|iter| {
                    iter.filter_map(|key| key.ok().and_then(|k| k.extract::<String>().ok()))
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    /// Python class name of the loaded object (`Pipeline`, `RandomForestClassifier`, ...).
    pub fn class_name(&self) -> String {
        Python::attach(|py| {
            self.py_pipeline
                .bind(py)
                .get_type()
                .qualname()
                .map(|name| name.to_string())
                .unwrap_or_else(|_| "<unknown>".to_string())
        })
    }
}

/// Handle to the `cleaning` step of a loaded pipeline.
pub struct CleaningStage {
    py_step: Py<PyAny>,
}

impl fmt::Debug for CleaningStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = Python::attach(|py| {
            self.py_step
                .bind(py)
                .get_type()
                .qualname()
                .map(|name| name.to_string())
                .unwrap_or_else(|_| "<unknown>".to_string())
        });
        f.debug_struct("CleaningStage").field("class", &class).finish()
    }
}

impl CleaningStage {
    /// Run the step's `transform` on a table.
    ///
    /// Non-DataFrame outputs (numpy arrays, sparse matrices) are wrapped in a
    /// DataFrame with positional column names.
    #[must_use = "returns the transformed table; use it or handle the error"]
    pub fn transform(&self, df: &DataFrame) -> Result<CleanedOutput, SklearnError> {
        Python::attach(|py| {
            let pandas_df = conversion::dataframe_to_python(py, df)?;
            let transformed = self
                .py_step
                .bind(py)
                .call_method1("transform", (&pandas_df,))
                .map_err(|e| conversion::map_python_error(py, e))?;

            let (frame, was_frame) = conversion::ensure_pandas_frame(py, &transformed)?;
            let cleaned = conversion::python_to_dataframe(py, &frame)?;

            Ok(if was_frame {
                CleanedOutput::Frame(cleaned)
            } else {
                CleanedOutput::Array(cleaned)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn test_load_nonexistent_file() {
        // Should return ModelNotFound error without calling Python
        let result = SklearnPipeline::load("/nonexistent/path/pipeline.pkl");
        assert!(matches!(result, Err(SklearnError::ModelNotFound { .. })));
    }

    /// Fits and dumps a small pipeline, returns its path.
    ///
    /// The cleaning function lives in `__main__` so it pickles by reference
    /// and resolves again when loaded in the same interpreter.
    fn dump_fixture_pipeline(dir: &Path, with_cleaning: bool) -> std::path::PathBuf {
        let path = dir.join("pipeline.pkl");
        let code = format!(
            r#"
import joblib, numpy as np, pandas as pd
from sklearn.pipeline import Pipeline
from sklearn.compose import ColumnTransformer
from sklearn.preprocessing import FunctionTransformer
from sklearn.linear_model import LogisticRegression

def drop_id(df):
    return df.drop(columns=["ID"])

X = pd.DataFrame({{"ID": [1, 2, 3, 4], "x": [1.0, 2.0, 8.0, 9.0]}})
y = np.array([0, 0, 1, 1])
if {with_cleaning}:
    first = ("cleaning", FunctionTransformer(drop_id))
else:
    first = ("select", ColumnTransformer([("x", "passthrough", ["x"])]))
pipe = Pipeline([first, ("model", LogisticRegression())]).fit(X, y)
joblib.dump(pipe, r"{path}")
"#,
            with_cleaning = if with_cleaning { "True" } else { "False" },
            path = path.display(),
        );
        Python::attach(|py| {
            let code = std::ffi::CString::new(code).unwrap();
            py.run(&code, None, None).expect("failed to dump fixture pipeline");
        });
        path
    }

    fn raw_table() -> DataFrame {
        df! {
            "ID" => &[1i64, 2],
            "x" => &[1.5f64, 8.5],
        }
        .unwrap()
    }

    #[test]
    #[ignore = "Requires Python runtime with ML libraries"]
    fn test_predict_and_proba_on_fitted_pipeline() {
        crate::initialize().expect("Failed to initialize Python");
        let dir = tempfile::tempdir().unwrap();
        let path = dump_fixture_pipeline(dir.path(), false);

        let pipeline = SklearnPipeline::load(&path).expect("pipeline should load");
        assert_eq!(pipeline.class_name(), "Pipeline");
        assert_eq!(pipeline.step_names(), vec!["select", "model"]);
        assert!(pipeline.cleaning_stage().is_none());

        let labels = pipeline.predict(&raw_table()).unwrap();
        assert_eq!(labels.len(), 2);

        let probabilities = pipeline.predict_proba(&raw_table()).unwrap();
        assert_eq!(probabilities.rows(), 2);
        assert_eq!(probabilities.columns(), 2);
        for row in probabilities.values().chunks(2) {
            assert!((row[0] + row[1] - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    #[ignore = "Requires Python runtime with ML libraries"]
    fn test_cleaning_stage_transform() {
        crate::initialize().expect("Failed to initialize Python");
        let dir = tempfile::tempdir().unwrap();
        let path = dump_fixture_pipeline(dir.path(), true);

        let pipeline = SklearnPipeline::load(&path).expect("pipeline should load");
        let stage = pipeline.cleaning_stage().expect("cleaning step present");
        let cleaned = stage.transform(&raw_table()).unwrap();
        assert!(cleaned.is_frame());

        let cleaned = cleaned.into_dataframe();
        assert_eq!(cleaned.shape(), (2, 1));
        assert!(cleaned.column("ID").is_err());
    }
}
