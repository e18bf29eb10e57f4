//! Derivation of the cleaned table used for the results file.
//!
//! The cleaned table is never fed back into `predict`; it only shapes the
//! output. Any problem with the cleaning stage therefore degrades to a copy of
//! the raw table instead of failing the run.

use crate::capability::Predictor;
use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::{debug, info};

/// Where the cleaned table came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum CleanedSource {
    /// Output of the pipeline's cleaning stage.
    CleaningStage,
    /// The pipeline has no cleaning stage; the raw table was copied.
    RawCopy,
    /// The cleaning stage failed; the raw table was copied.
    Fallback(String),
}

/// The cleaned view of the raw table plus its provenance.
#[derive(Debug, Clone)]
pub struct CleanedTable {
    pub df: DataFrame,
    pub source: CleanedSource,
}

impl CleanedTable {
    /// The failure description when the cleaning stage fell back.
    pub fn fallback_reason(&self) -> Option<&str> {
        match &self.source {
            CleanedSource::Fallback(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Run the pipeline's cleaning stage on `raw`, falling back to a copy of `raw`.
///
/// A stage whose output does not have one row per raw row is treated as a
/// failure, since results are aligned to raw rows by position.
pub fn derive_cleaned_table(predictor: &dyn Predictor, raw: &DataFrame) -> CleanedTable {
    let Some(cleaner) = predictor.cleaner() else {
        debug!("Pipeline has no cleaning stage, using raw table");
        return CleanedTable {
            df: raw.clone(),
            source: CleanedSource::RawCopy,
        };
    };

    let outcome = cleaner
        .transform(raw)
        .and_then(|data| data.into_table().map_err(anyhow::Error::from))
        .and_then(|df| {
            if df.height() == raw.height() {
                Ok(df)
            } else {
                Err(anyhow::anyhow!(
                    "cleaning stage returned {} rows for {} input rows",
                    df.height(),
                    raw.height()
                ))
            }
        });

    match outcome {
        Ok(df) => {
            debug!("Cleaning stage produced {:?}", df.shape());
            CleanedTable {
                df,
                source: CleanedSource::CleaningStage,
            }
        }
        Err(e) => {
            let reason = format!("{:#}", e);
            info!("Cleaning stage failed, using raw table: {}", reason);
            CleanedTable {
                df: raw.clone(),
                source: CleanedSource::Fallback(reason),
            }
        }
    }
}
