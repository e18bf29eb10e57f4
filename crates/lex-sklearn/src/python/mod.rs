//! Python interop module.
//!
//! Runtime start-up and the Polars/pandas conversions used by
//! [`SklearnPipeline`](crate::SklearnPipeline).

pub mod conversion;
pub mod runtime;
