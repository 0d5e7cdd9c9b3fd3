//! Error taxonomy for the load/join/render pipeline.
//!
//! Every load step returns `Result<_, PipelineError>`. Regions that fail to
//! match during the join are not errors; they travel alongside the result as
//! [`crate::types::UnmatchedRegion`] diagnostics.

use thiserror::Error;

use crate::types::Crs;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// File missing, unreadable, or not parseable in its declared format.
    #[error("source '{source_id}' unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    /// Required column, property, or CRS declaration not found.
    #[error("schema mismatch in '{source_id}': {detail}")]
    SchemaMismatch { source_id: String, detail: String },

    /// A statistic cell could not be converted to the target numeric type.
    #[error(
        "cannot convert {column} value {value:?} to {target} in '{source_id}' \
         (row {row}, region '{region}')"
    )]
    TypeCoercionFailure {
        source_id: String,
        row: usize,
        region: String,
        column: String,
        value: String,
        target: &'static str,
    },

    /// Two rows resolve to the same canonical region name after aliasing.
    #[error("region '{region}' appears more than once in '{source_id}' after alias normalization")]
    DuplicateRegion { source_id: String, region: String },

    #[error("cannot reproject from {from} to {to}: {detail}")]
    ProjectionFailure { from: Crs, to: Crs, detail: String },

    /// Invalid configuration or alias table.
    #[error("configuration error: {detail}")]
    Config { detail: String },
}

impl PipelineError {
    pub(crate) fn unavailable(source_id: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::SourceUnavailable {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn schema(source_id: impl Into<String>, detail: impl Into<String>) -> Self {
        PipelineError::SchemaMismatch {
            source_id: source_id.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn config(detail: impl Into<String>) -> Self {
        PipelineError::Config {
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
