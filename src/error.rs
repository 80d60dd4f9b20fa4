//! Structured error types for the layout engine.
//!
//! Two families matter here: configuration errors, detected before or while
//! the pass starts, and invariant violations, which indicate a defect in the
//! report definition or the engine itself. Both abort the pass — no partial
//! page list is considered valid. Overflow is never an error; it is the
//! normal trigger for a page break.

use thiserror::Error;

/// The unified error type returned by all public API functions.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The record sequence is empty and the report does not allow
    /// printing when empty.
    #[error("report has no records and printIfEmpty is disabled")]
    EmptyRecordSet,

    /// An attribute path did not resolve to a field, mapping key, or
    /// computed value on a record.
    #[error("attribute path `{path}` did not resolve on the record")]
    AttributeNotFound { path: String },

    /// The group stack was popped while empty. This cannot happen for any
    /// well-formed record sequence; it indicates an engine defect.
    #[error("group stack popped while empty")]
    GroupStackUnderflow,

    /// A band's computed height came out negative.
    #[error("band height is negative: {0}")]
    NegativeBandHeight(f64),

    /// A subreport was declared without a detail band.
    #[error("subreport declared without a detail band")]
    MissingSubreportDetail,

    /// The report definition JSON failed to parse.
    #[error("failed to parse report definition")]
    Parse(#[from] serde_json::Error),

    /// A cache backend operation failed.
    #[error("cache I/O failed")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReportError>;
