//! # Rapport
//!
//! A banded-report layout engine.
//!
//! A report is a declarative tree of rectangular bands — begin, summary,
//! page header/footer, grouping headers/footers, subreports, and one detail
//! band repeated per record. Rapport folds a stream of data records through
//! that tree, page by page, and produces an ordered sequence of abstract
//! pages, each a flat list of positioned elements. What a positioned
//! element *looks like* is a renderer's problem; the pages are the same
//! whether the backend draws vector graphics, a text grid, or spreadsheet
//! cells.
//!
//! The page is the fundamental unit of layout: every band placement is made
//! against the page boundary, so content flows *into* pages instead of
//! being laid out on an infinite canvas and sliced after the fact.
//!
//! ## Architecture
//!
//! ```text
//! Report definition + records (JSON/API)
//!       ↓
//!   [model]    — band tree: report, bands, elements, groups, subreports
//!       ↓
//!   [record]   — dotted-path attribute resolution over opaque records
//!       ↓
//!   [layout]   — page flow controller, positioner, group machine,
//!                subreport expander, cursor
//!       ↓
//!   LayoutResult — ordered pages of positioned elements
//! ```
//!
//! The [`cache`] module derives stable content-hash keys so external
//! collaborators can skip repeated passes over identical input.

pub mod cache;
pub mod error;
pub mod layout;
pub mod model;
pub mod record;

use std::sync::Arc;

pub use error::{ReportError, Result};
pub use layout::{
    ElementContent, LayoutOptions, LayoutPage, LayoutResult, PositionedElement,
};
pub use model::{
    Band, Borders, Dimension, Edges, Element, ElementKind, Group, PageSize, Report, Subreport,
    SystemField,
};
pub use record::{Record, RecordRef, Value};

/// Lay out a report over a record sequence.
///
/// This is the primary entry point. The pass is one-shot and forward-only;
/// it returns the complete page list or a fatal error with no partial
/// output.
pub fn layout(report: &Report, records: &[RecordRef]) -> Result<LayoutResult> {
    layout_with_options(report, records, LayoutOptions::default())
}

/// Lay out a report with caller-supplied comparison/formatting callbacks.
pub fn layout_with_options(
    report: &Report,
    records: &[RecordRef],
    options: LayoutOptions,
) -> Result<LayoutResult> {
    layout::LayoutEngine::new(report, options).run(records)
}

/// Lay out a report described as JSON over a JSON array of records.
pub fn layout_json(report_json: &str, records_json: &str) -> Result<LayoutResult> {
    let report: Report = serde_json::from_str(report_json)?;
    let values: Vec<Value> = serde_json::from_str(records_json)?;
    let records: Vec<RecordRef> = values
        .into_iter()
        .map(|v| Arc::new(v) as RecordRef)
        .collect();
    layout(&report, &records)
}
