//! # Subreport Expander
//!
//! A subreport is a nested banded mini-report whose record sequence derives
//! from the current parent record. For each parent record the expander
//! rebinds the parent (any previously fetched child sequence is dropped),
//! fetches the children, and — when the sequence is non-empty — interleaves
//! header, per-child detail, and footer bands through the same positioner
//! and cursor machinery as the outer report.
//!
//! Subreport page breaks never re-emit the report's begin band; the begin
//! band belongs to the first page alone.

use log::debug;

use crate::error::{ReportError, Result};
use crate::record::RecordRef;

use super::LayoutEngine;

impl LayoutEngine<'_> {
    /// Expand every declared subreport for the given parent record.
    pub(crate) fn expand_subreports(&mut self, parent: &RecordRef) -> Result<()> {
        for index in 0..self.report.subreports.len() {
            let sub = self.report.subreports[index].clone();
            let detail = sub.detail.ok_or(ReportError::MissingSubreportDetail)?;

            let Some(fetch) = &sub.fetch else {
                // No data source bound: nothing to expand.
                continue;
            };
            let children = (fetch.0)(parent.as_ref());
            if children.is_empty() {
                continue;
            }
            debug!("expanding subreport {index}: {} child records", children.len());

            if let Some(header) = &sub.header {
                self.ensure_band_fits(header)?;
                self.position_band(header, Some(parent.as_ref()))?;
            }

            for child in &children {
                // Cloned per child so sibling children never share
                // positioned state.
                let band = detail.clone();
                self.ensure_band_fits(&band)?;
                self.position_band(&band, Some(child.as_ref()))?;
            }

            if let Some(footer) = &sub.footer {
                self.ensure_band_fits(footer)?;
                self.position_band(footer, Some(parent.as_ref()))?;
            }
        }
        Ok(())
    }
}
