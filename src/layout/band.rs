//! # Band/Element Positioner
//!
//! Given a band (already cloned for the current record) and the cursor
//! position, compute the band's rectangle and the rectangles of its child
//! elements, then recurse into stacked child bands. The positioner tracks
//! the tallest child so auto-expanding bands can grow past their declared
//! height.
//!
//! Inline bands (`display_inline`) flow horizontally: as long as a band
//! fits in the remaining row width it occupies a slot on the current row
//! and the vertical cursor stays put; when it no longer fits, the row is
//! closed and flow wraps below it.

use log::trace;

use crate::error::{ReportError, Result};
use crate::model::{Band, Element, ElementKind, SystemField};
use crate::record::{get_attr_value, Record};

use super::{ElementContent, LayoutEngine, PositionedElement};

impl LayoutEngine<'_> {
    /// Position a band in normal flow at the cursor, then its child bands.
    /// Each child band gets its own overflow check and may break the page.
    pub(crate) fn position_band(&mut self, band: &Band, record: Option<&dyn Record>) -> Result<()> {
        if !band.visible {
            return Ok(());
        }
        if let Some(hook) = &band.before_print {
            if !(hook.0)(record) {
                trace!("band skipped by before-print hook");
                return Ok(());
            }
        }

        let width = band.width.unwrap_or_else(|| self.cursor.content_width());
        if band.display_inline {
            // Wrap to a fresh row when the slot no longer fits.
            if self.cursor.left() > 0.0 && width > self.cursor.available_width() {
                self.cursor.end_row();
            }
        } else {
            self.cursor.end_row();
        }

        let x = self.cursor.abs_x();
        let y = self.cursor.abs_y() + band.margin_top;
        let body = self.place_band_at(band, x, y, width, record)?;

        let consumed = band.margin_top + body + band.margin_bottom;
        if band.display_inline {
            self.cursor.note_row_height(consumed);
            self.cursor.advance_left(width);
        } else {
            self.cursor.advance_top(consumed);
        }
        trace!(
            "band at ({x:.1}, {y:.1}) w={width:.1} h={body:.1} inline={}",
            band.display_inline
        );

        for child in &band.child_bands {
            self.ensure_band_fits(child)?;
            self.position_band(child, record)?;
        }

        Ok(())
    }

    /// Position a band at a fixed page location (page header/footer),
    /// without touching the cursor.
    pub(crate) fn position_fixed_band(
        &mut self,
        band: &Band,
        y: f64,
        record: Option<&dyn Record>,
    ) -> Result<()> {
        if !band.visible {
            return Ok(());
        }
        if let Some(hook) = &band.before_print {
            if !(hook.0)(record) {
                return Ok(());
            }
        }
        let width = band.width.unwrap_or_else(|| self.cursor.content_width());
        let x = self.report.margin.left;
        self.place_band_at(band, x, y, width, record)?;
        Ok(())
    }

    /// Place a band's elements and borders at an absolute rectangle origin.
    /// Returns the band's body height: the declared height, or the tallest
    /// child extent when the band auto-expands.
    fn place_band_at(
        &mut self,
        band: &Band,
        x: f64,
        y: f64,
        width: f64,
        record: Option<&dyn Record>,
    ) -> Result<f64> {
        if band.height < 0.0 {
            return Err(ReportError::NegativeBandHeight(band.height));
        }

        let mut tallest: f64 = 0.0;
        for element in &band.elements {
            if let Some(extent) = self.place_element(element, x, y, width, band.height, record)? {
                tallest = tallest.max(extent);
            }
        }

        let body = if band.auto_expand_height {
            band.height.max(tallest)
        } else {
            band.height
        };

        if band.borders.any() {
            self.emit_border_lines(&band.borders, x, y, width, body);
        }

        Ok(body)
    }

    /// Place one element relative to its band rectangle. Returns the
    /// element's vertical extent from the band top (`None` when skipped),
    /// which feeds the band's tallest-child tracking.
    fn place_element(
        &mut self,
        element: &Element,
        band_x: f64,
        band_y: f64,
        band_w: f64,
        band_h: f64,
        record: Option<&dyn Record>,
    ) -> Result<Option<f64>> {
        if !element.visible {
            return Ok(None);
        }
        if let Some(hook) = &element.before_print {
            if !(hook.0)(record) {
                trace!("element skipped by before-print hook");
                return Ok(None);
            }
        }

        // The many-elements generator stamps its template at fixed steps.
        if let ElementKind::Many {
            count,
            step,
            template,
        } = &element.kind
        {
            let mut tallest = None;
            for i in 0..*count {
                let offset = i as f64 * step;
                if let Some(extent) =
                    self.place_element(template, band_x, band_y + offset, band_w, band_h, record)?
                {
                    let total = offset + extent;
                    tallest = Some(tallest.map_or(total, |t: f64| t.max(total)));
                }
            }
            return Ok(tallest);
        }

        let left = element.left.resolve(band_w);
        let top = element.top.resolve(band_h);
        let width = element.width.resolve(band_w);
        let height = element.height.resolve(band_h);

        let mut page_count_slot = false;
        let content = match &element.kind {
            ElementKind::Label { text } => ElementContent::Text { text: text.clone() },
            ElementKind::ObjectValue { attribute } => {
                let text = match record {
                    Some(record) => {
                        let value = get_attr_value(record, attribute)?;
                        self.format_value(&value)
                    }
                    None => String::new(),
                };
                ElementContent::Text { text }
            }
            ElementKind::SystemField { field } => {
                let text = match field {
                    SystemField::ReportTitle => self.report.title.clone(),
                    SystemField::PageNumber => (self.pages.len() + 1).to_string(),
                    SystemField::PageCount => {
                        // Unknowable until the pass completes; patched then.
                        page_count_slot = true;
                        String::new()
                    }
                    SystemField::CurrentDateTime => {
                        let value = self.current_datetime_value();
                        self.format_value(&value)
                    }
                };
                ElementContent::Text { text }
            }
            ElementKind::Line => ElementContent::Line,
            ElementKind::Rect { fill } => ElementContent::Rect { fill: *fill },
            ElementKind::Image { src } => ElementContent::Image { src: src.clone() },
            ElementKind::Barcode { attribute } => {
                let payload = match record {
                    Some(record) => {
                        let value = get_attr_value(record, attribute)?;
                        self.format_value(&value)
                    }
                    None => String::new(),
                };
                ElementContent::Barcode { payload }
            }
            ElementKind::Chart { values } => ElementContent::Chart {
                values: values.clone(),
            },
            ElementKind::Many { .. } => unreachable!("handled above"),
        };

        // Text auto-sizes vertically: one declared height per line. With
        // text shaping out of scope this is the deterministic stand-in for
        // wrapped-text measurement.
        let effective_height = match &content {
            ElementContent::Text { text } if !text.is_empty() => {
                height * text.split('\n').count() as f64
            }
            _ => height,
        };

        if page_count_slot {
            self.note_page_count_slot();
        }
        self.elements.push(PositionedElement {
            x: band_x + left,
            y: band_y + top,
            width,
            height: effective_height,
            content,
        });

        Ok(Some(top + effective_height))
    }
}
