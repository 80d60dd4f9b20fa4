//! # Page Flow Controller
//!
//! This is the heart of the engine. A report is never laid out on an
//! infinite canvas and sliced afterwards: the page is the fundamental unit,
//! and every band placement is made with the page boundary as a hard
//! constraint.
//!
//! The pass is a single forward fold over the record sequence:
//!
//! 1. Open a page: page borders, page header, and (first page only) the
//!    begin band.
//! 2. Per record: run the group state machine (footers for groups that
//!    ended, headers for groups that started), position the detail band,
//!    expand subreports.
//! 3. Before placing any band, ask: "does this fit?" If not, close the
//!    page (footer) and open a fresh one. Overflow is never an error.
//! 4. After the last record: flush remaining group footers, position the
//!    summary band, close the final page.
//!
//! Everything is strictly single-threaded and synchronous; the pass runs to
//! completion or returns a fatal error with no partial output.

pub mod band;
pub mod group;
pub mod subreport;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use serde::Serialize;

use crate::error::{ReportError, Result};
use crate::model::{Band, Borders, Edges, PageSize, Report};
use crate::record::{RecordRef, Value};

use group::GroupTracker;

/// Compares two group key values; defaults to structural equality.
pub type KeyCompare = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// Formats a resolved value for display in a text element.
pub type ValueFormatter = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Caller-supplied knobs for a layout pass.
#[derive(Clone, Default)]
pub struct LayoutOptions {
    /// Group-key comparison. `None` means structural equality.
    pub key_compare: Option<KeyCompare>,
    /// Value/date formatting callback used by value-producing elements.
    pub format_value: Option<ValueFormatter>,
}

/// A completed layout pass: the ordered page list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutResult {
    pub pages: Vec<LayoutPage>,
}

impl LayoutResult {
    /// Total number of pages. Pagination is not knowable in advance; this
    /// is only meaningful because the pass has completed.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// A fully laid-out page: a flat, ordered list of positioned elements in
/// the order a renderer must draw them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutPage {
    /// 1-based page number.
    pub number: usize,
    pub width: f64,
    pub height: f64,
    pub elements: Vec<PositionedElement>,
}

impl LayoutPage {
    /// Canonical string form of this page, used to build cache hash keys
    /// from previously rendered output.
    pub fn repr_for_cache_key(&self) -> String {
        let mut out = format!("page:{};{:.2}x{:.2}", self.number, self.width, self.height);
        for el in &self.elements {
            out.push_str(&format!(
                ";{:.2},{:.2},{:.2},{:.2},{}",
                el.x,
                el.y,
                el.width,
                el.height,
                el.content.cache_token()
            ));
        }
        out
    }
}

/// A positioned element: absolute page coordinates plus what to draw.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionedElement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub content: ElementContent,
}

/// What a renderer draws for a positioned element. Encoding into a concrete
/// output format (PDF, text grid, spreadsheet cells) is the renderer's
/// concern entirely.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ElementContent {
    Text { text: String },
    /// A straight line from (x, y) to (x + width, y + height).
    Line,
    Rect { fill: bool },
    Image { src: String },
    Barcode { payload: String },
    Chart { values: Vec<f64> },
}

impl ElementContent {
    fn cache_token(&self) -> String {
        match self {
            ElementContent::Text { text } => format!("text:{text}"),
            ElementContent::Line => "line".to_string(),
            ElementContent::Rect { fill } => format!("rect:{fill}"),
            ElementContent::Image { src } => format!("image:{src}"),
            ElementContent::Barcode { payload } => format!("barcode:{payload}"),
            ElementContent::Chart { values } => {
                let vals: Vec<String> = values.iter().map(|v| format!("{v:.4}")).collect();
                format!("chart:{}", vals.join(","))
            }
        }
    }
}

/// Convert a top-down logical `top` into the bottom-up coordinate some
/// backends use, returning the y of the element's lower edge.
pub fn to_bottom_up(page_height: f64, top: f64, height: f64) -> f64 {
    page_height - top - height
}

// ── Cursor ──────────────────────────────────────────────────────

/// Tracks where we are on the current page. Pure arithmetic over page
/// geometry; it knows nothing about bands.
///
/// `top` and `left` are offsets within the client area (page minus margins
/// minus reserved page-header/footer heights), always in top-down logical
/// coordinates. While an inline band run is active, `left` walks along the
/// row and the row's height accumulates separately; `end_row` folds the row
/// into `top`.
#[derive(Debug, Clone)]
pub struct PageCursor {
    top: f64,
    left: f64,
    row_height: f64,
    page_width: f64,
    page_height: f64,
    margin: Edges,
    header_reserved: f64,
    footer_reserved: f64,
}

impl PageCursor {
    pub fn new(
        page_size: PageSize,
        margin: Edges,
        header_reserved: f64,
        footer_reserved: f64,
    ) -> Self {
        let (page_width, page_height) = page_size.dimensions();
        Self {
            top: 0.0,
            left: 0.0,
            row_height: 0.0,
            page_width,
            page_height,
            margin,
            header_reserved,
            footer_reserved,
        }
    }

    pub fn advance_top(&mut self, delta: f64) {
        self.top += delta;
    }

    pub fn set_top(&mut self, value: f64) {
        self.top = value;
    }

    pub fn advance_left(&mut self, delta: f64) {
        self.left += delta;
    }

    pub fn set_left(&mut self, value: f64) {
        self.left = value;
    }

    pub fn top(&self) -> f64 {
        self.top
    }

    pub fn left(&self) -> f64 {
        self.left
    }

    /// Client-area width.
    pub fn content_width(&self) -> f64 {
        self.page_width - self.margin.horizontal()
    }

    /// Client-area height after the reserved page header/footer bands.
    pub fn content_height(&self) -> f64 {
        self.page_height - self.margin.vertical() - self.header_reserved - self.footer_reserved
    }

    /// Vertical space left below the cursor.
    pub fn available_height(&self) -> f64 {
        (self.content_height() - self.top).max(0.0)
    }

    /// Horizontal space left on the current row.
    pub fn available_width(&self) -> f64 {
        (self.content_width() - self.left).max(0.0)
    }

    /// Height the open inline row will occupy once it ends.
    pub fn pending_row_height(&self) -> f64 {
        self.row_height
    }

    pub fn note_row_height(&mut self, height: f64) {
        self.row_height = self.row_height.max(height);
    }

    /// Close the open inline row: fold its height into `top` and return
    /// `left` to the client edge.
    pub fn end_row(&mut self) {
        self.top += self.row_height;
        self.row_height = 0.0;
        self.left = 0.0;
    }

    /// Absolute page x of the cursor position.
    pub fn abs_x(&self) -> f64 {
        self.margin.left + self.left
    }

    /// Absolute page y of the cursor position.
    pub fn abs_y(&self) -> f64 {
        self.margin.top + self.header_reserved + self.top
    }
}

// ── Engine ──────────────────────────────────────────────────────

/// The layout engine: one instance per pass.
pub struct LayoutEngine<'a> {
    report: &'a Report,
    options: LayoutOptions,
    pages: Vec<LayoutPage>,
    cursor: PageCursor,
    /// Elements of the page currently being laid out.
    elements: Vec<PositionedElement>,
    tracker: GroupTracker,
    /// No detail band has been positioned on the current page yet.
    first_record_on_page: bool,
    current_record: Option<RecordRef>,
    /// (page index, element index) of PageCount fields to patch after the
    /// pass, when the total is finally known.
    page_count_slots: Vec<(usize, usize)>,
    header_reserved: f64,
    footer_reserved: f64,
}

/// Vertical space a band consumes in normal flow.
fn band_extent(band: &Band) -> f64 {
    band.margin_top + band.height + band.margin_bottom
}

fn reserved_height(band: &Option<Band>) -> f64 {
    band.as_ref()
        .filter(|b| b.visible)
        .map(band_extent)
        .unwrap_or(0.0)
}

impl<'a> LayoutEngine<'a> {
    pub fn new(report: &'a Report, options: LayoutOptions) -> Self {
        let header_reserved = reserved_height(&report.band_page_header);
        let footer_reserved = reserved_height(&report.band_page_footer);
        Self {
            report,
            options,
            pages: Vec::new(),
            cursor: PageCursor::new(
                report.page_size,
                report.margin,
                header_reserved,
                footer_reserved,
            ),
            elements: Vec::new(),
            tracker: GroupTracker::new(report.groups.len()),
            first_record_on_page: true,
            current_record: None,
            page_count_slots: Vec::new(),
            header_reserved,
            footer_reserved,
        }
    }

    /// Run the pass over the record sequence and return the page list.
    pub fn run(mut self, records: &[RecordRef]) -> Result<LayoutResult> {
        if records.is_empty() {
            if !self.report.print_if_empty {
                return Err(ReportError::EmptyRecordSet);
            }
            self.open_page(true)?;
            if let Some(summary) = self.report.band_summary.clone() {
                self.position_band(&summary, None)?;
            }
            self.close_page()?;
            self.patch_page_count();
            return Ok(LayoutResult { pages: self.pages });
        }

        self.open_page(true)?;

        let mut prev: Option<RecordRef> = None;
        for (index, record) in records.iter().enumerate() {
            self.current_record = Some(record.clone());

            let changed = self
                .tracker
                .compute_changes(&self.report.groups, record.as_ref(), self.options.key_compare.as_ref())?;
            self.emit_group_bands(&changed, record, prev.as_ref())?;

            // Cloned per record: positioned state is never shared.
            let detail = self.report.band_detail.clone();
            self.ensure_band_fits(&detail)?;
            self.position_band(&detail, Some(record.as_ref()))?;
            self.first_record_on_page = false;

            self.expand_subreports(record)?;

            if detail.force_new_page && index + 1 < records.len() {
                self.break_page()?;
            }

            prev = Some(record.clone());
        }

        if let Some(last) = records.last() {
            self.flush_group_footers(last.as_ref())?;
        }

        if let Some(summary) = self.report.band_summary.clone() {
            self.ensure_band_fits(&summary)?;
            let record = self.current_record.clone();
            self.position_band(&summary, record.as_deref())?;
        }

        self.close_page()?;
        self.patch_page_count();

        debug!("layout pass complete: {} pages", self.pages.len());
        Ok(LayoutResult { pages: self.pages })
    }

    /// Start a new page: page borders, page header, and (first page only)
    /// the begin band.
    pub(crate) fn open_page(&mut self, first: bool) -> Result<()> {
        self.cursor = PageCursor::new(
            self.report.page_size,
            self.report.margin,
            self.header_reserved,
            self.footer_reserved,
        );
        self.elements.clear();
        self.first_record_on_page = true;
        debug!("opening page {}", self.pages.len() + 1);

        let (page_w, page_h) = self.report.page_size.dimensions();
        let borders = self.report.borders;
        if borders.any() {
            let client_h = page_h - self.report.margin.vertical();
            let client_w = page_w - self.report.margin.horizontal();
            self.emit_border_lines(
                &borders,
                self.report.margin.left,
                self.report.margin.top,
                client_w,
                client_h,
            );
        }

        if let Some(header) = self.report.band_page_header.clone() {
            let record = self.current_record.clone();
            let y = self.report.margin.top + header.margin_top;
            self.position_fixed_band(&header, y, record.as_deref())?;
        }

        if first {
            if let Some(begin) = self.report.band_begin.clone() {
                let record = self.current_record.clone();
                self.position_band(&begin, record.as_deref())?;
            }
        }

        Ok(())
    }

    /// Close the current page: end any open inline row, position the page
    /// footer in its reserved area, and freeze the page.
    pub(crate) fn close_page(&mut self) -> Result<()> {
        self.cursor.end_row();

        if let Some(footer) = self.report.band_page_footer.clone() {
            let (_, page_h) = self.report.page_size.dimensions();
            let y = page_h - self.report.margin.bottom - self.footer_reserved + footer.margin_top;
            let record = self.current_record.clone();
            self.position_fixed_band(&footer, y, record.as_deref())?;
        }

        let (page_w, page_h) = self.report.page_size.dimensions();
        let number = self.pages.len() + 1;
        let elements = std::mem::take(&mut self.elements);
        debug!("closing page {number} ({} elements)", elements.len());
        self.pages.push(LayoutPage {
            number,
            width: page_w,
            height: page_h,
            elements,
        });
        Ok(())
    }

    /// Close the current page and open the next one. Never re-emits the
    /// begin band.
    pub(crate) fn break_page(&mut self) -> Result<()> {
        self.close_page()?;
        self.open_page(false)
    }

    /// Break the page unless the band fits where the cursor stands. An
    /// inline band that can join the open row in both directions needs no
    /// break while horizontal room remains.
    pub(crate) fn ensure_band_fits(&mut self, band: &Band) -> Result<()> {
        if !band.visible {
            return Ok(());
        }
        let needed = band_extent(band);
        let width = band.width.unwrap_or_else(|| self.cursor.content_width());
        let joins_row = band.display_inline
            && self.cursor.left() > 0.0
            && width <= self.cursor.available_width();

        let fits = if joins_row {
            needed.max(self.cursor.pending_row_height()) <= self.cursor.available_height()
        } else {
            needed + self.cursor.pending_row_height() <= self.cursor.available_height()
        };
        // A band that cannot fit even at the top of a fresh page gets
        // placed anyway rather than breaking forever.
        let at_page_top = self.cursor.top() == 0.0
            && self.cursor.left() == 0.0
            && self.cursor.pending_row_height() == 0.0;
        if !fits && !at_page_top {
            self.break_page()?;
        }
        Ok(())
    }

    /// Remember a PageCount element to patch once the total is known.
    pub(crate) fn note_page_count_slot(&mut self) {
        self.page_count_slots
            .push((self.pages.len(), self.elements.len()));
    }

    fn patch_page_count(&mut self) {
        let total = self.pages.len();
        for &(page, index) in &self.page_count_slots {
            if let Some(el) = self
                .pages
                .get_mut(page)
                .and_then(|p| p.elements.get_mut(index))
            {
                el.content = ElementContent::Text {
                    text: total.to_string(),
                };
            }
        }
    }

    pub(crate) fn format_value(&self, value: &Value) -> String {
        match &self.options.format_value {
            Some(f) => f(value),
            None => crate::record::display_value(value),
        }
    }

    pub(crate) fn current_datetime_value(&self) -> Value {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Value::from(secs)
    }

    /// Emit synthetic line elements for the marked edges of a rectangle.
    pub(crate) fn emit_border_lines(
        &mut self,
        borders: &Borders,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) {
        let mut line = |x: f64, y: f64, w: f64, h: f64| {
            self.elements.push(PositionedElement {
                x,
                y,
                width: w,
                height: h,
                content: ElementContent::Line,
            });
        };
        if borders.top {
            line(x, y, width, 0.0);
        }
        if borders.bottom {
            line(x, y + height, width, 0.0);
        }
        if borders.left {
            line(x, y, 0.0, height);
        }
        if borders.right {
            line(x + width, y, 0.0, height);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor() -> PageCursor {
        PageCursor::new(
            PageSize::Custom {
                width: 400.0,
                height: 600.0,
            },
            Edges::uniform(50.0),
            20.0,
            30.0,
        )
    }

    #[test]
    fn available_space_accounts_for_margins_and_reserved_bands() {
        let c = cursor();
        // 600 - 100 margins - 20 header - 30 footer
        assert_eq!(c.content_height(), 450.0);
        assert_eq!(c.available_height(), 450.0);
        assert_eq!(c.content_width(), 300.0);
        assert_eq!(c.available_width(), 300.0);
    }

    #[test]
    fn advancing_the_cursor_shrinks_available_space() {
        let mut c = cursor();
        c.advance_top(100.0);
        assert_eq!(c.available_height(), 350.0);
        c.advance_left(120.0);
        assert_eq!(c.available_width(), 180.0);
        c.set_top(0.0);
        c.set_left(0.0);
        assert_eq!(c.available_height(), 450.0);
        assert_eq!(c.available_width(), 300.0);
    }

    #[test]
    fn available_height_never_goes_negative() {
        let mut c = cursor();
        c.advance_top(10_000.0);
        assert_eq!(c.available_height(), 0.0);
    }

    #[test]
    fn ending_a_row_folds_its_height_into_top() {
        let mut c = cursor();
        c.note_row_height(40.0);
        c.advance_left(100.0);
        assert_eq!(c.available_height(), 450.0);
        c.end_row();
        assert_eq!(c.left(), 0.0);
        assert_eq!(c.top(), 40.0);
        assert_eq!(c.pending_row_height(), 0.0);
    }

    #[test]
    fn absolute_position_includes_margins_and_reserved_header() {
        let mut c = cursor();
        c.advance_top(15.0);
        c.advance_left(25.0);
        assert_eq!(c.abs_x(), 75.0); // 50 margin + 25
        assert_eq!(c.abs_y(), 85.0); // 50 margin + 20 header + 15
    }

    #[test]
    fn bottom_up_conversion_flips_the_axis() {
        assert_eq!(to_bottom_up(800.0, 100.0, 30.0), 670.0);
        assert_eq!(to_bottom_up(800.0, 0.0, 0.0), 800.0);
    }
}
