//! # Report Model
//!
//! The input representation for the layout engine. A report is a static tree
//! of bands — horizontal regions with a declared height, child elements, and
//! optionally nested child bands — plus ordered grouping levels and
//! subreports. The whole tree is immutable once layout begins; bands are
//! cloned per record before positioning, so no positioned state is ever
//! shared between records.
//!
//! The model is serde-derived end to end so a report definition can come
//! straight from JSON, the same way it would from an API or a designer tool.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::record::{Record, RecordRef};

/// A complete report definition ready for layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub author: String,

    /// Page size. Defaults to A4.
    #[serde(default)]
    pub page_size: PageSize,

    /// Page margins in points (1/72 inch).
    #[serde(default = "Edges::default_margin")]
    pub margin: Edges,

    /// Rendered once, at the top of the first page.
    #[serde(default)]
    pub band_begin: Option<Band>,

    /// Rendered once, after the last record (before the final page footer).
    #[serde(default)]
    pub band_summary: Option<Band>,

    /// Rendered at the top of every page.
    #[serde(default)]
    pub band_page_header: Option<Band>,

    /// Rendered at the bottom of every page.
    #[serde(default)]
    pub band_page_footer: Option<Band>,

    /// Rendered once per record.
    pub band_detail: Band,

    /// Grouping levels, ordered outer to inner.
    #[serde(default)]
    pub groups: Vec<Group>,

    /// Nested per-record mini-reports.
    #[serde(default)]
    pub subreports: Vec<Subreport>,

    /// Borders drawn around the page client area.
    #[serde(default)]
    pub borders: Borders,

    /// When the record sequence is empty: lay out one page with only the
    /// begin/summary/page bands instead of failing.
    #[serde(default)]
    pub print_if_empty: bool,

    /// Prefix for cache hash keys.
    #[serde(default)]
    pub cache_prefix: String,
}

impl Report {
    /// Minimal report: a detail band on a default page.
    pub fn with_detail(band_detail: Band) -> Self {
        Self {
            title: String::new(),
            author: String::new(),
            page_size: PageSize::default(),
            margin: Edges::default_margin(),
            band_begin: None,
            band_summary: None,
            band_page_header: None,
            band_page_footer: None,
            band_detail,
            groups: Vec::new(),
            subreports: Vec::new(),
            borders: Borders::default(),
            print_if_empty: false,
            cache_prefix: String::new(),
        }
    }

    /// Width of the client area (page width minus horizontal margins).
    pub fn client_width(&self) -> f64 {
        let (w, _) = self.page_size.dimensions();
        w - self.margin.horizontal()
    }

    /// Visit every band in the definition tree, including nested child
    /// bands and group/subreport bands.
    pub fn for_each_band<'a>(&'a self, f: &mut dyn FnMut(&'a Band)) {
        fn walk<'a>(band: &'a Band, f: &mut dyn FnMut(&'a Band)) {
            f(band);
            for child in &band.child_bands {
                walk(child, f);
            }
        }
        let top = [
            &self.band_begin,
            &self.band_summary,
            &self.band_page_header,
            &self.band_page_footer,
        ];
        for band in top.into_iter().flatten() {
            walk(band, f);
        }
        walk(&self.band_detail, f);
        for group in &self.groups {
            for band in [&group.header, &group.footer].into_iter().flatten() {
                walk(band, f);
            }
        }
        for sub in &self.subreports {
            for band in [&sub.header, &sub.detail, &sub.footer]
                .into_iter()
                .flatten()
            {
                walk(band, f);
            }
        }
    }
}

/// Standard page sizes in points.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub enum PageSize {
    #[default]
    A4,
    A5,
    Letter,
    Legal,
    Custom {
        width: f64,
        height: f64,
    },
}

impl PageSize {
    /// Returns (width, height) in points.
    pub fn dimensions(&self) -> (f64, f64) {
        match self {
            PageSize::A4 => (595.28, 841.89),
            PageSize::A5 => (419.53, 595.28),
            PageSize::Letter => (612.0, 792.0),
            PageSize::Legal => (612.0, 1008.0),
            PageSize::Custom { width, height } => (*width, *height),
        }
    }
}

/// Edge values (top, right, bottom, left) used for margins.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Edges {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Edges {
    pub fn uniform(v: f64) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }

    pub fn horizontal(&self) -> f64 {
        self.left + self.right
    }

    pub fn vertical(&self) -> f64 {
        self.top + self.bottom
    }

    fn default_margin() -> Self {
        Edges::uniform(28.35) // 1 cm
    }
}

/// Which edges of a band (or the page client area) get a border line.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Borders {
    #[serde(default)]
    pub top: bool,
    #[serde(default)]
    pub right: bool,
    #[serde(default)]
    pub bottom: bool,
    #[serde(default)]
    pub left: bool,
}

impl Borders {
    pub fn all() -> Self {
        Self {
            top: true,
            right: true,
            bottom: true,
            left: true,
        }
    }

    pub fn any(&self) -> bool {
        self.top || self.right || self.bottom || self.left
    }
}

/// A horizontal layout region: the unit the engine positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Band {
    /// Declared height in points.
    pub height: f64,

    /// Explicit width in points. Defaults to the page client width.
    #[serde(default)]
    pub width: Option<f64>,

    #[serde(default)]
    pub margin_top: f64,

    #[serde(default)]
    pub margin_bottom: f64,

    /// Leaf drawables positioned relative to the band rectangle.
    #[serde(default)]
    pub elements: Vec<Element>,

    /// Stacked sub-bands, positioned after this band's own elements.
    #[serde(default)]
    pub child_bands: Vec<Band>,

    #[serde(default)]
    pub borders: Borders,

    /// Grow the band to the tallest child element instead of the declared
    /// height.
    #[serde(default)]
    pub auto_expand_height: bool,

    /// Flow horizontally: the band occupies a slot on the current row
    /// instead of advancing the vertical cursor.
    #[serde(default)]
    pub display_inline: bool,

    /// Force a page break after this band is positioned.
    #[serde(default)]
    pub force_new_page: bool,

    #[serde(default = "default_true")]
    pub visible: bool,

    /// Called before the band is positioned; returning `false` skips the
    /// band for this record only.
    #[serde(skip)]
    pub before_print: Option<PrintHook>,
}

impl Band {
    /// A band of the given height with the given elements.
    pub fn new(height: f64, elements: Vec<Element>) -> Self {
        Self {
            height,
            width: None,
            margin_top: 0.0,
            margin_bottom: 0.0,
            elements,
            child_bands: Vec::new(),
            borders: Borders::default(),
            auto_expand_height: false,
            display_inline: false,
            force_new_page: false,
            visible: true,
            before_print: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A synchronous pre-print hook carried on bands and elements. Returning
/// `false` aborts that single band/element without aborting the pass.
#[derive(Clone)]
pub struct PrintHook(pub Arc<dyn Fn(Option<&dyn Record>) -> bool + Send + Sync>);

impl PrintHook {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Option<&dyn Record>) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }
}

impl fmt::Debug for PrintHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrintHook(..)")
    }
}

/// A leaf drawable inside a band.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub kind: ElementKind,

    #[serde(default = "Dimension::zero")]
    pub left: Dimension,

    #[serde(default = "Dimension::zero")]
    pub top: Dimension,

    #[serde(default = "Dimension::fill")]
    pub width: Dimension,

    #[serde(default = "Dimension::fill")]
    pub height: Dimension,

    #[serde(default = "default_true")]
    pub visible: bool,

    /// Called before the element is placed; returning `false` skips it.
    #[serde(skip)]
    pub before_print: Option<PrintHook>,
}

impl Element {
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            left: Dimension::zero(),
            top: Dimension::zero(),
            width: Dimension::fill(),
            height: Dimension::fill(),
            visible: true,
            before_print: None,
        }
    }

    /// A static text element.
    pub fn label(text: &str) -> Self {
        Self::new(ElementKind::Label {
            text: text.to_string(),
        })
    }

    /// A text element showing a record attribute.
    pub fn object_value(attribute: &str) -> Self {
        Self::new(ElementKind::ObjectValue {
            attribute: attribute.to_string(),
        })
    }

    pub fn at(mut self, left: Dimension, top: Dimension) -> Self {
        self.left = left;
        self.top = top;
        self
    }

    pub fn sized(mut self, width: Dimension, height: Dimension) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

/// The closed set of element kinds. Adding a kind is a compile-time-checked
/// enumeration change: the positioner dispatches exhaustively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ElementKind {
    /// Static text.
    Label { text: String },

    /// The value of a record attribute, resolved by dotted path.
    ObjectValue { attribute: String },

    /// Engine-provided values: title, page number, page count, timestamp.
    SystemField { field: SystemField },

    /// A straight line across the element rectangle.
    Line,

    /// A rectangle, optionally filled.
    Rect {
        #[serde(default)]
        fill: bool,
    },

    /// An image reference. Decoding is the renderer's concern.
    Image { src: String },

    /// A barcode whose payload comes from a record attribute. Symbol
    /// synthesis is the renderer's concern.
    Barcode { attribute: String },

    /// A chart placed from pre-computed values. Chart drawing is a
    /// data-transformation collaborator, never part of page flow.
    Chart { values: Vec<f64> },

    /// A generator that stamps the same template at fixed vertical steps.
    Many {
        count: usize,
        step: f64,
        template: Box<Element>,
    },
}

/// System-provided field values for [`ElementKind::SystemField`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SystemField {
    ReportTitle,
    PageNumber,
    /// Total page count; only knowable after the pass, patched in when the
    /// layout finishes.
    PageCount,
    CurrentDateTime,
}

/// A geometric quantity on an element: literal points, a percentage of the
/// band dimension, or the band dimension itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dimension {
    Pt(f64),
    Percent(f64),
    Fill,
}

impl Dimension {
    pub fn zero() -> Self {
        Dimension::Pt(0.0)
    }

    pub fn fill() -> Self {
        Dimension::Fill
    }

    /// Resolve against the band dimension this quantity is relative to.
    pub fn resolve(&self, reference: f64) -> f64 {
        match self {
            Dimension::Pt(v) => *v,
            Dimension::Percent(p) => reference * p / 100.0,
            Dimension::Fill => reference,
        }
    }
}

/// A grouping level: an attribute key plus optional header/footer bands.
/// Groups are declared outer to inner; a change in an outer group implies
/// all inner groups changed too.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Dotted attribute path extracting the group key from a record.
    pub attribute: String,

    #[serde(default)]
    pub header: Option<Band>,

    #[serde(default)]
    pub footer: Option<Band>,

    /// Break the page before this group's header (unless the header would
    /// open an already-fresh page).
    #[serde(default)]
    pub force_new_page: bool,
}

impl Group {
    pub fn on(attribute: &str) -> Self {
        Self {
            attribute: attribute.to_string(),
            header: None,
            footer: None,
            force_new_page: false,
        }
    }
}

/// Maps a parent record to the subreport's child record sequence.
pub type SubreportFetch = Arc<dyn Fn(&dyn Record) -> Vec<RecordRef> + Send + Sync>;

/// A nested banded mini-report driven by records derived from the current
/// parent record. The child sequence is refetched whenever the parent
/// record changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subreport {
    /// Rendered once before the first child record.
    #[serde(default)]
    pub header: Option<Band>,

    /// Rendered once per child record. Required; its absence is an
    /// invariant violation caught at layout time.
    #[serde(default)]
    pub detail: Option<Band>,

    /// Rendered once after the last child record.
    #[serde(default)]
    pub footer: Option<Band>,

    /// Produces the child record sequence for a parent record.
    #[serde(skip)]
    pub fetch: Option<FetchHook>,
}

/// Debug-printable wrapper for the subreport fetch closure.
#[derive(Clone)]
pub struct FetchHook(pub SubreportFetch);

impl FetchHook {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&dyn Record) -> Vec<RecordRef> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }
}

impl fmt::Debug for FetchHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FetchHook(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_resolution() {
        assert_eq!(Dimension::Pt(12.0).resolve(100.0), 12.0);
        assert_eq!(Dimension::Percent(50.0).resolve(200.0), 100.0);
        assert_eq!(Dimension::Fill.resolve(321.5), 321.5);
    }

    #[test]
    fn client_width_subtracts_margins() {
        let mut report = Report::with_detail(Band::new(20.0, vec![]));
        report.page_size = PageSize::Custom {
            width: 500.0,
            height: 800.0,
        };
        report.margin = Edges::uniform(50.0);
        assert_eq!(report.client_width(), 400.0);
    }

    #[test]
    fn for_each_band_visits_nested_and_group_bands() {
        let mut detail = Band::new(20.0, vec![]);
        detail.child_bands.push(Band::new(10.0, vec![]));
        let mut report = Report::with_detail(detail);
        report.groups.push(Group {
            attribute: "key".into(),
            header: Some(Band::new(15.0, vec![])),
            footer: Some(Band::new(15.0, vec![])),
            force_new_page: false,
        });

        let mut count = 0;
        report.for_each_band(&mut |_| count += 1);
        assert_eq!(count, 4); // detail + child + group header + group footer
    }

    #[test]
    fn report_definition_roundtrips_through_json() {
        let report = Report::with_detail(Band::new(
            24.0,
            vec![Element::object_value("name").sized(Dimension::Percent(40.0), Dimension::Fill)],
        ));
        let json = serde_json::to_string(&report).unwrap();
        let back: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(back.band_detail.height, 24.0);
        assert_eq!(back.band_detail.elements.len(), 1);
    }
}
