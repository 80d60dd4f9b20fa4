//! # Result Caching
//!
//! Laying out the same report over the same records is deterministic, so a
//! caller can skip a repeated pass entirely by keying rendered output on a
//! content hash of the input. The key concatenates, per record, the values
//! of every layout-relevant attribute — every attribute referenced by a
//! value-producing element plus every group key — and digests the result
//! with SHA-512. Previously rendered pages hash through their own canonical
//! string form instead.
//!
//! Backends are read-before-write: `store` checks for an existing entry and
//! otherwise writes. Concurrent writers racing on the same key are fine with
//! last-write-wins, because content is deterministic for identical inputs.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha512};

use crate::error::Result;
use crate::layout::LayoutPage;
use crate::model::{Element, ElementKind, Report};
use crate::record::{display_value, get_attr_value, RecordRef};

/// Every attribute path whose value can influence layout output: attributes
/// referenced by value-producing elements, plus all group keys. Sorted and
/// deduplicated so the key is stable across equivalent definitions.
pub fn relevant_attributes(report: &Report) -> Vec<String> {
    let mut attrs = BTreeSet::new();
    report.for_each_band(&mut |band| {
        for element in &band.elements {
            collect_element_attributes(element, &mut attrs);
        }
    });
    for group in &report.groups {
        attrs.insert(group.attribute.clone());
    }
    attrs.into_iter().collect()
}

fn collect_element_attributes(element: &Element, out: &mut BTreeSet<String>) {
    match &element.kind {
        ElementKind::ObjectValue { attribute } | ElementKind::Barcode { attribute } => {
            out.insert(attribute.clone());
        }
        ElementKind::Many { template, .. } => collect_element_attributes(template, out),
        _ => {}
    }
}

/// Stable hash key for a record sequence under a report definition.
/// Identical inputs always produce identical keys; mutating any
/// layout-relevant attribute of any record changes the key.
pub fn hash_key(report: &Report, records: &[RecordRef]) -> Result<String> {
    let attrs = relevant_attributes(report);
    let mut lines = Vec::with_capacity(records.len());
    for record in records {
        let mut parts = Vec::with_capacity(attrs.len());
        for attr in &attrs {
            parts.push(display_value(&get_attr_value(record.as_ref(), attr)?));
        }
        lines.push(parts.join("/"));
    }
    Ok(digest(report, &lines))
}

/// Hash key built from already-rendered pages instead of source records.
pub fn hash_key_for_pages(report: &Report, pages: &[LayoutPage]) -> String {
    let lines: Vec<String> = pages.iter().map(LayoutPage::repr_for_cache_key).collect();
    digest(report, &lines)
}

fn digest(report: &Report, lines: &[String]) -> String {
    let mut hasher = Sha512::new();
    hasher.update(lines.join("\n").as_bytes());
    let hex: String = hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    if report.cache_prefix.is_empty() {
        hex
    } else {
        format!("{}-{}", report.cache_prefix, hex)
    }
}

/// Storage for rendered output keyed by content hash.
pub trait CacheBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, content: &[u8]) -> Result<()>;
    fn exists(&self, key: &str) -> bool;

    /// Read-before-write: keep an existing entry, otherwise store. Races
    /// between writers are harmless — content is deterministic per key.
    fn store(&self, key: &str, content: &[u8]) -> Result<()> {
        if self.exists(key) {
            return Ok(());
        }
        self.set(key, content)
    }
}

/// Stores rendered output as files under a root directory,
/// one file per hash key.
pub struct FileCacheBackend {
    root: PathBuf,
}

impl FileCacheBackend {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl CacheBackend for FileCacheBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if !self.exists(key) {
            return Ok(None);
        }
        Ok(Some(fs::read(self.entry_path(key))?))
    }

    fn set(&self, key: &str, content: &[u8]) -> Result<()> {
        fs::write(self.entry_path(key), content)?;
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        self.entry_path(key).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Band, Group, Report};
    use serde_json::json;
    use std::sync::Arc;

    fn report() -> Report {
        let mut report = Report::with_detail(Band::new(
            20.0,
            vec![Element::object_value("name"), Element::object_value("qty")],
        ));
        report.groups.push(Group::on("region"));
        report
    }

    fn records(data: Vec<serde_json::Value>) -> Vec<RecordRef> {
        data.into_iter()
            .map(|v| Arc::new(v) as RecordRef)
            .collect()
    }

    #[test]
    fn relevant_attributes_cover_elements_and_groups() {
        let attrs = relevant_attributes(&report());
        assert_eq!(attrs, vec!["name", "qty", "region"]);
    }

    #[test]
    fn hash_key_is_idempotent() {
        let report = report();
        let recs = records(vec![
            json!({"name": "a", "qty": 1, "region": "n"}),
            json!({"name": "b", "qty": 2, "region": "s"}),
        ]);
        let k1 = hash_key(&report, &recs).unwrap();
        let k2 = hash_key(&report, &recs).unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn mutating_a_relevant_attribute_changes_the_key() {
        let report = report();
        let recs = records(vec![json!({"name": "a", "qty": 1, "region": "n"})]);
        let mutated = records(vec![json!({"name": "a", "qty": 2, "region": "n"})]);
        assert_ne!(
            hash_key(&report, &recs).unwrap(),
            hash_key(&report, &mutated).unwrap()
        );
    }

    #[test]
    fn irrelevant_attributes_do_not_affect_the_key() {
        let report = report();
        let recs = records(vec![json!({"name": "a", "qty": 1, "region": "n", "note": "x"})]);
        let other = records(vec![json!({"name": "a", "qty": 1, "region": "n", "note": "y"})]);
        assert_eq!(
            hash_key(&report, &recs).unwrap(),
            hash_key(&report, &other).unwrap()
        );
    }

    #[test]
    fn page_based_key_tracks_the_rendered_output() {
        let report = report();
        let recs = records(vec![
            json!({"name": "a", "qty": 1, "region": "n"}),
            json!({"name": "b", "qty": 2, "region": "n"}),
        ]);
        let result = crate::layout(&report, &recs).unwrap();

        let k1 = hash_key_for_pages(&report, &result.pages);
        let k2 = hash_key_for_pages(&report, &result.pages);
        assert_eq!(k1, k2);

        // Moving an element changes the canonical page form, and the key.
        let mut moved = result.pages.clone();
        moved[0].elements[0].x += 1.0;
        assert_ne!(k1, hash_key_for_pages(&report, &moved));
    }

    #[test]
    fn cache_prefix_lands_in_the_key() {
        let mut report = report();
        report.cache_prefix = "invoices".to_string();
        let recs = records(vec![json!({"name": "a", "qty": 1, "region": "n"})]);
        let key = hash_key(&report, &recs).unwrap();
        assert!(key.starts_with("invoices-"));
    }

    #[test]
    fn file_backend_roundtrip_and_store_once() {
        let root = std::env::temp_dir().join(format!(
            "rapport-cache-test-{}",
            std::process::id()
        ));
        let backend = FileCacheBackend::new(&root).unwrap();

        assert!(!backend.exists("k"));
        assert_eq!(backend.get("k").unwrap(), None);

        backend.store("k", b"first").unwrap();
        assert_eq!(backend.get("k").unwrap().as_deref(), Some(&b"first"[..]));

        // Existing entry wins on store.
        backend.store("k", b"second").unwrap();
        assert_eq!(backend.get("k").unwrap().as_deref(), Some(&b"first"[..]));

        fs::remove_dir_all(&root).unwrap();
    }
}
