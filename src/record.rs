//! # Records
//!
//! The engine consumes an ordered, finite sequence of opaque records.
//! Attribute access is by dotted path (`customer.address.city`), where each
//! segment may be a plain field, a mapping key, or a computed (zero-argument)
//! value — tried in that order. Rather than runtime reflection, each record
//! "shape" implements [`Record`] with one resolution method; the engine only
//! ever sees `&dyn Record`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ReportError, Result};

/// The value type flowing out of records. JSON values cover every attribute
/// shape the engine cares about (scalars, nested objects for path descent).
pub type Value = serde_json::Value;

/// A single data record. Implementors resolve one attribute segment at a
/// time; nested segments descend through returned object values.
pub trait Record: Send + Sync {
    /// Resolve a top-level attribute to a value, or `None` if the record
    /// has no such attribute.
    fn field(&self, name: &str) -> Option<Value>;
}

/// A shared, type-erased record handle as the engine passes them around.
pub type RecordRef = Arc<dyn Record>;

impl Record for Value {
    fn field(&self, name: &str) -> Option<Value> {
        match self {
            Value::Object(map) => map.get(name).cloned(),
            _ => None,
        }
    }
}

impl Record for serde_json::Map<String, Value> {
    fn field(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// A computed field: a zero-argument callable evaluated against the record's
/// base data. This is the typed stand-in for "the attribute is a method".
pub type ComputedField = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// A record backed by plain data plus named computed fields. Computed fields
/// shadow base fields of the same name.
#[derive(Clone)]
pub struct DerivedRecord {
    base: Value,
    computed: HashMap<String, ComputedField>,
}

impl DerivedRecord {
    pub fn new(base: Value) -> Self {
        Self {
            base,
            computed: HashMap::new(),
        }
    }

    /// Register a computed field under `name`.
    pub fn with_computed<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.computed.insert(name.to_string(), Arc::new(f));
        self
    }
}

impl Record for DerivedRecord {
    fn field(&self, name: &str) -> Option<Value> {
        if let Some(f) = self.computed.get(name) {
            return Some(f(&self.base));
        }
        self.base.field(name)
    }
}

impl fmt::Debug for DerivedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedRecord")
            .field("base", &self.base)
            .field("computed", &self.computed.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Resolve a dotted attribute path against a record, descending through
/// nested object values segment by segment.
///
/// Only the first segment goes through [`Record::field`]; the rest descend
/// through plain object values. A computed field can therefore sit only at
/// the first segment; deeper lookups still work when it returns a whole
/// object.
pub fn get_attr_value(record: &dyn Record, path: &str) -> Result<Value> {
    let mut segments = path.split('.');
    let first = segments.next().unwrap_or_default();
    let mut value = record
        .field(first)
        .ok_or_else(|| ReportError::AttributeNotFound {
            path: path.to_string(),
        })?;

    for segment in segments {
        value = match &value {
            Value::Object(map) => map.get(segment).cloned(),
            _ => None,
        }
        .ok_or_else(|| ReportError::AttributeNotFound {
            path: path.to_string(),
        })?;
    }

    Ok(value)
}

/// Render a value the way it should appear in a text element when the
/// caller supplies no formatting callback.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_flat_field() {
        let record = json!({"name": "Ada"});
        let value = get_attr_value(&record, "name").unwrap();
        assert_eq!(value, json!("Ada"));
    }

    #[test]
    fn resolves_nested_path() {
        let record = json!({"customer": {"address": {"city": "Lisbon"}}});
        let value = get_attr_value(&record, "customer.address.city").unwrap();
        assert_eq!(value, json!("Lisbon"));
    }

    #[test]
    fn bare_json_map_resolves_like_an_object_value() {
        let mut map = serde_json::Map::new();
        map.insert("name".to_string(), json!("Ada"));
        map.insert("customer".to_string(), json!({"city": "Lisbon"}));
        assert_eq!(get_attr_value(&map, "name").unwrap(), json!("Ada"));
        assert_eq!(
            get_attr_value(&map, "customer.city").unwrap(),
            json!("Lisbon")
        );
    }

    #[test]
    fn missing_attribute_is_an_error() {
        let record = json!({"name": "Ada"});
        let err = get_attr_value(&record, "age").unwrap_err();
        assert!(matches!(err, ReportError::AttributeNotFound { .. }));
    }

    #[test]
    fn missing_intermediate_segment_is_an_error() {
        let record = json!({"customer": {"name": "Ada"}});
        assert!(get_attr_value(&record, "customer.address.city").is_err());
    }

    #[test]
    fn computed_field_shadows_base_field() {
        let record = DerivedRecord::new(json!({"name": "ada", "qty": 3}))
            .with_computed("name", |base| {
                json!(base["name"].as_str().unwrap_or("").to_uppercase())
            });
        assert_eq!(get_attr_value(&record, "name").unwrap(), json!("ADA"));
        assert_eq!(get_attr_value(&record, "qty").unwrap(), json!(3));
    }

    #[test]
    fn computed_field_returning_an_object_supports_deeper_paths() {
        let record = DerivedRecord::new(json!({"city": "Lisbon", "zip": "1000"}))
            .with_computed("address", |base| {
                json!({"city": base["city"], "zip": base["zip"]})
            });
        assert_eq!(
            get_attr_value(&record, "address.city").unwrap(),
            json!("Lisbon")
        );
    }

    #[test]
    fn display_value_strips_quotes_from_strings() {
        assert_eq!(display_value(&json!("Ada")), "Ada");
        assert_eq!(display_value(&json!(42)), "42");
        assert_eq!(display_value(&Value::Null), "");
    }
}
