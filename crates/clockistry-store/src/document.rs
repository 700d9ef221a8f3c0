//! Sparse JSON documents and equality filters

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{StoreError, StoreResult};

/// A stored record: a flat JSON object
pub type Document = serde_json::Map<String, Value>;

/// Serialize a value into a document, dropping every top-level `null`.
///
/// The store never holds explicit nulls; a field with no value is simply
/// absent from the record.
pub fn to_document<T: Serialize>(value: &T) -> StoreResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(mut doc) => {
            strip_absent(&mut doc);
            Ok(doc)
        }
        other => Err(StoreError::Serialization(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Decode a document back into a typed record
pub fn from_document<T: DeserializeOwned>(doc: Document) -> StoreResult<T> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// Remove fields whose value is `null`
pub fn strip_absent(doc: &mut Document) {
    doc.retain(|_, v| !v.is_null());
}

/// Overwrite top-level fields of `doc`; `null` values are skipped
pub fn merge_fields(doc: &mut Document, fields: Document) {
    for (key, value) in fields {
        if !value.is_null() {
            doc.insert(key, value);
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Equality predicate on a top-level field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

impl FieldFilter {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether `doc` satisfies this filter. A missing field only matches `null`.
    pub fn matches(&self, doc: &Document) -> bool {
        match doc.get(&self.field) {
            Some(v) => v == &self.value,
            None => self.value.is_null(),
        }
    }
}

/// Whether `doc` satisfies every filter
pub fn matches_all(doc: &Document, filters: &[FieldFilter]) -> bool {
    filters.iter().all(|f| f.matches(doc))
}
