//! Per-collection write validation.
//!
//! A schema lists required fields, numeric bounds and optionally the full
//! set of known fields. Validation is deterministic, does not mutate
//! documents, and reports every violated field in one pass rather than
//! stopping at the first.

use crate::document::{CREATED_AT_FIELD, VERSION_FIELD};
use crate::errors::DbError;
use bson::{Bson, Document as BsonDocument};

#[derive(Debug, Clone)]
pub struct FieldBound {
    pub field: String,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CollectionSchema {
    required: Vec<String>,
    bounds: Vec<FieldBound>,
    known: Option<Vec<String>>,
}

impl CollectionSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn require(mut self, field: &str) -> Self {
        self.required.push(field.to_string());
        self
    }

    #[must_use]
    pub fn bound(mut self, field: &str, min: f64, max: f64) -> Self {
        self.bounds.push(FieldBound { field: field.to_string(), min, max });
        self
    }

    /// Closes the schema over `fields`: any other top-level field in a
    /// write is a violation. Store-maintained fields (`_id`, the revision
    /// and creation-time fields) are always accepted.
    #[must_use]
    pub fn known_fields(mut self, fields: &[&str]) -> Self {
        self.known = Some(fields.iter().map(|f| (*f).to_string()).collect());
        self
    }

    /// Validates a full candidate document (the merged result on update,
    /// never a bare patch), so bounds can see sibling fields.
    ///
    /// # Errors
    /// Returns `DbError::Validation` listing every violated field.
    pub fn validate(&self, doc: &BsonDocument) -> Result<(), DbError> {
        let mut violations = Vec::new();
        for field in &self.required {
            if doc.get(field.as_str()).is_none() {
                violations.push(format!("{field}: required"));
            }
        }
        for b in &self.bounds {
            if let Some(v) = doc.get(b.field.as_str())
                && let Some(n) = bson_num(v)
                && (n < b.min || n > b.max)
            {
                violations.push(format!(
                    "{}: must be between {} and {}",
                    b.field, b.min, b.max
                ));
            }
        }
        if let Some(known) = &self.known {
            for (field, _) in doc {
                if is_store_field(field) {
                    continue;
                }
                if !known.iter().any(|k| k == field) {
                    violations.push(format!("{field}: unknown field"));
                }
            }
        }
        if violations.is_empty() { Ok(()) } else { Err(DbError::Validation { fields: violations }) }
    }
}

fn is_store_field(field: &str) -> bool {
    field == "_id" || field == VERSION_FIELD || field == CREATED_AT_FIELD
}

#[allow(clippy::cast_precision_loss)]
fn bson_num(b: &Bson) -> Option<f64> {
    match b {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}
