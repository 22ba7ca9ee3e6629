use crate::types::{DocumentId, SerializableDateTime};
use bson::Document as BsonDocument;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Name of the internal revision field maintained inside document data.
/// Bumped on every update; excluded by the default projection.
pub const VERSION_FIELD: &str = "__rev";

/// Name of the creation-time field injected into document data on insert.
pub const CREATED_AT_FIELD: &str = "created_at";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Metadata {
    pub created_at: SerializableDateTime,
    pub updated_at: SerializableDateTime,
    /// Per-collection insertion sequence; deterministic sort tie-breaker.
    pub seq: u64,
}

impl Metadata {
    #[must_use]
    pub fn new(seq: u64) -> Self {
        Self {
            created_at: SerializableDateTime(Utc::now()),
            updated_at: SerializableDateTime(Utc::now()),
            seq,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub data: BsonDocument,
    pub metadata: Metadata,
}

impl Document {
    #[must_use]
    pub fn new(data: BsonDocument, seq: u64) -> Self {
        Self { id: DocumentId::new(), data, metadata: Metadata::new(seq) }
    }

    /// Merges `patch` into the document's data (top-level set) and bumps
    /// the revision and updated-at timestamp.
    pub fn apply_patch(&mut self, patch: BsonDocument) {
        for (k, v) in patch {
            self.data.insert(k, v);
        }
        let rev = self.data.get_i64(VERSION_FIELD).unwrap_or(0);
        self.data.insert(VERSION_FIELD.to_string(), rev + 1);
        self.metadata.updated_at = SerializableDateTime(Utc::now());
    }
}
