use crate::document::{CREATED_AT_FIELD, Document, VERSION_FIELD};
use crate::errors::DbError;
use crate::query::exec::{bson_equal, get_path};
use crate::schema::CollectionSchema;
use crate::types::DocumentId;
use bson::{Bson, Document as BsonDocument};
use parking_lot::RwLock;
use std::collections::HashMap;

/// A unique (possibly compound) index. Checked on every write; documents
/// missing any of the indexed fields are not indexed (sparse semantics).
#[derive(Debug, Clone)]
pub struct UniqueIndex {
    pub name: String,
    pub fields: Vec<String>,
}

impl UniqueIndex {
    #[must_use]
    pub fn new(name: &str, fields: &[&str]) -> Self {
        Self { name: name.to_string(), fields: fields.iter().map(|f| (*f).to_string()).collect() }
    }
}

#[derive(Default)]
struct State {
    docs: HashMap<DocumentId, Document>,
    /// Insertion order; scans iterate this for deterministic results.
    order: Vec<DocumentId>,
    next_seq: u64,
}

pub struct Collection {
    name: String,
    state: RwLock<State>,
    schema: RwLock<Option<CollectionSchema>>,
    unique: RwLock<Vec<UniqueIndex>>,
}

impl Collection {
    #[must_use]
    pub fn new(name: String) -> Self {
        Self {
            name,
            state: RwLock::new(State::default()),
            schema: RwLock::new(None),
            unique: RwLock::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers the collection's write-time schema. Startup configuration.
    pub fn set_schema(&self, schema: CollectionSchema) {
        *self.schema.write() = Some(schema);
    }

    /// Registers a unique index. Startup configuration; existing documents
    /// are not re-checked.
    pub fn add_unique_index(&self, index: UniqueIndex) {
        self.unique.write().push(index);
    }

    /// Inserts a document, injecting `_id`, `created_at` (when absent) and
    /// the internal revision field.
    ///
    /// # Errors
    /// `Validation` when the schema rejects the document, `Conflict` when a
    /// unique index already holds the candidate's key.
    pub fn insert_document(&self, mut data: BsonDocument) -> Result<Document, DbError> {
        if data.get(CREATED_AT_FIELD).is_none() {
            data.insert(CREATED_AT_FIELD.to_string(), Bson::DateTime(bson::DateTime::now()));
        }
        if let Some(schema) = self.schema.read().as_ref() {
            schema.validate(&data)?;
        }
        self.check_unique(&data, None)?;

        let mut state = self.state.write();
        let seq = state.next_seq;
        state.next_seq += 1;
        let mut doc = Document::new(data, seq);
        doc.data.insert("_id".to_string(), doc.id.to_string());
        doc.data.insert(VERSION_FIELD.to_string(), 1_i64);
        state.order.push(doc.id.clone());
        state.docs.insert(doc.id.clone(), doc.clone());
        Ok(doc)
    }

    #[must_use]
    pub fn find_document(&self, id: &DocumentId) -> Option<Document> {
        self.state.read().docs.get(id).cloned()
    }

    /// Applies `patch` (top-level field set) to an existing document. The
    /// merged document is validated, so field bounds hold on update too.
    ///
    /// # Errors
    /// `NotFound` when `id` has no document, plus the insert error cases.
    pub fn update_document(&self, id: &DocumentId, patch: BsonDocument) -> Result<Document, DbError> {
        let mut candidate = self.find_document(id).ok_or_else(|| DbError::NotFound {
            collection: self.name.clone(),
            id: id.to_string(),
        })?;
        candidate.apply_patch(patch);
        if let Some(schema) = self.schema.read().as_ref() {
            schema.validate(&candidate.data)?;
        }
        self.check_unique(&candidate.data, Some(id))?;

        let mut state = self.state.write();
        state.docs.insert(id.clone(), candidate.clone());
        Ok(candidate)
    }

    pub fn delete_document(&self, id: &DocumentId) -> bool {
        let mut state = self.state.write();
        if state.docs.remove(id).is_some() {
            state.order.retain(|d| d != id);
            true
        } else {
            false
        }
    }

    /// All documents in insertion order.
    #[must_use]
    pub fn scan(&self) -> Vec<Document> {
        let state = self.state.read();
        state.order.iter().filter_map(|id| state.docs.get(id).cloned()).collect()
    }

    /// First document (in insertion order) whose value at `path` equals
    /// `value`. Used for internal lookups such as user-by-email.
    #[must_use]
    pub fn find_one_eq(&self, path: &str, value: &Bson) -> Option<Document> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|id| state.docs.get(id))
            .find(|d| get_path(&d.data, path).is_some_and(|v| bson_equal(v, value)))
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_unique(&self, candidate: &BsonDocument, exclude: Option<&DocumentId>) -> Result<(), DbError> {
        let indexes = self.unique.read();
        if indexes.is_empty() {
            return Ok(());
        }
        let state = self.state.read();
        for index in indexes.iter() {
            let Some(key) = index_key(candidate, &index.fields) else { continue };
            let taken = state
                .order
                .iter()
                .filter(|id| exclude != Some(*id))
                .filter_map(|id| state.docs.get(id))
                .any(|d| index_key(&d.data, &index.fields).is_some_and(|k| keys_equal(&key, &k)));
            if taken {
                return Err(DbError::Conflict {
                    collection: self.name.clone(),
                    index: index.name.clone(),
                });
            }
        }
        Ok(())
    }
}

fn index_key<'a>(doc: &'a BsonDocument, fields: &[String]) -> Option<Vec<&'a Bson>> {
    fields.iter().map(|f| get_path(doc, f)).collect()
}

fn keys_equal(a: &[&Bson], b: &[&Bson]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| bson_equal(x, y))
}
