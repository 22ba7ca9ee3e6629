//! Generic per-collection CRUD handlers.
//!
//! A `ResourceHandler` is configured once per resource (collection name,
//! optional update allow-list, hydrator registry, optional post-commit stat
//! events) and produces the five operations every resource shares. None of
//! them retries internally; typed errors propagate for a boundary layer to
//! translate into transport responses.

use crate::aggregate::StatEvent;
use crate::engine::Engine;
use crate::errors::DbError;
use crate::hydrate::{HydratorRegistry, RelationDescriptor};
use crate::query::exec::{self, apply_projection};
use crate::query::plan::{build_list, build_scoped_list};
use crate::query::types::Projection;
use crate::types::DocumentId;
use bson::{Bson, Document as BsonDocument};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Explicit caller identity, passed into the operations that need it.
/// There is no ambient per-request state in this layer.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListResult {
    pub items: Vec<BsonDocument>,
    pub count: usize,
}

pub struct ResourceHandler {
    engine: Arc<Engine>,
    hydrator: Arc<HydratorRegistry>,
    collection: String,
    allowed_update_fields: Option<Vec<String>>,
    stat_events: Option<(UnboundedSender<StatEvent>, String)>,
}

impl ResourceHandler {
    #[must_use]
    pub fn new(engine: Arc<Engine>, hydrator: Arc<HydratorRegistry>, collection: &str) -> Self {
        Self {
            engine,
            hydrator,
            collection: collection.to_string(),
            allowed_update_fields: None,
            stat_events: None,
        }
    }

    /// Restricts `update` to the given fields. Anything else submitted is
    /// silently dropped before the write, regardless of the caller.
    #[must_use]
    pub fn allow_update_fields(mut self, fields: &[&str]) -> Self {
        self.allowed_update_fields = Some(fields.iter().map(|f| (*f).to_string()).collect());
        self
    }

    /// After every successful create/update/delete, sends a `StatEvent` for
    /// the parent id found at `parent_field` on the written document.
    #[must_use]
    pub fn notify_stats(mut self, sender: UnboundedSender<StatEvent>, parent_field: &str) -> Self {
        self.stat_events = Some((sender, parent_field.to_string()));
        self
    }

    /// List documents per the raw query pairs. An empty result is `Ok` with
    /// `count` 0, never an error.
    ///
    /// # Errors
    /// `NoSuchCollection` only.
    pub fn list(&self, params: &[(String, String)]) -> Result<ListResult, DbError> {
        let plan = self.hydrator.decorate(build_list(&self.collection, params));
        let items = exec::execute(&self.engine, &plan)?;
        Ok(ListResult { count: items.len(), items })
    }

    /// Nested-resource listing: everything `list` does, scoped to documents
    /// whose `parent_field` equals `parent_id`.
    ///
    /// # Errors
    /// `NoSuchCollection` only.
    pub fn list_scoped(
        &self,
        parent_field: &str,
        parent_id: &str,
        params: &[(String, String)],
    ) -> Result<ListResult, DbError> {
        let plan = self
            .hydrator
            .decorate(build_scoped_list(&self.collection, parent_field, parent_id, params));
        let items = exec::execute(&self.engine, &plan)?;
        Ok(ListResult { count: items.len(), items })
    }

    /// Fetch one document by id, hydrated, with the default projection.
    ///
    /// # Errors
    /// `NotFound` when the id has no document.
    pub fn get(&self, id: &str) -> Result<BsonDocument, DbError> {
        self.get_with(id, &[])
    }

    /// Like `get`, with extra population directives applied after the
    /// registry's. A single fetch can attach a relation its list view does
    /// not carry; the registered relations are never suppressed.
    ///
    /// # Errors
    /// `NotFound` when the id has no document.
    pub fn get_with(
        &self,
        id: &str,
        extra_populate: &[RelationDescriptor],
    ) -> Result<BsonDocument, DbError> {
        let col = self.engine.collection(&self.collection)?;
        let doc = col.find_document(&DocumentId::from(id)).ok_or_else(|| DbError::NotFound {
            collection: self.collection.clone(),
            id: id.to_string(),
        })?;
        let mut data = doc.data;
        let registered = self.hydrator.descriptors_for(&self.collection);
        for directive in registered.iter().chain(extra_populate) {
            crate::hydrate::apply_populate(&self.engine, &mut data, directive);
        }
        Ok(apply_projection(&data, &Projection::default()))
    }

    /// # Errors
    /// `Validation` from the collection schema, `Conflict` from a unique
    /// index.
    pub fn create(&self, body: BsonDocument) -> Result<BsonDocument, DbError> {
        let col = self.engine.collection(&self.collection)?;
        let doc = col.insert_document(body)?;
        self.emit_stat(&doc.data);
        Ok(doc.data)
    }

    /// Nested create: fills the parent reference from the path parameter and
    /// the user reference from the caller identity when the body omits them.
    ///
    /// # Errors
    /// Same as `create`.
    pub fn create_nested(
        &self,
        mut body: BsonDocument,
        parent_field: &str,
        parent_id: &str,
        identity: &Identity,
    ) -> Result<BsonDocument, DbError> {
        if body.get(parent_field).is_none() {
            body.insert(parent_field.to_string(), parent_id.to_string());
        }
        if body.get("user").is_none() {
            body.insert("user".to_string(), identity.user_id.clone());
        }
        self.create(body)
    }

    /// Updates one document. With an allow-list configured, the body is
    /// filtered to it first (the mass-assignment guard).
    ///
    /// # Errors
    /// `NotFound`, `Validation` or `Conflict`.
    pub fn update(&self, id: &str, body: BsonDocument) -> Result<BsonDocument, DbError> {
        let body = match &self.allowed_update_fields {
            Some(allowed) => filter_fields(body, allowed),
            None => body,
        };
        let col = self.engine.collection(&self.collection)?;
        let doc = col.update_document(&DocumentId::from(id), body)?;
        self.emit_stat(&doc.data);
        Ok(doc.data)
    }

    /// # Errors
    /// `NotFound` when the id has no document.
    pub fn delete(&self, id: &str) -> Result<(), DbError> {
        let col = self.engine.collection(&self.collection)?;
        let doc_id = DocumentId::from(id);
        let existing = col.find_document(&doc_id).ok_or_else(|| DbError::NotFound {
            collection: self.collection.clone(),
            id: id.to_string(),
        })?;
        col.delete_document(&doc_id);
        self.emit_stat(&existing.data);
        Ok(())
    }

    // Post-commit notification; fire-and-forget relative to the response.
    fn emit_stat(&self, data: &BsonDocument) {
        if let Some((sender, parent_field)) = &self.stat_events
            && let Some(Bson::String(parent_id)) = data.get(parent_field.as_str())
            && sender.send(StatEvent { parent_id: parent_id.clone() }).is_err()
        {
            log::warn!("stat event channel closed; dropping recompute for {parent_id}");
        }
    }
}

/// Keeps only the allowed fields of a write body.
#[must_use]
pub fn filter_fields(body: BsonDocument, allowed: &[String]) -> BsonDocument {
    let mut out = BsonDocument::new();
    for (k, v) in body {
        if allowed.iter().any(|a| *a == k) {
            out.insert(k, v);
        }
    }
    out
}
