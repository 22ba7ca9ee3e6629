//! Relation hydration.
//!
//! A `RelationDescriptor` declares, per collection, a reference field that
//! is populated on every read: the referenced document is inlined in place
//! of the raw id, minus the descriptor's excluded sub-fields. The registry
//! is built at startup and immutable afterwards; decoration is applied once
//! at plan-construction time rather than through implicit store hooks, so
//! the behavior is visible and testable at every call site.

use crate::document::VERSION_FIELD;
use crate::engine::Engine;
use crate::query::exec::remove_path;
use crate::query::plan::QueryPlan;
use crate::types::DocumentId;
use bson::{Bson, Document as BsonDocument};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct RelationDescriptor {
    pub owner_collection: String,
    /// Field on the owner holding the target id, or an array of target ids.
    pub reference_field: String,
    pub target_collection: String,
    /// Sub-fields stripped from every populated document.
    pub excluded_subfields: Vec<String>,
}

impl RelationDescriptor {
    #[must_use]
    pub fn new(
        owner_collection: &str,
        reference_field: &str,
        target_collection: &str,
        excluded_subfields: &[&str],
    ) -> Self {
        Self {
            owner_collection: owner_collection.to_string(),
            reference_field: reference_field.to_string(),
            target_collection: target_collection.to_string(),
            excluded_subfields: excluded_subfields.iter().map(|f| (*f).to_string()).collect(),
        }
    }
}

/// Startup-time registry of relation descriptors, keyed by owner collection.
/// Shared immutably (behind `Arc`) by every handler. There is no per-call
/// opt-out; a read always returns hydrated relations.
#[derive(Debug, Default)]
pub struct HydratorRegistry {
    by_owner: HashMap<String, Vec<RelationDescriptor>>,
}

impl HydratorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: RelationDescriptor) {
        self.by_owner.entry(descriptor.owner_collection.clone()).or_default().push(descriptor);
    }

    /// Descriptors for `collection` in registration order.
    #[must_use]
    pub fn descriptors_for(&self, collection: &str) -> &[RelationDescriptor] {
        self.by_owner.get(collection).map_or(&[], Vec::as_slice)
    }

    /// Appends the collection's population directives to a plan. Applied to
    /// every find-family read, including internally issued scoped lists.
    #[must_use]
    pub fn decorate(&self, mut plan: QueryPlan) -> QueryPlan {
        plan.populate.extend(self.descriptors_for(&plan.collection).iter().cloned());
        plan
    }
}

/// Inlines the referenced document(s) for one directive. A dangling or
/// non-string reference is left as-is: hydration is best-effort decoration,
/// not referential enforcement.
pub fn apply_populate(engine: &Engine, doc: &mut BsonDocument, d: &RelationDescriptor) {
    let Some(value) = doc.get(d.reference_field.as_str()).cloned() else { return };
    let populated = match value {
        Bson::String(id) => lookup(engine, d, &id).unwrap_or(Bson::String(id)),
        Bson::Array(items) => Bson::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Bson::String(id) => lookup(engine, d, &id).unwrap_or(Bson::String(id)),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    };
    doc.insert(d.reference_field.clone(), populated);
}

fn lookup(engine: &Engine, d: &RelationDescriptor, id: &str) -> Option<Bson> {
    let col = engine.get_collection(&d.target_collection)?;
    let mut target = col.find_document(&DocumentId::from(id))?.data;
    target.remove(VERSION_FIELD);
    for f in &d.excluded_subfields {
        remove_path(&mut target, f);
    }
    Some(Bson::Document(target))
}
