//! Query planning: composes filter, sort, projection and pagination into
//! one executable plan against a named collection.

use super::parse::parse_query;
use super::types::{Filter, Pagination, Projection, SortSpec};
use crate::hydrate::RelationDescriptor;
use bson::Bson;

/// An executable read plan. Constructed per request, decorated by the
/// relation hydrator, executed once, then discarded.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub collection: String,
    pub filter: Filter,
    pub sort: Vec<SortSpec>,
    pub projection: Projection,
    pub pagination: Pagination,
    pub populate: Vec<RelationDescriptor>,
}

/// Builds a list plan for `collection` from raw query pairs.
///
/// Guarantees: result set size <= `pagination.limit`; ordering is stable per
/// `sort` and tie-broken by insertion order, so it is deterministic for a
/// fixed dataset.
#[must_use]
pub fn build_list(collection: &str, pairs: &[(String, String)]) -> QueryPlan {
    let parsed = parse_query(pairs);
    QueryPlan {
        collection: collection.to_string(),
        filter: parsed.filter,
        sort: parsed.sort,
        projection: parsed.projection,
        pagination: parsed.pagination,
        populate: Vec::new(),
    }
}

/// Like `build_list`, but with an injected equality filter
/// `{parent_field: parent_id}` for nested-resource listing. The scope is
/// ANDed on top of whatever the client sent, so a client-supplied filter on
/// the same field can narrow the result but never widen it.
#[must_use]
pub fn build_scoped_list(
    collection: &str,
    parent_field: &str,
    parent_id: &str,
    pairs: &[(String, String)],
) -> QueryPlan {
    let mut plan = build_list(collection, pairs);
    let scope = Filter::eq(parent_field, Bson::String(parent_id.to_string()));
    plan.filter = std::mem::replace(&mut plan.filter, Filter::True).and(scope);
    plan
}
