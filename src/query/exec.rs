//! Plan execution: filter evaluation, stable sorting, pagination slicing,
//! population and projection against the engine.

use super::plan::QueryPlan;
use super::types::{CmpOp, Filter, MAX_PATH_DEPTH, MAX_REGEX_PATTERN, Order, Projection, SortSpec};
use crate::document::Document;
use crate::engine::Engine;
use crate::errors::DbError;
use crate::hydrate;
use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

/// Executes a read plan. Pipeline order: filter -> sort -> paginate ->
/// populate -> project. Population runs before projection so an explicit
/// include-list still sees hydrated fields.
///
/// # Errors
/// Returns `NoSuchCollection` for an unknown collection; an empty result is
/// `Ok(vec![])`, never an error.
pub fn execute(engine: &Engine, plan: &QueryPlan) -> Result<Vec<BsonDocument>, DbError> {
    let col = engine.collection(&plan.collection)?;

    // Scan is in insertion order and the sort below is stable, so equal keys
    // keep that order: deterministic tie-breaking for a fixed dataset.
    let mut docs: Vec<Document> = col.scan();
    docs.retain(|d| eval_filter(&d.data, &plan.filter));
    sort_docs(&mut docs, &plan.sort);

    let skip = usize::try_from(plan.pagination.skip()).unwrap_or(usize::MAX);
    let limit = usize::try_from(plan.pagination.limit).unwrap_or(usize::MAX);
    let end = skip.saturating_add(limit).min(docs.len());
    let page: Vec<Document> = if skip >= docs.len() { Vec::new() } else { docs[skip..end].to_vec() };

    let mut out = Vec::with_capacity(page.len());
    for doc in page {
        let mut data = doc.data;
        for directive in &plan.populate {
            hydrate::apply_populate(engine, &mut data, directive);
        }
        out.push(apply_projection(&data, &plan.projection));
    }
    Ok(out)
}

#[must_use]
pub fn eval_filter(doc: &BsonDocument, f: &Filter) -> bool {
    match f {
        Filter::True => true,
        Filter::And(v) => v.iter().all(|x| eval_filter(doc, x)),
        Filter::Cmp { path, op, value } => match (get_path(doc, path), op) {
            (Some(v), CmpOp::Eq) => bson_equal(v, value),
            (Some(v), CmpOp::Gt) => bson_cmp(v, value).is_some_and(|o| o == Ordering::Greater),
            (Some(v), CmpOp::Gte) => bson_cmp(v, value).is_some_and(|o| o != Ordering::Less),
            (Some(v), CmpOp::Lt) => bson_cmp(v, value).is_some_and(|o| o == Ordering::Less),
            (Some(v), CmpOp::Lte) => bson_cmp(v, value).is_some_and(|o| o != Ordering::Greater),
            _ => false,
        },
        Filter::Regex { path, pattern } => match get_path(doc, path) {
            Some(Bson::String(s)) => {
                if pattern.len() > MAX_REGEX_PATTERN {
                    return false;
                }
                match regex::Regex::new(pattern) {
                    Ok(re) => re.is_match(s),
                    Err(_) => false,
                }
            }
            _ => false,
        },
    }
}

pub(crate) fn get_path<'a>(doc: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    let mut iter = path.split('.');
    let first = iter.next()?;
    let mut depth = 1usize;
    let mut cur: Option<&Bson> = doc.get(first);
    for part in iter {
        depth += 1;
        if depth > MAX_PATH_DEPTH {
            return None;
        }
        match cur {
            Some(Bson::Document(d)) => {
                cur = d.get(part);
            }
            _ => return None,
        }
    }
    cur
}

#[allow(clippy::cast_precision_loss)]
fn to_f64(b: &Bson) -> Option<f64> {
    match b {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

#[allow(clippy::float_cmp, clippy::cast_precision_loss)]
pub(crate) fn bson_equal(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        (Bson::Int32(x), Bson::Int64(y)) => i64::from(*x) == *y,
        (Bson::Int64(x), Bson::Int32(y)) => *x == i64::from(*y),
        (Bson::Int32(x), Bson::Double(y)) => f64::from(*x) == *y,
        (Bson::Double(x), Bson::Int32(y)) => *x == f64::from(*y),
        (Bson::Int64(x), Bson::Double(y)) => (*x as f64) == *y,
        (Bson::Double(x), Bson::Int64(y)) => *x == (*y as f64),
        _ => a == b,
    }
}

pub(crate) fn bson_cmp(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(af), Some(bf)) = (to_f64(a), to_f64(b)) {
        return af.partial_cmp(&bf);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn sort_docs(docs: &mut [Document], specs: &[SortSpec]) {
    docs.sort_by(|a, b| compare_docs(&a.data, &b.data, specs));
}

fn compare_docs(a: &BsonDocument, b: &BsonDocument, specs: &[SortSpec]) -> Ordering {
    for s in specs {
        let av = get_path(a, &s.field);
        let bv = get_path(b, &s.field);
        let ord = match (av, bv) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(ax), Some(bx)) => bson_cmp(ax, bx).unwrap_or(Ordering::Equal),
        };
        if ord != Ordering::Equal {
            return if s.order == Order::Asc { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

#[must_use]
pub(crate) fn apply_projection(doc: &BsonDocument, projection: &Projection) -> BsonDocument {
    match projection {
        Projection::Include(fields) => {
            let mut out = BsonDocument::new();
            for f in fields {
                if let Some(v) = get_path(doc, f) {
                    out.insert(f.clone(), v.clone());
                }
            }
            out
        }
        Projection::Exclude(fields) => {
            let mut out = doc.clone();
            for f in fields {
                remove_path(&mut out, f);
            }
            out
        }
    }
}

pub(crate) fn remove_path(doc: &mut BsonDocument, path: &str) {
    let parts: Vec<&str> = path.split('.').collect();
    let Some((last, init)) = parts.split_last() else { return };
    let mut cur = doc;
    for key in init {
        match cur.get_mut(*key) {
            Some(Bson::Document(d)) => {
                cur = d;
            }
            _ => return,
        }
    }
    cur.remove(*last);
}
