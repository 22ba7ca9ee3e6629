//! Query-string parsing.
//!
//! Input is the decoded query string as ordered key/value pairs. Reserved
//! keys (`page`, `sort`, `limit`, `fields`) are directives, not filters.
//! Comparison operators are recognized only as bracketed suffixes from a
//! fixed whitelist (`field[gte]=5`); any other bracketed token degrades to a
//! literal equality match and can never select an operator. Malformed-but-
//! harmless input degrades to defaults instead of erroring.

use super::types::{
    CmpOp, DEFAULT_LIMIT, DEFAULT_PAGE, Filter, MAX_LIMIT, MAX_PROJECTION_FIELDS,
    MAX_SORT_FIELDS, Order, Pagination, Projection, SortSpec,
};
use crate::document::CREATED_AT_FIELD;
use bson::Bson;

pub const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];

const OPERATOR_TOKENS: [(&str, CmpOp); 4] =
    [("gt", CmpOp::Gt), ("gte", CmpOp::Gte), ("lt", CmpOp::Lt), ("lte", CmpOp::Lte)];

#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub filter: Filter,
    pub sort: Vec<SortSpec>,
    pub projection: Projection,
    pub pagination: Pagination,
}

/// Parses decoded query-string pairs into the four query specs.
/// Pure transform; no store access, never errors.
#[must_use]
pub fn parse_query(pairs: &[(String, String)]) -> ParsedQuery {
    let mut predicates = Vec::new();
    let mut sort_raw = None;
    let mut fields_raw = None;
    let mut page_raw = None;
    let mut limit_raw = None;

    for (key, value) in pairs {
        match key.as_str() {
            "sort" => sort_raw = Some(value.as_str()),
            "fields" => fields_raw = Some(value.as_str()),
            "page" => page_raw = Some(value.as_str()),
            "limit" => limit_raw = Some(value.as_str()),
            _ => predicates.push(parse_predicate(key, value)),
        }
    }

    let filter = match predicates.len() {
        0 => Filter::True,
        1 => predicates.pop().unwrap_or(Filter::True),
        _ => Filter::And(predicates),
    };

    ParsedQuery {
        filter,
        sort: parse_sort(sort_raw),
        projection: parse_fields(fields_raw),
        pagination: parse_pagination(page_raw, limit_raw),
    }
}

fn parse_predicate(key: &str, value: &str) -> Filter {
    if let Some((field, token)) = split_bracketed(key) {
        for (tok, op) in OPERATOR_TOKENS {
            if token == tok {
                return Filter::Cmp { path: field.to_string(), op, value: coerce_scalar(value) };
            }
        }
        if token == "regex" {
            return Filter::Regex { path: field.to_string(), pattern: value.to_string() };
        }
        // Unrecognized token: literal equality on the nested path, raw
        // string value. The token participates only as data.
        return Filter::Cmp {
            path: format!("{field}.{token}"),
            op: CmpOp::Eq,
            value: Bson::String(value.to_string()),
        };
    }
    Filter::Cmp { path: key.to_string(), op: CmpOp::Eq, value: coerce_scalar(value) }
}

/// `price[gte]` -> `("price", "gte")`; anything else is a plain field name.
fn split_bracketed(key: &str) -> Option<(&str, &str)> {
    let open = key.find('[')?;
    let rest = &key[open + 1..];
    if !rest.ends_with(']') || open == 0 {
        return None;
    }
    let token = &rest[..rest.len() - 1];
    if token.is_empty() {
        return None;
    }
    Some((&key[..open], token))
}

/// Query-string values are untyped; comparisons must still work
/// numerically, so scalars are coerced i64 -> f64 -> bool -> string.
#[must_use]
pub fn coerce_scalar(raw: &str) -> Bson {
    if let Ok(i) = raw.parse::<i64>() {
        return Bson::Int64(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Bson::Double(f);
    }
    match raw {
        "true" => Bson::Boolean(true),
        "false" => Bson::Boolean(false),
        _ => Bson::String(raw.to_string()),
    }
}

/// `sort=price,-ratingsAverage` -> ascending price, descending average.
/// Absent or empty: single descending sort on creation time.
fn parse_sort(raw: Option<&str>) -> Vec<SortSpec> {
    let specs: Vec<SortSpec> = raw
        .unwrap_or_default()
        .split(',')
        .filter(|s| !s.is_empty())
        .take(MAX_SORT_FIELDS)
        .map(|s| {
            s.strip_prefix('-').map_or_else(
                || SortSpec::new(s, Order::Asc),
                |field| SortSpec::new(field, Order::Desc),
            )
        })
        .collect();
    if specs.is_empty() {
        vec![SortSpec::new(CREATED_AT_FIELD, Order::Desc)]
    } else {
        specs
    }
}

/// Presence of `fields` always means an include-list, replacing the default
/// exclusion of the internal revision field.
fn parse_fields(raw: Option<&str>) -> Projection {
    match raw {
        Some(list) => {
            let fields: Vec<String> = list
                .split(',')
                .filter(|s| !s.is_empty())
                .take(MAX_PROJECTION_FIELDS)
                .map(str::to_string)
                .collect();
            if fields.is_empty() { Projection::default() } else { Projection::Include(fields) }
        }
        None => Projection::default(),
    }
}

fn parse_pagination(page_raw: Option<&str>, limit_raw: Option<&str>) -> Pagination {
    Pagination {
        page: parse_or_default(page_raw, DEFAULT_PAGE),
        limit: parse_or_default(limit_raw, DEFAULT_LIMIT).min(MAX_LIMIT),
    }
}

// `page*1 || 1` semantics: non-numeric and zero both fall back silently.
fn parse_or_default(raw: Option<&str>, default: u64) -> u64 {
    match raw.and_then(|s| s.parse::<u64>().ok()) {
        Some(0) | None => default,
        Some(n) => n,
    }
}
