use crate::document::VERSION_FIELD;
use bson::Bson;
use serde::{Deserialize, Serialize};

// Safety limits to prevent resource abuse
pub(crate) const MAX_PATH_DEPTH: usize = 32;
pub(crate) const MAX_SORT_FIELDS: usize = 8;
pub(crate) const MAX_PROJECTION_FIELDS: usize = 64;
pub(crate) const MAX_REGEX_PATTERN: usize = 512;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 100;
pub const MAX_LIMIT: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

impl SortSpec {
    #[must_use]
    pub fn new(field: &str, order: Order) -> Self {
        Self { field: field.to_string(), order }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// A constrained filter expression. Leaves are single-field predicates;
/// only conjunction is composable because the query grammar cannot express
/// anything else.
#[derive(Debug, Clone)]
pub enum Filter {
    True,
    And(Vec<Filter>),
    Cmp { path: String, op: CmpOp, value: Bson },
    Regex { path: String, pattern: String },
}

impl Filter {
    /// Conjunction, flattening nested `And`s and dropping `True`.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::True, f) | (f, Self::True) => f,
            (Self::And(mut a), Self::And(b)) => {
                a.extend(b);
                Self::And(a)
            }
            (Self::And(mut a), f) => {
                a.push(f);
                Self::And(a)
            }
            (f, Self::And(mut b)) => {
                b.insert(0, f);
                Self::And(b)
            }
            (a, b) => Self::And(vec![a, b]),
        }
    }

    #[must_use]
    pub fn eq(path: &str, value: impl Into<Bson>) -> Self {
        Self::Cmp { path: path.to_string(), op: CmpOp::Eq, value: value.into() }
    }
}

/// Included or excluded field names, never both. The default excludes the
/// internal revision field; a `fields=` include-list replaces that default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Default for Projection {
    fn default() -> Self {
        Self::Exclude(vec![VERSION_FIELD.to_string()])
    }
}

/// Page-based pagination. `page`/`limit` are always >= 1 by construction:
/// unparsable or zero inputs fall back to the defaults (1, 100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
}

impl Pagination {
    #[must_use]
    pub const fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: DEFAULT_PAGE, limit: DEFAULT_LIMIT }
    }
}
