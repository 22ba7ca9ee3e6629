//! Query layer: untrusted query-string mapping → constrained store query.
//!
//! `parse` turns the raw key/value pairs into filter/sort/projection/
//! pagination specs (operator whitelist, silent pagination fallback),
//! `plan` composes them into an executable `QueryPlan`, and `exec` runs a
//! plan against the engine.

pub mod exec;
pub mod parse;
pub mod plan;
pub mod types;

pub use exec::{eval_filter, execute};
pub use parse::{ParsedQuery, parse_query};
pub use plan::{QueryPlan, build_list, build_scoped_list};
pub use types::{CmpOp, Filter, Order, Pagination, Projection, SortSpec};
