//! SQL rendering for compiled queries.
//!
//! Only the shapes a compiled query can produce are modelled: a single base
//! table, inner joins along declared relations, a conjunction of filter
//! predicates, grouping and ordering on the base id, and an optional
//! pagination clause. [`Query`] can be wrapped in a CTE for counting.
//!
//! - [`dialect`] - per-database quoting and syntax differences
//! - [`writer`] - string buffer that knows its dialect
//! - [`expr`] - predicate expressions
//! - [`query`] - SELECT builder

pub mod dialect;
pub mod expr;
pub mod query;
pub mod writer;

pub use dialect::Dialect;
pub use expr::{
    and_all, count_star, lit_bool, lit_float, lit_int, lit_null, lit_str, or_all, table_col,
    table_star, CompareOp, Expr, ExprExt, Junction, Literal,
};
pub use query::{Cte, OrderByExpr, Query, SelectItem, SortDir, TableRef};
pub use writer::SqlWriter;
