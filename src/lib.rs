//! # phenoquery
//!
//! Declarative queries over a metabolomics schema, compiled to SQL, with a
//! two-tier cache for the dataframes built from their results.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        QuerySpec (filters → sub-filters → matches)       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [compiler + entity graph]
//! ┌─────────────────────────────────────────────────────────┐
//! │      CompiledQuery (joins + predicate tree)              │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!              ┌───────────┴────────────┐
//!              ▼ [render]               ▼ [executor]
//! ┌────────────────────────┐  ┌──────────────────────────────┐
//! │ debug string / SQL     │  │ rows → DataFrame (caller)    │
//! └────────────────────────┘  └──────────────────────────────┘
//!                                          │
//!                                          ▼ [cache keys]
//! ┌─────────────────────────────────────────────────────────┐
//! │   TieredCache: volatile (TTL) over durable (files)       │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! [`session::QuerySession`] ties the pieces together for callers.

pub mod cache;
pub mod config;
pub mod executor;
pub mod frame;
pub mod logging;
pub mod query;
pub mod saved_query;
pub mod schema;
pub mod session;
pub mod sql;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::cache::{CacheTtl, DataFrameKey, DataFrameType, Datum, Payload, TieredCache};
    pub use crate::executor::{ExecOutcome, ExecuteMode, Executor, QueryBackend, SqliteBackend};
    pub use crate::frame::{Cell, DataFrame, Record};
    pub use crate::query::{
        BoolOp, CompiledQuery, Filter, Match, Operator, QueryCompiler, QuerySpec, SubFilter,
    };
    pub use crate::schema::EntityGraph;
    pub use crate::session::QuerySession;
    pub use crate::sql::Dialect;
}
