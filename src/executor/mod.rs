//! Compiled query execution.
//!
//! [`Executor`] renders a [`CompiledQuery`] for its backend's dialect and
//! runs it in one of three shapes: all rows, the first row, or a count.
//! Backend failures propagate unchanged, wrapped with the mode and SQL.

mod sqlite;

use std::str::FromStr;

use tracing::{debug, info};

use crate::frame::{Cell, Record};
use crate::query::CompiledQuery;
use crate::sql::{count_star, Cte, Dialect, ExprExt, Query, TableRef};

pub use sqlite::SqliteBackend;

/// Result type for execution.
pub type ExecResult<T> = Result<T, ExecError>;

/// Errors raised by a backing store.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("no query to execute")]
    NoQuery,

    #[error("mode not recognised: {0}")]
    UnknownMode(String),

    #[error("{mode} query failed: {source}\n{sql}")]
    Backend {
        mode: ExecuteMode,
        sql: String,
        #[source]
        source: BackendError,
    },

    #[error("Unexpected count result: {0:?}")]
    Decode(Option<Cell>),
}

/// Something that can run SQL and hand back rows.
pub trait QueryBackend {
    fn dialect(&self) -> Dialect;

    fn fetch(&self, sql: &str) -> Result<Vec<Record>, BackendError>;
}

impl<B: QueryBackend + ?Sized> QueryBackend for &B {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn fetch(&self, sql: &str) -> Result<Vec<Record>, BackendError> {
        (**self).fetch(sql)
    }
}

/// Result shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecuteMode {
    #[default]
    All,
    First,
    Count,
}

impl ExecuteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecuteMode::All => "all",
            ExecuteMode::First => "first",
            ExecuteMode::Count => "count",
        }
    }
}

impl FromStr for ExecuteMode {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(ExecuteMode::All),
            "first" => Ok(ExecuteMode::First),
            "count" => Ok(ExecuteMode::Count),
            other => Err(ExecError::UnknownMode(other.into())),
        }
    }
}

impl std::fmt::Display for ExecuteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an execution returned.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutcome {
    Rows(Vec<Record>),
    Row(Option<Record>),
    Count(u64),
}

impl ExecOutcome {
    /// Rows of an `All` or `First` outcome. Counts have none.
    pub fn into_rows(self) -> Vec<Record> {
        match self {
            ExecOutcome::Rows(rows) => rows,
            ExecOutcome::Row(row) => row.into_iter().collect(),
            ExecOutcome::Count(_) => Vec::new(),
        }
    }
}

/// Runs one compiled query against a backend.
pub struct Executor<B: QueryBackend> {
    backend: B,
    query: Option<CompiledQuery>,
}

impl<B: QueryBackend> Executor<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            query: None,
        }
    }

    pub fn with_query(mut self, query: CompiledQuery) -> Self {
        self.query = Some(query);
        self
    }

    pub fn set_query(&mut self, query: CompiledQuery) {
        self.query = Some(query);
    }

    pub fn query(&self) -> Option<&CompiledQuery> {
        self.query.as_ref()
    }

    /// The SQL `execute` would run for `mode`.
    pub fn sql(
        &self,
        mode: ExecuteMode,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> ExecResult<String> {
        let compiled = self.query.as_ref().ok_or(ExecError::NoQuery)?;
        Ok(build_query(compiled, mode, limit, offset).to_sql(self.backend.dialect()))
    }

    /// Execute the query. Limit and offset are applied before the mode.
    pub fn execute(
        &self,
        mode: ExecuteMode,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> ExecResult<ExecOutcome> {
        let sql = self.sql(mode, limit, offset)?;
        debug!(%mode, ?limit, ?offset, "Executing query");

        let rows = self
            .backend
            .fetch(&sql)
            .map_err(|source| ExecError::Backend {
                mode,
                sql: sql.clone(),
                source,
            })?;

        match mode {
            ExecuteMode::All => {
                info!("Number of results: {}", rows.len());
                Ok(ExecOutcome::Rows(rows))
            }
            ExecuteMode::First => {
                let first = rows.into_iter().next();
                info!("First result only: {}", first.is_some());
                Ok(ExecOutcome::Row(first))
            }
            ExecuteMode::Count => {
                let cell = rows.into_iter().next().and_then(|r| r.get("count").cloned());
                let count = match cell {
                    Some(Cell::Int(n)) if n >= 0 => n as u64,
                    other => return Err(ExecError::Decode(other)),
                };
                info!("Result count: {}", count);
                Ok(ExecOutcome::Count(count))
            }
        }
    }

    /// Parse `mode` and execute.
    pub fn execute_str(
        &self,
        mode: &str,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> ExecResult<ExecOutcome> {
        self.execute(mode.parse()?, limit, offset)
    }
}

fn build_query(
    compiled: &CompiledQuery,
    mode: ExecuteMode,
    limit: Option<u64>,
    offset: Option<u64>,
) -> Query {
    let mut query = compiled.to_query();
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    if let Some(offset) = offset {
        query = query.offset(offset);
    }

    match mode {
        ExecuteMode::All => query,
        ExecuteMode::First => query.limit(limit.map_or(1, |l| l.min(1))),
        ExecuteMode::Count => Query::new()
            .with_cte(Cte::new("matched", query))
            .select(vec![count_star().alias("count")])
            .from(TableRef::new("matched")),
    }
}
