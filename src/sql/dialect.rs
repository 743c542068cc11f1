//! Database dialects the compiler can target.
//!
//! ```
//! use phenoquery::sql::Dialect;
//!
//! assert_eq!(Dialect::Sqlite.quote_identifier("sample"), "\"sample\"");
//! assert_eq!(Dialect::Sqlite.bool_literal(true), "1");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Target database. PostgreSQL is the production store; SQLite backs the
/// bundled executor and the tests; DuckDB reads exported snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    DuckDb,
    Sqlite,
}

impl Dialect {
    pub const ALL: [Dialect; 3] = [Dialect::Postgres, Dialect::DuckDb, Dialect::Sqlite];

    pub fn name(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::DuckDb => "duckdb",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// All three accept ANSI double quotes.
    pub fn quote_identifier(self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    pub fn quote_string(self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    /// SQLite has no boolean type and stores flags as integers.
    pub fn bool_literal(self, value: bool) -> &'static str {
        match (self, value) {
            (Dialect::Sqlite, true) => "1",
            (Dialect::Sqlite, false) => "0",
            (_, true) => "true",
            (_, false) => "false",
        }
    }

    /// Without a native ILIKE both sides are wrapped in `LOWER()`.
    pub fn has_ilike(self) -> bool {
        !matches!(self, Dialect::Sqlite)
    }

    /// The pagination clause, or `None` when neither bound is set.
    ///
    /// SQLite rejects a bare OFFSET; `LIMIT -1` there means unbounded.
    pub fn pagination(self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (None, None) => None,
            (Some(limit), None) => Some(format!("LIMIT {}", limit)),
            (None, Some(offset)) if self == Dialect::Sqlite => {
                Some(format!("LIMIT -1 OFFSET {}", offset))
            }
            (None, Some(offset)) => Some(format!("OFFSET {}", offset)),
            (Some(limit), Some(offset)) => Some(format!("LIMIT {} OFFSET {}", limit, offset)),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "duckdb" => Ok(Dialect::DuckDb),
            "sqlite" => Ok(Dialect::Sqlite),
            other => Err(format!("unknown SQL dialect '{}'", other)),
        }
    }
}
