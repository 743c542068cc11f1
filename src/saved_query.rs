//! Persisted queries and their cache bookkeeping.
//!
//! A [`SavedQuery`] keeps the interchange JSON of a [`QuerySpec`] together
//! with the rendered forms and a map of derived dataframe keys to their
//! cache status. Cached artifacts for a saved query are namespaced by its id:
//!
//! ```text
//! SavedQueryDataframe::{id}:{key}
//! SavedQueryAnnotatedFeatureIDDataframe::{id}:{key}
//! SavedQueryDataframeCSVPath::{id}:{key}
//! SavedQuerySummaryStats::{id}
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{CacheError, CacheStateSink, TieredCache};
use crate::query::QuerySpec;

#[derive(Debug, thiserror::Error)]
pub enum SavedQueryError {
    #[error("SavedQuery {0} not found")]
    NotFound(i64),

    #[error("SavedQuery.name == {0} already exists")]
    DuplicateName(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid stored JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

pub type SavedQueryResult<T> = Result<T, SavedQueryError>;

/// Lifecycle of one cached dataframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Generating,
    Exists,
}

/// Derived dataframe key -> status.
pub type CacheState = BTreeMap<String, CacheStatus>;

/// A query that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedQueryDraft {
    pub name: String,
    pub description: Option<String>,
    pub project_short_label: Option<String>,
    pub spec: QuerySpec,
    pub code_string: String,
    pub sql: String,
    pub kind: String,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedQuery {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub project_short_label: Option<String>,
    pub spec: QuerySpec,
    /// ORM-style rendering of the compiled query.
    pub code_string: String,
    /// Postgres rendering of the compiled query.
    pub sql: String,
    /// `custom` or `preset`.
    pub kind: String,
    pub created_by: Option<String>,
    pub cache_state: CacheState,
}

impl SavedQuery {
    pub fn dataframe_key(&self, key: &str) -> String {
        format!("SavedQueryDataframe::{}:{}", self.id, key)
    }

    pub fn annotated_feature_id_key(&self, key: &str) -> String {
        format!("SavedQueryAnnotatedFeatureIDDataframe::{}:{}", self.id, key)
    }

    pub fn csv_path_key(&self, key: &str) -> String {
        format!("SavedQueryDataframeCSVPath::{}:{}", self.id, key)
    }

    pub fn summary_stats_key(&self) -> String {
        format!("SavedQuerySummaryStats::{}", self.id)
    }

    /// Regex matching every cache key owned by this query.
    pub fn key_pattern(&self) -> String {
        format!(r"^SavedQuery\w+::{}(:|$)", self.id)
    }
}

/// Persistence for saved queries.
pub trait SavedQueryStore: Send + Sync {
    fn create(&self, draft: SavedQueryDraft) -> SavedQueryResult<SavedQuery>;

    /// Overwrite everything but the id.
    fn update(&self, query: &SavedQuery) -> SavedQueryResult<()>;

    fn get(&self, id: i64) -> SavedQueryResult<SavedQuery>;

    fn find_by_name(&self, name: &str) -> SavedQueryResult<Option<SavedQuery>>;

    fn set_cache_state(&self, id: i64, state: &CacheState) -> SavedQueryResult<()>;

    /// Set every query's cache state to empty, returning how many changed.
    fn reset_all_cache_states(&self) -> SavedQueryResult<usize>;
}

/// Remove every cached artifact tracked for `query` and clear its state.
pub fn delete_cache(
    cache: &TieredCache,
    store: &dyn SavedQueryStore,
    query: &mut SavedQuery,
) -> SavedQueryResult<()> {
    let summary_key = query.summary_stats_key();
    if cache.exists(&summary_key)? {
        cache.delete(&summary_key)?;
    }

    let mut state = query.cache_state.clone();
    state.remove(&summary_key);

    for key in query.cache_state.keys() {
        let af_id_key = query.annotated_feature_id_key(key);
        let dataframe_key = query.dataframe_key(key);

        if cache.exists(&af_id_key)? {
            cache.delete(&af_id_key)?;
        }
        if cache.exists(&dataframe_key)? {
            cache.delete(&dataframe_key)?;
        }
        state.remove(key);
        state.remove(&af_id_key);
    }

    query.cache_state = state;
    store.set_cache_state(query.id, &query.cache_state)?;
    info!(id = query.id, "Deleted saved query cache");
    Ok(())
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS saved_query (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    project_short_label TEXT,
    json TEXT NOT NULL,
    code_string TEXT NOT NULL,
    sql TEXT NOT NULL,
    type TEXT NOT NULL,
    created_by TEXT,
    cache_state TEXT NOT NULL DEFAULT '{}'
);
";

const COLUMNS: &str =
    "id, name, description, project_short_label, json, code_string, sql, type, created_by, cache_state";

/// [`SavedQueryStore`] on a SQLite table.
pub struct SqliteSavedQueryStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteSavedQueryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSavedQueryStore").finish_non_exhaustive()
    }
}

impl SqliteSavedQueryStore {
    pub fn open(path: impl AsRef<Path>) -> SavedQueryResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> SavedQueryResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> SavedQueryResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn select_one(
        &self,
        clause: &str,
        param: &dyn rusqlite::ToSql,
    ) -> SavedQueryResult<Option<SavedQuery>> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM saved_query WHERE {}", COLUMNS, clause),
                &[param][..],
                RawRow::from_row,
            )
            .optional()?;
        raw.map(RawRow::decode).transpose()
    }
}

/// A row before its JSON columns are parsed.
struct RawRow {
    id: i64,
    name: String,
    description: Option<String>,
    project_short_label: Option<String>,
    json: String,
    code_string: String,
    sql: String,
    kind: String,
    created_by: Option<String>,
    cache_state: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            project_short_label: row.get(3)?,
            json: row.get(4)?,
            code_string: row.get(5)?,
            sql: row.get(6)?,
            kind: row.get(7)?,
            created_by: row.get(8)?,
            cache_state: row.get(9)?,
        })
    }

    fn decode(self) -> SavedQueryResult<SavedQuery> {
        Ok(SavedQuery {
            id: self.id,
            name: self.name,
            description: self.description,
            project_short_label: self.project_short_label,
            spec: serde_json::from_str(&self.json)?,
            code_string: self.code_string,
            sql: self.sql,
            kind: self.kind,
            created_by: self.created_by,
            cache_state: serde_json::from_str(&self.cache_state)?,
        })
    }
}

impl SavedQueryStore for SqliteSavedQueryStore {
    fn create(&self, draft: SavedQueryDraft) -> SavedQueryResult<SavedQuery> {
        if self.find_by_name(&draft.name)?.is_some() {
            return Err(SavedQueryError::DuplicateName(draft.name));
        }

        let json = serde_json::to_string(&draft.spec)?;
        let id = {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT INTO saved_query
                 (name, description, project_short_label, json, code_string, sql, type, created_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    draft.name,
                    draft.description,
                    draft.project_short_label,
                    json,
                    draft.code_string,
                    draft.sql,
                    draft.kind,
                    draft.created_by,
                ],
            )?;
            conn.last_insert_rowid()
        };
        debug!(id, name = %draft.name, "Created saved query");

        Ok(SavedQuery {
            id,
            name: draft.name,
            description: draft.description,
            project_short_label: draft.project_short_label,
            spec: draft.spec,
            code_string: draft.code_string,
            sql: draft.sql,
            kind: draft.kind,
            created_by: draft.created_by,
            cache_state: CacheState::new(),
        })
    }

    fn update(&self, query: &SavedQuery) -> SavedQueryResult<()> {
        let json = serde_json::to_string(&query.spec)?;
        let cache_state = serde_json::to_string(&query.cache_state)?;
        let changed = self.conn.lock().execute(
            "UPDATE saved_query SET name = ?2, description = ?3, project_short_label = ?4,
             json = ?5, code_string = ?6, sql = ?7, type = ?8, created_by = ?9, cache_state = ?10
             WHERE id = ?1",
            params![
                query.id,
                query.name,
                query.description,
                query.project_short_label,
                json,
                query.code_string,
                query.sql,
                query.kind,
                query.created_by,
                cache_state,
            ],
        )?;
        if changed == 0 {
            return Err(SavedQueryError::NotFound(query.id));
        }
        Ok(())
    }

    fn get(&self, id: i64) -> SavedQueryResult<SavedQuery> {
        self.select_one("id = ?1", &id)?
            .ok_or(SavedQueryError::NotFound(id))
    }

    fn find_by_name(&self, name: &str) -> SavedQueryResult<Option<SavedQuery>> {
        self.select_one("name = ?1", &name)
    }

    fn set_cache_state(&self, id: i64, state: &CacheState) -> SavedQueryResult<()> {
        let json = serde_json::to_string(state)?;
        let changed = self.conn.lock().execute(
            "UPDATE saved_query SET cache_state = ?2 WHERE id = ?1",
            params![id, json],
        )?;
        if changed == 0 {
            return Err(SavedQueryError::NotFound(id));
        }
        info!(id, entries = state.len(), "Updated cache state");
        Ok(())
    }

    fn reset_all_cache_states(&self) -> SavedQueryResult<usize> {
        let changed = self.conn.lock().execute(
            "UPDATE saved_query SET cache_state = '{}' WHERE cache_state != '{}'",
            [],
        )?;
        Ok(changed)
    }
}

impl CacheStateSink for SqliteSavedQueryStore {
    fn reset_cache_states(&self) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.reset_all_cache_states()?)
    }
}
