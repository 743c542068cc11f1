//! Caller-facing facade: compile, execute and materialise through the cache.
//!
//! A [`QuerySession`] owns one query specification. Dataframes built from it
//! are cached under keys derived from a [`DataFrameKey`]; for a saved query
//! every transition is recorded in its cache state (`generating` while the
//! builder runs, `exists` once stored).

use std::error::Error;

use tracing::info;

use crate::cache::{CacheError, CacheTtl, DataFrameKey, Datum, KeyError, Payload, TieredCache};
use crate::config::QuerySettings;
use crate::executor::{ExecError, ExecOutcome, ExecuteMode, Executor, QueryBackend};
use crate::frame::DataFrame;
use crate::query::{
    project_role_filter, CompileError, CompileOptions, CompiledQuery, QueryCompiler, QuerySpec,
};
use crate::saved_query::{
    self, CacheStatus, SavedQuery, SavedQueryDraft, SavedQueryError, SavedQueryStore,
};
use crate::schema::EntityGraph;
use crate::sql::Dialect;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    SavedQuery(#[from] SavedQueryError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("Failed to fingerprint query: {0}")]
    Fingerprint(#[source] serde_json::Error),

    #[error("No saved query store configured")]
    NoStore,

    #[error("Dataframe builder failed for {key}: {source}")]
    Build {
        key: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

pub type SessionResult<T> = Result<T, SessionError>;

pub struct QuerySession<'a> {
    graph: &'a EntityGraph,
    cache: &'a TieredCache,
    store: Option<&'a dyn SavedQueryStore>,
    options: CompileOptions,
    dialect: Dialect,
    test_namespace: bool,
    role_id: Option<i64>,
    spec: QuerySpec,
    saved: Option<SavedQuery>,
}

impl<'a> QuerySession<'a> {
    pub fn new(graph: &'a EntityGraph, cache: &'a TieredCache, spec: QuerySpec) -> Self {
        Self {
            graph,
            cache,
            store: None,
            options: CompileOptions::default(),
            dialect: Dialect::default(),
            test_namespace: false,
            role_id: None,
            spec,
            saved: None,
        }
    }

    /// Open a session on a stored query.
    pub fn load(
        graph: &'a EntityGraph,
        cache: &'a TieredCache,
        store: &'a dyn SavedQueryStore,
        id: i64,
    ) -> SessionResult<Self> {
        let saved = store.get(id)?;
        let mut session = Self::new(graph, cache, saved.spec.clone()).with_store(store);
        session.saved = Some(saved);
        Ok(session)
    }

    pub fn with_settings(mut self, settings: &QuerySettings) -> Self {
        self.options.require_declared_joins = settings.require_declared_joins;
        self.dialect = settings.dialect;
        self.test_namespace = settings.test_namespace;
        self
    }

    pub fn with_store(mut self, store: &'a dyn SavedQueryStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Restrict every compiled query to projects visible to `role_id`.
    pub fn with_role(mut self, role_id: i64) -> Self {
        self.role_id = Some(role_id);
        self
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn saved(&self) -> Option<&SavedQuery> {
        self.saved.as_ref()
    }

    /// The authored spec plus the role restriction, if any.
    pub fn effective_spec(&self) -> QuerySpec {
        let mut spec = self.spec.clone();
        if let Some(role_id) = self.role_id {
            spec.add_filter(project_role_filter(role_id));
        }
        spec
    }

    pub fn compile(&self) -> SessionResult<CompiledQuery> {
        let compiler = QueryCompiler::new(self.graph).with_options(self.options);
        Ok(compiler.compile(&self.effective_spec())?)
    }

    /// SQL in the session's dialect.
    pub fn sql(&self) -> SessionResult<String> {
        Ok(self.compile()?.to_sql(self.dialect))
    }

    pub fn execute<B: QueryBackend>(
        &self,
        backend: B,
        mode: ExecuteMode,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> SessionResult<ExecOutcome> {
        let executor = Executor::new(backend).with_query(self.compile()?);
        Ok(executor.execute(mode, limit, offset)?)
    }

    /// Store the query under `name`, or update it if this session was loaded
    /// from or already saved to the store. Any cached artifacts are dropped.
    pub fn save(
        &mut self,
        name: &str,
        description: Option<&str>,
        created_by: Option<&str>,
    ) -> SessionResult<&SavedQuery> {
        let store = self.store.ok_or(SessionError::NoStore)?;

        let compiled = self.compile()?;
        let code_string = compiled.to_debug_string();
        let sql = compiled.to_sql(Dialect::Postgres);

        let mut canonical = self.spec.clone();
        canonical.joins = QueryCompiler::new(self.graph)
            .with_options(self.options)
            .compile(&self.spec)?
            .spec
            .joins;

        let mut saved = match self.saved.clone() {
            None => store.create(SavedQueryDraft {
                name: name.to_string(),
                description: description.map(str::to_string),
                project_short_label: None,
                spec: canonical.clone(),
                code_string,
                sql,
                kind: "custom".to_string(),
                created_by: created_by.map(str::to_string),
            })?,
            Some(mut saved) => {
                saved.name = name.to_string();
                saved.description = description.map(str::to_string);
                saved.spec = canonical.clone();
                saved.code_string = code_string;
                saved.sql = sql;
                if let Some(by) = created_by {
                    saved.created_by = Some(by.to_string());
                }
                store.update(&saved)?;
                saved
            }
        };
        info!(id = saved.id, name, "Query saved");

        saved_query::delete_cache(self.cache, store, &mut saved)?;
        self.spec = canonical;
        Ok(&*self.saved.insert(saved))
    }

    fn namespaced(&self, key: &DataFrameKey) -> String {
        let mut key = key.clone();
        if self.test_namespace {
            key.test_namespace = true;
        }
        key.build()
    }

    fn fingerprint(&self) -> SessionResult<String> {
        self.compile()?
            .fingerprint()
            .map_err(SessionError::Fingerprint)
    }

    /// Cache key for the dataframe `key` of this query.
    ///
    /// Unsaved queries are namespaced by their fingerprint.
    pub fn dataframe_cache_key(&self, key: &DataFrameKey) -> SessionResult<String> {
        let df_key = self.namespaced(key);
        match &self.saved {
            Some(saved) => Ok(saved.dataframe_key(&df_key)),
            None => Ok(format!("QueryDataframe::{}:{}", self.fingerprint()?, df_key)),
        }
    }

    pub fn summary_cache_key(&self) -> SessionResult<String> {
        match &self.saved {
            Some(saved) => Ok(saved.summary_stats_key()),
            None => Ok(format!("QuerySummaryStats::{}", self.fingerprint()?)),
        }
    }

    /// Record a cache-state transition; a no-op for unsaved queries.
    fn mark(&mut self, key: &str, status: Option<CacheStatus>) -> SessionResult<()> {
        let (Some(saved), Some(store)) = (self.saved.as_mut(), self.store) else {
            return Ok(());
        };
        match status {
            Some(status) => {
                if saved.cache_state.get(key) == Some(&status) {
                    return Ok(());
                }
                saved.cache_state.insert(key.to_string(), status);
            }
            None => {
                if saved.cache_state.remove(key).is_none() {
                    return Ok(());
                }
            }
        }
        store.set_cache_state(saved.id, &saved.cache_state)?;
        info!(id = saved.id, key, ?status, "Cache state changed");
        Ok(())
    }

    /// Return the cached dataframe for `key`, building and caching it on a miss.
    ///
    /// `reload` drops any cached copy first. If `build` fails the
    /// `generating` mark is removed and the error returned.
    pub fn load_dataframe<F, E>(
        &mut self,
        key: &DataFrameKey,
        reload: bool,
        build: F,
    ) -> SessionResult<DataFrame>
    where
        F: FnOnce(&CompiledQuery) -> Result<DataFrame, E>,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let df_key = self.namespaced(key);
        let cache_key = self.dataframe_cache_key(key)?;

        if reload {
            self.cache.delete(&cache_key)?;
            self.mark(&df_key, None)?;
        } else if let Some(table) = self.cache.get_table(&cache_key)? {
            self.mark(&df_key, Some(CacheStatus::Exists))?;
            return Ok(table);
        }

        let compiled = self.compile()?;
        self.mark(&df_key, Some(CacheStatus::Generating))?;

        let table = match build(&compiled) {
            Ok(table) => table,
            Err(e) => {
                self.mark(&df_key, None)?;
                return Err(SessionError::Build {
                    key: cache_key,
                    source: e.into(),
                });
            }
        };

        self.cache
            .set(&cache_key, &Payload::Table(table.clone()), CacheTtl::Default)?;
        self.mark(&df_key, Some(CacheStatus::Exists))?;
        Ok(table)
    }

    /// [`load_dataframe`](Self::load_dataframe) for the summary statistics value.
    pub fn load_summary<F, E>(&mut self, reload: bool, compute: F) -> SessionResult<Datum>
    where
        F: FnOnce(&CompiledQuery) -> Result<Datum, E>,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let cache_key = self.summary_cache_key()?;

        if reload {
            self.cache.delete(&cache_key)?;
        } else if let Some(payload) = self.cache.get(&cache_key)? {
            if let Payload::Value(datum) = payload {
                self.mark(&cache_key, Some(CacheStatus::Exists))?;
                return Ok(datum);
            }
            return Err(CacheError::FormatMismatch { key: cache_key }.into());
        }

        let compiled = self.compile()?;
        let datum = compute(&compiled).map_err(|e| SessionError::Build {
            key: cache_key.clone(),
            source: e.into(),
        })?;
        self.cache
            .set(&cache_key, &Payload::Value(datum.clone()), CacheTtl::Default)?;
        self.mark(&cache_key, Some(CacheStatus::Exists))?;
        Ok(datum)
    }

    /// Drop every cached artifact of this query.
    pub fn delete_cache(&mut self) -> SessionResult<()> {
        if let (Some(saved), Some(store)) = (self.saved.as_mut(), self.store) {
            saved_query::delete_cache(self.cache, store, saved)?;
            return Ok(());
        }
        let fingerprint = self.fingerprint()?;
        self.cache
            .delete_by_pattern(&format!("^Query\\w+::{}", fingerprint))?;
        Ok(())
    }
}
