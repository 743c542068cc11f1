//! End-to-end session tests: save and reload a query, materialise its
//! dataframes through the cache, and keep the saved cache state in step.

use std::cell::Cell as Counter;
use std::sync::Arc;

use phenoquery::cache::{
    CachePolicy, DataFrameKey, DataFrameType, Datum, DurableStore, MemoryStore, TieredCache,
};
use phenoquery::config::QuerySettings;
use phenoquery::executor::{ExecuteMode, SqliteBackend};
use phenoquery::frame::{Cell, DataFrame};
use phenoquery::query::{CompiledQuery, Filter, Match, Operator, QuerySpec};
use phenoquery::saved_query::{CacheStatus, SavedQueryStore, SqliteSavedQueryStore};
use phenoquery::schema::phenomedb;
use phenoquery::session::{QuerySession, SessionError};
use phenoquery::sql::Dialect;

struct Fixture {
    _dir: tempfile::TempDir,
    store: Arc<SqliteSavedQueryStore>,
    cache: TieredCache,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteSavedQueryStore::open(dir.path().join("queries.db")).unwrap());
    let cache = TieredCache::new(
        Arc::new(MemoryStore::new()),
        DurableStore::open(dir.path().join("files")).unwrap(),
        CachePolicy::default(),
    )
    .with_state_sink(store.clone());
    Fixture {
        _dir: dir,
        store,
        cache,
    }
}

fn pipeline_testing() -> QuerySpec {
    QuerySpec::new("AnnotatedFeature").with_filter(Filter::single(Match::new(
        "Project",
        "name",
        Operator::Eq,
        "PipelineTesting",
    )))
}

fn combined() -> DataFrameKey {
    DataFrameKey::new(DataFrameType::Combined, "AnnotatedFeature")
        .harmonise_annotations(true)
        .master_unit("mmol/L")
}

fn frame(rows: i64) -> DataFrame {
    let mut frame = DataFrame::new(["Sample.name", "Glucose"]);
    for i in 0..rows {
        frame
            .push_row(vec![Cell::Text(format!("S{}", i)), Cell::Float(i as f64 + 0.5)])
            .unwrap();
    }
    frame
}

// ============================================================================
// Saving and loading
// ============================================================================

#[test]
fn test_save_then_load_round_trip() {
    let fx = fixture();
    let graph = phenomedb::schema().unwrap();

    let mut session =
        QuerySession::new(graph, &fx.cache, pipeline_testing()).with_store(fx.store.as_ref());
    let saved = session
        .save("pipeline testing", Some("all features"), Some("admin"))
        .unwrap()
        .clone();

    assert_eq!(saved.kind, "custom");
    assert_eq!(
        saved.spec.joins,
        ["SampleAssay", "Sample", "Subject", "Project"]
    );
    assert!(saved
        .code_string
        .ends_with(".filter(Project.name==\"PipelineTesting\").group_by(AnnotatedFeature.id).order_by(AnnotatedFeature.id)"));
    assert_eq!(saved.sql, session.compile().unwrap().to_sql(Dialect::Postgres));

    let reloaded = QuerySession::load(graph, &fx.cache, fx.store.as_ref(), saved.id).unwrap();
    assert_eq!(reloaded.spec(), &saved.spec);
    assert_eq!(reloaded.saved(), Some(&saved));
    assert_eq!(
        fx.store.find_by_name("pipeline testing").unwrap().map(|q| q.id),
        Some(saved.id)
    );
}

#[test]
fn test_second_save_updates_in_place() {
    let fx = fixture();
    let graph = phenomedb::schema().unwrap();
    let mut session =
        QuerySession::new(graph, &fx.cache, pipeline_testing()).with_store(fx.store.as_ref());

    let first = session.save("v1", None, None).unwrap().id;
    let second = session.save("v2", Some("renamed"), None).unwrap().id;

    assert_eq!(first, second);
    assert!(fx.store.find_by_name("v1").unwrap().is_none());
    assert_eq!(
        fx.store.get(first).unwrap().description.as_deref(),
        Some("renamed")
    );
}

#[test]
fn test_duplicate_name_is_rejected() {
    let fx = fixture();
    let graph = phenomedb::schema().unwrap();

    QuerySession::new(graph, &fx.cache, pipeline_testing())
        .with_store(fx.store.as_ref())
        .save("shared", None, None)
        .unwrap();
    let mut other =
        QuerySession::new(graph, &fx.cache, QuerySpec::new("SampleAssay")).with_store(fx.store.as_ref());

    assert!(matches!(
        other.save("shared", None, None),
        Err(SessionError::SavedQuery(_))
    ));
}

#[test]
fn test_load_missing_query() {
    let fx = fixture();
    let graph = phenomedb::schema().unwrap();
    let err = QuerySession::load(graph, &fx.cache, fx.store.as_ref(), 99)
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "SavedQuery 99 not found");
}

// ============================================================================
// Dataframe materialisation
// ============================================================================

#[test]
fn test_saved_dataframe_is_built_once() {
    let fx = fixture();
    let graph = phenomedb::schema().unwrap();
    let mut session =
        QuerySession::new(graph, &fx.cache, pipeline_testing()).with_store(fx.store.as_ref());
    let id = session.save("q", None, None).unwrap().id;

    let builds = Counter::new(0);
    let build = |_: &CompiledQuery| {
        builds.set(builds.get() + 1);
        Ok::<_, String>(frame(3))
    };

    assert_eq!(session.load_dataframe(&combined(), false, build).unwrap(), frame(3));
    assert_eq!(session.load_dataframe(&combined(), false, build).unwrap(), frame(3));
    assert_eq!(builds.get(), 1);

    let cache_key = format!("SavedQueryDataframe::{}:combined::AnnotatedFeature:HA:u=mmol%2FL", id);
    assert_eq!(session.dataframe_cache_key(&combined()).unwrap(), cache_key);
    assert!(fx.cache.exists(&cache_key).unwrap());

    let stored = fx.store.get(id).unwrap();
    assert_eq!(
        stored.cache_state.get("combined::AnnotatedFeature:HA:u=mmol%2FL"),
        Some(&CacheStatus::Exists)
    );

    session.load_dataframe(&combined(), true, build).unwrap();
    assert_eq!(builds.get(), 2);
}

#[test]
fn test_unsaved_dataframe_uses_fingerprint_namespace() {
    let fx = fixture();
    let graph = phenomedb::schema().unwrap();
    let mut session = QuerySession::new(graph, &fx.cache, pipeline_testing());

    session
        .load_dataframe(&combined(), false, |_| Ok::<_, String>(frame(2)))
        .unwrap();
    let cache_key = session.dataframe_cache_key(&combined()).unwrap();
    assert!(cache_key.starts_with("QueryDataframe::"));
    assert!(fx.cache.exists(&cache_key).unwrap());

    // The same spec with stale authored joins shares the cached artifact.
    let mut noisy = pipeline_testing();
    noisy.joins = vec!["Compound".into()];
    let mut twin = QuerySession::new(graph, &fx.cache, noisy);
    let table = twin
        .load_dataframe(&combined(), false, |_| Err::<DataFrame, _>("should not rebuild"))
        .unwrap();
    assert_eq!(table, frame(2));

    session.delete_cache().unwrap();
    assert!(!fx.cache.exists(&cache_key).unwrap());
}

#[test]
fn test_summary_is_cached_as_value() {
    let fx = fixture();
    let graph = phenomedb::schema().unwrap();
    let mut session =
        QuerySession::new(graph, &fx.cache, pipeline_testing()).with_store(fx.store.as_ref());
    let id = session.save("q", None, None).unwrap().id;

    let computed = session
        .load_summary(false, |_| Ok::<_, String>(Datum::Int(42)))
        .unwrap();
    assert_eq!(computed, Datum::Int(42));

    let cached = session
        .load_summary(false, |_| Err::<Datum, _>("should not recompute"))
        .unwrap();
    assert_eq!(cached, Datum::Int(42));
    assert!(fx
        .cache
        .exists(&format!("SavedQuerySummaryStats::{}", id))
        .unwrap());
}

#[test]
fn test_test_namespace_keys() {
    let fx = fixture();
    let graph = phenomedb::schema().unwrap();
    let settings = QuerySettings {
        test_namespace: true,
        ..QuerySettings::default()
    };
    let mut session = QuerySession::new(graph, &fx.cache, pipeline_testing())
        .with_settings(&settings)
        .with_store(fx.store.as_ref());
    let id = session.save("q", None, None).unwrap().id;

    session
        .load_dataframe(&combined(), false, |_| Ok::<_, String>(frame(1)))
        .unwrap();
    let cache_key = session.dataframe_cache_key(&combined()).unwrap();
    assert_eq!(
        cache_key,
        format!("SavedQueryDataframe::{}:TEST::combined::AnnotatedFeature:HA:u=mmol%2FL", id)
    );

    assert_eq!(fx.cache.delete_test_keys().unwrap(), [cache_key.clone()]);
    assert!(!fx.cache.exists(&cache_key).unwrap());
}

// ============================================================================
// Invalidation
// ============================================================================

#[test]
fn test_resave_drops_cached_artifacts() {
    let fx = fixture();
    let graph = phenomedb::schema().unwrap();
    let mut session =
        QuerySession::new(graph, &fx.cache, pipeline_testing()).with_store(fx.store.as_ref());
    let id = session.save("q", None, None).unwrap().id;

    session
        .load_dataframe(&combined(), false, |_| Ok::<_, String>(frame(2)))
        .unwrap();
    session
        .load_summary(false, |_| Ok::<_, String>(Datum::Int(2)))
        .unwrap();
    let cache_key = session.dataframe_cache_key(&combined()).unwrap();

    session.save("q", Some("edited"), None).unwrap();

    assert!(!fx.cache.exists(&cache_key).unwrap());
    assert!(!fx
        .cache
        .exists(&format!("SavedQuerySummaryStats::{}", id))
        .unwrap());
    assert!(fx.store.get(id).unwrap().cache_state.is_empty());
    assert!(session.saved().unwrap().cache_state.is_empty());
}

#[test]
fn test_flush_resets_every_cache_state() {
    let fx = fixture();
    let graph = phenomedb::schema().unwrap();

    let mut ids = Vec::new();
    for name in ["a", "b"] {
        let mut session =
            QuerySession::new(graph, &fx.cache, pipeline_testing()).with_store(fx.store.as_ref());
        ids.push(session.save(name, None, None).unwrap().id);
        session
            .load_dataframe(&combined(), false, |_| Ok::<_, String>(frame(1)))
            .unwrap();
    }
    assert!(ids
        .iter()
        .all(|id| !fx.store.get(*id).unwrap().cache_state.is_empty()));

    fx.cache.flush(false).unwrap();

    for id in ids {
        assert!(fx.store.get(id).unwrap().cache_state.is_empty());
    }
    assert!(fx.cache.durable().list_filenames().unwrap().is_empty());
}

// ============================================================================
// Execution
// ============================================================================

#[test]
fn test_session_executes_with_role_filter() {
    let fx = fixture();
    let graph = phenomedb::schema().unwrap();

    let backend = SqliteBackend::open_in_memory().unwrap();
    backend
        .connection()
        .execute_batch(
            "CREATE TABLE sample_assay (id INTEGER PRIMARY KEY, sample_id INTEGER);
             CREATE TABLE sample (id INTEGER PRIMARY KEY, subject_id INTEGER);
             CREATE TABLE subject (id INTEGER PRIMARY KEY, project_id INTEGER);
             CREATE TABLE project (id INTEGER PRIMARY KEY, name TEXT);
             CREATE TABLE project_role (id INTEGER PRIMARY KEY, project_id INTEGER, role_id INTEGER);
             INSERT INTO project VALUES (1, 'PipelineTesting'), (2, 'PipelineTesting');
             INSERT INTO subject VALUES (1, 1), (2, 2);
             INSERT INTO sample VALUES (1, 1), (2, 2);
             INSERT INTO sample_assay VALUES (1, 1), (2, 2);
             INSERT INTO project_role VALUES (1, 2, 7);",
        )
        .unwrap();

    let spec = QuerySpec::new("SampleAssay").with_filter(Filter::single(Match::new(
        "Project",
        "name",
        Operator::Eq,
        "PipelineTesting",
    )));

    let open = QuerySession::new(graph, &fx.cache, spec.clone());
    assert_eq!(
        open.execute(&backend, ExecuteMode::Count, None, None).unwrap(),
        phenoquery::executor::ExecOutcome::Count(2)
    );

    let restricted = QuerySession::new(graph, &fx.cache, spec).with_role(7);
    let rows = restricted
        .execute(&backend, ExecuteMode::All, None, None)
        .unwrap()
        .into_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], Cell::Int(2));
}
