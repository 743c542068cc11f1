//! Executor tests against an in-memory SQLite copy of the core tables.

use phenoquery::executor::{ExecError, ExecOutcome, ExecuteMode, Executor, SqliteBackend};
use phenoquery::frame::{Cell, DataFrame};
use phenoquery::query::{BoolOp, Filter, Match, Operator, QueryCompiler, QuerySpec, SubFilter};
use phenoquery::schema::phenomedb;

const FIXTURE: &str = r#"
CREATE TABLE project (id INTEGER PRIMARY KEY, name TEXT);
CREATE TABLE subject (id INTEGER PRIMARY KEY, project_id INTEGER, name TEXT);
CREATE TABLE sample (id INTEGER PRIMARY KEY, subject_id INTEGER, name TEXT, sample_type TEXT);
CREATE TABLE assay (id INTEGER PRIMARY KEY, name TEXT);
CREATE TABLE sample_assay (
    id INTEGER PRIMARY KEY,
    sample_id INTEGER,
    assay_id INTEGER,
    run_order INTEGER
);

INSERT INTO project VALUES (1, 'PipelineTesting'), (2, 'Other');
INSERT INTO subject VALUES (1, 1, 'subject-a'), (2, 2, 'subject-b');
INSERT INTO sample VALUES
    (1, 1, 'S1', 'StudySample'),
    (2, 1, 'S2', 'StudyPool'),
    (3, 2, 'S3', 'StudySample');
INSERT INTO assay VALUES (1, 'LPOS'), (2, 'HPOS');
INSERT INTO sample_assay VALUES
    (1, 1, 1, 1),
    (2, 2, 1, 2),
    (3, 3, 1, 3),
    (4, 1, 2, 4);
"#;

fn backend() -> SqliteBackend {
    let backend = SqliteBackend::open_in_memory().unwrap();
    backend.connection().execute_batch(FIXTURE).unwrap();
    backend
}

fn executor(spec: &QuerySpec) -> Executor<SqliteBackend> {
    let compiled = QueryCompiler::new(phenomedb::schema().unwrap())
        .compile(spec)
        .unwrap();
    Executor::new(backend()).with_query(compiled)
}

fn project(name: &str) -> QuerySpec {
    QuerySpec::new("SampleAssay").with_filter(Filter::single(Match::new(
        "Project",
        "name",
        Operator::Eq,
        name,
    )))
}

fn ids(outcome: ExecOutcome) -> Vec<i64> {
    outcome
        .into_rows()
        .iter()
        .map(|r| match r["id"] {
            Cell::Int(id) => id,
            ref other => panic!("id is not an integer: {:?}", other),
        })
        .collect()
}

// ============================================================================
// Modes
// ============================================================================

#[test]
fn test_all_rows_in_id_order() {
    let exec = executor(&project("PipelineTesting"));
    let outcome = exec.execute(ExecuteMode::All, None, None).unwrap();
    assert_eq!(ids(outcome), [1, 2, 4]);
}

#[test]
fn test_first_and_count() {
    let exec = executor(&project("PipelineTesting"));

    match exec.execute(ExecuteMode::First, None, None).unwrap() {
        ExecOutcome::Row(Some(row)) => assert_eq!(row["run_order"], Cell::Int(1)),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(
        exec.execute(ExecuteMode::Count, None, None).unwrap(),
        ExecOutcome::Count(3)
    );
    assert_eq!(
        exec.execute_str("count", None, None).unwrap(),
        ExecOutcome::Count(3)
    );
}

#[test]
fn test_empty_result() {
    let exec = executor(&project("Nobody"));
    assert_eq!(
        exec.execute(ExecuteMode::First, None, None).unwrap(),
        ExecOutcome::Row(None)
    );
    assert_eq!(
        exec.execute(ExecuteMode::Count, None, None).unwrap(),
        ExecOutcome::Count(0)
    );
}

// ============================================================================
// Limit and offset
// ============================================================================

#[test]
fn test_limit_and_offset_apply_before_mode() {
    let exec = executor(&project("PipelineTesting"));

    let page = exec.execute(ExecuteMode::All, Some(1), Some(1)).unwrap();
    assert_eq!(ids(page), [2]);

    let tail = exec.execute(ExecuteMode::All, None, Some(1)).unwrap();
    assert_eq!(ids(tail), [2, 4]);

    let first = exec.execute(ExecuteMode::First, None, Some(2)).unwrap();
    assert_eq!(ids(first), [4]);

    assert_eq!(
        exec.execute(ExecuteMode::Count, Some(2), None).unwrap(),
        ExecOutcome::Count(2)
    );
}

// ============================================================================
// Predicates end to end
// ============================================================================

#[test]
fn test_or_of_ands_runs() {
    let group = |project: &str| {
        SubFilter::new(BoolOp::And)
            .add_match(Match::new("Project", "name", Operator::Eq, project))
            .add_match(Match::new("Sample", "sample_type", Operator::Eq, "StudySample"))
    };
    let spec = QuerySpec::new("SampleAssay").with_filter(
        Filter::new(BoolOp::Or)
            .add_sub_filter(group("PipelineTesting"))
            .add_sub_filter(group("Other")),
    );

    let outcome = executor(&spec).execute(ExecuteMode::All, None, None).unwrap();
    assert_eq!(ids(outcome), [1, 3, 4]);
}

#[test]
fn test_membership_pattern_and_range() {
    let spec = QuerySpec::new("SampleAssay")
        .with_filter(Filter::single(Match::new(
            "Assay",
            "name",
            Operator::In,
            vec!["LPOS"],
        )))
        .with_filter(Filter::single(Match::new(
            "Sample",
            "name",
            Operator::Ilike,
            "s%",
        )))
        .with_filter(Filter::single(Match::new(
            "SampleAssay",
            "run_order",
            Operator::NotBetween,
            vec![2, 2],
        )));

    let outcome = executor(&spec).execute(ExecuteMode::All, None, None).unwrap();
    assert_eq!(ids(outcome), [1, 3]);
}

#[test]
fn test_rows_collect_into_dataframe() {
    let exec = executor(&project("Other"));
    let rows = exec.execute(ExecuteMode::All, None, None).unwrap().into_rows();
    let frame = DataFrame::from_records(&rows);

    assert_eq!(frame.columns, ["assay_id", "id", "run_order", "sample_id"]);
    assert_eq!(frame.column("sample_id").unwrap(), [&Cell::Int(3)]);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_backend_error_carries_mode_and_sql() {
    // No annotation tables in the fixture.
    let exec = executor(&QuerySpec::new("HarmonisedAnnotation"));
    let err = exec.execute(ExecuteMode::Count, None, None).unwrap_err();

    match &err {
        ExecError::Backend { mode, sql, .. } => {
            assert_eq!(*mode, ExecuteMode::Count);
            assert!(sql.contains("\"harmonised_annotation\""));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(err.to_string().starts_with("count query failed"));
}

#[test]
fn test_unknown_mode_string() {
    let exec = executor(&project("PipelineTesting"));
    assert!(matches!(
        exec.execute_str("several", None, None),
        Err(ExecError::UnknownMode(mode)) if mode == "several"
    ));
}
