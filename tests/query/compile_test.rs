//! Integration tests for query compilation against the built-in schema.
//!
//! These tests go from the JSON interchange format to the compiled forms:
//! the ORM-style debug string and SQL.

use phenoquery::query::{
    metadata_filter, BoolOp, CompileError, CompileOptions, Filter, Match, Operator, Predicate,
    QueryCompiler, QuerySpec, SpecError, SubFilter,
};
use phenoquery::schema::{phenomedb, SchemaError};
use phenoquery::sql::Dialect;

fn compile(spec: &QuerySpec) -> Result<phenoquery::query::CompiledQuery, CompileError> {
    QueryCompiler::new(phenomedb::schema().unwrap()).compile(spec)
}

// ============================================================================
// Interchange format
// ============================================================================

const PIPELINE_TESTING: &str = r#"{
    "model": "SampleAssay",
    "filters": [{
        "filter_operator": "AND",
        "sub_filters": [{
            "sub_filter_operator": "AND",
            "matches": [{"model": "Project", "property": "name", "operator": "eq", "value": "PipelineTesting"}]
        }]
    }]
}"#;

#[test]
fn test_single_match_from_json() {
    let spec = QuerySpec::from_json(PIPELINE_TESTING).unwrap();
    let compiled = compile(&spec).unwrap();

    assert_eq!(compiled.spec.joins, ["Sample", "Subject", "Project"]);
    assert_eq!(compiled.filters.len(), 1);
    assert!(matches!(compiled.filters[0], Predicate::Compare(_)));
    assert_eq!(
        compiled.to_debug_string(),
        "db_session.query(SampleAssay)\
         .join(Sample,SampleAssay.sample_id==Sample.id)\
         .join(Subject,Sample.subject_id==Subject.id)\
         .join(Project,Subject.project_id==Project.id)\
         .filter(Project.name==\"PipelineTesting\")\
         .group_by(SampleAssay.id).order_by(SampleAssay.id)"
    );
}

#[test]
fn test_single_match_sql() {
    let spec = QuerySpec::from_json(PIPELINE_TESTING).unwrap();
    let compiled = compile(&spec).unwrap();

    insta::assert_snapshot!(compiled.to_sql(Dialect::Postgres), @r#"
    SELECT
      "sample_assay".*
    FROM "sample_assay"
    INNER JOIN "sample" ON "sample_assay"."sample_id" = "sample"."id"
    INNER JOIN "subject" ON "sample"."subject_id" = "subject"."id"
    INNER JOIN "project" ON "subject"."project_id" = "project"."id"
    WHERE "project"."name" = 'PipelineTesting'
    GROUP BY "sample_assay"."id"
    ORDER BY "sample_assay"."id" ASC
    "#);
}

#[test]
fn test_canonical_json_carries_recomputed_joins() {
    let mut spec = QuerySpec::from_json(PIPELINE_TESTING).unwrap();
    spec.joins = vec!["Assay".into()];

    let compiled = compile(&spec).unwrap();
    let reparsed = QuerySpec::from_json(&compiled.spec.to_json().unwrap()).unwrap();
    assert_eq!(reparsed.joins, ["Sample", "Subject", "Project"]);
    assert_eq!(reparsed.filters, spec.filters);
}

// ============================================================================
// Boolean nesting
// ============================================================================

fn sample_type_group(project: &str, sample_type: &str) -> SubFilter {
    SubFilter::new(BoolOp::And)
        .add_match(Match::new("Project", "name", Operator::Eq, project))
        .add_match(Match::new("Sample", "sample_type", Operator::Eq, sample_type))
}

#[test]
fn test_or_of_ands_nests_two_levels() {
    let spec = QuerySpec::new("SampleAssay").with_filter(
        Filter::new(BoolOp::Or)
            .add_sub_filter(sample_type_group("PipelineTesting", "StudySample"))
            .add_sub_filter(sample_type_group("Other", "StudyPool")),
    );
    let compiled = compile(&spec).unwrap();

    assert_eq!(compiled.filters.len(), 1);
    assert_eq!(compiled.filters[0].depth(), 2);
    assert!(compiled.to_debug_string().contains(
        ".filter(or_(\
         and_(Project.name==\"PipelineTesting\",Sample.sample_type==\"StudySample\"),\
         and_(Project.name==\"Other\",Sample.sample_type==\"StudyPool\")))"
    ));
}

#[test]
fn test_filters_are_anded_regardless_of_operator() {
    let spec = QuerySpec::new("SampleAssay")
        .with_filter(
            Filter::new(BoolOp::Or).add_sub_filter(
                SubFilter::new(BoolOp::Or)
                    .add_match(Match::new("Sample", "name", Operator::Like, "S1%")),
            ),
        )
        .with_filter(Filter::single(Match::new(
            "Assay",
            "name",
            Operator::In,
            vec!["LPOS", "HPOS"],
        )));
    let compiled = compile(&spec).unwrap();

    assert!(compiled
        .to_debug_string()
        .contains(".filter(Sample.name.like(\"S1%\")).filter(Assay.name.in_([\"LPOS\",\"HPOS\"]))"));
    assert!(compiled
        .to_sql(Dialect::Postgres)
        .contains("WHERE \"sample\".\"name\" LIKE 'S1%' AND \"assay\".\"name\" IN ('LPOS', 'HPOS')"));
}

#[test]
fn test_negated_operators() {
    let spec = QuerySpec::new("SampleAssay").with_filter(
        Filter::new(BoolOp::And).add_sub_filter(
            SubFilter::new(BoolOp::And)
                .add_match(Match::new("Sample", "name", Operator::NotIlike, "%qc%"))
                .add_match(Match::new("SampleAssay", "run_order", Operator::NotBetween, vec![1, 10])),
        ),
    );
    let compiled = compile(&spec).unwrap();

    assert!(compiled.to_debug_string().contains(
        ".filter(and_(not_(Sample.name.ilike(\"%qc%\")),not_(SampleAssay.run_order.between(1,10))))"
    ));
}

// ============================================================================
// Canned filters and implicit joins
// ============================================================================

#[test]
fn test_metadata_filter_joins_through_sample() {
    let spec = QuerySpec::new("SampleAssay").with_filter(
        Filter::new(BoolOp::And).add_sub_filter(metadata_filter("Age", Operator::Gt, 40)),
    );
    let compiled = compile(&spec).unwrap();

    assert_eq!(
        compiled.join_models(),
        [
            "Sample",
            "MetadataValue",
            "MetadataField",
            "HarmonisedMetadataField"
        ]
    );
    assert_eq!(compiled.inferred_joins().count(), 0);
}

#[test]
fn test_inferred_join_in_default_schema() {
    // MetadataValue follows Project in the join list but relates to Sample.
    let spec = QuerySpec::new("SampleAssay")
        .with_filter(Filter::single(Match::new(
            "Project",
            "name",
            Operator::Eq,
            "PipelineTesting",
        )))
        .with_filter(Filter::single(Match::new(
            "MetadataValue",
            "raw_value",
            Operator::Eq,
            "yes",
        )));

    let compiled = compile(&spec).unwrap();
    let inferred: Vec<_> = compiled.inferred_joins().map(|j| j.model.as_str()).collect();
    assert_eq!(inferred, ["MetadataValue"]);
    assert!(compiled.to_debug_string().contains(".join(MetadataValue)"));
    assert!(compiled
        .to_sql(Dialect::Postgres)
        .contains("INNER JOIN \"metadata_value\" ON \"metadata_value\".\"sample_id\" = \"sample\".\"id\""));

    let strict = QueryCompiler::new(phenomedb::schema().unwrap()).with_options(CompileOptions {
        require_declared_joins: true,
    });
    assert!(matches!(
        strict.compile(&spec),
        Err(CompileError::UndeclaredJoin { model }) if model == "MetadataValue"
    ));
}

#[test]
fn test_compound_class_compiles_against_parent() {
    let spec = QuerySpec::new("CompoundClass").with_filter(Filter::single(Match::new(
        "Compound",
        "name",
        Operator::Eq,
        "Glucose",
    )));
    let compiled = compile(&spec).unwrap();

    assert_eq!(compiled.output, "CompoundClass");
    assert_eq!(compiled.base, "AnnotatedFeature");
    assert!(compiled
        .to_debug_string()
        .starts_with("db_session.query(AnnotatedFeature).join(FeatureMetadata,"));
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_empty_spec_is_ordered_scan() {
    let compiled = compile(&QuerySpec::new("HarmonisedAnnotation")).unwrap();
    assert_eq!(
        compiled.to_debug_string(),
        "db_session.query(HarmonisedAnnotation)\
         .group_by(HarmonisedAnnotation.id).order_by(HarmonisedAnnotation.id)"
    );
}

#[test]
fn test_unknown_operator_in_json() {
    let json = PIPELINE_TESTING.replace("\"eq\"", "\"equals\"");
    let err = QuerySpec::from_json(&json).unwrap_err();
    assert!(err.to_string().contains("Unknown operator 'equals'"));
}

#[test]
fn test_scalar_for_list_operator_names_match() {
    let spec = QuerySpec::new("SampleAssay").with_filter(Filter::single(Match::new(
        "Sample",
        "name",
        Operator::In,
        "S1",
    )));
    let err = compile(&spec).unwrap_err();
    assert!(matches!(err, CompileError::Spec(SpecError::ValueMismatch { .. })));
    assert!(err.to_string().contains("Sample.name"));
}

#[test]
fn test_unknown_model_and_output() {
    let spec = QuerySpec::new("SampleAssay").with_filter(Filter::single(Match::new(
        "Instrument",
        "name",
        Operator::Eq,
        "x",
    )));
    assert!(matches!(
        compile(&spec),
        Err(CompileError::Schema(SchemaError::UnknownEntity(_)))
            | Err(CompileError::Schema(SchemaError::MissingRoute { .. }))
    ));

    assert!(matches!(
        compile(&QuerySpec::new("Project")),
        Err(CompileError::Schema(SchemaError::UnknownOutputModel(_)))
    ));
}

#[test]
fn test_pattern_operator_needs_string_attribute() {
    let spec = QuerySpec::new("SampleAssay").with_filter(Filter::single(Match::new(
        "SampleAssay",
        "run_order",
        Operator::Like,
        "1%",
    )));
    assert!(matches!(
        compile(&spec),
        Err(CompileError::IncompatibleAttribute { .. })
    ));
}
