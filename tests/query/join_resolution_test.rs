//! Join resolution tests: route unions, relation lookup order, and
//! inferred or ambiguous joins on small hand-built graphs.

use phenoquery::query::{CompileError, Filter, Match, Operator, QueryCompiler, QuerySpec};
use phenoquery::schema::{phenomedb, Entity, EntityGraph, RouteIssue, SchemaError};

fn eq(model: &str) -> Filter {
    Filter::single(Match::new(model, "id", Operator::Eq, 1))
}

// ============================================================================
// Route union over the default schema
// ============================================================================

#[test]
fn test_routes_are_unioned_in_match_order() {
    let graph = phenomedb::schema().unwrap();

    let joins = graph
        .resolve_joins("SampleAssay", &["Project", "Assay", "Subject"])
        .unwrap();
    assert_eq!(joins, ["Sample", "Subject", "Project", "Assay"]);

    let joins = graph
        .resolve_joins("SampleAssay", &["Assay", "Project"])
        .unwrap();
    assert_eq!(joins, ["Assay", "Sample", "Subject", "Project"]);
}

#[test]
fn test_output_model_contributes_no_join() {
    let graph = phenomedb::schema().unwrap();
    let joins = graph
        .resolve_joins("SampleAssay", &["SampleAssay", "Sample"])
        .unwrap();
    assert_eq!(joins, ["Sample"]);
}

#[test]
fn test_harmonised_annotation_reaches_project_through_features() {
    let graph = phenomedb::schema().unwrap();
    let spec = QuerySpec::new("HarmonisedAnnotation").with_filter(Filter::single(Match::new(
        "Project",
        "name",
        Operator::Eq,
        "PipelineTesting",
    )));

    let compiled = QueryCompiler::new(graph).compile(&spec).unwrap();
    assert_eq!(
        compiled.join_models(),
        [
            "Annotation",
            "FeatureMetadata",
            "AnnotatedFeature",
            "SampleAssay",
            "Sample",
            "Subject",
            "Project"
        ]
    );
    assert_eq!(compiled.inferred_joins().count(), 0);
}

#[test]
fn test_role_filter_extends_project_route() {
    let graph = phenomedb::schema().unwrap();
    let joins = graph
        .resolve_joins("AnnotatedFeature", &["ProjectRole"])
        .unwrap();
    assert_eq!(
        joins,
        ["SampleAssay", "Sample", "Subject", "Project", "ProjectRole"]
    );
}

#[test]
fn test_missing_route_is_reported() {
    let graph = EntityGraph::builder()
        .entity(Entity::new("SampleAssay"))
        .entity(Entity::new("Sample"))
        .entity(Entity::new("Subject"))
        .relation("SampleAssay", "sample_id", "Sample", "id")
        .route("SampleAssay", "Sample", &["Sample"])
        .build()
        .unwrap();

    let err = graph.resolve_joins("SampleAssay", &["Subject"]).unwrap_err();
    assert_eq!(
        err,
        SchemaError::MissingRoute {
            output: "SampleAssay".into(),
            target: "Subject".into()
        }
    );
    assert!(err.to_string().contains("Model graph incomplete"));
}

// ============================================================================
// Relation lookup
// ============================================================================

/// `A` joins directly to `B`, `C` and `F`; `M` relates to both `B` and `C`.
fn diamond() -> EntityGraph {
    EntityGraph::builder()
        .entity(Entity::new("A"))
        .entity(Entity::new("B"))
        .entity(Entity::new("C"))
        .entity(Entity::new("F"))
        .entity(Entity::new("M"))
        .relation("B", "a_id", "A", "id")
        .relation("C", "a_id", "A", "id")
        .relation("F", "a_id", "A", "id")
        .relation("M", "b_id", "B", "id")
        .relation("M", "c_id", "C", "id")
        .route("A", "B", &["B"])
        .route("A", "C", &["C"])
        .route("A", "F", &["F"])
        .route("A", "M", &["M"])
        .build()
        .unwrap()
}

#[test]
fn test_ambiguous_join_lists_candidates() {
    let graph = diamond();
    let spec = QuerySpec::new("A")
        .with_filter(eq("B"))
        .with_filter(eq("C"))
        .with_filter(eq("F"))
        .with_filter(eq("M"));

    match QueryCompiler::new(&graph).compile(&spec) {
        Err(CompileError::AmbiguousJoin { model, candidates }) => {
            assert_eq!(model, "M");
            assert!(candidates.contains("M.b_id==B.id"));
            assert!(candidates.contains("M.c_id==C.id"));
        }
        other => panic!("expected an ambiguous join, got {:?}", other),
    }
}

#[test]
fn test_predecessor_relation_wins_over_search() {
    let graph = diamond();
    // M directly follows C, so the C relation is used without searching.
    let spec = QuerySpec::new("A")
        .with_filter(eq("B"))
        .with_filter(eq("C"))
        .with_filter(eq("M"));

    let compiled = QueryCompiler::new(&graph).compile(&spec).unwrap();
    let last = compiled.joins.last().unwrap();
    assert_eq!(last.model, "M");
    assert!(!last.inferred);
    assert_eq!(last.relation.to_string(), "M.c_id==C.id");
}

#[test]
fn test_unrelated_first_join_is_undeclared() {
    let graph = diamond();
    let spec = QuerySpec::new("A").with_filter(eq("M")).with_filter(eq("B"));

    assert!(matches!(
        QueryCompiler::new(&graph).compile(&spec),
        Err(CompileError::UndeclaredJoin { model }) if model == "M"
    ));
}

// ============================================================================
// Derived routes and route validation
// ============================================================================

#[test]
fn test_derived_routes_fill_gaps_only() {
    let graph = EntityGraph::builder()
        .entity(Entity::new("SampleAssay"))
        .entity(Entity::new("Sample"))
        .entity(Entity::new("Subject"))
        .entity(Entity::new("Project"))
        .relation("SampleAssay", "sample_id", "Sample", "id")
        .relation("Sample", "subject_id", "Subject", "id")
        .relation("Subject", "project_id", "Project", "id")
        .route("SampleAssay", "Sample", &["Sample"])
        .derive_routes("SampleAssay")
        .build()
        .unwrap();

    assert_eq!(
        graph.route("SampleAssay", "Project").unwrap(),
        ["Sample", "Subject", "Project"]
    );
    assert_eq!(
        graph.find_path("Project", "SampleAssay").unwrap(),
        ["Subject", "Sample", "SampleAssay"]
    );
}

#[test]
fn test_broken_route_is_flagged() {
    let graph = EntityGraph::builder()
        .entity(Entity::new("SampleAssay"))
        .entity(Entity::new("Sample"))
        .entity(Entity::new("Subject"))
        .relation("SampleAssay", "sample_id", "Sample", "id")
        .route("SampleAssay", "Subject", &["Sample", "Subject"])
        .build()
        .unwrap();

    assert_eq!(
        graph.validate_routes(),
        [RouteIssue::MissingHop {
            output: "SampleAssay".into(),
            target: "Subject".into(),
            from: "Sample".into(),
            to: "Subject".into(),
        }]
    );
    assert!(phenomedb::schema().unwrap().validate_routes().is_empty());
}
