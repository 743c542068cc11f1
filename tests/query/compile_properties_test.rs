//! Property tests for the compiler over generated specifications.

use proptest::prelude::*;

use phenoquery::query::{
    BoolOp, Filter, Match, Operator, Predicate, QueryCompiler, QuerySpec, SubFilter,
};
use phenoquery::schema::phenomedb;

/// String attributes reachable from SampleAssay.
const COLUMNS: &[(&str, &str)] = &[
    ("SampleAssay", "name"),
    ("Sample", "name"),
    ("Subject", "name"),
    ("Project", "name"),
    ("Assay", "name"),
    ("MetadataField", "name"),
    ("HarmonisedMetadataField", "name"),
    ("Compound", "name"),
    ("AnnotationMethod", "name"),
];

fn bool_op() -> impl Strategy<Value = BoolOp> {
    prop_oneof![Just(BoolOp::And), Just(BoolOp::Or)]
}

fn match_strategy() -> impl Strategy<Value = Match> {
    (
        prop::sample::select(COLUMNS),
        prop::sample::select(vec![Operator::Eq, Operator::NotEq, Operator::Like, Operator::Ilike]),
        "[A-Za-z0-9%]{1,12}",
    )
        .prop_map(|((model, property), operator, value)| {
            Match::new(model, property, operator, value)
        })
}

fn sub_filter_strategy() -> impl Strategy<Value = SubFilter> {
    (bool_op(), prop::collection::vec(match_strategy(), 1..4)).prop_map(|(op, matches)| {
        matches
            .into_iter()
            .fold(SubFilter::new(op), |sf, m| sf.add_match(m))
    })
}

fn filter_strategy() -> impl Strategy<Value = Filter> {
    (bool_op(), prop::collection::vec(sub_filter_strategy(), 1..4)).prop_map(|(op, subs)| {
        subs.into_iter()
            .fold(Filter::new(op), |f, sf| f.add_sub_filter(sf))
    })
}

fn spec_strategy() -> impl Strategy<Value = QuerySpec> {
    prop::collection::vec(filter_strategy(), 0..4).prop_map(|filters| {
        filters
            .into_iter()
            .fold(QuerySpec::new("SampleAssay"), |spec, f| spec.with_filter(f))
    })
}

fn expected_depth(filter: &Filter) -> usize {
    let sub_depths: Vec<usize> = filter
        .sub_filters
        .iter()
        .map(|sf| usize::from(sf.matches.len() > 1))
        .collect();
    let inner = sub_depths.iter().copied().max().unwrap_or(0);
    if filter.sub_filters.len() > 1 {
        inner + 1
    } else {
        inner
    }
}

proptest! {
    #[test]
    fn test_compile_is_deterministic(spec in spec_strategy()) {
        let compiler = QueryCompiler::new(phenomedb::schema().unwrap());
        let a = compiler.compile(&spec).unwrap();
        let b = compiler.compile(&spec).unwrap();

        prop_assert_eq!(a.to_debug_string(), b.to_debug_string());
        prop_assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn test_authored_joins_do_not_matter(
        spec in spec_strategy(),
        noise in prop::collection::vec(prop::sample::select(vec!["Assay", "Compound", "Nope"]), 0..3),
    ) {
        let compiler = QueryCompiler::new(phenomedb::schema().unwrap());
        let mut noisy = spec.clone();
        noisy.joins = noise.into_iter().map(String::from).collect();

        let clean = compiler.compile(&spec).unwrap();
        let dirty = compiler.compile(&noisy).unwrap();
        prop_assert_eq!(&clean.spec.joins, &dirty.spec.joins);
        prop_assert_eq!(clean.fingerprint().unwrap(), dirty.fingerprint().unwrap());
    }

    #[test]
    fn test_joins_cover_every_match_model(spec in spec_strategy()) {
        let compiled = QueryCompiler::new(phenomedb::schema().unwrap()).compile(&spec).unwrap();
        let joins = compiled.join_models();

        for model in spec.match_models() {
            prop_assert!(model == "SampleAssay" || joins.contains(&model), "{} missing", model);
        }
        let mut unique = joins.clone();
        unique.sort();
        unique.dedup();
        prop_assert_eq!(unique.len(), joins.len());
    }

    #[test]
    fn test_single_children_are_never_wrapped(spec in spec_strategy()) {
        let compiled = QueryCompiler::new(phenomedb::schema().unwrap()).compile(&spec).unwrap();
        prop_assert_eq!(compiled.filters.len(), spec.filters.len());

        for (predicate, filter) in compiled.filters.iter().zip(&spec.filters) {
            prop_assert_eq!(predicate.depth(), expected_depth(filter));
            if let Predicate::Group { children, .. } = predicate {
                prop_assert!(children.len() >= 2);
            }
        }
        prop_assert_eq!(
            compiled.to_debug_string().matches(".filter(").count(),
            spec.filters.len()
        );
    }
}
