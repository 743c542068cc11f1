//! Cache key derivation: order independence, non-collision and file-name safety.

use proptest::prelude::*;

use phenoquery::cache::{DataFrameKey, DataFrameType, DurableFormat, DurableStore, KeyParam};

const MODELS: &[&str] = &[
    "AnnotatedFeature",
    "CompoundClass",
    "HarmonisedAnnotation",
    "SampleAssay",
];

fn word() -> impl Strategy<Value = String> {
    "[a-zA-Z]{1,6}(/[a-zA-Z]{1,4})?( [a-z]{1,5})?"
}

/// One param of every kind, so the order is the only thing that varies.
fn full_params() -> impl Strategy<Value = Vec<KeyParam>> {
    (
        (word(), word(), word(), word(), word()),
        (any::<bool>(), word(), word(), any::<bool>(), word(), any::<bool>()),
    )
        .prop_map(
            |(
                (class_type, class_level, aggregate, version, correction),
                (harmonise, feature_label, sample_label, convert, unit, test),
            )| {
                vec![
                    KeyParam::ClassType(class_type),
                    KeyParam::ClassLevel(class_level),
                    KeyParam::AggregateFunction(aggregate),
                    KeyParam::AnnotationVersion(version),
                    KeyParam::CorrectionType(correction),
                    KeyParam::HarmoniseAnnotations(harmonise),
                    KeyParam::FeatureLabel(feature_label),
                    KeyParam::SampleLabel(sample_label),
                    KeyParam::ConvertUnits(convert),
                    KeyParam::MasterUnit(unit),
                    KeyParam::TestNamespace(test),
                ]
            },
        )
}

fn df_type() -> impl Strategy<Value = DataFrameType> {
    prop::sample::select(DataFrameType::ALL.to_vec())
}

/// Qualifier values for a key type and model where every qualifier is
/// rendered. Class level and version are normalised when rendered, so they
/// draw from values the normalisation leaves alone.
type Qualifiers = (
    (Option<String>, Option<String>, Option<String>, Option<String>),
    (Option<String>, bool, Option<String>, Option<String>, Option<String>),
);

fn qualifiers() -> impl Strategy<Value = Qualifiers> {
    let plain = || proptest::option::of("[a-z0-9]{1,6}");
    let free = || proptest::option::of("[a-zA-Z0-9/:%= ]{1,6}");
    (
        (free(), plain(), free(), plain()),
        (free(), any::<bool>(), free(), free(), free()),
    )
}

fn qualified_key(q: &Qualifiers) -> String {
    let ((class_type, class_level, aggregate, version), (correction, harmonise, feature, sample, unit)) =
        q.clone();
    let params = [
        class_type.map(KeyParam::ClassType),
        class_level.map(KeyParam::ClassLevel),
        aggregate.map(KeyParam::AggregateFunction),
        version.map(KeyParam::AnnotationVersion),
        correction.map(KeyParam::CorrectionType),
        Some(KeyParam::HarmoniseAnnotations(harmonise)),
        feature.map(KeyParam::FeatureLabel),
        sample.map(KeyParam::SampleLabel),
        unit.map(KeyParam::MasterUnit),
    ];
    DataFrameKey::from_params("metaboanalyst_data", "CompoundClass", params.into_iter().flatten())
        .unwrap()
        .build()
}

proptest! {
    #[test]
    fn test_param_order_does_not_change_key(
        df_type in df_type(),
        model in prop::sample::select(MODELS),
        (params, shuffled) in full_params()
            .prop_flat_map(|p| (Just(p.clone()), Just(p).prop_shuffle())),
    ) {
        let a = DataFrameKey::from_params(df_type.as_str(), model, params).unwrap();
        let b = DataFrameKey::from_params(df_type.as_str(), model, shuffled).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.build(), b.build());
    }

    #[test]
    fn test_distinct_qualifiers_give_distinct_keys(a in qualifiers(), b in qualifiers()) {
        prop_assume!(a != b);
        prop_assert_ne!(qualified_key(&a), qualified_key(&b));
    }

    #[test]
    fn test_keys_are_file_safe(
        df_type in df_type(),
        model in prop::sample::select(MODELS),
        params in full_params(),
    ) {
        let key = DataFrameKey::from_params(df_type.as_str(), model, params)
            .unwrap()
            .build();

        prop_assert!(!key.contains('/'));
        let filename = DurableStore::filename(&key);
        prop_assert!(!filename.contains("::"));
        prop_assert!(filename.ends_with(".cache"));
        prop_assert_eq!(DurableStore::key_from_filename(&filename), key);
    }

    #[test]
    fn test_prefix_and_namespace(
        df_type in df_type(),
        model in prop::sample::select(MODELS),
        params in full_params(),
    ) {
        let built = DataFrameKey::from_params(df_type.as_str(), model, params).unwrap();
        let key = built.build();
        let prefix = format!("{}::{}", df_type, model);

        if built.test_namespace {
            prop_assert!(key.starts_with("TEST::"));
            prop_assert!(key["TEST::".len()..].starts_with(&prefix));
        } else {
            prop_assert!(key.starts_with(&prefix));
        }
    }
}

// ============================================================================
// Fixed cases
// ============================================================================

#[test]
fn test_reversed_arguments_give_identical_key() {
    let forward = DataFrameKey::from_params(
        "combined",
        "AnnotatedFeature",
        [
            KeyParam::HarmoniseAnnotations(true),
            KeyParam::MasterUnit("mmol/L".into()),
        ],
    )
    .unwrap();
    let reversed = DataFrameKey::from_params(
        "combined",
        "AnnotatedFeature",
        [
            KeyParam::MasterUnit("mmol/L".into()),
            KeyParam::HarmoniseAnnotations(true),
        ],
    )
    .unwrap();

    assert_eq!(forward.build(), reversed.build());
    assert_eq!(forward.build(), "combined::AnnotatedFeature:HA:u=mmol%2FL");
}

#[test]
fn test_units_dropped_without_conversion() {
    let key = DataFrameKey::new(DataFrameType::Combined, "AnnotatedFeature")
        .master_unit("mmol/L")
        .convert_units(false)
        .build();
    assert_eq!(key, "combined::AnnotatedFeature");
}

#[test]
fn test_labels_only_for_metaboanalyst() {
    let labelled = |df_type| {
        DataFrameKey::new(df_type, "AnnotatedFeature")
            .feature_label("compound")
            .sample_label("sample_id")
            .build()
    };
    assert_eq!(
        labelled(DataFrameType::MetaboanalystData),
        "metaboanalyst_data::AnnotatedFeature:fl=compound:sl=sample_id"
    );
    assert_eq!(
        labelled(DataFrameType::MetaboanalystMetadata),
        "metaboanalyst_metadata::AnnotatedFeature:sl=sample_id"
    );
    assert_eq!(
        labelled(DataFrameType::IntensityData),
        "intensity_data::AnnotatedFeature"
    );
}

#[test]
fn test_value_in_another_slot_is_another_key() {
    let feature = DataFrameKey::new(DataFrameType::MetaboanalystData, "AnnotatedFeature")
        .feature_label("x")
        .build();
    let sample = DataFrameKey::new(DataFrameType::MetaboanalystData, "AnnotatedFeature")
        .sample_label("x")
        .build();
    assert_ne!(feature, sample);

    let version = DataFrameKey::new(DataFrameType::Combined, "AnnotatedFeature")
        .annotation_version("sr")
        .build();
    let correction = DataFrameKey::new(DataFrameType::Combined, "AnnotatedFeature")
        .correction_type("sr")
        .build();
    assert_ne!(version, correction);
}

#[test]
fn test_storage_format_follows_type() {
    for df_type in DataFrameType::ALL {
        let key = format!(
            "SavedQueryDataframe::1:{}",
            DataFrameKey::new(df_type, "AnnotatedFeature").build()
        );
        let expected = if df_type == DataFrameType::IntensityData {
            DurableFormat::Binary
        } else {
            DurableFormat::Csv
        };
        assert_eq!(DurableFormat::for_key(&key), expected, "{}", key);
    }
}

#[test]
fn test_unknown_type_name() {
    let err = DataFrameKey::from_params("pivot", "AnnotatedFeature", Vec::new()).unwrap_err();
    assert_eq!(err.to_string(), "Dataframe type not recognised: pivot");
}
