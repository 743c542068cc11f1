//! The built-in metabolomics schema: projects, subjects, samples, assays,
//! annotated features, annotations and compounds.

use std::sync::LazyLock;

use super::{AttributeKind as K, Entity, EntityGraph, SchemaResult};

static PHENOMEDB: LazyLock<SchemaResult<EntityGraph>> = LazyLock::new(build);

/// The shared default schema.
pub fn schema() -> SchemaResult<&'static EntityGraph> {
    PHENOMEDB.as_ref().map_err(Clone::clone)
}

/// Build a fresh copy of the default schema.
pub fn build() -> SchemaResult<EntityGraph> {
    let builder = EntityGraph::builder()
        .entity(
            Entity::new("Project")
                .attr("name", K::String)
                .attr("description", K::String)
                .attr("lims_id", K::Number)
                .attr("project_folder_name", K::String)
                .attr("date_added", K::DateTime)
                .attr("short_description", K::String)
                .attr("chart_colour", K::String),
        )
        .entity(Entity::new("ProjectRole").attr("role_id", K::Number))
        .entity(Entity::new("Subject").attr("name", K::String))
        .entity(
            Entity::new("Sample")
                .attr("name", K::String)
                .attr("sampling_date", K::DateTime)
                .attr("sample_type", K::Enum)
                .attr("assay_role", K::Enum)
                .attr("sample_matrix", K::String)
                .attr("biological_tissue", K::String),
        )
        .entity(
            Entity::new("SampleAssay")
                .attr("name", K::String)
                .attr("acquired_time", K::DateTime)
                .attr("excluded", K::String)
                .attr("instrument", K::String)
                .attr("sample_file_name", K::String)
                .attr("sample_base_name", K::String)
                .attr("run_order", K::Number)
                .attr("batch", K::String)
                .attr("correction_batch", K::String)
                .attr("dilution", K::Number),
        )
        .entity(
            Entity::new("Assay")
                .attr("name", K::String)
                .attr("platform", K::Enum)
                .attr("targeted", K::String)
                .attr("ms_polarity", K::String)
                .attr("measurement_type", K::String)
                .attr("long_name", K::String)
                .attr("quantification_type", K::Enum),
        )
        .entity(
            Entity::new("AnnotatedFeature")
                .attr("intensity", K::Number)
                .attr("below_lloq", K::Bool)
                .attr("above_uloq", K::Bool)
                .attr("comment", K::String)
                .attr("sr_corrected_intensity", K::Number)
                .attr("ltr_corrected_intensity", K::Number),
        )
        .entity(
            Entity::new("FeatureMetadata")
                .attr("rt_average", K::Number)
                .attr("rt_min", K::Number)
                .attr("rt_max", K::Number)
                .attr("mz_average", K::Number)
                .attr("mz_min", K::Number)
                .attr("mz_max", K::Number)
                .attr("feature_name", K::String)
                .attr("lod", K::Number)
                .attr("lloq", K::Number)
                .attr("uloq", K::Number)
                .attr("ion_id", K::String)
                .attr("ion_type", K::String)
                .attr("excluded", K::Bool)
                .attr("feature_filtering_pass", K::Bool)
                .attr("final_assessment_pass", K::Bool)
                .attr("quantification_type", K::Enum)
                .attr("calibration_method", K::Enum)
                .attr("annotation_version", K::String)
                .attr("comment", K::String)
                .attr("date_imported", K::DateTime),
        )
        .entity(
            Entity::new("Annotation")
                .attr("version", K::String)
                .attr("cpd_name", K::String)
                .attr("cpd_id", K::String)
                .attr("annotated_by", K::String)
                .attr("confidence_score", K::String),
        )
        .entity(
            Entity::new("HarmonisedAnnotation")
                .attr("cpd_name", K::String)
                .attr("cpd_id", K::String)
                .attr("annotated_by", K::String)
                .attr("confidence_score", K::String)
                .attr("multi_compound_operator", K::Enum)
                .attr("latest_version", K::String),
        )
        .entity(
            Entity::new("AnnotationMethod")
                .attr("name", K::String)
                .attr("description", K::String),
        )
        .entity(Entity::new("AnnotationCompound"))
        .entity(
            Entity::new("Compound")
                .attr("name", K::String)
                .attr("chemical_formula", K::String)
                .attr("monoisotopic_mass", K::Number)
                .attr("inchi", K::String)
                .attr("inchi_key", K::String)
                .attr("iupac", K::String)
                .attr("smiles", K::String)
                .attr("log_p", K::Number),
        )
        .entity(
            Entity::new("CompoundExternalDB")
                .with_table("compound_external_db")
                .attr("database_ref", K::String),
        )
        .entity(
            Entity::new("ExternalDB")
                .with_table("external_db")
                .attr("name", K::String)
                .attr("url", K::String),
        )
        .entity(
            Entity::new("MetadataValue")
                .attr("raw_value", K::String)
                .attr("harmonised_numeric_value", K::Number)
                .attr("harmonised_text_value", K::String)
                .attr("harmonised_datetime_value", K::DateTime),
        )
        .entity(Entity::new("MetadataField").attr("name", K::String))
        .entity(
            Entity::new("HarmonisedMetadataField")
                .attr("name", K::String)
                .attr("datatype", K::Enum),
        )
        .entity(
            Entity::new("CompoundClass")
                .attr("name", K::String)
                .attr("description", K::String)
                .attr("type", K::Enum)
                .attr("kingdom", K::String)
                .attr("category", K::String)
                .attr("main_class", K::String)
                .attr("sub_class", K::String)
                .attr("direct_parent", K::String)
                .attr("version", K::String),
        );

    let builder = builder
        .relation("SampleAssay", "sample_id", "Sample", "id")
        .relation("SampleAssay", "assay_id", "Assay", "id")
        .relation("Sample", "subject_id", "Subject", "id")
        .relation("Subject", "project_id", "Project", "id")
        .relation("ProjectRole", "project_id", "Project", "id")
        .relation("AnnotatedFeature", "sample_assay_id", "SampleAssay", "id")
        .relation("AnnotatedFeature", "feature_metadata_id", "FeatureMetadata", "id")
        .relation("FeatureMetadata", "annotation_id", "Annotation", "id")
        .relation(
            "Annotation",
            "harmonised_annotation_id",
            "HarmonisedAnnotation",
            "id",
        )
        .relation("HarmonisedAnnotation", "assay_id", "Assay", "id")
        .relation(
            "HarmonisedAnnotation",
            "annotation_method_id",
            "AnnotationMethod",
            "id",
        )
        .relation(
            "HarmonisedAnnotation",
            "annotation_compound_id",
            "AnnotationCompound",
            "id",
        )
        .relation("AnnotationCompound", "compound_id", "Compound", "id")
        .relation("CompoundExternalDB", "compound_id", "Compound", "id")
        .relation("CompoundExternalDB", "external_db_id", "ExternalDB", "id")
        .relation("MetadataValue", "sample_id", "Sample", "id")
        .relation("MetadataValue", "metadata_field_id", "MetadataField", "id")
        .relation(
            "MetadataField",
            "harmonised_metadata_field_id",
            "HarmonisedMetadataField",
            "id",
        );

    let builder = annotated_feature_routes(builder);
    let builder = sample_assay_routes(builder);
    let builder = harmonised_annotation_routes(builder);

    builder
        .parent("CompoundClass", "AnnotatedFeature")
        .projection(
            "Project",
            &["name", "description", "lims_id", "short_description"],
        )
        .projection("Subject", &["name"])
        .projection(
            "Sample",
            &[
                "name",
                "sampling_date",
                "sample_type",
                "assay_role",
                "sample_matrix",
                "biological_tissue",
            ],
        )
        .projection(
            "SampleAssay",
            &[
                "name",
                "acquired_time",
                "excluded",
                "instrument",
                "sample_file_name",
                "sample_base_name",
                "run_order",
                "batch",
                "correction_batch",
                "dilution",
            ],
        )
        .projection(
            "Assay",
            &["name", "platform", "ms_polarity", "quantification_type"],
        )
        .projection(
            "FeatureMetadata",
            &[
                "feature_name",
                "rt_average",
                "rt_min",
                "rt_max",
                "mz_average",
                "mz_min",
                "mz_max",
                "lod",
                "lloq",
                "uloq",
                "ion_id",
                "ion_type",
                "excluded",
                "feature_filtering_pass",
                "final_assessment_pass",
                "quantification_type",
                "calibration_method",
                "annotation_version",
                "comment",
            ],
        )
        .projection(
            "Annotation",
            &[
                "version",
                "cpd_name",
                "cpd_id",
                "annotated_by",
                "confidence_score",
            ],
        )
        .projection(
            "HarmonisedAnnotation",
            &[
                "cpd_name",
                "cpd_id",
                "annotated_by",
                "confidence_score",
                "multi_compound_operator",
            ],
        )
        .projection(
            "CompoundClass",
            &[
                "name",
                "description",
                "kingdom",
                "category",
                "main_class",
                "sub_class",
                "direct_parent",
                "version",
            ],
        )
        .build()
}

type Builder = super::EntityGraphBuilder;

fn annotated_feature_routes(b: Builder) -> Builder {
    const O: &str = "AnnotatedFeature";
    const SAMPLE: [&str; 2] = ["SampleAssay", "Sample"];
    const HA: [&str; 3] = ["FeatureMetadata", "Annotation", "HarmonisedAnnotation"];

    b.route(O, "SampleAssay", &["SampleAssay"])
        .route(O, "Sample", &SAMPLE)
        .route(O, "Assay", &["SampleAssay", "Assay"])
        .route(O, "Subject", &[SAMPLE[0], SAMPLE[1], "Subject"])
        .route(O, "Project", &[SAMPLE[0], SAMPLE[1], "Subject", "Project"])
        .route(
            O,
            "ProjectRole",
            &[SAMPLE[0], SAMPLE[1], "Subject", "Project", "ProjectRole"],
        )
        .route(O, "MetadataValue", &[SAMPLE[0], SAMPLE[1], "MetadataValue"])
        .route(
            O,
            "MetadataField",
            &[SAMPLE[0], SAMPLE[1], "MetadataValue", "MetadataField"],
        )
        .route(
            O,
            "HarmonisedMetadataField",
            &[
                SAMPLE[0],
                SAMPLE[1],
                "MetadataValue",
                "MetadataField",
                "HarmonisedMetadataField",
            ],
        )
        .route(O, "FeatureMetadata", &["FeatureMetadata"])
        .route(O, "Annotation", &["FeatureMetadata", "Annotation"])
        .route(O, "HarmonisedAnnotation", &HA)
        .route(
            O,
            "AnnotationCompound",
            &[HA[0], HA[1], HA[2], "AnnotationCompound"],
        )
        .route(
            O,
            "AnnotationMethod",
            &[HA[0], HA[1], HA[2], "AnnotationMethod"],
        )
        .route(
            O,
            "Compound",
            &[HA[0], HA[1], HA[2], "AnnotationCompound", "Compound"],
        )
        .route(
            O,
            "CompoundExternalDB",
            &[
                HA[0],
                HA[1],
                HA[2],
                "AnnotationCompound",
                "Compound",
                "CompoundExternalDB",
            ],
        )
        .route(
            O,
            "ExternalDB",
            &[
                HA[0],
                HA[1],
                HA[2],
                "AnnotationCompound",
                "Compound",
                "CompoundExternalDB",
                "ExternalDB",
            ],
        )
}

fn sample_assay_routes(b: Builder) -> Builder {
    const O: &str = "SampleAssay";
    const HA: [&str; 4] = [
        "AnnotatedFeature",
        "FeatureMetadata",
        "Annotation",
        "HarmonisedAnnotation",
    ];

    b.route(O, "Sample", &["Sample"])
        .route(O, "Assay", &["Assay"])
        .route(O, "Subject", &["Sample", "Subject"])
        .route(O, "Project", &["Sample", "Subject", "Project"])
        .route(
            O,
            "ProjectRole",
            &["Sample", "Subject", "Project", "ProjectRole"],
        )
        .route(O, "MetadataValue", &["Sample", "MetadataValue"])
        .route(
            O,
            "MetadataField",
            &["Sample", "MetadataValue", "MetadataField"],
        )
        .route(
            O,
            "HarmonisedMetadataField",
            &[
                "Sample",
                "MetadataValue",
                "MetadataField",
                "HarmonisedMetadataField",
            ],
        )
        .route(O, "AnnotatedFeature", &["AnnotatedFeature"])
        .route(O, "FeatureMetadata", &["AnnotatedFeature", "FeatureMetadata"])
        .route(
            O,
            "Annotation",
            &["AnnotatedFeature", "FeatureMetadata", "Annotation"],
        )
        .route(O, "HarmonisedAnnotation", &HA)
        .route(
            O,
            "AnnotationCompound",
            &[HA[0], HA[1], HA[2], HA[3], "AnnotationCompound"],
        )
        .route(
            O,
            "AnnotationMethod",
            &[HA[0], HA[1], HA[2], HA[3], "AnnotationMethod"],
        )
        .route(
            O,
            "Compound",
            &[HA[0], HA[1], HA[2], HA[3], "AnnotationCompound", "Compound"],
        )
        .route(
            O,
            "CompoundExternalDB",
            &[
                HA[0],
                HA[1],
                HA[2],
                HA[3],
                "AnnotationCompound",
                "Compound",
                "CompoundExternalDB",
            ],
        )
        .route(
            O,
            "ExternalDB",
            &[
                HA[0],
                HA[1],
                HA[2],
                HA[3],
                "AnnotationCompound",
                "Compound",
                "CompoundExternalDB",
                "ExternalDB",
            ],
        )
}

fn harmonised_annotation_routes(b: Builder) -> Builder {
    const O: &str = "HarmonisedAnnotation";
    const SA: [&str; 4] = [
        "Annotation",
        "FeatureMetadata",
        "AnnotatedFeature",
        "SampleAssay",
    ];
    const S: [&str; 5] = [SA[0], SA[1], SA[2], SA[3], "Sample"];

    b.route(O, "SampleAssay", &SA)
        .route(O, "Sample", &S)
        .route(O, "Assay", &["Assay"])
        .route(O, "Subject", &[S[0], S[1], S[2], S[3], S[4], "Subject"])
        .route(
            O,
            "Project",
            &[S[0], S[1], S[2], S[3], S[4], "Subject", "Project"],
        )
        .route(
            O,
            "ProjectRole",
            &[S[0], S[1], S[2], S[3], S[4], "Subject", "Project", "ProjectRole"],
        )
        .route(
            O,
            "MetadataValue",
            &[S[0], S[1], S[2], S[3], S[4], "MetadataValue"],
        )
        .route(
            O,
            "MetadataField",
            &[S[0], S[1], S[2], S[3], S[4], "MetadataValue", "MetadataField"],
        )
        .route(
            O,
            "HarmonisedMetadataField",
            &[
                S[0],
                S[1],
                S[2],
                S[3],
                S[4],
                "MetadataValue",
                "MetadataField",
                "HarmonisedMetadataField",
            ],
        )
        .route(
            O,
            "AnnotatedFeature",
            &["Annotation", "FeatureMetadata", "AnnotatedFeature"],
        )
        .route(O, "FeatureMetadata", &["Annotation", "FeatureMetadata"])
        .route(O, "Annotation", &["Annotation"])
        .route(O, "AnnotationCompound", &["AnnotationCompound"])
        .route(O, "AnnotationMethod", &["AnnotationMethod"])
        .route(O, "Compound", &["AnnotationCompound", "Compound"])
        .route(
            O,
            "CompoundExternalDB",
            &["AnnotationCompound", "Compound", "CompoundExternalDB"],
        )
        .route(
            O,
            "ExternalDB",
            &[
                "AnnotationCompound",
                "Compound",
                "CompoundExternalDB",
                "ExternalDB",
            ],
        )
}
