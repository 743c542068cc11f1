//! Cache key derivation for materialised dataframes.
//!
//! A key is `[TEST::]{type}::{model}` followed by `:`-separated qualifier
//! segments in a fixed order. Each qualifier is tagged (`v=1_2`, `sl=sample_id`)
//! so two parameters can never stand in for each other, and unset qualifiers
//! contribute nothing. Values are percent-escaped for `%`, `:` and `/`, which
//! keeps them inside their segment and usable as file names.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("Dataframe type not recognised: {0}")]
    UnknownDataFrameType(String),
}

/// The kinds of dataframe that can be materialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataFrameType {
    Combined,
    IntensityData,
    SampleMetadata,
    FeatureMetadata,
    FeatureIdMatrix,
    FeatureIdCombinedDataframe,
    MetaboanalystData,
    MetaboanalystMetadata,
}

impl DataFrameType {
    pub const ALL: [DataFrameType; 8] = [
        DataFrameType::Combined,
        DataFrameType::IntensityData,
        DataFrameType::SampleMetadata,
        DataFrameType::FeatureMetadata,
        DataFrameType::FeatureIdMatrix,
        DataFrameType::FeatureIdCombinedDataframe,
        DataFrameType::MetaboanalystData,
        DataFrameType::MetaboanalystMetadata,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataFrameType::Combined => "combined",
            DataFrameType::IntensityData => "intensity_data",
            DataFrameType::SampleMetadata => "sample_metadata",
            DataFrameType::FeatureMetadata => "feature_metadata",
            DataFrameType::FeatureIdMatrix => "feature_id_matrix",
            DataFrameType::FeatureIdCombinedDataframe => "feature_id_combined_dataframe",
            DataFrameType::MetaboanalystData => "metaboanalyst_data",
            DataFrameType::MetaboanalystMetadata => "metaboanalyst_metadata",
        }
    }
}

impl fmt::Display for DataFrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataFrameType {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| KeyError::UnknownDataFrameType(s.to_string()))
    }
}

/// One optional qualifier, for building a key from an unordered parameter list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyParam {
    ClassType(String),
    ClassLevel(String),
    AggregateFunction(String),
    AnnotationVersion(String),
    CorrectionType(String),
    HarmoniseAnnotations(bool),
    FeatureLabel(String),
    SampleLabel(String),
    ConvertUnits(bool),
    MasterUnit(String),
    TestNamespace(bool),
}

/// Semantic parameters of a dataframe; [`build`](Self::build) renders the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrameKey {
    pub df_type: DataFrameType,
    pub model: String,
    pub class_type: Option<String>,
    pub class_level: Option<String>,
    pub aggregate_function: Option<String>,
    pub annotation_version: Option<String>,
    pub correction_type: Option<String>,
    pub harmonise_annotations: bool,
    pub feature_label: Option<String>,
    pub sample_label: Option<String>,
    pub convert_units: bool,
    pub master_unit: Option<String>,
    pub test_namespace: bool,
}

impl DataFrameKey {
    pub fn new(df_type: DataFrameType, model: impl Into<String>) -> Self {
        Self {
            df_type,
            model: model.into(),
            class_type: None,
            class_level: None,
            aggregate_function: None,
            annotation_version: None,
            correction_type: None,
            harmonise_annotations: false,
            feature_label: None,
            sample_label: None,
            convert_units: true,
            master_unit: None,
            test_namespace: false,
        }
    }

    /// Build from a type name, a model and qualifiers in any order.
    ///
    /// Later params of the same kind override earlier ones.
    pub fn from_params(
        df_type: &str,
        model: impl Into<String>,
        params: impl IntoIterator<Item = KeyParam>,
    ) -> Result<Self, KeyError> {
        let mut key = Self::new(df_type.parse()?, model);
        for param in params {
            key = key.with(param);
        }
        Ok(key)
    }

    pub fn with(mut self, param: KeyParam) -> Self {
        match param {
            KeyParam::ClassType(v) => self.class_type = Some(v),
            KeyParam::ClassLevel(v) => self.class_level = Some(v),
            KeyParam::AggregateFunction(v) => self.aggregate_function = Some(v),
            KeyParam::AnnotationVersion(v) => self.annotation_version = Some(v),
            KeyParam::CorrectionType(v) => self.correction_type = Some(v),
            KeyParam::HarmoniseAnnotations(v) => self.harmonise_annotations = v,
            KeyParam::FeatureLabel(v) => self.feature_label = Some(v),
            KeyParam::SampleLabel(v) => self.sample_label = Some(v),
            KeyParam::ConvertUnits(v) => self.convert_units = v,
            KeyParam::MasterUnit(v) => self.master_unit = Some(v),
            KeyParam::TestNamespace(v) => self.test_namespace = v,
        }
        self
    }

    pub fn class_type(self, v: impl Into<String>) -> Self {
        self.with(KeyParam::ClassType(v.into()))
    }

    pub fn class_level(self, v: impl Into<String>) -> Self {
        self.with(KeyParam::ClassLevel(v.into()))
    }

    pub fn aggregate_function(self, v: impl Into<String>) -> Self {
        self.with(KeyParam::AggregateFunction(v.into()))
    }

    pub fn annotation_version(self, v: impl Into<String>) -> Self {
        self.with(KeyParam::AnnotationVersion(v.into()))
    }

    pub fn correction_type(self, v: impl Into<String>) -> Self {
        self.with(KeyParam::CorrectionType(v.into()))
    }

    pub fn harmonise_annotations(self, v: bool) -> Self {
        self.with(KeyParam::HarmoniseAnnotations(v))
    }

    pub fn feature_label(self, v: impl Into<String>) -> Self {
        self.with(KeyParam::FeatureLabel(v.into()))
    }

    pub fn sample_label(self, v: impl Into<String>) -> Self {
        self.with(KeyParam::SampleLabel(v.into()))
    }

    pub fn convert_units(self, v: bool) -> Self {
        self.with(KeyParam::ConvertUnits(v))
    }

    pub fn master_unit(self, v: impl Into<String>) -> Self {
        self.with(KeyParam::MasterUnit(v.into()))
    }

    pub fn test_namespace(self, v: bool) -> Self {
        self.with(KeyParam::TestNamespace(v))
    }

    /// Render the key.
    pub fn build(&self) -> String {
        let mut key = String::new();
        if self.test_namespace {
            key.push_str("TEST::");
        }
        key.push_str(self.df_type.as_str());
        key.push_str("::");
        key.push_str(&escape(&self.model));

        let mut segments = Vec::new();
        if self.model == "CompoundClass" {
            if let Some(class_type) = non_empty(&self.class_type) {
                segments.push(tagged("ct", class_type));
            }
            if let Some(level) = non_empty(&self.class_level) {
                segments.push(tagged("cl", &level.replace(' ', "_").to_lowercase()));
            }
            if let Some(function) = non_empty(&self.aggregate_function) {
                segments.push(tagged("agg", function));
            }
        }

        if let Some(version) = non_empty(&self.annotation_version) {
            segments.push(tagged("v", &version.replace([' ', '.'], "_").to_lowercase()));
        }
        if let Some(correction) = non_empty(&self.correction_type) {
            segments.push(tagged("c", correction));
        }
        if self.harmonise_annotations {
            segments.push("HA".to_string());
        }
        if self.df_type == DataFrameType::MetaboanalystData {
            if let Some(label) = non_empty(&self.feature_label) {
                segments.push(tagged("fl", label));
            }
        }
        if matches!(
            self.df_type,
            DataFrameType::MetaboanalystData | DataFrameType::MetaboanalystMetadata
        ) {
            if let Some(label) = non_empty(&self.sample_label) {
                segments.push(tagged("sl", label));
            }
        }
        if self.convert_units {
            if let Some(unit) = non_empty(&self.master_unit) {
                segments.push(tagged("u", unit));
            }
        }

        for segment in segments {
            key.push(':');
            key.push_str(&segment);
        }
        key
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn tagged(tag: &str, value: &str) -> String {
    format!("{}={}", tag, escape(value))
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            '/' => out.push_str("%2F"),
            _ => out.push(c),
        }
    }
    out
}

impl fmt::Display for DataFrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build())
    }
}
