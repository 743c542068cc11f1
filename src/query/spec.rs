//! The filter model and its JSON interchange form.
//!
//! ```json
//! { "model": "SampleAssay",
//!   "joins": [],
//!   "filters": [ { "filter_operator": "AND",
//!                  "sub_filters": [ { "sub_filter_operator": "AND",
//!                                     "matches": [ { "model": "Project",
//!                                                    "property": "name",
//!                                                    "operator": "eq",
//!                                                    "value": "PipelineTesting" } ] } ] } ] }
//! ```
//!
//! `joins` is carried for compatibility only. The compiler always recomputes it.

use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Result type for specification checks.
pub type SpecResult<T> = Result<T, SpecError>;

#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("Unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("Unknown boolean operator '{0}', expected AND or OR")]
    UnknownBoolOp(String),

    #[error("Match {model}.{property} {operator}: expected {expected}")]
    ValueMismatch {
        model: String,
        property: String,
        operator: Operator,
        expected: &'static str,
    },

    #[error("Required field '{field}' is empty")]
    EmptyField { field: String },

    #[error("{path} has no children")]
    EmptyGroup { path: String },

    #[error("Invalid query specification JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Boolean combinator of a filter or sub-filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BoolOp {
    #[default]
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

impl BoolOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoolOp::And => "AND",
            BoolOp::Or => "OR",
        }
    }
}

impl FromStr for BoolOp {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AND" => Ok(BoolOp::And),
            "OR" => Ok(BoolOp::Or),
            _ => Err(SpecError::UnknownBoolOp(s.into())),
        }
    }
}

impl std::fmt::Display for BoolOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Match operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    Lt,
    Gte,
    Lte,
    Between,
    NotBetween,
    Like,
    NotLike,
    Ilike,
    NotIlike,
    In,
    NotIn,
}

impl Operator {
    pub const ALL: [Operator; 14] = [
        Operator::Eq,
        Operator::NotEq,
        Operator::Gt,
        Operator::Lt,
        Operator::Gte,
        Operator::Lte,
        Operator::Between,
        Operator::NotBetween,
        Operator::Like,
        Operator::NotLike,
        Operator::Ilike,
        Operator::NotIlike,
        Operator::In,
        Operator::NotIn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::NotEq => "not_eq",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Gte => "gte",
            Operator::Lte => "lte",
            Operator::Between => "between",
            Operator::NotBetween => "not_between",
            Operator::Like => "like",
            Operator::NotLike => "not_like",
            Operator::Ilike => "ilike",
            Operator::NotIlike => "not_ilike",
            Operator::In => "in",
            Operator::NotIn => "not_in",
        }
    }

    /// Comparison operators render as infix expressions, the rest as method calls.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Eq
                | Operator::NotEq
                | Operator::Gt
                | Operator::Lt
                | Operator::Gte
                | Operator::Lte
        )
    }

    /// Function operators whose name starts with `not_`.
    pub fn is_negated(&self) -> bool {
        matches!(
            self,
            Operator::NotBetween | Operator::NotLike | Operator::NotIlike | Operator::NotIn
        )
    }

    pub fn is_pattern(&self) -> bool {
        matches!(
            self,
            Operator::Like | Operator::NotLike | Operator::Ilike | Operator::NotIlike
        )
    }

    pub fn is_range(&self) -> bool {
        matches!(self, Operator::Between | Operator::NotBetween)
    }

    pub fn is_membership(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }

    /// Whether the operator needs an ordered attribute.
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte
        ) || self.is_range()
    }
}

impl FromStr for Operator {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| SpecError::UnknownOperator(s.into()))
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A single literal in a match value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn is_finite(&self) -> bool {
        match self {
            Scalar::Float(f) => f.is_finite(),
            _ => true,
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.into())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Int(n)
    }
}

impl From<i32> for Scalar {
    fn from(n: i32) -> Self {
        Scalar::Int(n.into())
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Scalar::Float(f)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

/// The right-hand side of a match: one scalar, or a list for the
/// `in` and `between` families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchValue {
    List(Vec<Scalar>),
    Scalar(Scalar),
}

macro_rules! match_value_from_scalar {
    ($($t:ty),*) => {
        $(
            impl From<$t> for MatchValue {
                fn from(value: $t) -> Self {
                    MatchValue::Scalar(value.into())
                }
            }
        )*
    };
}

match_value_from_scalar!(&str, String, i64, i32, f64, bool, Scalar);

impl<T: Into<Scalar>> From<Vec<T>> for MatchValue {
    fn from(values: Vec<T>) -> Self {
        MatchValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Atomic predicate on one model property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub model: String,
    pub property: String,
    pub operator: Operator,
    pub value: MatchValue,
}

impl Match {
    pub fn new(
        model: impl Into<String>,
        property: impl Into<String>,
        operator: Operator,
        value: impl Into<MatchValue>,
    ) -> Self {
        Self {
            model: model.into(),
            property: property.into(),
            operator,
            value: value.into(),
        }
    }

    /// Check that the value shape fits the operator.
    pub fn validate(&self) -> SpecResult<()> {
        if self.model.is_empty() {
            return Err(SpecError::EmptyField {
                field: "model".into(),
            });
        }
        if self.property.is_empty() {
            return Err(SpecError::EmptyField {
                field: format!("{}.property", self.model),
            });
        }

        let mismatch = |expected| SpecError::ValueMismatch {
            model: self.model.clone(),
            property: self.property.clone(),
            operator: self.operator,
            expected,
        };

        match (&self.value, self.operator) {
            (MatchValue::List(items), op) if op.is_membership() => {
                if items.is_empty() {
                    return Err(mismatch("a non-empty list"));
                }
                if !items.iter().all(Scalar::is_finite) {
                    return Err(mismatch("finite numbers"));
                }
            }
            (MatchValue::List(items), op) if op.is_range() => {
                if items.len() != 2 {
                    return Err(mismatch("a list of exactly two values"));
                }
                if !items.iter().all(Scalar::is_finite) {
                    return Err(mismatch("finite numbers"));
                }
            }
            (MatchValue::Scalar(_), op) if op.is_membership() => {
                return Err(mismatch("a non-empty list"));
            }
            (MatchValue::Scalar(_), op) if op.is_range() => {
                return Err(mismatch("a list of exactly two values"));
            }
            (MatchValue::Scalar(Scalar::Text(_)), op) if op.is_pattern() => {}
            (_, op) if op.is_pattern() => return Err(mismatch("a string pattern")),
            (MatchValue::List(_), _) => return Err(mismatch("a single value")),
            (MatchValue::Scalar(s), _) => {
                if !s.is_finite() {
                    return Err(mismatch("a finite number"));
                }
            }
        }
        Ok(())
    }
}

/// A boolean group of matches.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubFilter {
    pub sub_filter_operator: BoolOp,
    pub matches: Vec<Match>,
}

impl SubFilter {
    pub fn new(operator: BoolOp) -> Self {
        Self {
            sub_filter_operator: operator,
            matches: Vec::new(),
        }
    }

    pub fn add_match(mut self, m: Match) -> Self {
        self.matches.push(m);
        self
    }
}

/// A top-level boolean group of sub-filters.
///
/// Successive filters are always combined with AND, whatever their own operator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Filter {
    pub filter_operator: BoolOp,
    pub sub_filters: Vec<SubFilter>,
}

impl Filter {
    pub fn new(operator: BoolOp) -> Self {
        Self {
            filter_operator: operator,
            sub_filters: Vec::new(),
        }
    }

    /// A filter holding exactly one match.
    pub fn single(m: Match) -> Self {
        Filter::new(BoolOp::And).add_sub_filter(SubFilter::new(BoolOp::And).add_match(m))
    }

    pub fn add_sub_filter(mut self, sub_filter: SubFilter) -> Self {
        self.sub_filters.push(sub_filter);
        self
    }
}

/// Harmonised metadata filter: the field name and a comparison on its numeric value.
pub fn metadata_filter(
    field_name: &str,
    operator: Operator,
    value: impl Into<MatchValue>,
) -> SubFilter {
    SubFilter::new(BoolOp::And)
        .add_match(Match::new(
            "HarmonisedMetadataField",
            "name",
            Operator::Eq,
            field_name,
        ))
        .add_match(Match::new(
            "MetadataValue",
            "harmonised_numeric_value",
            operator,
            value,
        ))
}

/// Restrict results to projects visible to `role_id`.
pub fn project_role_filter(role_id: i64) -> Filter {
    Filter::single(Match::new("ProjectRole", "role_id", Operator::Eq, role_id))
}

/// A complete query specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub model: String,
    #[serde(default)]
    pub joins: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
}

impl QuerySpec {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            joins: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn add_filter(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    pub fn from_json(json: &str) -> SpecResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> SpecResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> SpecResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Distinct models referenced by matches, in first-seen order.
    pub fn match_models(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.matches()
            .map(|m| m.model.as_str())
            .filter(|model| seen.insert(*model))
            .collect()
    }

    pub fn matches(&self) -> impl Iterator<Item = &Match> {
        self.filters
            .iter()
            .flat_map(|f| f.sub_filters.iter())
            .flat_map(|sf| sf.matches.iter())
    }

    /// Structural checks. An empty filter list is valid.
    pub fn validate(&self) -> SpecResult<()> {
        if self.model.is_empty() {
            return Err(SpecError::EmptyField {
                field: "model".into(),
            });
        }
        for (i, filter) in self.filters.iter().enumerate() {
            if filter.sub_filters.is_empty() {
                return Err(SpecError::EmptyGroup {
                    path: format!("filters[{}]", i),
                });
            }
            for (j, sub_filter) in filter.sub_filters.iter().enumerate() {
                if sub_filter.matches.is_empty() {
                    return Err(SpecError::EmptyGroup {
                        path: format!("filters[{}].sub_filters[{}]", i, j),
                    });
                }
                for m in &sub_filter.matches {
                    m.validate()?;
                }
            }
        }
        Ok(())
    }
}
