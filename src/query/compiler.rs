//! Query compilation: join resolution and predicate tree construction.

use tracing::{debug, warn};

use crate::schema::{AttributeKind, EntityGraph, Relation, SchemaError};

use super::ast::{Comparison, CompiledQuery, JoinNode, Predicate};
use super::spec::{Filter, Match, Operator, QuerySpec, SpecError, SubFilter};

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error("Cannot join {model}: several relations connect it to the query ({candidates})")]
    AmbiguousJoin { model: String, candidates: String },

    #[error("Cannot join {model}: no declared relation to the output model or previous join")]
    UndeclaredJoin { model: String },

    #[error("Match {model}.{property}: operator {operator} does not apply to {kind} attributes")]
    IncompatibleAttribute {
        model: String,
        property: String,
        operator: Operator,
        kind: AttributeKind,
    },
}

/// Compiler switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// Reject joins that would need an inferred relation.
    pub require_declared_joins: bool,
}

/// Compiles query specifications against one entity graph.
pub struct QueryCompiler<'g> {
    graph: &'g EntityGraph,
    options: CompileOptions,
}

impl<'g> QueryCompiler<'g> {
    pub fn new(graph: &'g EntityGraph) -> Self {
        Self {
            graph,
            options: CompileOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn graph(&self) -> &'g EntityGraph {
        self.graph
    }

    /// Compile `spec`.
    ///
    /// Joins in the input are ignored and recomputed from the match models.
    pub fn compile(&self, spec: &QuerySpec) -> CompileResult<CompiledQuery> {
        spec.validate()?;

        if !self.graph.is_output_model(&spec.model) {
            return Err(SchemaError::UnknownOutputModel(spec.model.clone()).into());
        }
        let base = self.graph.parent_model(&spec.model).to_string();
        let base_table = self.graph.entity(&base)?.table.clone();

        let join_models = self.graph.resolve_joins(&base, &spec.match_models())?;
        let joins = self.compile_joins(&base, &join_models)?;

        let filters = spec
            .filters
            .iter()
            .map(|f| self.compile_filter(f))
            .collect::<CompileResult<Vec<_>>>()?;

        let mut canonical = spec.clone();
        canonical.joins = join_models;

        debug!(
            output = %spec.model,
            base = %base,
            joins = ?canonical.joins,
            filters = filters.len(),
            "Compiled query"
        );

        Ok(CompiledQuery {
            output: spec.model.clone(),
            base,
            base_table,
            joins,
            filters,
            spec: canonical,
        })
    }

    fn compile_joins(&self, base: &str, models: &[String]) -> CompileResult<Vec<JoinNode>> {
        let mut nodes = Vec::with_capacity(models.len());

        for (i, model) in models.iter().enumerate() {
            let previous = if i == 0 { None } else { Some(models[i - 1].as_str()) };

            let declared = self
                .graph
                .relation(base, model)
                .or_else(|| previous.and_then(|p| self.graph.relation(model, p)));

            let (relation, inferred) = match declared {
                Some(r) => (r.clone(), false),
                None => {
                    let joined: Vec<&str> = std::iter::once(base)
                        .chain(models[..i].iter().map(String::as_str))
                        .collect();
                    (self.infer_relation(model, &joined)?, true)
                }
            };

            nodes.push(JoinNode {
                model: model.clone(),
                table: self.graph.entity(model)?.table.clone(),
                lhs_table: self.graph.entity(&relation.lhs.entity)?.table.clone(),
                rhs_table: self.graph.entity(&relation.rhs.entity)?.table.clone(),
                relation,
                inferred,
            });
        }

        Ok(nodes)
    }

    /// Find the single relation between `model` and anything already joined.
    fn infer_relation(&self, model: &str, joined: &[&str]) -> CompileResult<Relation> {
        if self.options.require_declared_joins {
            return Err(CompileError::UndeclaredJoin {
                model: model.into(),
            });
        }

        let candidates: Vec<&Relation> = joined
            .iter()
            .filter_map(|j| self.graph.relation(model, j))
            .collect();

        match candidates.as_slice() {
            [] => Err(CompileError::UndeclaredJoin {
                model: model.into(),
            }),
            [only] => {
                warn!(
                    model,
                    relation = %only,
                    "No declared relation to the output model or previous join, inferring"
                );
                Ok((*only).clone())
            }
            many => Err(CompileError::AmbiguousJoin {
                model: model.into(),
                candidates: many
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    fn compile_filter(&self, filter: &Filter) -> CompileResult<Predicate> {
        let children = filter
            .sub_filters
            .iter()
            .map(|sf| self.compile_sub_filter(sf))
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(Predicate::group(filter.filter_operator, children))
    }

    fn compile_sub_filter(&self, sub_filter: &SubFilter) -> CompileResult<Predicate> {
        let children = sub_filter
            .matches
            .iter()
            .map(|m| self.compile_match(m).map(Predicate::Compare))
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(Predicate::group(sub_filter.sub_filter_operator, children))
    }

    fn compile_match(&self, m: &Match) -> CompileResult<Comparison> {
        let entity = self.graph.entity(&m.model)?;

        if let Some(kind) = self.graph.attribute_kind(&m.model, &m.property)? {
            let incompatible = (m.operator.is_pattern() && kind != AttributeKind::String)
                || (m.operator.is_ordering() && !kind.is_orderable());
            if incompatible {
                return Err(CompileError::IncompatibleAttribute {
                    model: m.model.clone(),
                    property: m.property.clone(),
                    operator: m.operator,
                    kind,
                });
            }
        }

        Ok(Comparison {
            model: m.model.clone(),
            table: entity.table.clone(),
            property: m.property.clone(),
            operator: m.operator,
            value: m.value.clone(),
        })
    }
}
