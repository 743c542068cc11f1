//! The compiled query tree.
//!
//! The compiler produces a [`CompiledQuery`]; renderers in `render` walk it
//! to build either the ORM-style debug string or SQL.

use serde::Serialize;

use crate::schema::Relation;

use super::spec::{BoolOp, MatchValue, Operator, QuerySpec};

/// One join in the compiled plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinNode {
    pub model: String,
    pub table: String,
    pub relation: Relation,
    pub lhs_table: String,
    pub rhs_table: String,
    /// The relation was found by searching rather than by the declared
    /// output/predecessor lookup.
    pub inferred: bool,
}

/// A single comparison against one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub model: String,
    pub table: String,
    pub property: String,
    pub operator: Operator,
    pub value: MatchValue,
}

/// Boolean predicate tree.
///
/// Groups always hold two or more children; a single child is stored bare.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Predicate {
    Group { op: BoolOp, children: Vec<Predicate> },
    Compare(Comparison),
}

impl Predicate {
    /// Wrap `children` in `op`, or return the only child unwrapped.
    pub fn group(op: BoolOp, mut children: Vec<Predicate>) -> Predicate {
        if children.len() == 1 {
            children.remove(0)
        } else {
            Predicate::Group { op, children }
        }
    }

    /// Number of nested group levels.
    pub fn depth(&self) -> usize {
        match self {
            Predicate::Compare(_) => 0,
            Predicate::Group { children, .. } => {
                1 + children.iter().map(Predicate::depth).max().unwrap_or(0)
            }
        }
    }
}

/// A query specification resolved against the entity graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    /// The requested output model.
    pub output: String,
    /// The model the query is compiled against (the output's parent).
    pub base: String,
    pub base_table: String,
    pub joins: Vec<JoinNode>,
    /// One predicate per filter, combined with AND.
    pub filters: Vec<Predicate>,
    /// The input spec with its joins recomputed.
    pub spec: QuerySpec,
}

impl CompiledQuery {
    pub fn join_models(&self) -> Vec<&str> {
        self.joins.iter().map(|j| j.model.as_str()).collect()
    }

    pub fn inferred_joins(&self) -> impl Iterator<Item = &JoinNode> {
        self.joins.iter().filter(|j| j.inferred)
    }
}
