//! Query specification and compilation.
//!
//! A [`QuerySpec`] (filters → sub-filters → matches) is compiled against an
//! [`EntityGraph`](crate::schema::EntityGraph) into a [`CompiledQuery`]:
//! the join list is recomputed from the match models, each join gets its
//! relation, and the filters become a predicate tree. Renderers turn the
//! tree into the ORM-style debug string or SQL.

pub mod ast;
pub mod compiler;
mod render;
pub mod spec;

pub use ast::{Comparison, CompiledQuery, JoinNode, Predicate};
pub use compiler::{CompileError, CompileOptions, CompileResult, QueryCompiler};
pub use spec::{
    metadata_filter, project_role_filter, BoolOp, Filter, Match, MatchValue, Operator, QuerySpec,
    Scalar, SpecError, SpecResult, SubFilter,
};

use crate::cache::spec_fingerprint;

impl CompiledQuery {
    /// Stable fingerprint of the canonical specification.
    ///
    /// Two specs that differ only in their authored joins share a fingerprint.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let canonical = serde_json::to_vec(&self.spec)?;
        Ok(spec_fingerprint(&canonical))
    }
}
