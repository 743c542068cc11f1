//! Errors raised while building or querying the entity graph.

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Entity {entity} has no attribute '{attribute}'")]
    UnknownAttribute { entity: String, attribute: String },

    #[error("Model graph incomplete: no join route from {output} to {target}")]
    MissingRoute { output: String, target: String },

    #[error("{0} is not an output model")]
    UnknownOutputModel(String),

    #[error("Duplicate entity name: {0}")]
    DuplicateEntity(String),

    #[error("No relation path between {from} and {to}")]
    NoPath { from: String, to: String },
}
