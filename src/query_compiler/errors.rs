use thiserror::Error;

use crate::mapping_catalog::errors::MappingError;
use crate::relational_plan::PlanError;

/// Message shown when a collection filter appears inside a projected column
pub const POST_FILTER_MESSAGE: &str =
    "Filter in column projections is not supported. Use a Post Filter if filtering is necessary";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("{}", POST_FILTER_MESSAGE)]
    PostFilterRequired,

    #[error("Unsupported construct: {0}")]
    UnsupportedConstruct(String),

    #[error("Join path collision on alias `{alias}`: already bound to {existing}, claimed by {claimed}")]
    JoinPathCollision {
        alias: String,
        existing: String,
        claimed: String,
    },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Unknown function `{name}`")]
    UnknownFunction { name: String },

    #[error("Type dispatch error: {0}")]
    TypeDispatch(String),

    #[error("Invalid compiler configuration: {0}")]
    InvalidConfig(String),
}

impl CompileError {
    pub fn unsupported(message: impl Into<String>) -> Self {
        CompileError::UnsupportedConstruct(message.into())
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        CompileError::InvalidQuery(message.into())
    }

    /// Create an InvalidQuery error naming the property being resolved
    pub fn invalid_step_with_context(
        message: impl Into<String>,
        class: &str,
        property: &str,
    ) -> Self {
        CompileError::InvalidQuery(format!(
            "{}\n  Context: while resolving `{}.{}`",
            message.into(),
            class,
            property
        ))
    }
}
