use thiserror::Error;

use crate::ast::NodeKind;

/// Failures surfaced by translation, provider resolution and dispatch.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A rewrite or formatting pass met a node shape it cannot translate.
    #[error("unsupported construct {kind}: {detail}")]
    UnsupportedConstruct { kind: NodeKind, detail: String },

    #[error("could not resolve a query provider: {0}")]
    ProviderResolution(String),

    /// The provider failed to compile the query; carried unchanged.
    #[error(transparent)]
    BackendCompile(anyhow::Error),

    /// The compiled callable failed; carried unchanged.
    #[error(transparent)]
    Dispatch(anyhow::Error),

    #[error("query expects {expected} argument(s), got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl QueryError {
    pub fn unsupported(kind: NodeKind, detail: impl Into<String>) -> Self {
        QueryError::UnsupportedConstruct {
            kind,
            detail: detail.into(),
        }
    }
}

/// Failures while evaluating a scalar expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("unbound parameter '{0}'")]
    UnboundParameter(String),

    #[error("unknown column {alias}.{name}")]
    UnknownColumn { alias: String, name: String },

    #[error("record has no member '{0}'")]
    MissingMember(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("type mismatch in {op}: {detail}")]
    TypeMismatch { op: String, detail: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in {0}")]
    Overflow(String),

    #[error("{0} is not a scalar expression")]
    NotScalar(NodeKind),
}

pub type Result<T> = std::result::Result<T, QueryError>;
