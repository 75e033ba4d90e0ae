//! Error types shared by the flow scheduler and the future runtime.

use std::sync::Arc;

use thiserror::Error;

/// Result alias used throughout the runtime.
pub type FlowResult<T> = Result<T, FlowError>;

/// Errors produced by task flows, futures and continuations.
///
/// The type is cheap to clone so a single failure can be handed to every
/// dependent, observer and waiter that needs to see it.
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// Malformed declaration, duplicate name or mutation after start.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Cycle or unreachable task detected while leveling the graph.
    #[error("Graph error: {0}")]
    Graph(String),

    /// Work was short-circuited before its evaluator ran.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Opaque failure reported by an evaluator.
    #[error("Evaluation error: {0}")]
    Evaluation(Arc<anyhow::Error>),
}

impl FlowError {
    /// Build a validation error.
    #[inline]
    pub fn validation(message: impl Into<String>) -> Self {
        FlowError::Validation(message.into())
    }

    /// Build a graph error.
    #[inline]
    pub fn graph(message: impl Into<String>) -> Self {
        FlowError::Graph(message.into())
    }

    /// Build a cancellation error.
    #[inline]
    pub fn cancelled(message: impl Into<String>) -> Self {
        FlowError::Cancelled(message.into())
    }

    /// Build an evaluation error from any displayable message.
    pub fn evaluation(message: impl std::fmt::Display) -> Self {
        FlowError::Evaluation(Arc::new(anyhow::anyhow!("{}", message)))
    }

    /// Whether this error was synthesized by cancellation rather than raised
    /// by an evaluator.
    #[inline]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, FlowError::Cancelled(_))
    }
}

impl From<anyhow::Error> for FlowError {
    fn from(error: anyhow::Error) -> Self {
        FlowError::Evaluation(Arc::new(error))
    }
}
