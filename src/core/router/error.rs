//! Router error types

/// Failures of the pre-dispatch selection layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// Filtering left no candidate standing
    #[error("no available model satisfies the request constraints")]
    NoAvailableModel,

    /// No prefix rule matched the model id
    #[error("no route found for model id '{0}'")]
    NotFound(String),

    /// A/B configuration violated an invariant
    #[error("invalid A/B configuration: {0}")]
    InvalidAbConfig(String),
}
