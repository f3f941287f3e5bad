//! Error taxonomy shared by the store, the retrieval planner, and the
//! provider boundary.

use std::fmt::Display;

use thiserror::Error;

/// Cause prefix of a [`RecallError::ProviderUnavailable`] raised because the
/// local request deadline elapsed.
pub const TIMEOUT_CAUSE_PREFIX: &str = "provider request timed out";

/// Typed failure returned by every core operation.
///
/// | Variant | Code | Recoverable |
/// |---------|------|-------------|
/// | [`Validation`](RecallError::Validation) | `validation` | yes |
/// | [`DimensionMismatch`](RecallError::DimensionMismatch) | `dimension_mismatch` | no |
/// | [`ProviderUnavailable`](RecallError::ProviderUnavailable) | `provider_unavailable` | yes |
/// | [`ProviderRejected`](RecallError::ProviderRejected) | `provider_rejected` | yes |
/// | [`EmptyResult`](RecallError::EmptyResult) | `empty_result` | yes |
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecallError {
    /// Missing or malformed item / query input. Raised before the store is touched.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A vector's length differs from the store's fixed dimensionality.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// The embedding or completion provider could not be reached, timed
    /// out, or is temporarily failing (429 / 5xx).
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider refused the request (bad request, unknown model,
    /// unsupported capability, unparseable response).
    #[error("provider rejected request: {0}")]
    ProviderRejected(String),

    /// No stored item matched. Callers present this as "no matches".
    #[error("no matching items")]
    EmptyResult,
}

impl RecallError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            RecallError::Validation(_) => "validation",
            RecallError::DimensionMismatch { .. } => "dimension_mismatch",
            RecallError::ProviderUnavailable(_) => "provider_unavailable",
            RecallError::ProviderRejected(_) => "provider_rejected",
            RecallError::EmptyResult => "empty_result",
        }
    }

    /// Whether the caller can reasonably retry or rephrase.
    ///
    /// Only a dimension mismatch is fatal to the operation: it signals a
    /// misconfigured provider rather than a transient condition.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, RecallError::DimensionMismatch { .. })
    }

    /// A provider call that hit the local request deadline.
    pub fn provider_timeout(detail: impl Display) -> Self {
        RecallError::ProviderUnavailable(format!("{}: {}", TIMEOUT_CAUSE_PREFIX, detail))
    }

    /// Whether this error was built by [`RecallError::provider_timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, RecallError::ProviderUnavailable(cause) if cause.starts_with(TIMEOUT_CAUSE_PREFIX))
    }

    /// Shorthand for [`RecallError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        RecallError::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, RecallError>;
