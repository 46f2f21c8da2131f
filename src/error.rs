//! Error taxonomy for the analysis core.
//!
//! Provider failures are recovered locally by the orchestrator (retry,
//! fallback, degraded analysis) and never surface as hard failures.
//! Everything in `AnalysisError` is terminal for the current document.

use thiserror::Error;

use crate::models::AnalysisKind;

/// Errors from a single provider attempt.
///
/// The orchestrator inspects the variant to decide between retrying the
/// same provider and moving on to the next one.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Recoverable failure (connection refused, timeout, 5xx). Retried
    /// with backoff up to the configured bound.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// Quota or rate limit exhausted (429/402). Not retried; the
    /// orchestrator moves straight to the next provider.
    #[error("provider quota exceeded (retry after {retry_after_secs:?}s)")]
    QuotaExceeded { retry_after_secs: Option<u64> },

    /// The provider answered but the payload could not be read.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Errors from prompt template rendering. Always fatal: a missing
/// variable means the caller supplied incomplete metadata.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("missing required template variable: {0}")]
    MissingVariable(String),
}

/// No quality history recorded yet for an analysis kind. The
/// orchestrator falls back to the configured static provider order.
#[derive(Debug, Error)]
#[error("no quality history recorded for {0}")]
pub struct NoHistoryError(pub AnalysisKind);

/// Terminal errors for a document analysis call.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Bad input (empty content, unusable request). Never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Malformed prompt configuration.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The caller abandoned the analysis between chunks.
    #[error("analysis cancelled")]
    Cancelled,

    /// Memory growth stayed above threshold even at the floor batch
    /// size. Fatal for this document only; shared state is untouched.
    #[error("resource budget exhausted: {0}")]
    ResourceExhausted(String),

    /// A cached computation failed. Nothing was committed, so later
    /// callers recompute. Cancellation and request validation errors
    /// are never wrapped in this variant.
    #[error("cached analysis computation failed")]
    CacheCompute(#[source] Box<AnalysisError>),
}

impl ProviderError {
    /// Whether the same provider is worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}
