pub mod client;
pub mod dto;
pub mod retry;

use thiserror::Error;

pub use client::{GeminiClient, NutritionModel};
pub use dto::{AnalysisResult, Macros};
pub use retry::{with_retry, DEFAULT_MAX_ATTEMPTS};

/// Failure taxonomy for one analysis attempt. Classification happens once,
/// at the transport boundary (`client::classify_status`); downstream code
/// matches on the variant, never on the message text.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("invalid or missing API credential: {0}")]
    Auth(String),

    #[error("permission denied by the inference service: {0}")]
    Forbidden(String),

    #[error("rate limit or quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("request rejected by the inference service: {0}")]
    BadRequest(String),

    #[error("inference service unavailable: {0}")]
    Unavailable(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("model returned no textual payload")]
    EmptyResponse,

    #[error("model response does not match the nutrition schema: {0}")]
    MalformedResult(String),

    #[error("inference failed: {0}")]
    Unknown(String),

    #[error("gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<AnalyzeError>,
    },
}

impl AnalyzeError {
    /// Whether a retry could plausibly succeed. Quota and 5xx resolve on
    /// their own; auth, permission and schema problems never do.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AnalyzeError::QuotaExceeded(_) | AnalyzeError::Unavailable(_) | AnalyzeError::Network(_)
        )
    }
}
