use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use reqwest::StatusCode;
use serde_json::json;
use tracing::debug;

use super::dto::{response_schema, AnalysisResult, GenerateContentResponse};
use super::AnalyzeError;
use crate::config::AppConfig;

/// Instruction sent with every request; the response schema does the heavy
/// lifting, the text pins down the portion assumption.
pub const INSTRUCTION: &str = "Analyze the meal in this photo and estimate its nutrition, \
assuming the full portion shown is eaten. Respond with JSON matching the given schema only.";

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Seam between the flow and the hosted model, so tests can substitute a
/// scripted fake.
#[async_trait]
pub trait NutritionModel: Send + Sync {
    async fn analyze(&self, image: Bytes) -> Result<AnalysisResult, AnalyzeError>;
}

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl NutritionModel for GeminiClient {
    async fn analyze(&self, image: Bytes) -> Result<AnalysisResult, AnalyzeError> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "inline_data": { "mime_type": "image/jpeg", "data": BASE64.encode(&image) } },
                    { "text": INSTRUCTION }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": response_schema()
            }
        });

        debug!(model = %self.model, image_bytes = image.len(), "sending analysis request");

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let envelope: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AnalyzeError::MalformedResult(format!("invalid response envelope: {e}")))?;

        let text = match envelope.first_text() {
            Some(t) if !t.trim().is_empty() => t,
            _ => return Err(AnalyzeError::EmptyResponse),
        };
        AnalysisResult::parse(text)
    }
}

/// Maps an HTTP status onto the error taxonomy. Called exactly once per
/// response; nothing downstream re-inspects messages.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> AnalyzeError {
    let msg = summarize(body);
    match status.as_u16() {
        400 => AnalyzeError::BadRequest(msg),
        401 => AnalyzeError::Auth(msg),
        403 => AnalyzeError::Forbidden(msg),
        429 => AnalyzeError::QuotaExceeded(msg),
        500..=599 => AnalyzeError::Unavailable(format!("http {status}: {msg}")),
        _ => AnalyzeError::Unknown(format!("http {status}: {msg}")),
    }
}

pub(crate) fn classify_transport(err: reqwest::Error) -> AnalyzeError {
    if err.is_connect() || err.is_timeout() {
        AnalyzeError::Network(err.to_string())
    } else {
        AnalyzeError::Unknown(err.to_string())
    }
}

/// Error bodies can be large HTML pages; keep a readable prefix.
fn summarize(body: &str) -> String {
    const MAX: usize = 300;
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "(no response body)".into();
    }
    let mut end = trimmed.len().min(MAX);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        let cases: [(u16, fn(&AnalyzeError) -> bool); 6] = [
            (400, |e| matches!(e, AnalyzeError::BadRequest(_))),
            (401, |e| matches!(e, AnalyzeError::Auth(_))),
            (403, |e| matches!(e, AnalyzeError::Forbidden(_))),
            (429, |e| matches!(e, AnalyzeError::QuotaExceeded(_))),
            (503, |e| matches!(e, AnalyzeError::Unavailable(_))),
            (418, |e| matches!(e, AnalyzeError::Unknown(_))),
        ];
        for (code, check) in cases {
            let err = classify_status(StatusCode::from_u16(code).unwrap(), "boom");
            assert!(check(&err), "status {code} misclassified: {err:?}");
        }
    }

    #[test]
    fn transient_categories() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
        assert!(!classify_status(StatusCode::BAD_REQUEST, "").is_transient());
        assert!(!classify_status(StatusCode::UNAUTHORIZED, "").is_transient());
        assert!(!AnalyzeError::EmptyResponse.is_transient());
    }

    #[test]
    fn summarize_truncates_without_splitting_chars() {
        let long = "é".repeat(400);
        let short = summarize(&long);
        assert!(short.len() <= 300);
        assert!(short.chars().all(|c| c == 'é'));
        assert_eq!(summarize("   "), "(no response body)");
    }
}
