pub mod openai_client;
pub mod prompts;

use futures::future::BoxFuture;
use shared::DetectionResult;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// No API key configured. Raised before any network traffic.
    #[error("AI analysis service unavailable: API key not configured")]
    Unavailable,
    #[error("Upstream request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Upstream response could not be parsed: {0}")]
    Malformed(String),
    #[error("Upstream call timed out after {0:?}")]
    Timeout(Duration),
}

impl InferenceError {
    /// Short description that is safe to return to clients.
    pub fn public_detail(&self) -> &'static str {
        match self {
            InferenceError::Unavailable => "Configuration error",
            InferenceError::Request(_) => "Upstream service could not be reached",
            InferenceError::Status { .. } => "Upstream service returned an error",
            InferenceError::Malformed(_) => "Upstream service returned an unreadable response",
            InferenceError::Timeout(_) => "Upstream service timed out",
        }
    }
}

/// The multimodal model behind detection and crop advice.
pub trait InferenceClient: Send + Sync {
    fn is_configured(&self) -> bool;

    fn analyze_image<'a>(
        &'a self,
        image: &'a [u8],
        media_type: &'a str,
    ) -> BoxFuture<'a, Result<DetectionResult, InferenceError>>;

    fn crop_advice<'a>(
        &'a self,
        crop: &'a str,
        issue: &'a str,
    ) -> BoxFuture<'a, Result<String, InferenceError>>;
}
