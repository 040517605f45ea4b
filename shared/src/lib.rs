mod detection;
mod session;

pub use detection::{
    DEFAULT_TREATMENT, DEFAULT_TREATMENT_ML, DetectionRecord, DetectionResult, Severity,
    UNKNOWN_DISEASE, UNKNOWN_DISEASE_ML, Urgency,
};
pub use session::{DetectionSession, DetectionView, SessionError};

use serde::{Deserialize, Serialize};

/// Body of every non-2xx response from the backend.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CropAdviceRequest {
    #[serde(default)]
    pub crop_type: String,
    #[serde(default)]
    pub issue: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CropAdviceResponse {
    pub advice: String,
}
