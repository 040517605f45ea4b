use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;

use crate::inference::InferenceError;
use crate::intake::upload::IntakeError;
use crate::storage::detection_store::StoreError;

/// Everything a handler can fail with, mapped onto the HTTP surface.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("Failed to fetch detection history: {0}")]
    History(#[source] StoreError),
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    fn body(&self) -> ErrorResponse {
        match self {
            ApiError::Intake(IntakeError::Io(_)) => ErrorResponse {
                error: "Failed to receive image".into(),
                details: None,
            },
            ApiError::Intake(err) => ErrorResponse {
                error: err.to_string(),
                details: None,
            },
            ApiError::Inference(err @ InferenceError::Unavailable) => ErrorResponse {
                error: "AI analysis service unavailable".into(),
                details: Some(err.public_detail().into()),
            },
            ApiError::Inference(err) => ErrorResponse {
                error: "Failed to analyze image".into(),
                details: Some(err.public_detail().into()),
            },
            ApiError::History(_) => ErrorResponse {
                error: "Failed to fetch detection history".into(),
                details: None,
            },
            ApiError::BadRequest(message) => ErrorResponse {
                error: message.clone(),
                details: None,
            },
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Intake(IntakeError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Intake(IntakeError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Intake(_) => StatusCode::BAD_REQUEST,
            ApiError::Inference(InferenceError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::History(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed ({}): {}", status, self);
        } else {
            log::warn!("Request rejected ({}): {}", status, self);
        }
        HttpResponse::build(status).json(self.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn maps_taxonomy_to_status_codes() {
        let cases = [
            (ApiError::from(IntakeError::MissingImage), 400),
            (ApiError::from(IntakeError::NotAnImage), 400),
            (ApiError::from(IntakeError::TooLarge { limit: 10 }), 413),
            (ApiError::from(InferenceError::Unavailable), 503),
            (ApiError::from(InferenceError::Timeout(Duration::from_secs(1))), 500),
            (ApiError::from(InferenceError::Malformed("x".into())), 500),
            (ApiError::History(StoreError::Backend("down".into())), 500),
            (ApiError::BadRequest("cropType and issue are required".into()), 400),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code().as_u16(), status, "{err}");
        }
    }

    #[test]
    fn upstream_detail_is_not_leaked() {
        let err = ApiError::from(InferenceError::Status {
            status: 401,
            body: "invalid api key sk-live-123".into(),
        });
        let body = err.body();
        assert_eq!(body.error, "Failed to analyze image");
        assert!(!body.details.unwrap_or_default().contains("sk-live"));
    }
}
