use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use shared::{
    CropAdviceRequest, CropAdviceResponse, DetectionRecord, DetectionResult, ErrorResponse,
};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message}")]
    Api { status: u16, message: String },
}

impl ClientError {
    /// Text that can be shown to the farmer as-is.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Api { message, .. } => message.clone(),
            ClientError::Http(e) if e.is_timeout() => {
                "The analysis took too long. Please try again.".to_string()
            }
            ClientError::Http(_) => {
                "Could not reach the analysis service. Please try again.".to_string()
            }
        }
    }
}

/// Thin wrapper over the backend's JSON API.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn detect(
        &self,
        image: Vec<u8>,
        file_name: String,
        media_type: &str,
        user_id: Option<&str>,
    ) -> Result<DetectionResult, ClientError> {
        let part = Part::bytes(image).file_name(file_name).mime_str(media_type)?;
        let mut form = Form::new().part("image", part);
        if let Some(user_id) = user_id {
            form = form.text("userId", user_id.to_string());
        }

        let resp = self
            .http
            .post(format!("{}/api/detect-pest", self.base_url))
            .multipart(form)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn history(&self, user_id: &str) -> Result<Vec<DetectionRecord>, ClientError> {
        let resp = self
            .http
            .get(format!(
                "{}/api/detections/{}",
                self.base_url,
                urlencoding::encode(user_id)
            ))
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn crop_advice(&self, crop: &str, issue: &str) -> Result<String, ClientError> {
        let request = CropAdviceRequest {
            crop_type: crop.to_string(),
            issue: issue.to_string(),
        };
        let resp = self
            .http
            .post(format!("{}/api/crop-advice", self.base_url))
            .json(&request)
            .send()
            .await?;
        let body: CropAdviceResponse = Self::check(resp).await?.json().await?;
        Ok(body.advice)
    }

    async fn check(resp: Response) -> Result<Response, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        Err(ClientError::Api {
            status: status.as_u16(),
            message: error_message(status.as_u16(), &text),
        })
    }
}

fn error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse {
            error,
            details: Some(details),
        }) => format!("{error}: {details}"),
        Ok(ErrorResponse { error, .. }) => error,
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => format!("Request failed with HTTP {status}"),
    }
}

/// Media type declared for an upload, guessed from the file extension.
pub fn media_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}
