use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::future::{BoxFuture, FutureExt};
use log::{debug, info};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{Value, json};
use shared::DetectionResult;
use std::sync::Arc;

use super::prompts::PromptConfig;
use super::{InferenceClient, InferenceError};

const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    http: HttpClient,
    api_key: Option<String>,
    base_url: String,
    model: String,
    prompts: Arc<PromptConfig>,
}

impl OpenAiClient {
    pub fn new(
        http: HttpClient,
        api_key: Option<String>,
        base_url: String,
        model: String,
        prompts: Arc<PromptConfig>,
    ) -> Self {
        Self {
            http,
            api_key,
            base_url,
            model,
            prompts,
        }
    }

    fn api_key(&self) -> Result<&str, InferenceError> {
        self.api_key.as_deref().ok_or(InferenceError::Unavailable)
    }

    pub async fn diagnose(
        &self,
        image: &[u8],
        media_type: &str,
    ) -> Result<DetectionResult, InferenceError> {
        let api_key = self.api_key()?;
        let encoded = BASE64.encode(image);
        debug!(
            "Sending {} byte image ({} base64 chars) to {}",
            image.len(),
            encoded.len(),
            self.model
        );

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": self.prompts.detection_system() },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": self.prompts.detection.user },
                        {
                            "type": "image_url",
                            "image_url": { "url": format!("data:{};base64,{}", media_type, encoded) }
                        }
                    ]
                }
            ],
            "response_format": { "type": "json_object" },
            "max_tokens": self.prompts.detection.max_tokens,
        });

        let content = self
            .complete(api_key, &body)
            .await?
            .ok_or_else(|| InferenceError::Malformed("completion has no content".into()))?;
        let result = parse_diagnosis(&content)?;
        info!(
            "Diagnosis received: {} ({}%, {})",
            result.disease, result.confidence, result.severity
        );
        Ok(result)
    }

    pub async fn advise(&self, crop: &str, issue: &str) -> Result<String, InferenceError> {
        let api_key = self.api_key()?;
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": self.prompts.advice.system },
                { "role": "user", "content": self.prompts.advice_user(crop, issue) }
            ],
            "max_tokens": self.prompts.advice.max_tokens,
        });

        let advice = self
            .complete(api_key, &body)
            .await?
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .unwrap_or_else(|| self.prompts.advice.fallback.clone());
        Ok(advice)
    }

    async fn complete(&self, api_key: &str, body: &Value) -> Result<Option<String>, InferenceError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| InferenceError::Malformed(e.to_string()))?;
        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content))
    }
}

/// Parses the model's message as a single JSON object and sanitizes it.
pub fn parse_diagnosis(content: &str) -> Result<DetectionResult, InferenceError> {
    let value: Value = serde_json::from_str(content.trim())
        .map_err(|e| InferenceError::Malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(InferenceError::Malformed(
            "expected a JSON object in the completion".into(),
        ));
    }
    Ok(DetectionResult::sanitize(&value))
}

impl InferenceClient for OpenAiClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn analyze_image<'a>(
        &'a self,
        image: &'a [u8],
        media_type: &'a str,
    ) -> BoxFuture<'a, Result<DetectionResult, InferenceError>> {
        self.diagnose(image, media_type).boxed()
    }

    fn crop_advice<'a>(
        &'a self,
        crop: &'a str,
        issue: &'a str,
    ) -> BoxFuture<'a, Result<String, InferenceError>> {
        self.advise(crop, issue).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::dev::ServerHandle;
    use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
    use shared::Severity;

    type Reply = fn(&HttpRequest, &Value) -> HttpResponse;

    fn completion(content: Value) -> HttpResponse {
        HttpResponse::Ok().json(json!({
            "id": "chatcmpl-test",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        }))
    }

    fn blight_reply(req: &HttpRequest, body: &Value) -> HttpResponse {
        let authorized = req
            .headers()
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            == Some("Bearer sk-test");
        if !authorized {
            return HttpResponse::Unauthorized().finish();
        }
        let image_url = body["messages"][1]["content"][1]["image_url"]["url"]
            .as_str()
            .unwrap_or_default();
        if body["response_format"]["type"] != "json_object"
            || !image_url.starts_with("data:image/png;base64,")
        {
            return HttpResponse::BadRequest().finish();
        }
        completion(json!(
            r#"{"disease":"Coconut Leaf Blight","confidence":150,"severity":"extreme","preventionTips":"none","extra":"ignored"}"#
        ))
    }

    fn prose_reply(_: &HttpRequest, _: &Value) -> HttpResponse {
        completion(json!("This looks like leaf blight to me."))
    }

    fn array_reply(_: &HttpRequest, _: &Value) -> HttpResponse {
        completion(json!("[\"Coconut Leaf Blight\"]"))
    }

    fn empty_reply(_: &HttpRequest, _: &Value) -> HttpResponse {
        completion(Value::Null)
    }

    fn failing_reply(_: &HttpRequest, _: &Value) -> HttpResponse {
        HttpResponse::TooManyRequests().body("rate limited")
    }

    fn advice_reply(_: &HttpRequest, body: &Value) -> HttpResponse {
        let question = body["messages"][1]["content"].as_str().unwrap_or_default();
        completion(json!(format!("  Advice for: {}  ", question)))
    }

    async fn spawn_upstream(reply: Reply) -> (String, ServerHandle) {
        let server = HttpServer::new(move || {
            App::new().route(
                "/v1/chat/completions",
                web::post().to(move |req: HttpRequest, body: web::Json<Value>| async move {
                    reply(&req, &body.into_inner())
                }),
            )
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);
        (format!("http://{}/v1", addr), handle)
    }

    fn client(base_url: String, api_key: Option<&str>) -> OpenAiClient {
        OpenAiClient::new(
            HttpClient::builder().no_proxy().build().unwrap(),
            api_key.map(str::to_string),
            base_url,
            "gpt-4o".into(),
            Arc::new(PromptConfig::load(None).unwrap()),
        )
    }

    #[actix_web::test]
    async fn sanitizes_upstream_diagnosis() {
        let (base_url, handle) = spawn_upstream(blight_reply).await;

        let result = client(base_url, Some("sk-test"))
            .diagnose(b"\x89PNG fake", "image/png")
            .await
            .unwrap();

        assert_eq!(result.disease, "Coconut Leaf Blight");
        assert_eq!(result.confidence, 100);
        assert_eq!(result.severity, Severity::Moderate);
        assert!(result.prevention_tips.is_empty());
        handle.stop(true).await;
    }

    #[actix_web::test]
    async fn missing_key_fails_without_network() {
        // Nothing listens on the discard port; reaching it would be a Request error.
        let client = client("http://127.0.0.1:9/v1".into(), None);

        assert!(!client.is_configured());
        let err = client.diagnose(b"img", "image/jpeg").await.unwrap_err();
        assert!(matches!(err, InferenceError::Unavailable));
        let err = client.advise("rice", "blast").await.unwrap_err();
        assert!(matches!(err, InferenceError::Unavailable));
    }

    #[actix_web::test]
    async fn prose_and_non_object_content_are_malformed() {
        for reply in [prose_reply as Reply, array_reply, empty_reply] {
            let (base_url, handle) = spawn_upstream(reply).await;
            let err = client(base_url, Some("sk-test"))
                .diagnose(b"img", "image/jpeg")
                .await
                .unwrap_err();
            assert!(matches!(err, InferenceError::Malformed(_)), "got {err:?}");
            handle.stop(true).await;
        }
    }

    #[actix_web::test]
    async fn non_success_status_is_reported() {
        let (base_url, handle) = spawn_upstream(failing_reply).await;

        let err = client(base_url, Some("sk-test"))
            .diagnose(b"img", "image/jpeg")
            .await
            .unwrap_err();

        match err {
            InferenceError::Status { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        handle.stop(true).await;
    }

    #[actix_web::test]
    async fn wrong_key_is_reported_as_status() {
        let (base_url, handle) = spawn_upstream(blight_reply).await;

        let err = client(base_url, Some("sk-other"))
            .diagnose(b"img", "image/png")
            .await
            .unwrap_err();

        assert!(matches!(err, InferenceError::Status { status: 401, .. }));
        handle.stop(true).await;
    }

    #[actix_web::test]
    async fn crop_advice_is_trimmed_or_falls_back() {
        let (base_url, handle) = spawn_upstream(advice_reply).await;
        let advice = client(base_url, Some("sk-test"))
            .advise("banana", "bunchy top")
            .await
            .unwrap();
        assert!(advice.starts_with("Advice for: I'm growing banana in Kerala"));
        assert!(!advice.ends_with(' '));
        handle.stop(true).await;

        let (base_url, handle) = spawn_upstream(empty_reply).await;
        let advice = client(base_url, Some("sk-test"))
            .advise("banana", "bunchy top")
            .await
            .unwrap();
        assert_eq!(advice, "Please consult your local agricultural extension officer.");
        handle.stop(true).await;
    }

    #[test]
    fn parse_rejects_markdown_wrapped_json() {
        let err = parse_diagnosis("```json\n{\"disease\":\"x\"}\n```").unwrap_err();
        assert!(matches!(err, InferenceError::Malformed(_)));
        let ok = parse_diagnosis("  {\"disease\":\"Rust\"}\n").unwrap();
        assert_eq!(ok.disease, "Rust");
    }
}
