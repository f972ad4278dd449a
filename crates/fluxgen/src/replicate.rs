//! Raw reqwest client for the Replicate predictions API.
//!
//! Creates a prediction for a named model, then polls it until a terminal
//! status. No streaming and no retries; one generation is one create plus
//! a poll loop.

use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Replicate API base URL.
pub const API_BASE: &str = "https://api.replicate.com";

/// Environment variable holding the API token.
pub const TOKEN_ENV: &str = "REPLICATE_API_TOKEN";

/// Delay between prediction status polls.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Errors from Replicate API operations.
#[derive(Debug, thiserror::Error)]
pub enum ReplicateError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("REPLICATE_API_TOKEN not set")]
    MissingApiToken,

    #[error("generation rejected by the safety filter: {0}")]
    ContentPolicy(String),

    #[error("prediction failed: {0}")]
    Failed(String),

    #[error("prediction was canceled")]
    Canceled,

    #[error("prediction succeeded without output")]
    MissingOutput,
}

pub type Result<T> = std::result::Result<T, ReplicateError>;

/// Prediction lifecycle states reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl PredictionStatus {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

/// Links returned alongside a prediction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionUrls {
    #[serde(default)]
    pub get: Option<String>,
}

/// Wire format of a prediction resource.
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub urls: PredictionUrls,
}

/// The upstream generation service, seen as a single blocking call.
///
/// The orchestrator is generic over this trait so tests can substitute a
/// stub backend for the hosted API.
#[async_trait::async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Run `model_id` with `input` and return the raw output value.
    async fn run(&self, model_id: &str, input: &Value) -> Result<Value>;
}

/// A minimal Replicate API client.
#[derive(Debug)]
pub struct ReplicateClient {
    client: reqwest::Client,
    api_token: String,
    api_base: String,
}

impl ReplicateClient {
    /// Create a client from the `REPLICATE_API_TOKEN` environment variable.
    ///
    /// `api_base` overrides the production endpoint (proxies, tests).
    pub fn from_env(api_base: Option<&str>) -> Result<Self> {
        let api_token = std::env::var(TOKEN_ENV).map_err(|_| ReplicateError::MissingApiToken)?;
        Ok(Self::new(api_token, api_base.unwrap_or(API_BASE)))
    }

    pub fn new(api_token: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_token: api_token.into(),
            api_base: api_base.into(),
        }
    }

    async fn create_prediction(&self, model_id: &str, input: &Value) -> Result<Prediction> {
        let url = format!("{}/v1/models/{}/predictions", self.api_base, model_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&serde_json::json!({ "input": input }))
            .send()
            .await?;
        Self::parse_prediction(response).await
    }

    async fn get_prediction(&self, url: &str) -> Result<Prediction> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        Self::parse_prediction(response).await
    }

    async fn parse_prediction(response: reqwest::Response) -> Result<Prediction> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            if is_safety_rejection(&message) {
                return Err(ReplicateError::ContentPolicy(message));
            }
            return Err(ReplicateError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    /// Poll URL for a prediction: the API-provided link when present,
    /// otherwise the canonical predictions path.
    fn poll_url(&self, prediction: &Prediction) -> String {
        prediction
            .urls
            .get
            .clone()
            .unwrap_or_else(|| format!("{}/v1/predictions/{}", self.api_base, prediction.id))
    }
}

/// Upstream error strings that indicate a safety-filter rejection.
fn is_safety_rejection(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("nsfw") || lower.contains("flagged as sensitive")
}

#[async_trait::async_trait]
impl GenerationBackend for ReplicateClient {
    async fn run(&self, model_id: &str, input: &Value) -> Result<Value> {
        let mut prediction = self.create_prediction(model_id, input).await?;
        log::debug!(
            "created prediction {} ({:?})",
            prediction.id,
            prediction.status
        );

        while !prediction.status.is_terminal() {
            tokio::time::sleep(POLL_INTERVAL).await;
            let url = self.poll_url(&prediction);
            prediction = self.get_prediction(&url).await?;
        }

        match prediction.status {
            PredictionStatus::Succeeded => prediction.output.ok_or(ReplicateError::MissingOutput),
            PredictionStatus::Canceled => Err(ReplicateError::Canceled),
            _ => {
                let message = prediction
                    .error
                    .unwrap_or_else(|| "unknown failure".to_string());
                if is_safety_rejection(&message) {
                    Err(ReplicateError::ContentPolicy(message))
                } else {
                    Err(ReplicateError::Failed(message))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn prediction_deserialization() {
        let json_str = r#"{
            "id": "pred_abc123",
            "status": "succeeded",
            "output": ["https://replicate.delivery/pbxt/abc/out.png"],
            "urls": {"get": "https://api.replicate.com/v1/predictions/pred_abc123"}
        }"#;
        let prediction: Prediction = serde_json::from_str(json_str).unwrap();
        assert_eq!(prediction.id, "pred_abc123");
        assert_eq!(prediction.status, PredictionStatus::Succeeded);
        assert!(prediction.error.is_none());
        assert_eq!(
            prediction.urls.get.as_deref(),
            Some("https://api.replicate.com/v1/predictions/pred_abc123")
        );
    }

    #[test]
    fn prediction_deserialization_minimal() {
        let prediction: Prediction =
            serde_json::from_str(r#"{"id": "p1", "status": "starting"}"#).unwrap();
        assert_eq!(prediction.status, PredictionStatus::Starting);
        assert!(prediction.output.is_none());
        assert!(prediction.urls.get.is_none());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!PredictionStatus::Starting.is_terminal());
        assert!(!PredictionStatus::Processing.is_terminal());
        assert!(PredictionStatus::Succeeded.is_terminal());
        assert!(PredictionStatus::Failed.is_terminal());
        assert!(PredictionStatus::Canceled.is_terminal());
    }

    #[test]
    fn safety_rejection_detection() {
        assert!(is_safety_rejection("NSFW content detected"));
        assert!(is_safety_rejection("image flagged as sensitive"));
        assert!(!is_safety_rejection("connection reset by peer"));
        assert!(!is_safety_rejection(""));
    }

    #[tokio::test]
    async fn run_returns_output_when_prediction_succeeds_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/models/black-forest-labs/flux-pro/predictions"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_partial_json(json!({"input": {"prompt": "a cat"}})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "p1",
                "status": "succeeded",
                "output": ["https://replicate.delivery/pbxt/p1/out.png"]
            })))
            .mount(&server)
            .await;

        let client = ReplicateClient::new("test-token", server.uri());
        let output = client
            .run("black-forest-labs/flux-pro", &json!({"prompt": "a cat"}))
            .await
            .unwrap();
        assert_eq!(
            output,
            json!(["https://replicate.delivery/pbxt/p1/out.png"])
        );
    }

    #[tokio::test]
    async fn run_polls_until_the_prediction_settles() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/models/black-forest-labs/flux-pro/predictions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "p2",
                "status": "starting",
                "urls": {"get": format!("{}/v1/predictions/p2", server.uri())}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/predictions/p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "p2",
                "status": "succeeded",
                "output": "https://replicate.delivery/pbxt/p2/out.png"
            })))
            .mount(&server)
            .await;

        let client = ReplicateClient::new("test-token", server.uri());
        let output = client
            .run("black-forest-labs/flux-pro", &json!({"prompt": "a cat"}))
            .await
            .unwrap();
        assert_eq!(output, json!("https://replicate.delivery/pbxt/p2/out.png"));
    }

    #[tokio::test]
    async fn failed_prediction_with_safety_text_is_content_policy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/models/black-forest-labs/flux-pro/predictions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "p3",
                "status": "failed",
                "error": "NSFW content detected"
            })))
            .mount(&server)
            .await;

        let client = ReplicateClient::new("test-token", server.uri());
        let err = client
            .run("black-forest-labs/flux-pro", &json!({"prompt": "a cat"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ReplicateError::ContentPolicy(_)));
    }

    #[tokio::test]
    async fn failed_prediction_surfaces_the_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/models/black-forest-labs/flux-pro/predictions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "p4",
                "status": "failed",
                "error": "model exploded"
            })))
            .mount(&server)
            .await;

        let client = ReplicateClient::new("test-token", server.uri());
        let err = client
            .run("black-forest-labs/flux-pro", &json!({"prompt": "a cat"}))
            .await
            .unwrap_err();
        match err {
            ReplicateError::Failed(message) => assert_eq!(message, "model exploded"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn api_error_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/models/black-forest-labs/flux-pro/predictions"))
            .respond_with(ResponseTemplate::new(402).set_body_string("payment required"))
            .mount(&server)
            .await;

        let client = ReplicateClient::new("test-token", server.uri());
        let err = client
            .run("black-forest-labs/flux-pro", &json!({"prompt": "a cat"}))
            .await
            .unwrap_err();
        match err {
            ReplicateError::Api { status, message } => {
                assert_eq!(status, 402);
                assert_eq!(message, "payment required");
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[test]
    fn from_env_without_token_is_a_configuration_error() {
        let saved = std::env::var(TOKEN_ENV).ok();
        std::env::remove_var(TOKEN_ENV);

        let result = ReplicateClient::from_env(None);
        assert!(matches!(result, Err(ReplicateError::MissingApiToken)));

        if let Some(token) = saved {
            std::env::set_var(TOKEN_ENV, token);
        }
    }
}
