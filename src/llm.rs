use std::time::Duration;

use anyhow::Context;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use reqwest::ClientBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chat::{self, ChatMessage};
use crate::config::ServiceConfig;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("A request is already in progress. Please wait for it to finish.")]
    AlreadyInFlight,
    #[error("Cannot connect to Ollama. Make sure Ollama is running!\n\nStart it with: ollama serve")]
    Unreachable,
    #[error("Request timed out. The model might be too large or your computer is slow.")]
    Timeout,
    #[error("Ollama Error ({status}): {detail}")]
    Service { status: u16, detail: String },
    #[error("Error: {0}")]
    Transport(String),
}

// Structs for Ollama's /api/generate endpoint (non-streaming)
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// Case-insensitive substring test against the configured vision fragment
/// set; only matching models may receive an image attachment.
pub fn is_vision_model(name: &str, fragments: &[String]) -> bool {
    let name = name.to_lowercase();
    fragments.iter().any(|fragment| name.contains(&fragment.to_lowercase()))
}

/// Immutable snapshot of everything one generate call needs.
pub struct InferenceRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub image_png: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

impl InferenceRequest {
    pub fn new(messages: Vec<ChatMessage>, model: String, image_png: Option<Vec<u8>>) -> Self {
        Self {
            messages,
            model,
            image_png,
            created_at: Utc::now(),
        }
    }

    /// Builds the wire payload pieces: the linear prompt and, when the model
    /// is vision-capable, the base64-encoded attachment. A non-vision model
    /// drops the image silently.
    pub fn payload(&self, vision_fragments: &[String]) -> (String, Option<Vec<String>>) {
        let prompt = chat::render_prompt(&self.messages);
        let images = match &self.image_png {
            Some(png) if is_vision_model(&self.model, vision_fragments) => {
                Some(vec![base64::engine::general_purpose::STANDARD.encode(png)])
            }
            _ => None,
        };
        (prompt, images)
    }

    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}

/// Thin client over the local inference service. Cloning shares the
/// underlying connection pool, so clones are cheap to move into worker
/// tasks.
#[derive(Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    probe_timeout: Duration,
}

impl OllamaClient {
    pub fn new(service: &ServiceConfig) -> anyhow::Result<Self> {
        let http = ClientBuilder::new()
            .timeout(Duration::from_secs(service.request_timeout_secs))
            .connect_timeout(Duration::from_secs(service.connect_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: service.base_url.trim_end_matches('/').to_string(),
            probe_timeout: Duration::from_secs(service.probe_timeout_secs),
        })
    }

    pub async fn generate(
        &self,
        model: &str,
        prompt: &str,
        images: Option<Vec<String>>,
    ) -> Result<String, InferenceError> {
        let payload = GenerateRequest {
            model,
            prompt,
            images,
            stream: false,
        };

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(classify_send_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(InferenceError::Service {
                status,
                detail: extract_error_detail(&body),
            });
        }

        let body = response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| InferenceError::Transport(format!("failed to parse response: {}", e)))?;

        Ok(body.response)
    }

    /// Lists installed model names via the tags endpoint. Uses the short
    /// probe timeout so presence checks fail fast when the service is down.
    pub async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        let response = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(classify_send_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(InferenceError::Service {
                status,
                detail: extract_error_detail(&body),
            });
        }

        let tags = response
            .json::<TagsResponse>()
            .await
            .map_err(|e| InferenceError::Transport(format!("failed to parse model list: {}", e)))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

fn classify_send_error(error: reqwest::Error) -> InferenceError {
    if error.is_connect() {
        InferenceError::Unreachable
    } else if error.is_timeout() {
        InferenceError::Timeout
    } else {
        InferenceError::Transport(error.to_string())
    }
}

// The service reports failures as {"error": {"message": …}} when it can;
// anything else is surfaced raw.
fn extract_error_detail(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatRole;

    fn fragments() -> Vec<String> {
        crate::config::ModelsConfig::default().vision_fragments
    }

    #[test]
    fn test_vision_detection() {
        assert!(is_vision_model("llava", &fragments()));
        assert!(is_vision_model("llama3.2-vision:11b", &fragments()));
        assert!(is_vision_model("LLaVA-phi3", &fragments()));
        assert!(!is_vision_model("llama3.2:1b", &fragments()));
        assert!(!is_vision_model("mistral", &fragments()));
    }

    #[test]
    fn test_payload_attaches_image_for_vision_model() {
        let messages = vec![ChatMessage {
            role: ChatRole::User,
            content: "what do you see?".to_string(),
        }];
        let request = InferenceRequest::new(messages, "llava".to_string(), Some(vec![1, 2, 3]));

        let (prompt, images) = request.payload(&fragments());
        assert!(prompt.ends_with("Assistant: "));
        let images = images.expect("vision model should carry the image");
        assert_eq!(images.len(), 1);
        assert_eq!(
            images[0],
            base64::engine::general_purpose::STANDARD.encode([1, 2, 3])
        );
    }

    #[test]
    fn test_payload_drops_image_for_text_model() {
        let messages = vec![ChatMessage {
            role: ChatRole::User,
            content: "hello".to_string(),
        }];
        let request = InferenceRequest::new(messages, "mistral".to_string(), Some(vec![1, 2, 3]));

        let (_, images) = request.payload(&fragments());
        assert!(images.is_none());
    }

    #[test]
    fn test_generate_request_omits_absent_images() {
        let payload = GenerateRequest {
            model: "llama3.2",
            prompt: "User: hi\n\nAssistant: ",
            images: None,
            stream: false,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("images").is_none());
        assert_eq!(json["stream"], serde_json::Value::Bool(false));
    }

    #[test]
    fn test_error_detail_from_json_body() {
        let body = r#"{"error": {"message": "model not found"}}"#;
        assert_eq!(extract_error_detail(body), "model not found");
    }

    #[test]
    fn test_error_detail_falls_back_to_raw_text() {
        assert_eq!(extract_error_detail("boom"), "boom");
        assert_eq!(extract_error_detail(r#"{"error": {}}"#), r#"{"error": {}}"#);
    }
}
