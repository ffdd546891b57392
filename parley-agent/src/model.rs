// ABOUTME: Model collaborator boundary - one call shape for every LLM request parley makes.
// ABOUTME: OpenAI-compatible HTTP client plus a JSON helper that substitutes a fallback on failure.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Desired shape of the model output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputShape {
    #[default]
    Text,
    /// The provider is asked for a JSON object
    Json,
}

/// Speaker of a prior conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A prior turn replayed ahead of the current user message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single model call
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    /// System instruction
    pub system: String,
    /// Earlier turns, oldest first
    pub history: Vec<ChatTurn>,
    /// The message to answer
    pub user: String,
    /// Sampling temperature; None uses the client's configured value
    pub temperature: Option<f32>,
    pub shape: OutputShape,
    /// Overrides the client's default model
    pub model: Option<String>,
}

impl ModelRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            history: Vec::new(),
            user: user.into(),
            temperature: None,
            shape: OutputShape::Text,
            model: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn json(mut self) -> Self {
        self.shape = OutputShape::Json;
        self
    }
}

/// Anything that can answer a ModelRequest with text
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Default model identifier
    fn model(&self) -> &str;

    /// Return the raw model output. For `OutputShape::Json` the text is
    /// expected, but not guaranteed, to decode as a JSON object.
    async fn complete(&self, request: &ModelRequest) -> Result<String>;
}

/// Settings for the OpenAI-compatible client
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

// Custom Debug impl to redact the API key
impl std::fmt::Debug for ModelSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4.1-nano".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_temperature() -> f32 {
    0.7
}

/// Client for any `/chat/completions` endpoint speaking the OpenAI dialect
pub struct OpenAiClient {
    client: reqwest::Client,
    settings: ModelSettings,
}

impl OpenAiClient {
    pub fn new(settings: ModelSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

fn wire_messages(request: &ModelRequest) -> Vec<WireMessage<'_>> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    if !request.system.is_empty() {
        messages.push(WireMessage {
            role: "system",
            content: &request.system,
        });
    }
    for turn in &request.history {
        messages.push(WireMessage {
            role: match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: &turn.content,
        });
    }
    messages.push(WireMessage {
        role: "user",
        content: &request.user,
    });
    messages
}

/// Wire body for `request`, filling unset fields from `settings`
fn completion_request<'a>(
    settings: &'a ModelSettings,
    request: &'a ModelRequest,
) -> CompletionRequest<'a> {
    CompletionRequest {
        model: request.model.as_deref().unwrap_or(&settings.model),
        messages: wire_messages(request),
        temperature: request.temperature.unwrap_or(settings.temperature),
        response_format: match request.shape {
            OutputShape::Text => None,
            OutputShape::Json => Some(ResponseFormat {
                kind: "json_object",
            }),
        },
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.settings.model
    }

    async fn complete(&self, request: &ModelRequest) -> Result<String> {
        let body = completion_request(&self.settings, request);
        let model = body.model;

        let url = format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        );
        tracing::debug!(model, url = %url, shape = ?request.shape, "Calling model");

        let mut http = self.client.post(&url).json(&body);
        if let Some(ref key) = self.settings.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.context("Model request failed")?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Model API returned {}: {}", status, text);
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .context("Failed to decode model response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("Model returned no content")
    }
}

/// Decode model output as JSON, tolerating a surrounding markdown code fence.
pub fn decode_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(unfenced.trim()).context("Model output is not the requested JSON")
}

/// Ask for a JSON object and decode it, substituting `fallback` when the
/// model fails or returns something that does not decode.
pub async fn complete_json_or<T: DeserializeOwned>(
    client: &dyn ModelClient,
    request: ModelRequest,
    fallback: T,
) -> T {
    let request = request.json();
    match client.complete(&request).await {
        Ok(raw) => match decode_json(&raw) {
            Ok(value) => value,
            Err(e) => {
                let preview: String = raw.chars().take(80).collect();
                tracing::warn!(
                    error = %e,
                    preview = %preview,
                    "Using fallback for undecodable model output"
                );
                fallback
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "Using fallback after model failure");
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Mood {
        emotion: String,
    }

    #[test]
    fn test_decode_json_plain() {
        let mood: Mood = decode_json(r#"{"emotion": "calm"}"#).unwrap();
        assert_eq!(mood.emotion, "calm");
    }

    #[test]
    fn test_decode_json_fenced() {
        let mood: Mood = decode_json("```json\n{\"emotion\": \"happy\"}\n```").unwrap();
        assert_eq!(mood.emotion, "happy");
    }

    #[test]
    fn test_decode_json_garbage() {
        assert!(decode_json::<Mood>("I feel fine").is_err());
    }

    #[tokio::test]
    async fn test_complete_json_or_decodes() {
        let model = ScriptedModel::new().reply(r#"{"emotion": "excited"}"#);
        let fallback = Mood {
            emotion: "neutral".to_string(),
        };
        let mood = complete_json_or(&model, ModelRequest::new("sys", "hi"), fallback).await;
        assert_eq!(mood.emotion, "excited");

        let seen = model.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].shape, OutputShape::Json);
    }

    #[tokio::test]
    async fn test_complete_json_or_falls_back_on_bad_output() {
        let model = ScriptedModel::new().reply("not json at all");
        let fallback = Mood {
            emotion: "neutral".to_string(),
        };
        let mood = complete_json_or(&model, ModelRequest::new("sys", "hi"), fallback).await;
        assert_eq!(mood.emotion, "neutral");
    }

    #[tokio::test]
    async fn test_complete_json_or_falls_back_on_model_error() {
        let model = ScriptedModel::new().fail("upstream unavailable");
        let mood = complete_json_or(
            &model,
            ModelRequest::new("sys", "hi"),
            Mood {
                emotion: "neutral".to_string(),
            },
        )
        .await;
        assert_eq!(mood.emotion, "neutral");
    }

    #[test]
    fn test_wire_messages_order() {
        let request = ModelRequest::new("be brief", "now")
            .with_history(vec![ChatTurn::user("earlier"), ChatTurn::assistant("reply")]);
        let roles: Vec<&str> = wire_messages(&request).iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
    }

    #[test]
    fn test_wire_messages_skip_empty_system() {
        let request = ModelRequest::new("", "hello");
        let messages = wire_messages(&request);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hello");
    }

    #[test]
    fn test_request_temperature_falls_back_to_settings() {
        let settings = ModelSettings {
            temperature: 0.2,
            ..ModelSettings::default()
        };

        let plain = ModelRequest::new("sys", "hi");
        let body = completion_request(&settings, &plain);
        assert_eq!(body.temperature, 0.2);
        assert_eq!(body.model, "gpt-4.1-nano");
        assert!(body.response_format.is_none());

        let pinned = ModelRequest::new("sys", "hi")
            .with_temperature(0.0)
            .with_model(Some("other-model".to_string()))
            .json();
        let body = completion_request(&settings, &pinned);
        assert_eq!(body.temperature, 0.0);
        assert_eq!(body.model, "other-model");
        assert_eq!(serde_json::to_value(&body).unwrap()["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_settings_debug_redacts_key() {
        let settings = ModelSettings {
            api_key: Some("sk-secret".to_string()),
            ..ModelSettings::default()
        };
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
