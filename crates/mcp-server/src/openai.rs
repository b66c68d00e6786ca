//! OpenAI-compatible Text Intelligence adapter (`/chat/completions`,
//! `/embeddings`).
//!
//! Works with any endpoint that speaks the OpenAI wire format: OpenAI itself,
//! Ollama, LM Studio, vLLM. Wire types stay private to this module.

use graphloom_retrieval::{ChatMessage, Completer, Embedder, IntelligenceError};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    /// Base URL without the endpoint path, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub chat_model: String,
    pub embed_model: String,
    /// `None` for keyless local servers.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct OpenAiCompatible {
    client: Client,
    settings: OpenAiSettings,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiCompatible {
    pub fn new(settings: OpenAiSettings) -> Result<Self, IntelligenceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| IntelligenceError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, settings })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.settings.base_url.trim_end_matches('/'))
    }

    fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, IntelligenceError> {
        let url = self.endpoint(path);
        let mut req = self.client.post(&url).json(body);
        if let Some(key) = &self.settings.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().map_err(|e| {
            error!(url = %url, error = %e, "model request failed (transport)");
            IntelligenceError::Request(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            error!(url = %url, %status, "model endpoint returned an error");
            return Err(IntelligenceError::Request(format!("HTTP {status}: {body}")));
        }

        response
            .json::<R>()
            .map_err(|e| IntelligenceError::Response(e.to_string()))
    }
}

impl Completer for OpenAiCompatible {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, IntelligenceError> {
        let request = ChatRequest {
            model: &self.settings.chat_model,
            messages,
            temperature: 0.0,
        };
        debug!(model = %self.settings.chat_model, messages = messages.len(), "sending chat request");

        let response: ChatResponse = self.post("chat/completions", &request)?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| IntelligenceError::Response("response has no message content".into()))
    }
}

impl Embedder for OpenAiCompatible {
    fn embed(&self, text: &str) -> Result<Vec<f32>, IntelligenceError> {
        let request = EmbeddingRequest {
            model: &self.settings.embed_model,
            input: text,
        };
        let response: EmbeddingResponse = self.post("embeddings", &request)?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| IntelligenceError::Response("response has no embedding".into()))
    }
}
