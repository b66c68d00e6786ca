//! Text Intelligence capabilities consumed by the retrieval pipeline.
//!
//! Both traits are synchronous and object-safe so the orchestrator can hold
//! them as `Arc<dyn ...>`. Adapters for real model endpoints live in the
//! calling application; tests use scripted doubles.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum IntelligenceError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected response: {0}")]
    Response(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One message in a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// `embed(text) -> vector`. Must be deterministic for a fixed model.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, IntelligenceError>;
}

/// `complete(messages) -> text`. May fail; retries belong to the caller.
pub trait Completer: Send + Sync {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, IntelligenceError>;
}
