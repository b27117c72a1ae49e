use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::GenerateError;

/// Which backend produces the completion.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// The embedding host's generic raw-completion capability.
    Default,
    /// Ollama-style local HTTP server (`/api/generate`).
    Local,
    /// OpenAI-compatible HTTP endpoint (`/chat/completions`).
    Openai,
    /// A saved connection profile, resolved by the host's profile registry.
    Profile,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Default => write!(f, "default"),
            SourceKind::Local => write!(f, "local"),
            SourceKind::Openai => write!(f, "openai"),
            SourceKind::Profile => write!(f, "profile"),
        }
    }
}

// -- Ollama wire types ------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct OllamaGenerateRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub stream: bool,
    pub options: OllamaOptions,
}

#[derive(Debug, Serialize)]
pub struct OllamaOptions {
    pub num_ctx: u32,
    pub num_predict: u32,
    pub stop: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct OllamaGenerateResponse {
    pub response: String,
}

// -- OpenAI-compatible wire types -------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
}

impl ChatCompletionResponse {
    /// First choice's content, or a `Backend` error when the list is empty.
    pub fn into_text(self) -> Result<String, GenerateError> {
        self.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GenerateError::backend("response contained no choices"))
    }
}

// -- Profile request service response ---------------------------------------

/// What the host's profile request service hands back. Hosts are loose about
/// this: some extract the text up front, some return the raw chat-completion
/// body, some return a bare string. All three are accepted.
#[derive(Debug)]
pub enum ProfileResponse {
    Extracted { content: String },
    Chat(ChatCompletionResponse),
    Text(String),
}

impl ProfileResponse {
    pub fn into_text(self) -> Result<String, GenerateError> {
        match self {
            ProfileResponse::Extracted { content } => Ok(content),
            ProfileResponse::Chat(body) => body.into_text(),
            ProfileResponse::Text(s) => Ok(s),
        }
    }
}
