//! Chat types for the `/api/chat` surface.

use edusage_ingest::TopicClassification;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::templates::TemplateKind;
use crate::validate::ValidationReport;

/// LLM provider identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    OpenAI,
    Anthropic,
    Groq,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Groq => write!(f, "groq"),
        }
    }
}

/// Chat message in conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// Incoming chat request: `{ messages: [{ role, content }] }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// The last message, if it is a non-blank user turn.
    pub fn question(&self) -> Option<&str> {
        self.messages
            .last()
            .filter(|m| m.role == "user")
            .map(|m| m.content.trim())
            .filter(|q| !q.is_empty())
    }

    /// Everything before the question.
    pub fn history(&self) -> &[ChatMessage] {
        match self.messages.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }
}

/// A retrieved passage as reported back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatContext {
    pub id: i64,
    pub source: String,
    pub excerpt: String,
    pub score: f64,
}

/// Non-streaming completion response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    pub message: String,
    pub model: String,
    pub topic: TopicClassification,
    pub template: TemplateKind,
    pub validation: ValidationReport,
    /// Whether the first answer failed validation and was generated again.
    pub regenerated: bool,
    pub context: Vec<ChatContext>,
    pub duration: u64,
}

/// Error body for chat failures: `{ message, error }`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatErrorBody {
    pub message: String,
    pub error: String,
}

/// Why a chat request could not be answered.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("No question in request")]
    MissingQuestion,

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("No LLM provider configured")]
    NoProvider,

    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] edusage_core::Error),

    #[error("Generation failed: {0}")]
    Generation(String),
}

impl ChatError {
    pub fn body(&self) -> ChatErrorBody {
        ChatErrorBody {
            message: "Error Processing Request".into(),
            error: self.to_string(),
        }
    }
}
