//! Curriculum chat with external LLM streaming (OpenAI/Anthropic/Groq).
//!
//! A question is classified by subject, mapped to a response template,
//! wrapped around passages retrieved from the knowledge store, and sent to
//! the configured provider. Generated answers are checked against the
//! template's practice-item contract.

pub mod config;
pub mod prompt;
pub mod providers;
pub mod service;
pub mod templates;
pub mod types;
pub mod validate;

pub use config::GenerationConfig;
pub use service::{ChatService, PreparedChat};
pub use templates::{select_template, TemplateDescriptor, TemplateKind};
pub use types::*;
pub use validate::{validate_response, ValidationReport};
