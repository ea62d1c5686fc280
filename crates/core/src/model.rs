//! Model trait — the abstraction over the language-model collaborator.
//!
//! A Model receives the ordered conversation, a system instruction and the
//! declared tools, and replies with ordered content parts plus token usage.
//! The core never assumes a transport; it only depends on this shape and on
//! errors being classifiable as retryable or not.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::message::Turn;

/// Whether the model may answer with function calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionCallingMode {
    /// The model decides between text and function calls
    #[default]
    Auto,
    /// Text only
    None,
}

/// A tool declaration sent to the model so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A request to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,

    /// The conversation turns, oldest first
    pub turns: Vec<Turn>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    #[serde(default)]
    pub mode: FunctionCallingMode,
}

impl ModelRequest {
    /// A text-only request with no tools.
    pub fn text_only(system_instruction: impl Into<String>, turns: Vec<Turn>) -> Self {
        Self {
            system_instruction: Some(system_instruction.into()),
            turns,
            tools: Vec::new(),
            mode: FunctionCallingMode::None,
        }
    }
}

/// One part of a model reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePart {
    Text {
        text: String,
    },
    FunctionCall {
        name: String,
        args: serde_json::Map<String, serde_json::Value>,
    },
}

/// Token usage reported by the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_count: u64,
    pub candidate_count: u64,
}

/// A complete reply from the model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelResponse {
    pub parts: Vec<ResponsePart>,
    pub usage: Usage,
}

impl ModelResponse {
    /// A reply consisting of a single text part.
    pub fn text(text: impl Into<String>, usage: Usage) -> Self {
        Self {
            parts: vec![ResponsePart::Text { text: text.into() }],
            usage,
        }
    }

    /// All text parts joined by newlines.
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ResponsePart::Text { text } => Some(text.as_str()),
                ResponsePart::FunctionCall { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The core Model trait.
///
/// The orchestrator, the edit generator and the execution analyzer all talk
/// to the model through this trait without knowing the backend.
#[async_trait]
pub trait Model: Send + Sync {
    /// A human-readable name (e.g. "gemini").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ModelError>;
}
