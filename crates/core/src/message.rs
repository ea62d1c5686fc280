//! Conversation domain types.
//!
//! A conversation is an ordered, append-only sequence of turns. Each turn
//! carries one or more content parts: plain text, an image, a tool call
//! requested by the model, or the result of running that tool.

use serde::{Deserialize, Serialize};

use crate::tool::ToolOutcome;

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user (and tool results, which are fed back on the user side)
    User,
    /// The language model
    Model,
}

/// One piece of content inside a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        data: Vec<u8>,
        mime: String,
    },
    ToolCall {
        name: String,
        args: serde_json::Map<String, serde_json::Value>,
    },
    ToolResult {
        name: String,
        outcome: ToolOutcome,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_call(
        name: impl Into<String>,
        args: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self::ToolCall {
            name: name.into(),
            args,
        }
    }

    pub fn tool_result(name: impl Into<String>, outcome: ToolOutcome) -> Self {
        Self::ToolResult {
            name: name.into(),
            outcome,
        }
    }

    /// The text payload, if this is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A single exchange unit in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl Turn {
    /// A user turn containing plain text.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![ContentPart::text(text)],
        }
    }

    /// A user turn with text and an attached image.
    pub fn user_with_image(text: impl Into<String>, data: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![
                ContentPart::text(text),
                ContentPart::Image {
                    data,
                    mime: mime.into(),
                },
            ],
        }
    }

    /// A model turn containing plain text.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![ContentPart::text(text)],
        }
    }

    /// A model turn requesting a single tool call.
    pub fn tool_call(
        name: impl Into<String>,
        args: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            role: Role::Model,
            parts: vec![ContentPart::tool_call(name, args)],
        }
    }

    /// A user-side turn carrying a tool's result back to the model.
    pub fn tool_result(name: impl Into<String>, outcome: ToolOutcome) -> Self {
        Self {
            role: Role::User,
            parts: vec![ContentPart::tool_result(name, outcome)],
        }
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The conversation store: chronological turns for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn. This is the only way turns enter the store.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// The full ordered sequence of turns.
    pub fn current(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Ensure the conversation ends on a model turn.
    ///
    /// If the last turn is a dangling user turn, a placeholder model turn
    /// with `acknowledgment` is appended. Returns whether a turn was added.
    pub fn close_with_model_turn(&mut self, acknowledgment: &str) -> bool {
        match self.turns.last() {
            Some(turn) if turn.role == Role::User => {
                self.turns.push(Turn::model(acknowledgment));
                true
            }
            _ => false,
        }
    }

    /// Drop every turn (the `reset` command).
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Get the total token count estimate (rough: 4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.turns.iter().map(|t| t.text().len() / 4).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_order() {
        let mut conv = Conversation::new();
        conv.append(Turn::user("first"));
        conv.append(Turn::model("second"));
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.current()[0].text(), "first");
        assert_eq!(conv.last().unwrap().role, Role::Model);
    }

    #[test]
    fn close_with_model_turn_only_when_dangling() {
        let mut conv = Conversation::new();
        conv.append(Turn::user("do the thing"));
        assert!(conv.close_with_model_turn("stopped"));
        assert_eq!(conv.last().unwrap().role, Role::Model);
        assert!(!conv.close_with_model_turn("stopped"));
        assert_eq!(conv.len(), 2);
    }

    #[test]
    fn close_on_empty_conversation_is_noop() {
        let mut conv = Conversation::new();
        assert!(!conv.close_with_model_turn("stopped"));
        assert!(conv.is_empty());
    }

    #[test]
    fn turn_text_joins_text_parts_only() {
        let turn = Turn {
            role: Role::Model,
            parts: vec![
                ContentPart::text("one"),
                ContentPart::tool_call("list_files", serde_json::Map::new()),
                ContentPart::text("two"),
            ],
        };
        assert_eq!(turn.text(), "one\ntwo");
    }

    #[test]
    fn content_part_serialization_is_tagged() {
        let part = ContentPart::tool_result("read_file", ToolOutcome::success("ok"));
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["outcome"]["is_error"], false);
    }

    #[test]
    fn conversation_token_estimate() {
        let mut conv = Conversation::new();
        // 20 chars ≈ 5 tokens
        conv.append(Turn::user("12345678901234567890"));
        assert_eq!(conv.estimated_tokens(), 5);
    }
}
