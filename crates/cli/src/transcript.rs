//! Markdown export of a conversation (the `save chat` command).

use chrono::{DateTime, Local};
use patchloop_core::message::{ContentPart, Role, Turn};
use std::fmt::Write as _;

/// `Chat_HHMM.md` for the given time.
pub fn file_name(now: DateTime<Local>) -> String {
    format!("Chat_{}.md", now.format("%H%M"))
}

/// Render every turn, tool exchanges included.
pub fn render(turns: &[Turn]) -> String {
    let mut out = String::from("# Patchloop Chat Log\n\n");

    for turn in turns {
        for part in &turn.parts {
            match part {
                ContentPart::Text { text } => {
                    let heading = match turn.role {
                        Role::User => "User",
                        Role::Model => "Assistant",
                    };
                    let _ = write!(out, "## {heading}\n\n{}\n\n", text.trim());
                }
                ContentPart::Image { mime, data } => {
                    let _ = write!(out, "*[image: {mime}, {} bytes]*\n\n", data.len());
                }
                ContentPart::ToolCall { name, args } => {
                    let args = serde_json::to_string_pretty(args).unwrap_or_default();
                    let _ = write!(out, "### Tool Use: {name}\n\n```json\n{args}\n```\n\n");
                }
                ContentPart::ToolResult { outcome, .. } => {
                    let label = if outcome.is_error { "Tool Error" } else { "Tool Result" };
                    let _ = write!(out, "### {label}\n\n```\n{}\n```\n\n", outcome.content.trim_end());
                }
            }
        }
    }
    out
}
