//! `edit_and_apply` — model-generated search/replace edits for one file.

use async_trait::async_trait;
use patchloop_core::error::ToolError;
use patchloop_core::tool::{Tool, ToolArgs, ToolOutcome};
use tracing::warn;

use crate::ToolContext;
use crate::cache::MARKER_UPDATED;
use crate::diff::diff_stats;
use crate::editor::EditStatus;

pub struct EditAndApplyTool {
    ctx: ToolContext,
}

impl EditAndApplyTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for EditAndApplyTool {
    fn name(&self) -> &str {
        "edit_and_apply"
    }

    fn description(&self) -> &str {
        "Apply changes to an existing file. Describe the changes in plain language; a code \
         editor turns them into precise search/replace edits, applies them and retries edits \
         that do not match. Use this instead of create_file to modify files."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path of the file to edit"
                },
                "instructions": {
                    "type": "string",
                    "description": "Detailed instructions describing the changes to make"
                },
                "project_context": {
                    "type": "string",
                    "description": "Relevant context about the project and the goal of the change"
                }
            },
            "required": ["path", "instructions"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolOutcome, ToolError> {
        let path = args.required_str("path")?;
        let instructions = args.required_str("instructions")?;
        let project_context = args.optional_str("project_context").unwrap_or_default();
        let resolved = self.ctx.resolve(path);

        let status = match self
            .ctx
            .editor
            .edit_and_apply(&resolved, instructions, project_context, self.ctx.max_retries)
            .await
        {
            Ok(status) => status,
            Err(e) => {
                warn!(path, error = %e, "Could not load file for editing");
                return Ok(ToolOutcome::error(format!("Error editing '{path}': {e}")));
            }
        };

        Ok(match status {
            EditStatus::Applied { diff, rounds } => {
                let (added, removed) = diff_stats(&diff);
                ToolOutcome::success(format!(
                    "Changes applied to {path} in {rounds} round(s) (+{added} -{removed}):\n{diff}\n{MARKER_UPDATED}."
                ))
            }
            EditStatus::NoChangesSuggested => {
                ToolOutcome::success(format!("No changes suggested for {path}."))
            }
            EditStatus::ExhaustedRetries {
                failed,
                diff,
                rounds,
            } => {
                let mut message = format!(
                    "Could not apply {} edit(s) to {path} after {rounds} attempt(s):\n",
                    failed.len()
                );
                for search in &failed {
                    message.push_str(&format!("<SEARCH>\n{search}\n</SEARCH>\n"));
                }
                if let Some(diff) = diff {
                    message.push_str("\nPartial changes were written:\n");
                    message.push_str(&diff);
                }
                ToolOutcome::error(message)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::EditInstruction;
    use crate::editor::{EditGenerator, EditRequest};
    use crate::testing;
    use std::sync::Arc;

    struct UppercaseB;

    #[async_trait]
    impl EditGenerator for UppercaseB {
        async fn generate_edit_instructions(&self, _: &EditRequest) -> Vec<EditInstruction> {
            vec![EditInstruction::new("b", "B").unwrap()]
        }
    }

    fn args(value: serde_json::Value) -> ToolArgs {
        ToolArgs::new(value.as_object().cloned().unwrap())
    }

    #[tokio::test]
    async fn applied_edit_reports_marker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "a\nb\nc\n").unwrap();
        let tool = EditAndApplyTool::new(testing::context_with(dir.path(), Arc::new(UppercaseB)));

        let outcome = tool
            .execute(&args(serde_json::json!({"path": "f.txt", "instructions": "uppercase b"})))
            .await
            .unwrap();
        assert!(!outcome.is_error);
        assert!(outcome.content.contains(MARKER_UPDATED));
        assert!(outcome.content.contains("(+1 -1)"));
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "a\nB\nc\n");
    }

    #[tokio::test]
    async fn exhausted_retries_is_error_without_marker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "xyz\n").unwrap();
        let tool = EditAndApplyTool::new(testing::context_with(dir.path(), Arc::new(UppercaseB)));

        let outcome = tool
            .execute(&args(serde_json::json!({"path": "f.txt", "instructions": "uppercase b"})))
            .await
            .unwrap();
        assert!(outcome.is_error);
        assert!(!outcome.content.contains(MARKER_UPDATED));
        assert!(outcome.content.contains("after 3 attempt(s)"));
    }

    #[tokio::test]
    async fn no_changes_suggested() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "x\n").unwrap();
        let tool = EditAndApplyTool::new(testing::context(dir.path()));
        let outcome = tool
            .execute(&args(serde_json::json!({"path": "f.txt", "instructions": "nothing"})))
            .await
            .unwrap();
        assert!(!outcome.is_error);
        assert!(outcome.content.starts_with("No changes suggested"));
    }

    #[tokio::test]
    async fn missing_file_is_error_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let tool = EditAndApplyTool::new(testing::context(dir.path()));
        let outcome = tool
            .execute(&args(serde_json::json!({"path": "gone.txt", "instructions": "x"})))
            .await
            .unwrap();
        assert!(outcome.is_error);
        assert!(outcome.content.contains("gone.txt"));
    }
}
