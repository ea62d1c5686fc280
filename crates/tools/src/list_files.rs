//! Directory listing tool.

use async_trait::async_trait;
use patchloop_core::error::ToolError;
use patchloop_core::tool::{Tool, ToolArgs, ToolOutcome};

use crate::ToolContext;

pub struct ListFilesTool {
    ctx: ToolContext,
}

impl ListFilesTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the files and folders in a directory. Folders are shown with a trailing '/'. \
         Defaults to the project root."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The directory to list (default: the project root)"
                }
            }
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolOutcome, ToolError> {
        let path = args.optional_str("path").unwrap_or(".");
        let entries = match self.ctx.fs.list_dir(&self.ctx.resolve(path)).await {
            Ok(entries) => entries,
            Err(e) => return Ok(ToolOutcome::error(format!("Error listing files: {e}"))),
        };

        if entries.is_empty() {
            return Ok(ToolOutcome::success(format!("Directory '{path}' is empty")));
        }
        let listing = entries
            .iter()
            .map(|e| {
                if e.is_dir {
                    format!("{}/", e.name)
                } else {
                    e.name.clone()
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ToolOutcome::success(listing))
    }
}
