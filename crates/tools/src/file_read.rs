//! File read tools — load files from storage into the cache.
//!
//! Reads always go to storage so the cache picks up edits made outside the
//! agent. The content itself is not echoed back: the cache is rendered into
//! the system instruction, and the tool result only confirms the read.

use async_trait::async_trait;
use patchloop_core::error::ToolError;
use patchloop_core::tool::{Tool, ToolArgs, ToolOutcome};
use tracing::debug;

use crate::ToolContext;
use crate::cache::MARKER_READ;

pub struct ReadFileTool {
    ctx: ToolContext,
}

impl ReadFileTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

/// Read one file into the cache and describe the result.
async fn read_into_cache(ctx: &ToolContext, path: &str) -> Result<String, String> {
    let resolved = ctx.resolve(path);
    match ctx.fs.read_to_string(&resolved).await {
        Ok(content) => {
            debug!(path = %resolved.display(), bytes = content.len(), "Read file");
            ctx.cache.insert(&resolved, content);
            Ok(format!("File '{path}' {MARKER_READ}."))
        }
        Err(e) => Err(format!("Error reading file '{path}': {e}")),
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. The content is added to the context for this and \
         later turns, so there is no need to read the same file again unless it changed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path of the file to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolOutcome, ToolError> {
        let path = args.required_str("path")?;
        Ok(match read_into_cache(&self.ctx, path).await {
            Ok(message) => ToolOutcome::success(message),
            Err(message) => ToolOutcome::error(message),
        })
    }
}

pub struct ReadMultipleFilesTool {
    ctx: ToolContext,
}

impl ReadMultipleFilesTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for ReadMultipleFilesTool {
    fn name(&self) -> &str {
        "read_multiple_files"
    }

    fn description(&self) -> &str {
        "Read several files at once. Their contents are added to the context. \
         Use this instead of repeated read_file calls."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "paths": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "The paths of the files to read"
                }
            },
            "required": ["paths"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolOutcome, ToolError> {
        let paths = args.required_str_list("paths")?;
        if paths.is_empty() {
            return Err(ToolError::InvalidArguments("'paths' must not be empty".into()));
        }

        let mut lines = Vec::with_capacity(paths.len());
        let mut any_read = false;
        for path in &paths {
            match read_into_cache(&self.ctx, path).await {
                Ok(message) => {
                    any_read = true;
                    lines.push(message);
                }
                Err(message) => lines.push(message),
            }
        }

        let content = lines.join("\n");
        Ok(if any_read {
            ToolOutcome::success(content)
        } else {
            ToolOutcome::error(content)
        })
    }
}
