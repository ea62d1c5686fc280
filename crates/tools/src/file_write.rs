//! File write tools — create folders and files.

use async_trait::async_trait;
use patchloop_core::error::ToolError;
use patchloop_core::tool::{Tool, ToolArgs, ToolOutcome};
use tracing::debug;

use crate::ToolContext;
use crate::cache::{CacheLookup, MARKER_CREATED};
use crate::diff::generate_diff;

pub struct CreateFolderTool {
    ctx: ToolContext,
}

impl CreateFolderTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for CreateFolderTool {
    fn name(&self) -> &str {
        "create_folder"
    }

    fn description(&self) -> &str {
        "Create a new folder at the specified path, including any missing parent folders. \
         Use this to set up the project structure before creating files."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path where the folder should be created"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolOutcome, ToolError> {
        let path = args.required_str("path")?;
        let resolved = self.ctx.resolve(path);
        match self.ctx.fs.create_dir_all(&resolved).await {
            Ok(()) => Ok(ToolOutcome::success(format!("Folder created: {path}"))),
            Err(e) => Ok(ToolOutcome::error(format!("Error creating folder: {e}"))),
        }
    }
}

pub struct CreateFileTool {
    ctx: ToolContext,
}

impl CreateFileTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for CreateFileTool {
    fn name(&self) -> &str {
        "create_file"
    }

    fn description(&self) -> &str {
        "Create a new file at the specified path with the given content. Parent folders are \
         created as needed. An existing file is overwritten. The file's content becomes part \
         of the context for later turns."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path where the file should be created"
                },
                "content": {
                    "type": "string",
                    "description": "The full content of the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolOutcome, ToolError> {
        let path = args.required_str("path")?;
        let content = args.required_str("content")?;
        let resolved = self.ctx.resolve(path);

        let previous = match self.ctx.cache.lookup(&resolved) {
            CacheLookup::Found(previous) => Some(previous),
            CacheLookup::NotFound => self.ctx.fs.read_to_string(&resolved).await.ok(),
        };

        if let Err(e) = self.ctx.fs.write(&resolved, content).await {
            return Ok(ToolOutcome::error(format!("Error creating file: {e}")));
        }
        self.ctx.cache.insert(&resolved, content);
        debug!(path = %resolved.display(), bytes = content.len(), "Created file");

        let mut message = format!("{MARKER_CREATED}: {path}");
        if let Some(previous) = previous.filter(|p| p != content) {
            message.push_str("\nOverwrote existing content:\n");
            message.push_str(&generate_diff(&previous, content, path));
        }
        Ok(ToolOutcome::success(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn args(value: serde_json::Value) -> ToolArgs {
        ToolArgs::new(value.as_object().cloned().unwrap())
    }

    #[tokio::test]
    async fn create_folder_nested() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CreateFolderTool::new(testing::context(dir.path()));
        let outcome = tool
            .execute(&args(serde_json::json!({"path": "a/b/c"})))
            .await
            .unwrap();
        assert!(!outcome.is_error);
        assert!(dir.path().join("a/b/c").is_dir());
    }

    #[tokio::test]
    async fn create_file_writes_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context(dir.path());
        let tool = CreateFileTool::new(ctx.clone());

        let outcome = tool
            .execute(&args(serde_json::json!({
                "path": "src/main.py",
                "content": "print('hi')\n"
            })))
            .await
            .unwrap();

        assert!(!outcome.is_error);
        assert!(outcome.content.contains(MARKER_CREATED));
        let path = dir.path().join("src/main.py");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "print('hi')\n");
        assert_eq!(ctx.cache.lookup(&path), CacheLookup::Found("print('hi')\n".into()));
    }

    #[tokio::test]
    async fn overwrite_reports_diff() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "old\n").unwrap();
        let tool = CreateFileTool::new(testing::context(dir.path()));

        let outcome = tool
            .execute(&args(serde_json::json!({"path": "f.txt", "content": "new\n"})))
            .await
            .unwrap();
        assert!(outcome.content.contains("-old"));
        assert!(outcome.content.contains("+new"));
    }
}
