//! Built-in tools for Patchloop.
//!
//! Tools give the agent the ability to act on the project: create folders and
//! files, read and list them, edit them through search/replace patches, and
//! run code or shell commands in the execution environment.
//!
//! Besides the tools themselves this crate holds the machinery they share:
//! the [`cache::FileCache`], the [`diff`] engine and [`editor`] retry loop,
//! and the [`process`] manager.

pub mod cache;
pub mod diff;
pub mod editor;
pub mod file_edit;
pub mod file_read;
pub mod file_write;
pub mod list_files;
pub mod process;
pub mod shell;

use patchloop_core::error::ToolError;
use patchloop_core::fs::Filesystem;
use patchloop_core::tool::ToolRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub use cache::{CacheLookup, FileCache, MATERIALIZED_MARKERS};
pub use diff::{ApplyReport, EditInstruction, apply_edits, generate_diff};
pub use editor::{EditGenerator, EditRequest, EditStatus, FileEditor, ModelEditGenerator};
pub use process::{
    ExecutionAnalyzer, ExecutionEnvironment, ExecutionResult, ExecutionSummary, ProcessManager,
    ProcessStatus, StopOutcome, Terminator, platform_terminator,
};

/// Shared handles the built-in tools operate on.
#[derive(Clone)]
pub struct ToolContext {
    /// Relative tool paths resolve against this directory
    pub root: PathBuf,
    pub fs: Arc<dyn Filesystem>,
    pub cache: Arc<FileCache>,
    pub editor: Arc<FileEditor>,
    pub processes: Arc<ProcessManager>,
    /// Optional model summary appended to execution results
    pub analyzer: Option<Arc<dyn ExecutionSummary>>,
    /// How long `execute_code` / `run_shell_command` wait before reporting
    /// the process as still running
    pub timeout: Duration,
    /// Generation rounds allowed per `edit_and_apply` call
    pub max_retries: u32,
}

impl ToolContext {
    pub fn resolve(&self, path: &str) -> PathBuf {
        patchloop_core::fs::resolve(&self.root, path)
    }
}

/// Create a registry with every built-in tool.
pub fn default_registry(ctx: ToolContext) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(file_write::CreateFolderTool::new(ctx.clone())))?;
    registry.register(Box::new(file_write::CreateFileTool::new(ctx.clone())))?;
    registry.register(Box::new(file_read::ReadFileTool::new(ctx.clone())))?;
    registry.register(Box::new(file_read::ReadMultipleFilesTool::new(ctx.clone())))?;
    registry.register(Box::new(list_files::ListFilesTool::new(ctx.clone())))?;
    registry.register(Box::new(file_edit::EditAndApplyTool::new(ctx.clone())))?;
    registry.register(Box::new(shell::ExecuteCodeTool::new(ctx.clone())))?;
    registry.register(Box::new(shell::RunShellCommandTool::new(ctx.clone())))?;
    registry.register(Box::new(shell::StopProcessTool::new(ctx)))?;
    Ok(registry)
}
