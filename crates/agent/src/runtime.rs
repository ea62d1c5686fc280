//! Wiring: builds an orchestrator and its tools from configuration.

use patchloop_config::AppConfig;
use patchloop_core::error::ToolError;
use patchloop_core::event::EventBus;
use patchloop_core::fs::{Filesystem, LocalFilesystem};
use patchloop_core::model::Model;
use patchloop_telemetry::{ModelPricing, TokenTracker};
use patchloop_tools::cache::FileCache;
use patchloop_tools::editor::{FileEditor, ModelEditGenerator};
use patchloop_tools::process::{
    ExecutionAnalyzer, ExecutionEnvironment, ExecutionSummary, ProcessManager, platform_terminator,
};
use patchloop_tools::{ToolContext, default_registry};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::session::Session;

/// A ready-to-use agent plus the handles the front-end needs directly.
pub struct Runtime {
    pub orchestrator: Orchestrator,
    /// Background processes are stopped through this on exit
    pub processes: Arc<ProcessManager>,
    pub events: Arc<EventBus>,
}

/// Assemble a runtime rooted at `root`.
///
/// `main` drives the conversation, tool follow-ups and execution summaries;
/// `editor` generates search/replace edits.
pub fn build_runtime(
    config: &AppConfig,
    main: Arc<dyn Model>,
    editor: Arc<dyn Model>,
    root: PathBuf,
) -> Result<Runtime, ToolError> {
    let events = Arc::new(EventBus::default());
    let cache = Arc::new(FileCache::new());
    let tracker = Arc::new(TokenTracker::new(
        config.max_context_tokens,
        ModelPricing::new(config.pricing.input_per_m, config.pricing.output_per_m),
    ));
    let fs: Arc<dyn Filesystem> = Arc::new(LocalFilesystem);

    let generator = Arc::new(ModelEditGenerator::new(
        editor,
        tracker.clone(),
        config.editor.memory_limit,
    ));
    let file_editor = Arc::new(
        FileEditor::new(fs.clone(), cache.clone(), generator).with_events(events.clone()),
    );

    let environment = Arc::new(ExecutionEnvironment::new(
        config.env_dir(),
        config.execution.interpreter.clone(),
    ));
    let processes = Arc::new(ProcessManager::new(environment, platform_terminator()));
    let analyzer: Arc<dyn ExecutionSummary> =
        Arc::new(ExecutionAnalyzer::new(main.clone(), tracker.clone()));

    let tools = default_registry(ToolContext {
        root: root.clone(),
        fs,
        cache: cache.clone(),
        editor: file_editor.clone(),
        processes: processes.clone(),
        analyzer: Some(analyzer),
        timeout: Duration::from_secs(config.execution.timeout_secs),
        max_retries: config.editor.max_retries,
    })?;
    info!(root = %root.display(), tools = tools.len(), "Runtime ready");

    let orchestrator = Orchestrator::new(
        main,
        Arc::new(tools),
        Session::new(cache, tracker),
        OrchestratorConfig::from_app_config(config),
        events.clone(),
    )
    .with_editor(file_editor);

    Ok(Runtime {
        orchestrator,
        processes,
        events,
    })
}
