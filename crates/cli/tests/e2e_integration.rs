//! End-to-end tests for the Patchloop agent.
//!
//! These run full turns through the runtime the CLI builds: real tools on a
//! temporary project directory, with scripted models standing in for the
//! main and editor models.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use patchloop_agent::{AutomodeOutcome, InterruptFlag, Runtime, build_runtime};
use patchloop_config::AppConfig;
use patchloop_core::error::ModelError;
use patchloop_core::event::DomainEvent;
use patchloop_core::message::{ContentPart, Role};
use patchloop_core::model::{Model, ModelRequest, ModelResponse, ResponsePart, Usage};
use patchloop_telemetry::ModelRole;
use patchloop_tools::cache::{MARKER_CREATED, MARKER_UPDATED};

// ── Scripted Model ───────────────────────────────────────────────────────

/// A model that returns scripted replies in sequence and records requests.
struct ScriptedModel {
    replies: Mutex<VecDeque<ModelResponse>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    fn new(replies: Vec<ModelResponse>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Model for ScriptedModel {
    fn name(&self) -> &str {
        "e2e_scripted"
    }

    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front();
        Ok(reply.unwrap_or_else(|| panic!("ScriptedModel exhausted")))
    }
}

fn usage() -> Usage {
    Usage {
        prompt_count: 10,
        candidate_count: 5,
    }
}

fn text(reply: &str) -> ModelResponse {
    ModelResponse::text(reply, usage())
}

fn tool_call(name: &str, args: serde_json::Value) -> ModelResponse {
    ModelResponse {
        parts: vec![ResponsePart::FunctionCall {
            name: name.into(),
            args: args.as_object().cloned().unwrap(),
        }],
        usage: usage(),
    }
}

fn runtime(root: &Path, main: Arc<ScriptedModel>, editor: Arc<ScriptedModel>) -> Runtime {
    let mut config = AppConfig::default();
    config.execution.env_dir = Some(root.join(".env"));
    config.execution.interpreter = "sh".into();
    config.execution.timeout_secs = 5;
    build_runtime(&config, main, editor, root.to_path_buf()).unwrap()
}

// ── E2E: file creation ───────────────────────────────────────────────────

#[tokio::test]
async fn e2e_create_file_lands_in_system_instruction() {
    let dir = tempfile::tempdir().unwrap();
    let main = ScriptedModel::new(vec![
        tool_call(
            "create_file",
            serde_json::json!({"path": "hello.py", "content": "print('hello')\n"}),
        ),
        text("Created hello.py."),
        text("It prints hello."),
    ]);
    let editor = ScriptedModel::new(vec![]);
    let mut rt = runtime(dir.path(), main.clone(), editor);

    let out = rt
        .orchestrator
        .handle_user_message("Create hello.py that prints hello", None)
        .await;
    assert_eq!(out.response, "Created hello.py.");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("hello.py")).unwrap(),
        "print('hello')\n"
    );

    // The stored result carries the marker; the model never sees the pair.
    let stored = rt.orchestrator.session().conversation.current();
    assert!(matches!(
        &stored[2].parts[0],
        ContentPart::ToolResult { outcome, .. } if outcome.content.contains(MARKER_CREATED)
    ));

    rt.orchestrator
        .handle_user_message("What does it print?", None)
        .await;
    let last = main.requests().pop().unwrap();
    assert!(last.turns.iter().all(|t| {
        t.parts
            .iter()
            .all(|p| matches!(p, ContentPart::Text { .. }))
    }));
    assert!(
        last.system_instruction
            .unwrap()
            .contains("print('hello')")
    );
}

// ── E2E: edit_and_apply through the editor model ─────────────────────────

#[tokio::test]
async fn e2e_edit_and_apply_patches_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "alpha\nbeta\ngamma\n").unwrap();

    let main = ScriptedModel::new(vec![
        tool_call(
            "edit_and_apply",
            serde_json::json!({
                "path": "notes.txt",
                "instructions": "Uppercase beta",
                "project_context": "A notes file"
            }),
        ),
        text("Beta is now uppercase."),
    ]);
    let editor = ScriptedModel::new(vec![text(
        "<SEARCH>\nbeta\n</SEARCH>\n<REPLACE>\nBETA\n</REPLACE>",
    )]);
    let mut rt = runtime(dir.path(), main, editor.clone());
    let mut events = rt.events.subscribe();

    let out = rt
        .orchestrator
        .handle_user_message("Uppercase beta in notes.txt", None)
        .await;
    assert_eq!(out.response, "Beta is now uppercase.");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("notes.txt")).unwrap(),
        "alpha\nBETA\ngamma\n"
    );

    let stored = rt.orchestrator.session().conversation.current();
    assert!(matches!(
        &stored[2].parts[0],
        ContentPart::ToolResult { outcome, .. }
            if !outcome.is_error && outcome.content.contains(MARKER_UPDATED)
    ));

    let edit_prompt = editor.requests()[0].turns[0].text();
    assert!(edit_prompt.contains("Uppercase beta"));
    assert!(edit_prompt.contains("A notes file"));

    let mut saw_edit = false;
    while let Ok(event) = events.try_recv() {
        if matches!(&*event, DomainEvent::EditApplied { failed_edits: 0, .. }) {
            saw_edit = true;
        }
    }
    assert!(saw_edit);

    let tracker = &rt.orchestrator.session().tracker;
    assert_eq!(tracker.get(ModelRole::Main).input, 10);
    assert_eq!(tracker.get(ModelRole::ToolChecker).input, 10);
    assert_eq!(tracker.get(ModelRole::CodeEditor).input, 10);
}

#[tokio::test]
async fn e2e_edit_that_never_matches_reports_failure() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "alpha\n").unwrap();

    let main = ScriptedModel::new(vec![
        tool_call(
            "edit_and_apply",
            serde_json::json!({"path": "notes.txt", "instructions": "Change zeta"}),
        ),
        text("I could not find zeta."),
    ]);
    let bad = "<SEARCH>\nzeta\n</SEARCH>\n<REPLACE>\nZETA\n</REPLACE>";
    let editor = ScriptedModel::new(vec![text(bad), text(bad), text(bad)]);
    let mut rt = runtime(dir.path(), main, editor.clone());

    rt.orchestrator
        .handle_user_message("Change zeta", None)
        .await;

    assert_eq!(editor.requests().len(), 3);
    // The retry prompt keeps the original instructions.
    assert!(editor.requests()[2].turns[0].text().contains("Change zeta"));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("notes.txt")).unwrap(),
        "alpha\n"
    );
    let stored = rt.orchestrator.session().conversation.current();
    assert!(matches!(
        &stored[2].parts[0],
        ContentPart::ToolResult { outcome, .. } if outcome.is_error
    ));
}

// ── E2E: code execution ──────────────────────────────────────────────────

#[cfg(unix)]
#[tokio::test]
async fn e2e_execute_code_reports_output_and_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let main = ScriptedModel::new(vec![
        tool_call("execute_code", serde_json::json!({"code": "echo hello-e2e"})),
        // Execution analysis runs on the main model inside the tool.
        text("The script printed a greeting."),
        text("It worked."),
    ]);
    let editor = ScriptedModel::new(vec![]);
    let mut rt = runtime(dir.path(), main, editor);

    let out = rt
        .orchestrator
        .handle_user_message("Run a greeting", None)
        .await;
    assert_eq!(out.response, "It worked.");

    let stored = rt.orchestrator.session().conversation.current();
    let ContentPart::ToolResult { outcome, .. } = &stored[2].parts[0] else {
        panic!("expected a tool result");
    };
    assert!(!outcome.is_error);
    assert!(outcome.content.contains("hello-e2e"));
    assert!(outcome.content.contains("Return Code: 0"));
    assert!(outcome.content.contains("The script printed a greeting."));
    assert_eq!(
        rt.orchestrator
            .session()
            .tracker
            .get(ModelRole::CodeExecution)
            .input,
        10
    );
    assert!(rt.processes.running().await.is_empty());
}

// ── E2E: automode ────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_automode_runs_tools_until_complete() {
    let dir = tempfile::tempdir().unwrap();
    let main = ScriptedModel::new(vec![
        tool_call("create_folder", serde_json::json!({"path": "src"})),
        text("Folder ready."),
        tool_call(
            "create_file",
            serde_json::json!({"path": "src/lib.rs", "content": "pub fn answer() -> u32 { 42 }\n"}),
        ),
        text("Library written. AUTOMODE_COMPLETE"),
    ]);
    let editor = ScriptedModel::new(vec![]);
    let mut rt = runtime(dir.path(), main.clone(), editor);

    let mut responses = Vec::new();
    let report = rt
        .orchestrator
        .run_automode("Scaffold a library", 5, &InterruptFlag::new(), |_, out| {
            responses.push(out.response.clone())
        })
        .await;

    assert_eq!(report.outcome, AutomodeOutcome::Completed);
    assert_eq!(report.iterations, 2);
    assert_eq!(responses, vec!["Folder ready.", "Library written. AUTOMODE_COMPLETE"]);
    assert!(dir.path().join("src/lib.rs").exists());

    let turns = rt.orchestrator.session().conversation.current();
    assert_eq!(turns.last().unwrap().role, Role::Model);
    assert!(main.requests()[0].system_instruction.as_deref().unwrap().contains("Automode"));
}

// ── E2E: reset ───────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_reset_forgets_files_and_usage() {
    let dir = tempfile::tempdir().unwrap();
    let main = ScriptedModel::new(vec![
        tool_call(
            "create_file",
            serde_json::json!({"path": "a.txt", "content": "a"}),
        ),
        text("Done."),
        text("Fresh start."),
    ]);
    let editor = ScriptedModel::new(vec![]);
    let mut rt = runtime(dir.path(), main.clone(), editor);

    rt.orchestrator.handle_user_message("make a.txt", None).await;
    rt.orchestrator.reset();
    rt.orchestrator.handle_user_message("hello", None).await;

    let last = main.requests().pop().unwrap();
    assert_eq!(last.turns.len(), 1);
    assert!(!last.system_instruction.unwrap().contains("a.txt"));
    assert_eq!(rt.orchestrator.session().tracker.get(ModelRole::Main).input, 10);
}
