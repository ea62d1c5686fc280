//! Shared test helpers: a scripted model and a small tool set.

use async_trait::async_trait;
use patchloop_core::error::{ModelError, ToolError};
use patchloop_core::event::EventBus;
use patchloop_core::model::{Model, ModelRequest, ModelResponse, ResponsePart, Usage};
use patchloop_core::tool::{Tool, ToolArgs, ToolOutcome, ToolRegistry};
use patchloop_tools::cache::{FileCache, MARKER_READ};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::session::Session;

/// A model that replays a fixed script and records every request.
///
/// Panics if called more often than the script allows.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<ModelResponse, ModelError>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<ModelResponse, ModelError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Model for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedModel: no reply for call #{call}"))
    }
}

/// A text reply with one token in and one out.
pub fn text(text: &str) -> ModelResponse {
    ModelResponse::text(
        text,
        Usage {
            prompt_count: 1,
            candidate_count: 1,
        },
    )
}

pub fn call(name: &str, args: serde_json::Value) -> ResponsePart {
    ResponsePart::FunctionCall {
        name: name.into(),
        args: args.as_object().cloned().unwrap_or_default(),
    }
}

/// Returns its `text` argument.
struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the text back"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolOutcome, ToolError> {
        Ok(ToolOutcome::success(args.required_str("text")?))
    }
}

/// Puts `path` into the cache and reports it with the read marker.
struct MaterializeTool {
    cache: Arc<FileCache>,
}

#[async_trait]
impl Tool for MaterializeTool {
    fn name(&self) -> &str {
        "materialize"
    }

    fn description(&self) -> &str {
        "Load a file into context"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolOutcome, ToolError> {
        let path = args.required_str("path")?;
        self.cache.insert(path, format!("contents of {path}"));
        Ok(ToolOutcome::success(format!("File '{path}' {MARKER_READ}.")))
    }
}

/// An orchestrator over `model` with the echo and materialize tools.
pub fn orchestrator(model: Arc<ScriptedModel>) -> Orchestrator {
    orchestrator_with(model, OrchestratorConfig::default())
}

pub fn orchestrator_with(model: Arc<ScriptedModel>, config: OrchestratorConfig) -> Orchestrator {
    let session = Session::default();
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(EchoTool)).unwrap();
    registry
        .register(Box::new(MaterializeTool {
            cache: session.cache.clone(),
        }))
        .unwrap();

    Orchestrator::new(
        model,
        Arc::new(registry),
        session,
        config,
        Arc::new(EventBus::new(64)),
    )
}
