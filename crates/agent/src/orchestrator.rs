//! The conversation turn loop.
//!
//! One call to [`Orchestrator::handle_user_message`] runs a full turn:
//!
//! ```text
//! Idle → AwaitingModel → Responding ─────────────────────────────→ Idle
//!                             └→ DispatchingTools ⇄ AwaitingFollowup ┘
//! ```
//!
//! Tool calls from the main reply run one at a time in the order the model
//! produced them. After each one the conversation is re-sent in text-only
//! mode so the model can comment on the result before the next call.

use chrono::Utc;
use patchloop_config::AppConfig;
use patchloop_core::error::ModelError;
use patchloop_core::event::{DomainEvent, EventBus};
use patchloop_core::message::Turn;
use patchloop_core::model::{FunctionCallingMode, Model, ModelRequest, ModelResponse, ResponsePart};
use patchloop_core::tool::ToolRegistry;
use patchloop_telemetry::ModelRole;
use patchloop_tools::editor::FileEditor;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::automode::AutomodeStatus;
use crate::context::{filter_context, system_instruction};
use crate::session::Session;

/// Base system prompt for the main model.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert software engineer working directly \
in the user's project through a set of tools. You can create folders and files, read and list \
files, edit existing files, run code in an isolated environment and run shell commands.

Guidelines:
- Read a file before changing it, unless its current content is already shown under \
\"Files in context\".
- Use edit_and_apply for changes to existing files and create_file only for new files.
- Describe edits precisely: what to change, where, and why.
- After running code, look at the output and fix problems before moving on.
- Long-running programs keep running in the background; use stop_process with the reported \
process id to stop them.
- Keep answers focused. Explain what you did and what the user should check.";

/// Where a turn currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    AwaitingModel,
    Responding,
    DispatchingTools,
    AwaitingFollowup,
}

impl std::fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::AwaitingModel => "awaiting_model",
            Self::Responding => "responding",
            Self::DispatchingTools => "dispatching_tools",
            Self::AwaitingFollowup => "awaiting_followup",
        };
        f.write_str(name)
    }
}

/// Knobs for the turn loop.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub base_prompt: String,
    /// Sentinel that marks an automode goal as reached
    pub completion_phrase: String,
    /// Delay before re-issuing a rate-limited request
    pub rate_limit_backoff: Duration,
    pub max_rate_limit_retries: u32,
}

impl OrchestratorConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        let mut base_prompt = DEFAULT_SYSTEM_PROMPT.to_string();
        if let Some(extra) = config.system_prompt_extra.as_deref()
            && !extra.trim().is_empty()
        {
            base_prompt.push_str("\n\n");
            base_prompt.push_str(extra.trim());
        }
        Self {
            base_prompt,
            completion_phrase: config.agent.completion_phrase.clone(),
            rate_limit_backoff: Duration::from_secs(config.agent.rate_limit_backoff_secs),
            max_rate_limit_retries: config.agent.max_rate_limit_retries,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

/// An image sent along with a user message.
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    pub data: Vec<u8>,
    pub mime: String,
}

/// The visible result of one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutput {
    /// Everything the model said this turn, follow-ups included
    pub response: String,
    /// Whether the response contains the completion phrase
    pub completed: bool,
}

/// Drives turns between the user, the main model and the tools.
pub struct Orchestrator {
    model: Arc<dyn Model>,
    tools: Arc<ToolRegistry>,
    session: Session,
    config: OrchestratorConfig,
    events: Arc<EventBus>,
    /// Edit generator memory is cleared together with the session
    editor: Option<Arc<FileEditor>>,
    phase: TurnPhase,
    pub(crate) automode: Option<AutomodeStatus>,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn Model>,
        tools: Arc<ToolRegistry>,
        session: Session,
        config: OrchestratorConfig,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            model,
            tools,
            session,
            config,
            events,
            editor: None,
            phase: TurnPhase::Idle,
            automode: None,
        }
    }

    pub fn with_editor(mut self, editor: Arc<FileEditor>) -> Self {
        self.editor = Some(editor);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Start over: clear conversation, file cache, counters and editor memory.
    pub fn reset(&mut self) {
        self.session.reset();
        if let Some(editor) = &self.editor {
            editor.generator().reset();
        }
        self.automode = None;
        self.set_phase(TurnPhase::Idle);
    }

    /// Run one full turn for a user message.
    ///
    /// Never fails: model errors end the turn with an error message that is
    /// recorded as the model's reply.
    pub async fn handle_user_message(
        &mut self,
        text: &str,
        image: Option<ImageAttachment>,
    ) -> TurnOutput {
        let turn = match image {
            Some(image) => Turn::user_with_image(text, image.data, image.mime),
            None => Turn::user(text),
        };
        self.session.conversation.append(turn);

        self.set_phase(TurnPhase::AwaitingModel);
        let request = self.build_request(FunctionCallingMode::Auto);
        let reply = match self.generate_with_retry(request).await {
            Ok(reply) => reply,
            Err(e) => return self.fail_turn("generating response", &e),
        };
        self.record_usage(ModelRole::Main, &reply);

        self.set_phase(TurnPhase::Responding);
        let mut response = String::new();
        let mut calls = Vec::new();
        for part in reply.parts {
            match part {
                ResponsePart::Text { text } => push_paragraph(&mut response, &text),
                ResponsePart::FunctionCall { name, args } => calls.push((name, args)),
            }
        }
        debug!(tool_calls = calls.len(), "Main model replied");

        for (name, args) in calls {
            self.set_phase(TurnPhase::DispatchingTools);
            self.session
                .conversation
                .append(Turn::tool_call(&name, args.clone()));

            let started = Instant::now();
            let outcome = self.tools.dispatch(&name, args).await;
            let duration_ms = started.elapsed().as_millis() as u64;
            info!(tool = %name, is_error = outcome.is_error, duration_ms, "Tool executed");
            self.events.publish(DomainEvent::ToolExecuted {
                tool_name: name.clone(),
                is_error: outcome.is_error,
                duration_ms,
                timestamp: Utc::now(),
            });
            self.session
                .conversation
                .append(Turn::tool_result(&name, outcome));

            self.set_phase(TurnPhase::AwaitingFollowup);
            let request = self.build_request(FunctionCallingMode::None);
            match self.generate_with_retry(request).await {
                Ok(followup) => {
                    self.record_usage(ModelRole::ToolChecker, &followup);
                    push_paragraph(&mut response, &followup.joined_text());
                }
                Err(e) => {
                    warn!(tool = %name, error = %e, "Tool follow-up failed");
                    self.publish_error("tool follow-up", &e);
                    push_paragraph(&mut response, &format!("Error in tool response: {e}"));
                }
            }
        }

        self.session.conversation.append(Turn::model(response.clone()));
        self.set_phase(TurnPhase::Idle);

        let completed = response.contains(&self.config.completion_phrase);
        TurnOutput {
            response,
            completed,
        }
    }

    /// Send a request, re-issuing it after a fixed backoff while the model
    /// reports rate limiting.
    async fn generate_with_retry(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let mut retries = 0;
        loop {
            match self.model.generate(request.clone()).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_retryable() && retries < self.config.max_rate_limit_retries => {
                    retries += 1;
                    warn!(
                        retry = retries,
                        max_retries = self.config.max_rate_limit_retries,
                        backoff_secs = self.config.rate_limit_backoff.as_secs(),
                        "Rate limited, retrying"
                    );
                    tokio::time::sleep(self.config.rate_limit_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn build_request(&self, mode: FunctionCallingMode) -> ModelRequest {
        let mut system = system_instruction(&self.config.base_prompt, &self.session.cache);
        if let Some(status) = self.automode {
            let _ = write!(
                system,
                "\n\n## Automode\nAutomode is active (iteration {} of {}). Work toward the \
                 user's goal one step at a time without waiting for confirmation. When the goal \
                 is fully achieved, say '{}'.",
                status.iteration, status.max_iterations, self.config.completion_phrase
            );
        }

        ModelRequest {
            system_instruction: Some(system),
            turns: filter_context(self.session.conversation.current()),
            tools: self.tools.definitions(),
            mode,
        }
    }

    fn record_usage(&self, role: ModelRole, reply: &ModelResponse) {
        self.session
            .tracker
            .record(role, reply.usage.prompt_count, reply.usage.candidate_count);
        if role == ModelRole::Main {
            self.events.publish(DomainEvent::ResponseGenerated {
                text: reply.joined_text(),
                input_tokens: reply.usage.prompt_count,
                output_tokens: reply.usage.candidate_count,
                timestamp: Utc::now(),
            });
        }
    }

    fn fail_turn(&mut self, context: &str, e: &ModelError) -> TurnOutput {
        error!(context, error = %e, "Turn failed");
        self.publish_error(context, e);
        let response = format!("Error while {context}: {e}");
        self.session.conversation.append(Turn::model(response.clone()));
        self.set_phase(TurnPhase::Idle);
        TurnOutput {
            response,
            completed: false,
        }
    }

    fn publish_error(&self, context: &str, e: &ModelError) {
        self.events.publish(DomainEvent::ErrorOccurred {
            context: context.to_string(),
            error_message: e.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn set_phase(&mut self, phase: TurnPhase) {
        if self.phase != phase {
            debug!(from = %self.phase, to = %phase, "Turn phase");
            self.phase = phase;
        }
    }
}

fn push_paragraph(out: &mut String, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    if !out.is_empty() {
        out.push_str("\n\n");
    }
    out.push_str(text);
}
