//! The Patchloop agent: conversation turns, tool dispatch and autonomous mode.
//!
//! Each user message runs one turn of the loop:
//!
//! 1. **Append** the user turn to the session's conversation
//! 2. **Build context**: system prompt plus cached files, and the
//!    conversation minus tool exchanges the cache already covers
//! 3. **Ask the model** with tools enabled
//! 4. **Dispatch** each requested tool in order, letting the model comment on
//!    every result
//! 5. **Record** the combined reply as the model's turn
//!
//! Autonomous mode repeats turns toward a goal until the model says it is
//! done, an iteration cap is hit, or the user interrupts.

pub mod automode;
pub mod context;
pub mod orchestrator;
pub mod runtime;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use automode::{
    AutomodeOutcome, AutomodeReport, AutomodeStatus, INTERRUPTED_ACK, InterruptFlag,
    continuation_prompt,
};
pub use context::{filter_context, is_materialized, system_instruction};
pub use orchestrator::{
    DEFAULT_SYSTEM_PROMPT, ImageAttachment, Orchestrator, OrchestratorConfig, TurnOutput, TurnPhase,
};
pub use runtime::{Runtime, build_runtime};
pub use session::Session;
