//! Autonomous mode: keep the model working toward a goal without user input.

use chrono::Utc;
use patchloop_core::event::DomainEvent;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::orchestrator::{Orchestrator, TurnOutput};

/// The user message for every iteration after the first.
pub fn continuation_prompt(completion_phrase: &str) -> String {
    format!(
        "Continue with the next step. Or STOP by saying '{completion_phrase}' if you think \
         you've achieved the results established in the original request."
    )
}

/// Placeholder model turn that closes a conversation left on a user turn.
pub const INTERRUPTED_ACK: &str = "Automode interrupted. How can I assist you further?";

/// Cooperative cancellation signal, set from the Ctrl+C handler.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Progress shown to the model while automode runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutomodeStatus {
    pub iteration: u32,
    pub max_iterations: u32,
}

/// Why automode stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomodeOutcome {
    /// The model said the completion phrase
    Completed,
    MaxIterations,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutomodeReport {
    pub outcome: AutomodeOutcome,
    pub iterations: u32,
}

impl Orchestrator {
    /// Run turns toward `goal` until the model reports completion, the
    /// iteration cap is reached, or `interrupt` is set.
    ///
    /// The interrupt is checked between turns only; a turn in flight always
    /// finishes. Whatever the exit, the conversation ends on a model turn and
    /// the flag is cleared. `on_turn` sees every turn's output as it lands.
    pub async fn run_automode<F>(
        &mut self,
        goal: &str,
        max_iterations: u32,
        interrupt: &InterruptFlag,
        mut on_turn: F,
    ) -> AutomodeReport
    where
        F: FnMut(u32, &TurnOutput),
    {
        info!(max_iterations, "Entering automode");
        let continuation = continuation_prompt(&self.config().completion_phrase);
        let mut iterations = 0;

        let outcome = loop {
            if interrupt.is_set() {
                break AutomodeOutcome::Interrupted;
            }
            if iterations >= max_iterations {
                break AutomodeOutcome::MaxIterations;
            }
            iterations += 1;
            self.automode = Some(AutomodeStatus {
                iteration: iterations,
                max_iterations,
            });

            let message = if iterations == 1 { goal } else { continuation.as_str() };
            let output = self.handle_user_message(message, None).await;
            self.events().publish(DomainEvent::AutomodeProgress {
                iteration: iterations,
                max_iterations,
                timestamp: Utc::now(),
            });
            on_turn(iterations, &output);

            if output.completed {
                break AutomodeOutcome::Completed;
            }
        };

        self.automode = None;
        if self
            .session_mut()
            .conversation
            .close_with_model_turn(INTERRUPTED_ACK)
        {
            info!("Closed dangling user turn");
        }
        interrupt.clear();
        info!(?outcome, iterations, "Exited automode");

        AutomodeReport {
            outcome,
            iterations,
        }
    }
}
