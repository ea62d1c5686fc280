//! Domain event system — decoupled observation of what the agent does.
//!
//! Events are published when something interesting happens (a tool ran, an
//! edit was applied, automode advanced). Front-ends subscribe to render
//! progress without the core knowing how output is displayed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Something observable the agent did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The model produced (part of) a turn's response
    ResponseGenerated {
        text: String,
        input_tokens: u64,
        output_tokens: u64,
        timestamp: DateTime<Utc>,
    },

    /// A tool was dispatched
    ToolExecuted {
        tool_name: String,
        is_error: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A round of search/replace edits was applied to a file
    EditApplied {
        path: String,
        diff: String,
        failed_edits: usize,
        timestamp: DateTime<Utc>,
    },

    /// An automode iteration finished
    AutomodeProgress {
        iteration: u32,
        max_iterations: u32,
        timestamp: DateTime<Utc>,
    },

    /// An error was surfaced to the user
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// Fan-out of [`DomainEvent`]s to any number of observers.
///
/// Slow observers lose the oldest events rather than blocking the agent.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// `capacity` events are buffered per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
