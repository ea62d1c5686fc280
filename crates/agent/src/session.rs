//! Per-run session state.

use patchloop_core::message::Conversation;
use patchloop_telemetry::TokenTracker;
use patchloop_tools::cache::FileCache;
use std::sync::Arc;
use tracing::info;

/// Everything one interactive run accumulates.
///
/// The cache and tracker are shared with the tools and the edit generator,
/// which is why they sit behind `Arc`. The conversation is owned here and
/// only the orchestrator appends to it.
pub struct Session {
    pub conversation: Conversation,
    pub cache: Arc<FileCache>,
    pub tracker: Arc<TokenTracker>,
}

impl Session {
    pub fn new(cache: Arc<FileCache>, tracker: Arc<TokenTracker>) -> Self {
        Self {
            conversation: Conversation::new(),
            cache,
            tracker,
        }
    }

    /// Clear the conversation, the file cache and the token counters.
    pub fn reset(&mut self) {
        let turns = self.conversation.len();
        let files = self.cache.len();
        self.conversation.clear();
        self.cache.clear();
        self.tracker.reset();
        info!(turns, files, "Session reset");
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Arc::new(FileCache::new()), Arc::new(TokenTracker::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchloop_core::message::Turn;
    use patchloop_telemetry::ModelRole;

    #[test]
    fn reset_clears_everything() {
        let mut session = Session::default();
        session.conversation.append(Turn::user("hi"));
        session.cache.insert("a.txt", "a");
        session.tracker.record(ModelRole::Main, 10, 5);

        session.reset();

        assert!(session.conversation.is_empty());
        assert!(session.cache.is_empty());
        assert_eq!(session.tracker.total().total(), 0);
    }
}
