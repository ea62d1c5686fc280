//! Context filter: drop tool exchanges whose effect already lives in the
//! system instruction.
//!
//! A tool result carrying one of the materialized markers only confirms that
//! a file is now in the cache, and the cache is rendered into every system
//! instruction. Such results are dropped together with the call that
//! produced them, so the model never sees a call without its result or a
//! result without its call.

use patchloop_core::message::{ContentPart, Turn};
use patchloop_core::tool::ToolOutcome;
use patchloop_tools::cache::MATERIALIZED_MARKERS;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::trace;

/// Whether a tool result is redundant with the file cache.
pub fn is_materialized(outcome: &ToolOutcome) -> bool {
    MATERIALIZED_MARKERS
        .iter()
        .any(|marker| outcome.content.contains(marker))
}

/// Compute the turns to send to the model.
///
/// A result pairs with the oldest unpaired call of the same name, so
/// parallel calls are answered in the order they were made. Materialized results are removed along with their paired call;
/// turns left without parts are omitted. The input is never modified.
pub fn filter_context(turns: &[Turn]) -> Vec<Turn> {
    // (turn index, part index) of every part to drop
    let mut dropped: HashSet<(usize, usize)> = HashSet::new();
    let mut open_calls: HashMap<&str, VecDeque<(usize, usize)>> = HashMap::new();

    for (t, turn) in turns.iter().enumerate() {
        for (p, part) in turn.parts.iter().enumerate() {
            match part {
                ContentPart::ToolCall { name, .. } => {
                    open_calls.entry(name.as_str()).or_default().push_back((t, p));
                }
                ContentPart::ToolResult { name, outcome } => {
                    let call = open_calls
                        .get_mut(name.as_str())
                        .and_then(VecDeque::pop_front);
                    if is_materialized(outcome) {
                        dropped.insert((t, p));
                        if let Some(call) = call {
                            dropped.insert(call);
                        }
                    }
                }
                ContentPart::Text { .. } | ContentPart::Image { .. } => {}
            }
        }
    }

    if dropped.is_empty() {
        return turns.to_vec();
    }
    trace!(parts = dropped.len(), "Filtering materialized tool exchanges");

    turns
        .iter()
        .enumerate()
        .filter_map(|(t, turn)| {
            let parts: Vec<ContentPart> = turn
                .parts
                .iter()
                .enumerate()
                .filter(|(p, _)| !dropped.contains(&(t, *p)))
                .map(|(_, part)| part.clone())
                .collect();
            if parts.is_empty() && !turn.parts.is_empty() {
                None
            } else {
                Some(Turn {
                    role: turn.role,
                    parts,
                })
            }
        })
        .collect()
}
