//! Summarizer node: surfaces forward progress by marking the current
//! subgoal for re-examination, and prunes conversation history to a bounded
//! window.

use super::state::{Field, State, StatePatch};

/// Default conversation length above which pruning kicks in.
pub const DEFAULT_MAX_MESSAGES_IN_HISTORY: usize = 30;

/// Marks the current subgoal ready for re-examination and structurally
/// prunes old history. Pruning never rewrites content and never splits a
/// dangling AI/tool-call pair: within the removable prefix, removal starts
/// at the newest Tool or Human boundary and takes everything older.
pub struct SummarizerNode {
    max_history: usize,
}

impl SummarizerNode {
    pub fn new(max_history: usize) -> Self {
        Self { max_history }
    }

    pub fn run(&self, state: &State) -> StatePatch {
        let mut patch = StatePatch::default();

        // Ordinary forward progress: even when cortex claimed nothing, the
        // current subgoal is queued for re-examination next cycle.
        if let Some(current) = state.current_subgoal() {
            if !state.complete_subgoals_by_ids.iter().any(|id| id == &current.id) {
                tracing::debug!("marking subgoal for re-examination: {}", current.id);
                let mut ids = state.complete_subgoals_by_ids.clone();
                ids.push(current.id.clone());
                patch.complete_subgoals_by_ids = Field::Set(ids);
            }
        }

        if state.conversation.len() <= self.max_history {
            return patch;
        }

        let removable = state.conversation.len() - self.max_history;
        let mut remove_ids = Vec::new();
        let mut start_removal = false;

        for message in state.conversation[..removable].iter().rev() {
            if message.is_prune_boundary() {
                start_removal = true;
            }
            if start_removal {
                if let Some(id) = message.id() {
                    remove_ids.push(id.to_string());
                }
            }
        }

        tracing::info!(
            removed = remove_ids.len(),
            history = state.conversation.len(),
            "pruning conversation history"
        );
        patch.prune_message_ids = remove_ids;
        patch
    }
}

impl Default for SummarizerNode {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES_IN_HISTORY)
    }
}
