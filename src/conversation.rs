use crate::types::{Role, ToolCall, Turn};
use serde_json::Value;

/// Append-only turn log. Ordering is the literal context sent to the model:
/// a model turn carrying a function call is always immediately followed by
/// the function turn carrying its result.
#[derive(Debug, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::user_text(text));
    }

    /// Appends the model's call and its outcome as an adjacent pair.
    pub fn push_exchange(&mut self, call: &ToolCall, result: Value) {
        self.turns.push(Turn::model_call(call));
        self.turns.push(Turn::function_result(&call.name, result));
    }

    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Keeps only the most recent `max_pairs` user-initiated exchanges. A
    /// pair starts at a user turn and runs to the next user turn, so call
    /// and result turns never get split apart.
    pub fn truncate_pairs(&mut self, max_pairs: usize) {
        let user_indices: Vec<usize> = self
            .turns
            .iter()
            .enumerate()
            .filter(|(_, t)| t.role == Role::User)
            .map(|(i, _)| i)
            .collect();
        if user_indices.len() <= max_pairs {
            return;
        }
        let cut = user_indices[user_indices.len() - max_pairs];
        self.turns.drain(..cut);
    }
}
