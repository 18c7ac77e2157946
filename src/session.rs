use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::conversation::Conversation;
use crate::types::Turn;

pub const DEFAULT_MAX_HISTORY_PAIRS: usize = 10;

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    turns: Vec<Turn>,
}

/// Window applied when loading a persisted session, in user-initiated
/// exchanges. Overridable via DESKPILOT_MAX_HISTORY_PAIRS.
pub fn max_history_pairs() -> usize {
    std::env::var("DESKPILOT_MAX_HISTORY_PAIRS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_HISTORY_PAIRS)
}

/// Restores a conversation from a session file, truncated to the history
/// window. A missing file starts an empty session; a corrupt one is an
/// error rather than silent data loss.
pub fn load(path: &Path, max_pairs: usize) -> anyhow::Result<Conversation> {
    if !path.exists() {
        return Ok(Conversation::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read session file {}", path.display()))?;
    let file: SessionFile = serde_json::from_str(&content)
        .with_context(|| format!("session file {} is not valid JSON", path.display()))?;
    let mut conversation = Conversation::from_turns(file.turns);
    conversation.truncate_pairs(max_pairs);
    Ok(conversation)
}

pub fn save(path: &Path, conversation: &Conversation) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let file = SessionFile {
        version: 1,
        turns: conversation.snapshot().to_vec(),
    };
    let content = serde_json::to_string_pretty(&file)?;
    std::fs::write(path, content)
        .with_context(|| format!("failed to write session file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::{load, save, DEFAULT_MAX_HISTORY_PAIRS};
    use crate::conversation::Conversation;
    use crate::types::ToolCall;

    #[test]
    fn round_trips_turns_through_disk() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("session.json");
        let mut conv = Conversation::new();
        conv.push_user("list my files");
        conv.push_exchange(
            &ToolCall {
                name: "list_files".to_string(),
                arguments: json!({"dir_path": "."}),
                comment: None,
            },
            json!({"result": "a.txt"}),
        );
        save(&path, &conv).expect("save");
        let restored = load(&path, DEFAULT_MAX_HISTORY_PAIRS).expect("load");
        assert_eq!(restored.len(), 3);
    }

    #[test]
    fn missing_session_starts_empty() {
        let tmp = tempdir().expect("tempdir");
        let conv = load(&tmp.path().join("absent.json"), 10).expect("load");
        assert!(conv.is_empty());
    }

    #[test]
    fn corrupt_session_is_an_error() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("session.json");
        std::fs::write(&path, "{not json").expect("write");
        assert!(load(&path, 10).is_err());
    }

    #[test]
    fn load_applies_the_history_window() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("session.json");
        let mut conv = Conversation::new();
        for i in 0..5 {
            conv.push_user(format!("request {i}"));
        }
        save(&path, &conv).expect("save");
        let restored = load(&path, 2).expect("load");
        assert_eq!(restored.len(), 2);
    }
}
