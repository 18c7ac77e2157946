use serde_json::Value;

use crate::types::ToolCall;

/// Normalized shape of one raw model response. The loop matches on this
/// exhaustively; adding a variant is a compile-time event, not a silent
/// fallthrough.
#[derive(Debug, Clone)]
pub enum ModelReply {
    /// The model asked for a tool. `comment` on the call carries any free
    /// text that accompanied it; the call takes precedence, the text is
    /// surfaced as narration before execution.
    FunctionCall(ToolCall),
    /// A final answer. Always terminal, never narration.
    Text(String),
    /// No usable candidate came back.
    NoResponse { diagnostic: Option<String> },
    /// The provider refused the request outright (safety block).
    Blocked(String),
    /// The response is unusable for another reason, e.g. an anomalous
    /// finish with nothing salvageable.
    Error(String),
}

const NORMAL_FINISH_REASONS: &[&str] = &["STOP", "MAX_TOKENS"];

pub fn parse_response(raw: &Value) -> ModelReply {
    let candidates = match raw.get("candidates").and_then(|v| v.as_array()) {
        Some(c) if !c.is_empty() => c,
        _ => {
            if let Some(reason) = raw
                .get("promptFeedback")
                .and_then(|f| f.get("blockReason"))
                .and_then(|r| r.as_str())
            {
                return ModelReply::Blocked(format!("request blocked by provider: {reason}"));
            }
            let diagnostic = raw
                .get("promptFeedback")
                .map(|f| f.to_string())
                .filter(|s| s != "null");
            return ModelReply::NoResponse { diagnostic };
        }
    };

    let candidate = &candidates[0];
    let finish_reason = candidate.get("finishReason").and_then(|v| v.as_str());
    let parts = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    // Even on an anomalous finish reason, salvage whatever partial call or
    // text the candidate carries before giving up.
    let mut call: Option<(String, Value)> = None;
    let mut text_chunks: Vec<&str> = Vec::new();
    for part in parts {
        if call.is_none() {
            if let Some(fc) = part.get("functionCall") {
                let name = fc
                    .get("name")
                    .and_then(|n| n.as_str())
                    .unwrap_or_default()
                    .to_string();
                let args = fc.get("args").cloned().unwrap_or(Value::Object(Default::default()));
                call = Some((name, args));
                continue;
            }
        }
        if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
            if !text.trim().is_empty() {
                text_chunks.push(text);
            }
        }
    }

    if let Some((name, arguments)) = call {
        let comment = if text_chunks.is_empty() {
            None
        } else {
            Some(text_chunks.join("\n"))
        };
        return ModelReply::FunctionCall(ToolCall {
            name,
            arguments,
            comment,
        });
    }

    if !text_chunks.is_empty() {
        return ModelReply::Text(text_chunks.join("\n"));
    }

    match finish_reason {
        Some(reason) if !NORMAL_FINISH_REASONS.contains(&reason) => {
            ModelReply::Error(format!("model stopped early: {reason}"))
        }
        other => ModelReply::NoResponse {
            diagnostic: other.map(|r| format!("finish reason: {r}")),
        },
    }
}
