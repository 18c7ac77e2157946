use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::types::Turn;

#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 2000,
            request_timeout_ms: 30_000,
        }
    }
}

/// Remote completion boundary. The loop sends the conversation snapshot plus
/// the tool schema and gets back the raw provider response; transport
/// failures are terminal for the run and are not retried here.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn generate(
        &self,
        turns: &[Turn],
        declarations: &Value,
        system_instruction: &str,
    ) -> anyhow::Result<Value>;
}

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

pub struct GeminiClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: &str, http: HttpConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_millis(http.connect_timeout_ms))
            .timeout(std::time::Duration::from_millis(http.request_timeout_ms))
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent"
            ),
            api_key,
        })
    }
}

pub fn build_payload(turns: &[Turn], declarations: &Value, system_instruction: &str) -> Value {
    json!({
        "contents": turns,
        "tools": [{ "functionDeclarations": declarations }],
        "systemInstruction": {
            "parts": [{ "text": system_instruction }]
        }
    })
}

#[async_trait]
impl CompletionClient for GeminiClient {
    async fn generate(
        &self,
        turns: &[Turn],
        declarations: &Value,
        system_instruction: &str,
    ) -> anyhow::Result<Value> {
        let payload = build_payload(turns, declarations, system_instruction);
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await
            .context("failed to call completion endpoint")?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(anyhow!(
                "completion endpoint returned HTTP {}: {}",
                status.as_u16(),
                truncate_for_error(&body, 200)
            ));
        }
        response
            .json::<Value>()
            .await
            .context("failed to parse completion response as JSON")
    }
}

pub fn truncate_for_error(s: &str, max_chars: usize) -> String {
    let single_line = s
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect::<String>();
    let trimmed = single_line.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        trimmed.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{build_payload, truncate_for_error};
    use crate::types::Turn;

    #[test]
    fn payload_carries_contents_tools_and_preamble() {
        let turns = vec![Turn::user_text("list my files")];
        let decls = json!([{"name": "list_files"}]);
        let payload = build_payload(&turns, &decls, "you are a file assistant");
        assert_eq!(payload["contents"][0]["role"], "user");
        assert_eq!(
            payload["tools"][0]["functionDeclarations"][0]["name"],
            "list_files"
        );
        assert_eq!(
            payload["systemInstruction"]["parts"][0]["text"],
            "you are a file assistant"
        );
    }

    #[test]
    fn error_bodies_are_flattened_and_bounded() {
        let body = "line one\nline two\n".repeat(50);
        let out = truncate_for_error(&body, 40);
        assert_eq!(out.chars().count(), 40);
        assert!(!out.contains('\n'));
    }
}
