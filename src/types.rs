use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    Function,
}

/// One entry of the conversation in Gemini wire shape. Turns are immutable
/// once appended; the conversation owns ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum Part {
    Text {
        text: String,
    },
    FunctionCall {
        function_call: FunctionCallPayload,
    },
    FunctionResponse {
        function_response: FunctionResponsePayload,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallPayload {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionResponsePayload {
    pub name: String,
    pub response: Value,
}

impl Turn {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    pub fn model_call(call: &ToolCall) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::FunctionCall {
                function_call: FunctionCallPayload {
                    name: call.name.clone(),
                    args: call.arguments.clone(),
                },
            }],
        }
    }

    pub fn function_result(name: impl Into<String>, result: Value) -> Self {
        Self {
            role: Role::Function,
            parts: vec![Part::FunctionResponse {
                function_response: FunctionResponsePayload {
                    name: name.into(),
                    response: serde_json::json!({ "content": result }),
                },
            }],
        }
    }
}

/// A tool call extracted from one model turn. `comment` carries free text the
/// model attached alongside the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}
