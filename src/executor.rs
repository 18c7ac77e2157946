use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::registry::{Invocation, ToolSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorKind {
    /// The model asked for a name that is not in the registry.
    UnknownTool,
    /// The backing script/handler is missing.
    NotAvailable,
    /// The capability ran and failed (non-zero exit or spawn failure).
    ExecutionFailed,
    /// The user denied the confirmation prompt.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
    pub exit_code: Option<i32>,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            exit_code: None,
        }
    }
}

pub type ToolResult = Result<Value, ToolError>;

/// Serialized form of a tool result as it goes back into the conversation.
pub fn result_to_value(result: &ToolResult) -> Value {
    match result {
        Ok(v) => v.clone(),
        Err(e) => {
            let mut obj = json!({ "error": e.message });
            if e.kind == ToolErrorKind::Cancelled {
                obj["cancelled"] = Value::Bool(true);
            }
            obj
        }
    }
}

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, spec: &ToolSpec, arguments: &Value) -> ToolResult;
}

/// Runs capabilities as external scripts under `scripts_dir`, passing the
/// declared arguments positionally.
pub struct ScriptExecutor {
    pub scripts_dir: PathBuf,
    pub debug: bool,
}

impl ScriptExecutor {
    pub fn new(scripts_dir: PathBuf, debug: bool) -> Self {
        Self { scripts_dir, debug }
    }

    fn debug_print(&self, msg: &str) {
        if self.debug {
            eprintln!("[DEBUG] {msg}");
        }
    }
}

#[async_trait]
impl ToolExecutor for ScriptExecutor {
    async fn execute(&self, spec: &ToolSpec, arguments: &Value) -> ToolResult {
        let (script, subcommand, arg_order) = match &spec.invocation {
            Invocation::Script {
                script,
                subcommand,
                arg_order,
            } => (*script, *subcommand, *arg_order),
            Invocation::CurrentTime => {
                let format = arguments
                    .get("format")
                    .and_then(|v| v.as_str())
                    .unwrap_or("iso8601");
                return Ok(current_time_value(format));
            }
        };

        let script_path = self.scripts_dir.join(script);
        if !script_path.exists() {
            return Err(ToolError::new(
                ToolErrorKind::NotAvailable,
                format!("{script} not found"),
            ));
        }

        let args = positional_args(arguments, arg_order);
        self.debug_print(&format!(
            "calling {} {}{}",
            script_path.display(),
            subcommand.map(|c| format!("{c} ")).unwrap_or_default(),
            args.join(" ")
        ));

        let mut cmd = Command::new(&script_path);
        if let Some(sub) = subcommand {
            cmd.arg(sub);
        }
        cmd.args(&args);
        let output = match cmd.output().await {
            Ok(out) => out,
            Err(e) => {
                return Err(ToolError::new(
                    ToolErrorKind::ExecutionFailed,
                    format!("failed to run {script}: {e}"),
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code();
        self.debug_print(&format!("exit code: {exit_code:?}"));
        self.debug_print(&format!("stdout: {}", preview(&stdout, 500)));
        self.debug_print(&format!("stderr: {}", preview(&stderr, 500)));

        if !output.status.success() {
            return Err(ToolError {
                kind: ToolErrorKind::ExecutionFailed,
                message: extract_failure_message(&stdout, &stderr),
                exit_code,
            });
        }

        Ok(interpret_stdout(&stdout))
    }
}

/// Values of `arg_order` in declared order. Absent and empty optional
/// arguments are dropped rather than forwarded as empty placeholders.
fn positional_args(arguments: &Value, arg_order: &[&str]) -> Vec<String> {
    arg_order
        .iter()
        .filter_map(|key| match arguments.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            _ => None,
        })
        .collect()
}

/// Successful stdout is structured data when it parses as JSON, opaque text
/// otherwise.
fn interpret_stdout(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(v) => v,
        Err(_) => json!({ "result": trimmed }),
    }
}

/// Failure message priority: structured `error` field in stdout JSON, then
/// raw stderr, then raw stdout, then a generic message. The order is a
/// deliberate contract, matching how the backing scripts report failures.
fn extract_failure_message(stdout: &str, stderr: &str) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(stdout.trim()) {
        if let Some(err) = v.get("error").and_then(|e| e.as_str()) {
            if !err.is_empty() {
                return err.to_string();
            }
        }
    }
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let stdout = stdout.trim();
    if !stdout.is_empty() {
        return stdout.to_string();
    }
    "command failed".to_string()
}

fn current_time_value(format: &str) -> Value {
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    let formatted = match format {
        "date" => now
            .format(&time::macros::format_description!("[year]-[month]-[day]"))
            .unwrap_or_default(),
        "datetime" => now
            .format(&time::macros::format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second]"
            ))
            .unwrap_or_default(),
        _ => now
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
    };
    json!({
        "time": formatted,
        "timestamp": now.unix_timestamp(),
    })
}

fn preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}
