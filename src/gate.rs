use std::io::BufRead;

use async_trait::async_trait;
use serde_json::Value;

use crate::registry::{DangerClass, ToolSpec};
use crate::types::ToolCall;

/// Session-scoped approval memory. Owned by the orchestration loop and
/// handed to the gate by reference, never process-global, so a fresh run
/// always starts closed.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionPolicy {
    pub always_accept: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    AllowOnce,
    AllowAlways,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Approved,
    /// Denies this one action; the run continues.
    Denied,
    /// Ctrl-C at the prompt aborts the whole run, not just the action.
    Interrupted,
}

#[async_trait]
pub trait ConfirmGate: Send {
    async fn confirm(
        &mut self,
        spec: &ToolSpec,
        call: &ToolCall,
        policy: &mut SessionPolicy,
    ) -> GateDecision;
}

/// Accepts numeric codes and word forms, case-insensitively. Anything not
/// recognized as an affirmative or "always" cancels: ambiguous input must
/// never approve.
pub fn parse_choice(input: &str) -> Choice {
    match input.trim().to_lowercase().as_str() {
        "1" | "y" | "yes" => Choice::AllowOnce,
        "2" | "a" | "always" => Choice::AllowAlways,
        _ => Choice::Cancel,
    }
}

pub fn apply_choice(choice: Choice, policy: &mut SessionPolicy) -> GateDecision {
    match choice {
        Choice::AllowOnce => GateDecision::Approved,
        Choice::AllowAlways => {
            policy.always_accept = true;
            GateDecision::Approved
        }
        Choice::Cancel => GateDecision::Denied,
    }
}

const ARG_PREVIEW_CHARS: usize = 100;

/// One `key: value` line per argument, free text bounded so oversized
/// content never floods the prompt.
pub fn argument_preview(arguments: &Value, max_chars: usize) -> String {
    let Some(obj) = arguments.as_object() else {
        return String::new();
    };
    obj.iter()
        .map(|(k, v)| {
            let rendered = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let shown: String = rendered.chars().take(max_chars).collect();
            let ellipsis = if rendered.chars().count() > max_chars {
                "..."
            } else {
                ""
            };
            format!("  {k}: {shown}{ellipsis}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Line-level diff of current file content against the proposed replacement,
/// for content-replacing tools. Only rendered when there is something to
/// replace: append-mode updates and targets that do not exist yet get no
/// diff.
pub fn content_diff_preview(spec: &ToolSpec, call: &ToolCall) -> Option<String> {
    let diff_args = spec.diff_args?;
    if call.arguments.get("mode").and_then(|m| m.as_str()) == Some("append") {
        return None;
    }
    let path = call.arguments.get(diff_args.path_key)?.as_str()?;
    let proposed = call.arguments.get(diff_args.content_key)?.as_str()?;
    let existing = std::fs::read_to_string(path).ok()?;
    if existing == proposed {
        return None;
    }
    Some(diffy::create_patch(&existing, proposed).to_string())
}

enum PromptRead {
    Line(String),
    Eof,
    Interrupted,
}

/// Interactive gate: prompt on stderr, one line from stdin. EOF and
/// interrupts both refuse; an interrupt additionally cancels the run.
pub struct InteractiveGate;

impl InteractiveGate {
    pub fn new() -> Self {
        Self
    }

    fn render_prompt(&self, spec: &ToolSpec, call: &ToolCall) {
        eprintln!();
        eprintln!("{}", "=".repeat(60));
        eprintln!("CONFIRMATION REQUIRED: {}", call.name);
        eprintln!("{}", "=".repeat(60));
        if spec.danger == DangerClass::ArbitraryExec {
            eprintln!("this action runs arbitrary commands on your machine");
        }
        let preview = argument_preview(&call.arguments, ARG_PREVIEW_CHARS);
        if !preview.is_empty() {
            eprintln!("{preview}");
        }
        if let Some(diff) = content_diff_preview(spec, call) {
            eprintln!("proposed change:");
            eprintln!("{diff}");
        }
        eprintln!();
        eprintln!("  1) y/yes    - allow this action");
        eprintln!("  2) a/always - allow all actions for this session");
        eprintln!("  3) n/no     - cancel this action");
        eprint!("choice: ");
    }

    async fn read_choice(&self) -> PromptRead {
        let read = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(0) => PromptRead::Eof,
                Ok(_) => PromptRead::Line(line),
                Err(_) => PromptRead::Eof,
            }
        });
        tokio::select! {
            res = read => res.unwrap_or(PromptRead::Eof),
            _ = tokio::signal::ctrl_c() => PromptRead::Interrupted,
        }
    }
}

impl Default for InteractiveGate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfirmGate for InteractiveGate {
    async fn confirm(
        &mut self,
        spec: &ToolSpec,
        call: &ToolCall,
        policy: &mut SessionPolicy,
    ) -> GateDecision {
        if policy.always_accept {
            return GateDecision::Approved;
        }
        self.render_prompt(spec, call);
        match self.read_choice().await {
            PromptRead::Line(line) => apply_choice(parse_choice(&line), policy),
            PromptRead::Eof => {
                eprintln!();
                eprintln!("cancelled (end of input)");
                GateDecision::Denied
            }
            PromptRead::Interrupted => GateDecision::Interrupted,
        }
    }
}

/// Non-interactive gate for `--yes` runs: approves everything.
pub struct AutoApproveGate;

#[async_trait]
impl ConfirmGate for AutoApproveGate {
    async fn confirm(
        &mut self,
        _spec: &ToolSpec,
        _call: &ToolCall,
        _policy: &mut SessionPolicy,
    ) -> GateDecision {
        GateDecision::Approved
    }
}
