use std::path::Path;

use anyhow::Context;
use clap::Parser;

use crate::agent::{Agent, ExitReason};
use crate::cli_args::CliArgs;
use crate::client::{GeminiClient, HttpConfig};
use crate::conversation::Conversation;
use crate::env_file;
use crate::events::{EventSink, JsonlFileSink, MultiSink, StderrDebugSink};
use crate::executor::ScriptExecutor;
use crate::gate::{AutoApproveGate, ConfirmGate, InteractiveGate};
use crate::prompts;
use crate::registry::{ToolRegistry, ToolsetKind};
use crate::session;

pub async fn run_cli() -> anyhow::Result<()> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(err) => {
            use clap::error::ErrorKind;
            if matches!(
                err.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) {
                err.exit();
            }
            err.print().ok();
            std::process::exit(1);
        }
    };
    env_file::load(Path::new(".env"));

    let api_key = match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.is_empty() => key,
        _ => {
            eprintln!("error: GEMINI_API_KEY is not set (environment or .env file)");
            std::process::exit(1);
        }
    };

    if args.toolset == ToolsetKind::Calendar {
        if let Err(e) = check_calendar_auth(&args.scripts_dir) {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }

    let event_sink = build_event_sink(&args)?;
    let max_pairs = session::max_history_pairs();
    let mut conversation = match &args.session {
        Some(path) => session::load(path, max_pairs)?,
        None => Conversation::new(),
    };
    conversation.push_user(&args.request);

    let gate: Box<dyn ConfirmGate> = if args.yes {
        Box::new(AutoApproveGate)
    } else {
        Box::new(InteractiveGate::new())
    };
    let mut agent = Agent {
        client: Box::new(GeminiClient::new(
            api_key,
            &args.model,
            HttpConfig::default(),
        )?),
        registry: ToolRegistry::for_toolset(args.toolset),
        executor: Box::new(ScriptExecutor::new(args.scripts_dir.clone(), args.debug)),
        gate,
        system_instruction: prompts::system_instruction(args.toolset).to_string(),
        max_iterations: args.max_iterations,
        event_sink,
    };

    let outcome = agent.run(&mut conversation).await;
    if args.debug {
        eprintln!(
            "[DEBUG] run {} finished: {} after {} tool calls",
            outcome.run_id,
            outcome.exit_reason.as_str(),
            outcome.tool_calls_made
        );
    }

    if let Some(path) = &args.session {
        if let Err(e) = session::save(path, &conversation) {
            eprintln!("warning: {e:#}");
        }
    }

    match outcome.exit_reason {
        ExitReason::Ok => {
            println!("{}", outcome.final_output);
            Ok(())
        }
        ExitReason::Cancelled => {
            eprintln!("interrupted");
            std::process::exit(130);
        }
        reason => {
            let message = outcome
                .error
                .unwrap_or_else(|| reason.as_str().to_string());
            eprintln!("error: {message}");
            std::process::exit(1);
        }
    }
}

fn build_event_sink(args: &CliArgs) -> anyhow::Result<Option<Box<dyn EventSink>>> {
    let mut multi = MultiSink::new();
    if let Some(path) = &args.events_file {
        multi.push(Box::new(JsonlFileSink::new(path)?));
    }
    if args.debug {
        multi.push(Box::new(StderrDebugSink));
    }
    if multi.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Box::new(multi)))
    }
}

/// Runs `auth.sh status` before a calendar session so the model never sees
/// a wall of auth failures. A missing auth.sh means the script set handles
/// credentials itself.
fn check_calendar_auth(scripts_dir: &Path) -> anyhow::Result<()> {
    let auth = scripts_dir.join("auth.sh");
    if !auth.exists() {
        return Ok(());
    }
    let status = std::process::Command::new(&auth)
        .arg("status")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .with_context(|| format!("failed to run {}", auth.display()))?;
    if !status.success() {
        anyhow::bail!(
            "not signed in to the calendar; run `{} login` first",
            auth.display()
        );
    }
    Ok(())
}
