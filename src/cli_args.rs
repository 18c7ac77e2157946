use std::path::PathBuf;

use clap::Parser;

use crate::registry::ToolsetKind;

/// Desktop assistant that turns one natural-language request into tool
/// calls against local helper scripts, with confirmation before anything
/// destructive.
#[derive(Debug, Parser)]
#[command(name = "deskpilot", version, about)]
pub struct CliArgs {
    /// The request, e.g. "delete all .tmp files in /tmp"
    pub request: String,

    /// Which tool family to expose to the model
    #[arg(long, value_enum, default_value = "filesystem")]
    pub toolset: ToolsetKind,

    /// Directory holding the helper scripts (readfile.sh, calendar.sh, ...)
    #[arg(long, default_value = "./scripts")]
    pub scripts_dir: PathBuf,

    /// Model identifier for the completion endpoint
    #[arg(long, default_value = crate::client::DEFAULT_MODEL)]
    pub model: String,

    /// Upper bound on tool calls in one run
    #[arg(long, env = "DESKPILOT_MAX_ITERATIONS", default_value_t = 15)]
    pub max_iterations: u32,

    /// Persist the conversation to this file and resume from it
    #[arg(long)]
    pub session: Option<PathBuf>,

    /// Append structured run events to this JSONL file
    #[arg(long)]
    pub events_file: Option<PathBuf>,

    /// Approve every confirmable action without prompting
    #[arg(long)]
    pub yes: bool,

    /// Trace each step to stderr
    #[arg(long, env = "DESKPILOT_DEBUG")]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::CliArgs;
    use crate::registry::ToolsetKind;

    #[test]
    fn defaults_cover_a_bare_request() {
        let args = CliArgs::try_parse_from(["deskpilot", "list my files"]).expect("parse");
        assert_eq!(args.request, "list my files");
        assert_eq!(args.toolset, ToolsetKind::Filesystem);
        assert_eq!(args.max_iterations, 15);
        assert!(!args.yes);
        assert!(args.session.is_none());
    }

    #[test]
    fn calendar_toolset_and_overrides_parse() {
        let args = CliArgs::try_parse_from([
            "deskpilot",
            "--toolset",
            "calendar",
            "--max-iterations",
            "3",
            "--yes",
            "what is on tomorrow",
        ])
        .expect("parse");
        assert_eq!(args.toolset, ToolsetKind::Calendar);
        assert_eq!(args.max_iterations, 3);
        assert!(args.yes);
    }

    #[test]
    fn missing_request_is_a_usage_error() {
        assert!(CliArgs::try_parse_from(["deskpilot"]).is_err());
    }
}
