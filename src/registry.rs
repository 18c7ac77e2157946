use std::collections::BTreeMap;

use clap::ValueEnum;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ToolsetKind {
    Filesystem,
    Calendar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DangerClass {
    ReadOnly,
    Mutating,
    ArbitraryExec,
}

/// How the executor reaches the capability behind a tool name.
#[derive(Debug, Clone)]
pub enum Invocation {
    /// Spawn `<scripts_dir>/<script>` with the values of `arg_order` as
    /// positional arguments (empty optionals are dropped, not forwarded).
    Script {
        script: &'static str,
        /// Fixed subcommand inserted before the arguments, for multiplexed
        /// scripts like calendar.sh.
        subcommand: Option<&'static str>,
        arg_order: &'static [&'static str],
    },
    /// Answered in-process, no subprocess involved.
    CurrentTime,
}

/// Argument keys the gate needs to render a before/after diff for
/// content-replacing tools.
#[derive(Debug, Clone, Copy)]
pub struct DiffArgs {
    pub path_key: &'static str,
    pub content_key: &'static str,
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
    pub requires_confirmation: bool,
    pub danger: DangerClass,
    pub invocation: Invocation,
    pub diff_args: Option<DiffArgs>,
}

pub struct ToolRegistry {
    specs: BTreeMap<&'static str, ToolSpec>,
}

impl ToolRegistry {
    pub fn for_toolset(kind: ToolsetKind) -> Self {
        let specs = match kind {
            ToolsetKind::Filesystem => filesystem_tools(),
            ToolsetKind::Calendar => calendar_tools(),
        };
        Self {
            specs: specs.into_iter().map(|s| (s.name, s)).collect(),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&ToolSpec> {
        self.specs.get(name)
    }

    /// Gemini `functionDeclarations` payload for the whole table.
    pub fn function_declarations(&self) -> Value {
        Value::Array(
            self.specs
                .values()
                .map(|s| {
                    json!({
                        "name": s.name,
                        "description": s.description,
                        "parameters": s.parameters,
                    })
                })
                .collect(),
        )
    }

    #[cfg(test)]
    pub fn names(&self) -> Vec<&'static str> {
        self.specs.keys().copied().collect()
    }
}

fn string_param(description: &str) -> Value {
    json!({"type": "string", "description": description})
}

fn filesystem_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "read_file",
            description: "Read the contents of a file.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": string_param("Path to the file, absolute or relative"),
                },
                "required": ["file_path"]
            }),
            requires_confirmation: false,
            danger: DangerClass::ReadOnly,
            invocation: Invocation::Script {
                script: "readfile.sh",
                subcommand: None,
                arg_order: &["file_path"],
            },
            diff_args: None,
        },
        ToolSpec {
            name: "create_file",
            description: "Create a new file with the given content. Requires user confirmation.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": string_param("Path of the file to create"),
                    "content": string_param("File content"),
                },
                "required": ["file_path", "content"]
            }),
            requires_confirmation: true,
            danger: DangerClass::Mutating,
            invocation: Invocation::Script {
                script: "createfile.sh",
                subcommand: None,
                arg_order: &["file_path", "content"],
            },
            diff_args: Some(DiffArgs {
                path_key: "file_path",
                content_key: "content",
            }),
        },
        ToolSpec {
            name: "update_file",
            description: "Update a file's content (overwrite or append). Requires user confirmation.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": string_param("Path of the file to update"),
                    "content": string_param("New content"),
                    "mode": {
                        "type": "string",
                        "description": "'overwrite' replaces the file, 'append' adds to the end",
                        "enum": ["overwrite", "append"]
                    }
                },
                "required": ["file_path", "content"]
            }),
            requires_confirmation: true,
            danger: DangerClass::Mutating,
            invocation: Invocation::Script {
                script: "updatefile.sh",
                subcommand: None,
                arg_order: &["file_path", "content", "mode"],
            },
            diff_args: Some(DiffArgs {
                path_key: "file_path",
                content_key: "content",
            }),
        },
        ToolSpec {
            name: "delete_file",
            description: "Delete a file or folder. Requires user confirmation.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": string_param("Path of the file or folder to delete"),
                },
                "required": ["file_path"]
            }),
            requires_confirmation: true,
            danger: DangerClass::Mutating,
            invocation: Invocation::Script {
                script: "deletefile.sh",
                subcommand: None,
                arg_order: &["file_path"],
            },
            diff_args: None,
        },
        ToolSpec {
            name: "rename_file",
            description: "Rename a file or folder. Requires user confirmation.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "old_path": string_param("Current path"),
                    "new_path": string_param("New path"),
                },
                "required": ["old_path", "new_path"]
            }),
            requires_confirmation: true,
            danger: DangerClass::Mutating,
            invocation: Invocation::Script {
                script: "renamefile.sh",
                subcommand: None,
                arg_order: &["old_path", "new_path"],
            },
            diff_args: None,
        },
        ToolSpec {
            name: "execute_file",
            description: "Run a script file (Python, Bash, Node.js). Requires user confirmation.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": string_param("Path of the script to run"),
                    "args": string_param("Arguments for the script (optional)"),
                    "working_dir": string_param("Working directory (optional, defaults to the current directory)"),
                },
                "required": ["file_path"]
            }),
            requires_confirmation: true,
            danger: DangerClass::ArbitraryExec,
            invocation: Invocation::Script {
                script: "executefile.sh",
                subcommand: None,
                arg_order: &["file_path", "args", "working_dir"],
            },
            diff_args: None,
        },
        ToolSpec {
            name: "list_files",
            description: "List files and folders in a directory.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "dir_path": string_param("Directory path (defaults to the current directory)"),
                    "pattern": string_param("Glob filter, e.g. '*.py' (defaults to '*')"),
                    "recursive": {
                        "type": "string",
                        "description": "'true' to list recursively",
                        "enum": ["true", "false"]
                    }
                }
            }),
            requires_confirmation: false,
            danger: DangerClass::ReadOnly,
            invocation: Invocation::Script {
                script: "listfiles.sh",
                subcommand: None,
                arg_order: &["dir_path", "pattern", "recursive"],
            },
            diff_args: None,
        },
        ToolSpec {
            name: "search_files",
            description: "Search for files by name pattern.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "dir_path": string_param("Directory to search in (defaults to the current directory)"),
                    "name_pattern": string_param("File name pattern, e.g. '*.tmp'"),
                    "recursive": {
                        "type": "string",
                        "description": "'true' to search recursively",
                        "enum": ["true", "false"]
                    }
                },
                "required": ["name_pattern"]
            }),
            requires_confirmation: false,
            danger: DangerClass::ReadOnly,
            invocation: Invocation::Script {
                script: "searchfiles.sh",
                subcommand: None,
                arg_order: &["dir_path", "name_pattern", "recursive"],
            },
            diff_args: None,
        },
        ToolSpec {
            name: "run_command",
            description: "Run an arbitrary shell command (ls, cp, find, kill, pipes, ...). Requires user confirmation.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": string_param("Shell command to run, e.g. 'ps aux | head -10'"),
                    "working_dir": string_param("Working directory (optional)"),
                },
                "required": ["command"]
            }),
            requires_confirmation: true,
            danger: DangerClass::ArbitraryExec,
            invocation: Invocation::Script {
                script: "processtool.sh",
                subcommand: None,
                arg_order: &["command", "working_dir"],
            },
            diff_args: None,
        },
    ]
}

fn calendar_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "list_events",
            description: "List calendar events in a time range. Call this before add/update/delete to see the current schedule.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "time_min": string_param("Range start, ISO 8601, e.g. 2024-01-15T00:00:00+07:00"),
                    "time_max": string_param("Range end, ISO 8601"),
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of events (defaults to 10)"
                    }
                },
                "required": ["time_min"]
            }),
            requires_confirmation: false,
            danger: DangerClass::ReadOnly,
            invocation: Invocation::Script {
                script: "calendar.sh",
                subcommand: Some("list"),
                arg_order: &["time_min", "time_max", "max_results"],
            },
            diff_args: None,
        },
        ToolSpec {
            name: "add_event",
            description: "Add a new calendar event. Call list_events first to check for conflicts. Requires user confirmation.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "summary": string_param("Event title"),
                    "start_time": string_param("Start time, ISO 8601"),
                    "end_time": string_param("End time, ISO 8601 (optional)"),
                    "description": string_param("Details (optional)"),
                    "location": string_param("Location (optional)"),
                },
                "required": ["summary", "start_time"]
            }),
            requires_confirmation: true,
            danger: DangerClass::Mutating,
            invocation: Invocation::Script {
                script: "calendar.sh",
                subcommand: Some("add"),
                arg_order: &["summary", "start_time", "end_time", "description", "location"],
            },
            diff_args: None,
        },
        ToolSpec {
            name: "update_event",
            description: "Update an existing event. Call list_events first to get the event_id. Requires user confirmation.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "event_id": string_param("Event id from list_events"),
                    "summary": string_param("New title (optional)"),
                    "start_time": string_param("New start time, ISO 8601 (optional)"),
                    "end_time": string_param("New end time, ISO 8601 (optional)"),
                    "description": string_param("New details (optional)"),
                    "location": string_param("New location (optional)"),
                },
                "required": ["event_id"]
            }),
            requires_confirmation: true,
            danger: DangerClass::Mutating,
            invocation: Invocation::Script {
                script: "calendar.sh",
                subcommand: Some("update"),
                arg_order: &[
                    "event_id",
                    "summary",
                    "start_time",
                    "end_time",
                    "description",
                    "location",
                ],
            },
            diff_args: None,
        },
        ToolSpec {
            name: "delete_event",
            description: "Delete a calendar event. Call list_events first to get the event_id. Requires user confirmation.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "event_id": string_param("Event id from list_events"),
                },
                "required": ["event_id"]
            }),
            requires_confirmation: true,
            danger: DangerClass::Mutating,
            invocation: Invocation::Script {
                script: "calendar.sh",
                subcommand: Some("delete"),
                arg_order: &["event_id"],
            },
            diff_args: None,
        },
        ToolSpec {
            name: "get_current_time",
            description: "Get the current time, for resolving 'today', 'tomorrow' and similar.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "format": string_param("Desired format: iso8601, date, datetime"),
                }
            }),
            requires_confirmation: false,
            danger: DangerClass::ReadOnly,
            invocation: Invocation::CurrentTime,
            diff_args: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::{DangerClass, Invocation, ToolRegistry, ToolsetKind};

    #[test]
    fn filesystem_registry_has_all_tools() {
        let reg = ToolRegistry::for_toolset(ToolsetKind::Filesystem);
        let names = reg.names();
        for expected in [
            "read_file",
            "create_file",
            "update_file",
            "delete_file",
            "rename_file",
            "execute_file",
            "list_files",
            "search_files",
            "run_command",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn unknown_name_is_not_found() {
        let reg = ToolRegistry::for_toolset(ToolsetKind::Calendar);
        assert!(reg.lookup("delete_file").is_none());
        assert!(reg.lookup("").is_none());
    }

    #[test]
    fn read_only_tools_skip_confirmation() {
        let reg = ToolRegistry::for_toolset(ToolsetKind::Filesystem);
        for spec in ["read_file", "list_files", "search_files"] {
            let spec = reg.lookup(spec).expect("spec");
            assert!(!spec.requires_confirmation);
            assert_eq!(spec.danger, DangerClass::ReadOnly);
        }
    }

    #[test]
    fn mutating_and_exec_tools_require_confirmation() {
        let reg = ToolRegistry::for_toolset(ToolsetKind::Filesystem);
        for name in [
            "create_file",
            "update_file",
            "delete_file",
            "rename_file",
            "execute_file",
            "run_command",
        ] {
            assert!(reg.lookup(name).expect("spec").requires_confirmation);
        }
    }

    #[test]
    fn calendar_tools_share_one_script() {
        let reg = ToolRegistry::for_toolset(ToolsetKind::Calendar);
        for name in ["list_events", "add_event", "update_event", "delete_event"] {
            match &reg.lookup(name).expect("spec").invocation {
                Invocation::Script {
                    script, subcommand, ..
                } => {
                    assert_eq!(*script, "calendar.sh");
                    assert!(subcommand.is_some());
                }
                other => panic!("unexpected invocation {other:?}"),
            }
        }
    }

    #[test]
    fn declarations_expose_name_and_schema() {
        let reg = ToolRegistry::for_toolset(ToolsetKind::Calendar);
        let decls = reg.function_declarations();
        let arr = decls.as_array().expect("array");
        assert_eq!(arr.len(), 5);
        assert!(arr
            .iter()
            .all(|d| d.get("name").is_some() && d.get("parameters").is_some()));
    }
}
