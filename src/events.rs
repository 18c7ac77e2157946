use std::io::Write;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RunStart,
    ModelRequestStart,
    ModelResponseEnd,
    ToolCallDetected,
    ToolDecision,
    ToolExecStart,
    ToolExecEnd,
    RunEnd,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub ts: String,
    pub run_id: String,
    pub step: u32,
    pub kind: EventKind,
    pub data: Value,
}

impl Event {
    pub fn new(run_id: String, step: u32, kind: EventKind, data: Value) -> Self {
        Self {
            ts: now_rfc3339(),
            run_id,
            step,
            kind,
            data,
        }
    }
}

pub trait EventSink: Send {
    fn emit(&mut self, event: Event) -> anyhow::Result<()>;
}

pub struct JsonlFileSink {
    file: std::fs::File,
}

impl JsonlFileSink {
    pub fn new(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open events file {}", path.display()))?;
        Ok(Self { file })
    }
}

impl EventSink for JsonlFileSink {
    fn emit(&mut self, event: Event) -> anyhow::Result<()> {
        let line = serde_json::to_string(&event)?;
        writeln!(self.file, "{line}")?;
        Ok(())
    }
}

/// Debug sink: one line per event on stderr, never on stdout, so the final
/// answer stays machine-parseable.
pub struct StderrDebugSink;

impl EventSink for StderrDebugSink {
    fn emit(&mut self, event: Event) -> anyhow::Result<()> {
        let kind = serde_json::to_string(&event.kind)?;
        eprintln!(
            "[DEBUG] step {} {}: {}",
            event.step,
            kind.trim_matches('"'),
            event.data
        );
        Ok(())
    }
}

pub struct MultiSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn push(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Default for MultiSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for MultiSink {
    fn emit(&mut self, event: Event) -> anyhow::Result<()> {
        for sink in &mut self.sinks {
            sink.emit(event.clone())?;
        }
        Ok(())
    }
}
