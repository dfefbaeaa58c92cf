//! Batch progress reporting.
//!
//! Reports how many rows of a batch have been categorized so far. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for a batch run.
#[derive(Clone, Debug)]
pub enum BatchProgressEvent {
    /// Batch accepted; `total` rows will be processed.
    Started { total: u64 },
    /// Row `n` of `total` finished.
    Row { n: u64, total: u64, success: bool },
    /// All rows processed.
    Finished { total: u64, failed: u64 },
}

/// Reports batch progress. Implementations write to stderr (human or JSON).
pub trait BatchProgressReporter: Send + Sync {
    fn report(&self, event: BatchProgressEvent);
}

/// Human-friendly progress on stderr: "batch  matching  1,234 / 5,000 rows".
pub struct StderrProgress;

impl BatchProgressReporter for StderrProgress {
    fn report(&self, event: BatchProgressEvent) {
        let line = match &event {
            BatchProgressEvent::Started { total } => {
                format!("batch  starting  {} rows\n", format_number(*total))
            }
            BatchProgressEvent::Row { n, total, .. } => format!(
                "batch  matching  {} / {} rows\n",
                format_number(*n),
                format_number(*total)
            ),
            BatchProgressEvent::Finished { total, failed } => format!(
                "batch  done  {} rows, {} failed\n",
                format_number(*total),
                format_number(*failed)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl BatchProgressReporter for JsonProgress {
    fn report(&self, event: BatchProgressEvent) {
        let obj = match &event {
            BatchProgressEvent::Started { total } => serde_json::json!({
                "event": "progress",
                "phase": "started",
                "total": total
            }),
            BatchProgressEvent::Row { n, total, success } => serde_json::json!({
                "event": "progress",
                "phase": "matching",
                "n": n,
                "total": total,
                "success": success
            }),
            BatchProgressEvent::Finished { total, failed } => serde_json::json!({
                "event": "progress",
                "phase": "finished",
                "total": total,
                "failed": failed
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl BatchProgressReporter for NoProgress {
    fn report(&self, _event: BatchProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "off" | "none" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    pub fn reporter(&self) -> Box<dyn BatchProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
