//! Structured request lifecycle events.
//!
//! Each event is one JSON object written as one line to a [`LogSink`]. Log
//! platforms parse the `severity` and `message` keys; the remaining keys
//! correlate events of the same request.

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::{Map, Value, json};

use rowgate_core::{Correlation, FunctionName, LogStatus};

/// Line-oriented destination for request events.
///
/// `emit` must not fail or block the response path; sinks swallow their own
/// write errors.
pub trait LogSink: Send + Sync {
    fn emit(&self, line: &str);
}

/// Writes each event to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn emit(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{line}");
    }
}

/// Keeps every emitted line in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All emitted lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// All emitted lines parsed back into JSON. Unparseable lines are skipped.
    pub fn events(&self) -> Vec<Value> {
        self.lines
            .lock()
            .iter()
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect()
    }

    /// The `status` of every emitted event, in order.
    pub fn statuses(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|e| e.get("status").and_then(Value::as_str).map(str::to_owned))
            .collect()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, line: &str) {
        self.lines.lock().push(line.to_owned());
    }
}

/// Per-request logger bound to the request's correlating fields.
///
/// Elapsed time is measured from construction.
pub struct RequestLogger {
    function: FunctionName,
    correlation: Correlation,
    started: Instant,
    sink: Arc<dyn LogSink>,
}

impl RequestLogger {
    pub fn new(function: FunctionName, correlation: Correlation, sink: Arc<dyn LogSink>) -> Self {
        Self {
            function,
            correlation,
            started: Instant::now(),
            sink,
        }
    }

    #[must_use]
    pub fn correlation(&self) -> &Correlation {
        &self.correlation
    }

    /// Emit an event for `status`, merging `extra` over the base record.
    /// Keys in `extra` replace base keys of the same name.
    pub fn log(&self, status: LogStatus, extra: Map<String, Value>) {
        let mut event = self.base_record(status);
        event.extend(extra);
        match serde_json::to_string(&Value::Object(event)) {
            Ok(line) => self.sink.emit(&line),
            Err(e) => tracing::warn!(error = %e, "failed to encode request event"),
        }
    }

    /// Emit an event for `status` carrying `status_info`.
    pub fn log_info(&self, status: LogStatus, status_info: &str) {
        let mut extra = Map::new();
        extra.insert("status_info".into(), Value::String(status_info.to_owned()));
        self.log(status, extra);
    }

    fn base_record(&self, status: LogStatus) -> Map<String, Value> {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let c = &self.correlation;
        let message = format!(
            "{}: {} from {} with {} rows (elapsed {elapsed_ms:.3} ms)",
            status.as_str().to_uppercase(),
            self.function,
            c.user,
            c.row_count,
        );
        let record = json!({
            "severity": status.severity(),
            "message": message,
            "function": self.function.as_str(),
            "user": c.user.as_str(),
            "row_count": c.row_count,
            "request_id": c.request_id.as_str(),
            "caller": c.caller,
            "elapsed_ms": elapsed_ms,
            "status": status.as_str(),
        });
        match record {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}
