//! Hierarchical trace spans and typed events for a single task run
//!
//! Every LLM call, tool execution, thought, and decision is recorded as a
//! trace event within spans. The full trace is persisted as one pretty-printed
//! JSON document per task under the configured directory.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};
use uuid::Uuid;

use crate::Result;

/// Types of trace events. Closed enumeration; serialized in snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    LlmRequest,
    LlmResponse,
    ToolCall,
    ToolResult,
    Thought,
    PlanStep,
    CriticCheck,
    CacheHit,
    CacheMiss,
    MemoryStore,
    MemoryRecall,
    Error,
    BudgetWarning,
}

/// A single trace event within a span
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub data: Value,
    pub timestamp: f64,
}

/// A span representing a logical unit of work (e.g. one loop iteration).
/// Open until `end_time` is set.
#[derive(Debug, Clone)]
pub struct TraceSpan {
    pub span_id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub start_time: f64,
    pub end_time: Option<f64>,
    pub events: Vec<TraceEvent>,
    pub metadata: Value,
}

impl TraceSpan {
    fn new(name: &str, parent_id: Option<String>) -> Self {
        TraceSpan {
            span_id: short_id(),
            name: name.to_string(),
            parent_id,
            start_time: now_secs(),
            end_time: None,
            events: Vec::new(),
            metadata: json!({}),
        }
    }

    /// Duration in milliseconds, or None while the span is still open
    pub fn duration_ms(&self) -> Option<f64> {
        self.end_time.map(|end| (end - self.start_time) * 1000.0)
    }

    fn to_json(&self) -> Value {
        json!({
            "span_id": self.span_id,
            "name": self.name,
            "parent_id": self.parent_id,
            "start_time": self.start_time,
            "end_time": self.end_time,
            "duration_ms": self.duration_ms(),
            "events": self.events,
            "metadata": self.metadata,
        })
    }
}

/// Opaque handle to a started span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanId(String);

impl std::fmt::Display for SpanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Default)]
struct RecorderState {
    spans: Vec<TraceSpan>,
    /// Index of the currently active span, if any
    active: Option<usize>,
}

/// Collects and manages trace spans for a single task execution.
///
/// One recorder per task. A coarse lock guards span mutation and event
/// appends so tools dispatched concurrently within a task stay safe.
pub struct TraceRecorder {
    task_id: String,
    log_dir: Option<PathBuf>,
    state: Mutex<RecorderState>,
}

impl TraceRecorder {
    /// Create a recorder for one task. `log_dir` of None disables persistence.
    pub fn new(task_id: impl Into<String>, log_dir: Option<PathBuf>) -> Self {
        TraceRecorder {
            task_id: task_id.into(),
            log_dir,
            state: Mutex::new(RecorderState::default()),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Start a new span and make it the active one
    pub fn start_span(&self, name: &str, parent: Option<&SpanId>) -> SpanId {
        let mut state = self.lock();
        let span = TraceSpan::new(name, parent.map(|p| p.0.clone()));
        let id = SpanId(span.span_id.clone());
        debug!("Started span: {} ({})", name, id);
        state.spans.push(span);
        state.active = Some(state.spans.len() - 1);
        id
    }

    /// Close a span. Defaults to the most recently started open span.
    /// Idempotent if the span is already closed.
    pub fn end_span(&self, span: Option<&SpanId>) {
        let mut state = self.lock();
        let idx = match span {
            Some(id) => state.spans.iter().position(|s| s.span_id == id.0),
            None => state.active,
        };
        if let Some(idx) = idx {
            if state.spans[idx].end_time.is_none() {
                state.spans[idx].end_time = Some(now_secs());
                debug!(
                    "Closed span: {} ({:.1}ms)",
                    state.spans[idx].name,
                    state.spans[idx].duration_ms().unwrap_or(0.0)
                );
            }
            if state.active == Some(idx) {
                state.active = None;
            }
        }
    }

    /// Record an event in the currently active span, creating an `orphan`
    /// span on demand if none is open.
    pub fn record(&self, event_type: EventType, data: Value) -> TraceEvent {
        let event = TraceEvent {
            event_id: short_id(),
            event_type,
            data,
            timestamp: now_secs(),
        };
        let mut state = self.lock();
        let idx = match state.active {
            Some(idx) => idx,
            None => {
                state.spans.push(TraceSpan::new("orphan", None));
                let idx = state.spans.len() - 1;
                state.active = Some(idx);
                idx
            }
        };
        state.spans[idx].events.push(event.clone());
        event
    }

    /// Total number of events across all spans
    pub fn event_count(&self) -> usize {
        self.lock().spans.iter().map(|s| s.events.len()).sum()
    }

    /// All events of a specific type, in append order across spans
    pub fn events_of(&self, event_type: EventType) -> Vec<TraceEvent> {
        self.lock()
            .spans
            .iter()
            .flat_map(|s| s.events.iter())
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Serialize the full trace to a JSON document
    pub fn to_json(&self) -> Value {
        let state = self.lock();
        let total_events: usize = state.spans.iter().map(|s| s.events.len()).sum();
        json!({
            "task_id": self.task_id,
            "spans": state.spans.iter().map(|s| s.to_json()).collect::<Vec<_>>(),
            "total_events": total_events,
        })
    }

    /// Persist the trace as `trace_<task_id>.json` under the log directory.
    ///
    /// Returns the written path, or None if persistence is disabled.
    pub fn save(&self) -> Result<Option<PathBuf>> {
        let Some(dir) = &self.log_dir else {
            return Ok(None);
        };
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("trace_{}.json", self.task_id));
        let mut doc = serde_json::to_string_pretty(&self.to_json())?;
        doc.push('\n');
        std::fs::write(&path, doc)?;
        info!("Saved trace to {} ({} events)", path.display(), self.event_count());
        Ok(Some(path))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecorderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_lifecycle() {
        let recorder = TraceRecorder::new("t1", None);
        let span = recorder.start_span("iteration_0", None);
        recorder.record(EventType::Thought, json!({"text": "hm"}));
        recorder.end_span(Some(&span));

        let doc = recorder.to_json();
        assert_eq!(doc["total_events"], 1);
        let spans = doc["spans"].as_array().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0]["name"], "iteration_0");
        assert!(spans[0]["end_time"].is_f64());
        assert!(spans[0]["duration_ms"].as_f64().unwrap() >= 0.0);
    }

    #[test]
    fn test_end_span_is_idempotent() {
        let recorder = TraceRecorder::new("t1", None);
        let span = recorder.start_span("work", None);
        recorder.end_span(Some(&span));
        let first_end = recorder.to_json()["spans"][0]["end_time"].clone();
        recorder.end_span(Some(&span));
        assert_eq!(recorder.to_json()["spans"][0]["end_time"], first_end);
    }

    #[test]
    fn test_end_defaults_to_most_recent() {
        let recorder = TraceRecorder::new("t1", None);
        recorder.start_span("a", None);
        recorder.end_span(None);
        let doc = recorder.to_json();
        assert!(doc["spans"][0]["end_time"].is_f64());
    }

    #[test]
    fn test_orphan_span_for_events_outside_spans() {
        let recorder = TraceRecorder::new("t1", None);
        recorder.record(EventType::CacheMiss, json!({"best_score": 0.2}));
        let doc = recorder.to_json();
        assert_eq!(doc["spans"][0]["name"], "orphan");
        assert_eq!(doc["total_events"], 1);
    }

    #[test]
    fn test_events_of_filters_by_type() {
        let recorder = TraceRecorder::new("t1", None);
        recorder.start_span("s", None);
        recorder.record(EventType::ToolCall, json!({"tool": "grep"}));
        recorder.record(EventType::ToolResult, json!({"tool": "grep"}));
        recorder.record(EventType::ToolCall, json!({"tool": "shell"}));
        assert_eq!(recorder.events_of(EventType::ToolCall).len(), 2);
        assert_eq!(recorder.events_of(EventType::Error).len(), 0);
    }

    #[test]
    fn test_nested_parent_linkage() {
        let recorder = TraceRecorder::new("t1", None);
        let outer = recorder.start_span("outer", None);
        recorder.start_span("inner", Some(&outer));
        let doc = recorder.to_json();
        assert_eq!(doc["spans"][1]["parent_id"], doc["spans"][0]["span_id"]);
    }

    #[test]
    fn test_save_roundtrips_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = TraceRecorder::new("abc123", Some(dir.path().to_path_buf()));
        let span = recorder.start_span("iteration_0", None);
        recorder.record(EventType::LlmRequest, json!({"model": "m", "tool_count": 3}));
        recorder.record(EventType::LlmResponse, json!({"stop_reason": "end_turn"}));
        recorder.end_span(Some(&span));

        let path = recorder.save().unwrap().unwrap();
        assert!(path.ends_with("trace_abc123.json"));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.ends_with('\n'));
        let reloaded: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(reloaded, recorder.to_json());
    }

    #[test]
    fn test_save_disabled_without_log_dir() {
        let recorder = TraceRecorder::new("t1", None);
        assert!(recorder.save().unwrap().is_none());
    }
}
