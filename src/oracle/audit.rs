//! Audit trail for oracle calls
//!
//! Every call, successful or not, leaves a preview row in `llm_actions` and
//! a full trace in the archive. Audit failures are logged and swallowed.

use super::prompts::AgentTag;
use crate::store::{trace_key, Record, RecordStore, Table, TraceStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Characters kept in the `llm_actions` preview
pub const PREVIEW_CHARS: usize = 500;

/// One completed oracle call
#[derive(Debug, Clone, Serialize)]
pub struct OracleCall {
    pub action_id: String,
    pub timestamp: DateTime<Utc>,
    pub agent_type: AgentTag,
    pub model: String,
    pub prompt: String,
    pub response: String,
    pub latency_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

/// First 500 characters plus `...` when anything was cut
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

#[derive(Clone)]
pub struct OracleAuditor {
    records: Arc<dyn RecordStore>,
    traces: Arc<dyn TraceStore>,
}

impl OracleAuditor {
    pub fn new(records: Arc<dyn RecordStore>, traces: Arc<dyn TraceStore>) -> Self {
        Self { records, traces }
    }

    /// Write the preview row and the full trace; returns the trace key
    pub fn record(&self, call: &OracleCall) -> String {
        let key = trace_key(&call.action_id, call.timestamp);

        let row = Record::new(
            Table::LlmActions,
            call.action_id.clone(),
            json!({
                "agent_type": call.agent_type,
                "model": call.model,
                "prompt": preview(&call.prompt),
                "response": preview(&call.response),
                "latency_ms": call.latency_ms,
                "success": call.success,
                "error": call.error.clone().unwrap_or_default(),
                "trace_key": key,
            }),
        )
        .at(call.timestamp.timestamp_millis());
        if let Err(e) = self.records.put(row) {
            warn!(action_id = %call.action_id, error = %e, "Could not write llm_actions row");
        }

        match serde_json::to_string_pretty(call) {
            Ok(body) => {
                if let Err(e) = self.traces.put(&key, &body) {
                    warn!(key = %key, error = %e, "Could not archive oracle trace");
                }
            }
            Err(e) => warn!(action_id = %call.action_id, error = %e, "Could not serialize oracle trace"),
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryRecordStore, MemoryTraceStore};

    fn call(prompt: String) -> OracleCall {
        OracleCall {
            action_id: "abc".into(),
            timestamp: Utc::now(),
            agent_type: AgentTag::Detection,
            model: "heuristic".into(),
            prompt,
            response: "{}".into(),
            latency_ms: 3,
            success: true,
            error: None,
        }
    }

    #[test]
    fn test_preview_truncation() {
        assert_eq!(preview("short"), "short");
        let exact = "a".repeat(PREVIEW_CHARS);
        assert_eq!(preview(&exact), exact);
        let long = "b".repeat(PREVIEW_CHARS + 1);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
    }

    #[test]
    fn test_record_writes_row_and_trace() {
        let records = Arc::new(MemoryRecordStore::new());
        let traces = Arc::new(MemoryTraceStore::new());
        let auditor = OracleAuditor::new(records.clone(), traces.clone());

        let key = auditor.record(&call("x".repeat(2_000)));
        assert!(key.starts_with("llm-traces/"));
        assert!(key.ends_with("/abc.json"));

        let rows = records.scan(Table::LlmActions, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].field_str("prompt").unwrap().chars().count(), PREVIEW_CHARS + 3);

        let trace = traces.get(&key).unwrap().unwrap();
        let full: serde_json::Value = serde_json::from_str(&trace).unwrap();
        assert_eq!(full["prompt"].as_str().unwrap().len(), 2_000);
    }
}
