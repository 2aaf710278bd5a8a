//! Persistent record store
//!
//! Six tables keyed by (id, timestamp). Records are schemaless JSON objects;
//! large text fields are capped before they are written.

use crate::errors::{HealError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Cap for output, plan and error blobs
pub const BLOB_LIMIT: usize = 5_000;

/// Cap for decision analysis and metrics snapshots
pub const DECISION_BLOB_LIMIT: usize = 10_000;

/// Cap for a stored command line
pub const COMMAND_LIMIT: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Incidents,
    Remediations,
    AgentDecisions,
    SystemMetrics,
    CommandExecutions,
    LlmActions,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Incidents,
        Table::Remediations,
        Table::AgentDecisions,
        Table::SystemMetrics,
        Table::CommandExecutions,
        Table::LlmActions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Incidents => "incidents",
            Table::Remediations => "remediations",
            Table::AgentDecisions => "agent_decisions",
            Table::SystemMetrics => "system_metrics",
            Table::CommandExecutions => "command_executions",
            Table::LlmActions => "llm_actions",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite primary key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub id: String,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub table: Table,
    pub key: RecordKey,
    pub fields: serde_json::Value,
}

impl Record {
    pub fn new(table: Table, id: impl Into<String>, fields: serde_json::Value) -> Self {
        Self {
            table,
            key: RecordKey {
                id: id.into(),
                timestamp_ms: chrono::Utc::now().timestamp_millis(),
            },
            fields,
        }
    }

    pub fn at(mut self, timestamp_ms: i64) -> Self {
        self.key.timestamp_ms = timestamp_ms;
        self
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }
}

/// Table-oriented persistence
pub trait RecordStore: Send + Sync {
    /// Insert or overwrite by key
    fn put(&self, record: Record) -> Result<()>;

    /// Up to `limit` records, newest first
    fn scan(&self, table: Table, limit: usize) -> Result<Vec<Record>>;

    /// Returns whether a record was removed
    fn delete(&self, table: Table, key: &RecordKey) -> Result<bool>;
}

/// Cap a text blob at `max` characters without splitting a code point
pub fn truncate_blob(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Serialize a value and cap its JSON text
pub fn capped_json<T: Serialize>(value: &T, max: usize) -> String {
    match serde_json::to_string(value) {
        Ok(text) => truncate_blob(&text, max),
        Err(e) => format!("<unserializable: {}>", e),
    }
}

fn newest_first(records: &mut [Record]) {
    records.sort_by(|a, b| b.key.timestamp_ms.cmp(&a.key.timestamp_ms));
}

/// Records held in process memory
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: Mutex<HashMap<Table, Vec<Record>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, table: Table) -> usize {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.get(&table).map(Vec::len).unwrap_or(0)
    }
}

impl RecordStore for MemoryRecordStore {
    fn put(&self, record: Record) -> Result<()> {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let rows = tables.entry(record.table).or_default();
        rows.retain(|r| r.key != record.key);
        rows.push(record);
        Ok(())
    }

    fn scan(&self, table: Table, limit: usize) -> Result<Vec<Record>> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let mut rows = tables.get(&table).cloned().unwrap_or_default();
        newest_first(&mut rows);
        rows.truncate(limit);
        Ok(rows)
    }

    fn delete(&self, table: Table, key: &RecordKey) -> Result<bool> {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let Some(rows) = tables.get_mut(&table) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|r| &r.key != key);
        Ok(rows.len() != before)
    }
}

/// One pretty-printed JSON file per record under `<root>/tables/<table>/`
pub struct JsonFileRecordStore {
    root: PathBuf,
}

impl JsonFileRecordStore {
    /// Create the table directories if they don't exist
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().join("tables");
        for table in Table::ALL {
            let dir = root.join(table.as_str());
            fs::create_dir_all(&dir)
                .map_err(|e| HealError::StoreUnavailable(format!("{}: {}", dir.display(), e)))?;
        }
        Ok(Self { root })
    }

    fn table_dir(&self, table: Table) -> PathBuf {
        self.root.join(table.as_str())
    }

    fn record_path(&self, table: Table, key: &RecordKey) -> PathBuf {
        let safe_id: String = key
            .id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.table_dir(table)
            .join(format!("{:013}_{}.json", key.timestamp_ms, safe_id))
    }
}

impl RecordStore for JsonFileRecordStore {
    fn put(&self, record: Record) -> Result<()> {
        let path = self.record_path(record.table, &record.key);
        let json = serde_json::to_string_pretty(&record)?;
        fs::write(&path, json)
            .map_err(|e| HealError::StoreUnavailable(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    fn scan(&self, table: Table, limit: usize) -> Result<Vec<Record>> {
        let dir = self.table_dir(table);
        let entries = fs::read_dir(&dir)
            .map_err(|e| HealError::StoreUnavailable(format!("{}: {}", dir.display(), e)))?;

        // file names start with the zero-padded timestamp
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect();
        paths.sort();
        paths.reverse();

        let mut records = Vec::new();
        for path in paths {
            if records.len() >= limit {
                break;
            }
            let Ok(json) = fs::read_to_string(&path) else {
                continue;
            };
            match serde_json::from_str::<Record>(&json) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable record"),
            }
        }
        newest_first(&mut records);
        Ok(records)
    }

    fn delete(&self, table: Table, key: &RecordKey) -> Result<bool> {
        let path = self.record_path(table, key);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        Ok(true)
    }
}
