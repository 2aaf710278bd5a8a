//! External collaborators: event log, record store, trace archive
//!
//! Each is a trait with an in-memory implementation (tests, demo runs) and a
//! file-backed one rooted at the configured data directory.

pub mod events;
pub mod records;
pub mod traces;

pub use events::{EventLog, JsonlEventLog, LogEvent, LogGroup, MemoryEventLog};
pub use records::{
    capped_json, truncate_blob, JsonFileRecordStore, MemoryRecordStore, Record, RecordKey,
    RecordStore, Table, BLOB_LIMIT, COMMAND_LIMIT, DECISION_BLOB_LIMIT,
};
pub use traces::{trace_key, FsTraceStore, MemoryTraceStore, TraceStore};

use std::sync::Arc;

/// The three stores every component writes through
#[derive(Clone)]
pub struct Stores {
    pub events: Arc<dyn EventLog>,
    pub records: Arc<dyn RecordStore>,
    pub traces: Arc<dyn TraceStore>,
}

impl Stores {
    /// Everything in memory
    pub fn in_memory() -> Self {
        Self {
            events: Arc::new(MemoryEventLog::new()),
            records: Arc::new(MemoryRecordStore::new()),
            traces: Arc::new(MemoryTraceStore::new()),
        }
    }

    /// Everything below `data_dir`
    pub fn on_disk(data_dir: &std::path::Path) -> crate::errors::Result<Self> {
        Ok(Self {
            events: Arc::new(JsonlEventLog::open(data_dir.join("logs"))?),
            records: Arc::new(JsonFileRecordStore::open(data_dir)?),
            traces: Arc::new(FsTraceStore::new(data_dir)),
        })
    }
}
