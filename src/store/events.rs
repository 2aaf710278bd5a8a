//! Log/event source
//!
//! Named groups of timestamped text messages. Every component writes
//! through `EventLog::append`; the health window reads the newest events of
//! several groups merged most-recent-first.

use crate::errors::{HealError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

/// Default retained events per group for the in-memory log
pub const DEFAULT_GROUP_CAPACITY: usize = 10_000;

/// Named event groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogGroup {
    Faults,
    Metrics,
    DetectionAgent,
    RemediationAgent,
    Orchestrator,
}

impl LogGroup {
    /// Groups the health window is computed from
    pub const HEALTH_SOURCES: [LogGroup; 4] = [
        LogGroup::Faults,
        LogGroup::Metrics,
        LogGroup::DetectionAgent,
        LogGroup::RemediationAgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogGroup::Faults => "faults",
            LogGroup::Metrics => "metrics",
            LogGroup::DetectionAgent => "detection-agent",
            LogGroup::RemediationAgent => "remediation-agent",
            LogGroup::Orchestrator => "orchestrator",
        }
    }
}

impl fmt::Display for LogGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogGroup {
    type Err = HealError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim_start_matches("/autonomous/") {
            "faults" => Ok(LogGroup::Faults),
            "metrics" => Ok(LogGroup::Metrics),
            "detection-agent" => Ok(LogGroup::DetectionAgent),
            "remediation-agent" => Ok(LogGroup::RemediationAgent),
            "orchestrator" => Ok(LogGroup::Orchestrator),
            other => Err(HealError::Config(format!("Unknown log group: {}", other))),
        }
    }
}

/// One timestamped message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub group: LogGroup,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    pub message: String,
}

impl LogEvent {
    pub fn now(group: LogGroup, message: impl Into<String>) -> Self {
        Self {
            group,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            message: message.into(),
        }
    }
}

/// Append-only grouped event log
pub trait EventLog: Send + Sync {
    fn append(&self, group: LogGroup, message: &str) -> Result<()>;

    /// Newest `per_group_limit` events of each group, merged newest first
    fn recent(&self, groups: &[LogGroup], per_group_limit: usize) -> Result<Vec<LogEvent>>;

    /// Append a serializable record as a one-line JSON message
    fn append_json(&self, group: LogGroup, value: &serde_json::Value) -> Result<()> {
        self.append(group, &value.to_string())
    }
}

/// Merge per-group slices (each newest first) into one newest-first list
pub fn merge_newest_first(mut events: Vec<LogEvent>) -> Vec<LogEvent> {
    // stable: equal timestamps keep their per-group order
    events.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
    events
}

/// Bounded in-memory log
pub struct MemoryEventLog {
    groups: Mutex<HashMap<LogGroup, VecDeque<LogEvent>>>,
    capacity: usize,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_GROUP_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Insert an event with an explicit timestamp
    pub fn push(&self, event: LogEvent) {
        let mut groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        let queue = groups.entry(event.group).or_default();
        if queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(event);
    }

    /// Total events across groups
    pub fn len(&self) -> usize {
        let groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        groups.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every message of one group, oldest first
    pub fn messages(&self, group: LogGroup) -> Vec<String> {
        let groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        groups
            .get(&group)
            .map(|q| q.iter().map(|e| e.message.clone()).collect())
            .unwrap_or_default()
    }
}

impl Default for MemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog for MemoryEventLog {
    fn append(&self, group: LogGroup, message: &str) -> Result<()> {
        self.push(LogEvent::now(group, message));
        Ok(())
    }

    fn recent(&self, groups: &[LogGroup], per_group_limit: usize) -> Result<Vec<LogEvent>> {
        let stored = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        let mut merged = Vec::new();
        for group in groups {
            if let Some(queue) = stored.get(group) {
                merged.extend(queue.iter().rev().take(per_group_limit).cloned());
            }
        }
        Ok(merge_newest_first(merged))
    }
}

/// One JSON-lines file per group under a directory
pub struct JsonlEventLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlEventLog {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| HealError::StoreUnavailable(format!("{}: {}", dir.display(), e)))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn group_path(&self, group: LogGroup) -> PathBuf {
        self.dir.join(format!("{}.jsonl", group.as_str()))
    }

    fn read_group(&self, group: LogGroup, limit: usize) -> Result<Vec<LogEvent>> {
        let path = self.group_path(group);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&path)
            .map_err(|e| HealError::StoreUnavailable(format!("{}: {}", path.display(), e)))?;

        let mut tail: VecDeque<LogEvent> = VecDeque::with_capacity(limit.min(1024));
        for line in BufReader::new(file).lines() {
            let line = line?;
            // torn or foreign lines are skipped
            let Ok(event) = serde_json::from_str::<LogEvent>(&line) else {
                continue;
            };
            if tail.len() == limit {
                tail.pop_front();
            }
            if limit > 0 {
                tail.push_back(event);
            }
        }
        Ok(tail.into_iter().rev().collect())
    }
}

impl EventLog for JsonlEventLog {
    fn append(&self, group: LogGroup, message: &str) -> Result<()> {
        let event = LogEvent::now(group, message);
        let line = serde_json::to_string(&event)?;

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.group_path(group);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| HealError::StoreUnavailable(format!("{}: {}", path.display(), e)))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    fn recent(&self, groups: &[LogGroup], per_group_limit: usize) -> Result<Vec<LogEvent>> {
        let mut merged = Vec::new();
        for group in groups {
            merged.extend(self.read_group(*group, per_group_limit)?);
        }
        Ok(merge_newest_first(merged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn at(group: LogGroup, ts: i64, msg: &str) -> LogEvent {
        LogEvent {
            group,
            timestamp_ms: ts,
            message: msg.to_string(),
        }
    }

    #[test]
    fn test_group_names_round_trip() {
        for group in [
            LogGroup::Faults,
            LogGroup::Metrics,
            LogGroup::DetectionAgent,
            LogGroup::RemediationAgent,
            LogGroup::Orchestrator,
        ] {
            assert_eq!(group.as_str().parse::<LogGroup>().unwrap(), group);
        }
        assert_eq!("/autonomous/faults".parse::<LogGroup>().unwrap(), LogGroup::Faults);
        assert!("nope".parse::<LogGroup>().is_err());
    }

    #[test]
    fn test_memory_recent_merges_newest_first() {
        let log = MemoryEventLog::new();
        log.push(at(LogGroup::Faults, 10, "f1"));
        log.push(at(LogGroup::Metrics, 20, "m1"));
        log.push(at(LogGroup::Faults, 30, "f2"));
        log.push(at(LogGroup::Orchestrator, 40, "o1"));

        let events = log.recent(&[LogGroup::Faults, LogGroup::Metrics], 10).unwrap();
        let messages: Vec<&str> = events.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["f2", "m1", "f1"]);
    }

    #[test]
    fn test_memory_per_group_limit() {
        let log = MemoryEventLog::new();
        for i in 0..10 {
            log.push(at(LogGroup::Faults, i, &format!("f{}", i)));
        }
        let events = log.recent(&[LogGroup::Faults], 3).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].message, "f9");
        assert_eq!(events[2].message, "f7");
    }

    #[test]
    fn test_memory_capacity_evicts_oldest() {
        let log = MemoryEventLog::with_capacity(2);
        log.push(at(LogGroup::Faults, 1, "a"));
        log.push(at(LogGroup::Faults, 2, "b"));
        log.push(at(LogGroup::Faults, 3, "c"));
        assert_eq!(log.messages(LogGroup::Faults), vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_jsonl_append_and_recent() {
        let dir = TempDir::new().unwrap();
        let log = JsonlEventLog::open(dir.path()).unwrap();
        log.append(LogGroup::Faults, "first").unwrap();
        log.append(LogGroup::Faults, "second").unwrap();
        log.append_json(LogGroup::Metrics, &serde_json::json!({"cpu": 42})).unwrap();

        let faults = log.recent(&[LogGroup::Faults], 1).unwrap();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].message, "second");

        let all = log.recent(&LogGroup::HEALTH_SOURCES, 10).unwrap();
        assert_eq!(all.len(), 3);
        assert!(dir.path().join("faults.jsonl").exists());
    }

    #[test]
    fn test_jsonl_skips_torn_lines() {
        let dir = TempDir::new().unwrap();
        let log = JsonlEventLog::open(dir.path()).unwrap();
        log.append(LogGroup::Faults, "ok").unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join("faults.jsonl"))
            .unwrap();
        writeln!(file, "{{\"group\": \"faults\", \"timest").unwrap();

        let events = log.recent(&[LogGroup::Faults], 10).unwrap();
        assert_eq!(events.len(), 1);
    }
}
