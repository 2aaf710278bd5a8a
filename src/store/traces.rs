//! Oracle trace archive
//!
//! Full request/response bodies are kept as objects under
//! `llm-traces/YYYY/MM/DD/<action_id>.json`.

use crate::errors::{HealError, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

/// Archive key for one oracle call
pub fn trace_key(action_id: &str, at: DateTime<Utc>) -> String {
    format!("llm-traces/{}/{}.json", at.format("%Y/%m/%d"), action_id)
}

/// Object-style archive of full oracle traces
pub trait TraceStore: Send + Sync {
    fn put(&self, key: &str, body: &str) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<String>>;
}

#[derive(Default)]
pub struct MemoryTraceStore {
    objects: Mutex<BTreeMap<String, String>>,
}

impl MemoryTraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.keys().cloned().collect()
    }
}

impl TraceStore for MemoryTraceStore {
    fn put(&self, key: &str, body: &str) -> Result<()> {
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.insert(key.to_string(), body.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        Ok(objects.get(key).cloned())
    }
}

/// Traces as files below a root directory
pub struct FsTraceStore {
    root: PathBuf,
}

impl FsTraceStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(HealError::StoreUnavailable(format!("Invalid trace key: {}", key)));
        }
        Ok(self.root.join(relative))
    }
}

impl TraceStore for FsTraceStore {
    fn put(&self, key: &str, body: &str) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, body)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.resolve(key)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_trace_key_layout() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
        assert_eq!(trace_key("abc", at), "llm-traces/2024/03/07/abc.json");
    }

    #[test]
    fn test_fs_store_put_get() {
        let dir = TempDir::new().unwrap();
        let store = FsTraceStore::new(dir.path());
        store.put("llm-traces/2024/03/07/abc.json", "{}").unwrap();
        assert_eq!(store.get("llm-traces/2024/03/07/abc.json").unwrap().as_deref(), Some("{}"));
        assert!(store.get("llm-traces/2024/03/07/missing.json").unwrap().is_none());
    }

    #[test]
    fn test_fs_store_rejects_escaping_keys() {
        let dir = TempDir::new().unwrap();
        let store = FsTraceStore::new(dir.path());
        assert!(store.put("../outside.json", "{}").is_err());
        assert!(store.put("/etc/passwd", "{}").is_err());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryTraceStore::new();
        store.put("k", "v").unwrap();
        assert_eq!(store.keys(), vec!["k".to_string()]);
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }
}
