//! Configuration management for autoheal
//!
//! TOML configuration with defaults for every field and validation.
//! Location: ~/.autoheal/config.toml

use crate::agent::{CycleOrchestrator, CycleSettings};
use crate::errors::{HealError, Result};
use crate::faults::FaultProfile;
use crate::health::HealthSettings;
use crate::oracle::client::{DEFAULT_MODEL, DEFAULT_OLLAMA_URL};
use crate::oracle::{HeuristicOracle, HttpOracle, OracleClient, OracleProvider, RetryPolicy};
use crate::remediation::{ExecutorKind, ProcessExecutor, SimulatedExecutor, StepExecutor};
use crate::store::Stores;
use crate::telemetry::TelemetryCollector;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Complete configuration for autoheal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub orchestrator: CycleSettings,
    pub oracle: OracleConfig,
    pub executor: ExecutorConfig,
    pub faults: FaultProfile,
    pub health: HealthSettings,
    pub storage: StorageConfig,
}

/// Reasoning oracle connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub provider: OracleProvider,
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the bearer token, if any
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// Remediation step execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub mode: ExecutorKind,
    pub command_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    File,
}

/// Where records, event logs and traces live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: OracleProvider::Heuristic,
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_env: None,
            timeout_secs: 60,
            max_retries: 3,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            mode: ExecutorKind::Simulated,
            command_timeout_secs: 30,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            data_dir: "~/.autoheal/data".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(config_path) => Self::load_from_file(config_path),
            None => Self::load_default(),
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| HealError::Config(format!("Failed to read config {}: {}", path.display(), e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| HealError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from the standard location or fall back to built-in defaults
    pub fn load_default() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Config::default()),
        }
    }

    /// `~/.autoheal/config.toml`
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".autoheal").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.health.window == 0 {
            return Err(HealError::Config("health.window must be greater than 0".to_string()));
        }
        if self.health.per_group_limit == 0 {
            return Err(HealError::Config(
                "health.per_group_limit must be greater than 0".to_string(),
            ));
        }
        if self.health.services.is_empty() {
            return Err(HealError::Config("health.services must name at least one service".to_string()));
        }

        self.faults.validate().map_err(HealError::Config)?;

        if self.oracle.timeout_secs == 0 {
            return Err(HealError::Config("oracle.timeout_secs must be greater than 0".to_string()));
        }
        if self.oracle.max_retries == 0 {
            return Err(HealError::Config("oracle.max_retries must be at least 1".to_string()));
        }
        if self.oracle.provider != OracleProvider::Heuristic && self.oracle.base_url.trim().is_empty() {
            return Err(HealError::Config(format!(
                "oracle.base_url is required for the {} provider",
                self.oracle.provider
            )));
        }

        if self.executor.command_timeout_secs == 0 {
            return Err(HealError::Config(
                "executor.command_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::File && self.storage.data_dir.trim().is_empty() {
            return Err(HealError::Config("storage.data_dir must not be empty".to_string()));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| HealError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HealError::Config(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| HealError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.storage.data_dir)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle.timeout_secs)
    }

    /// Backend selected by `[oracle]`
    pub fn oracle_client(&self) -> Result<Arc<dyn OracleClient>> {
        if self.oracle.provider == OracleProvider::Heuristic {
            return Ok(Arc::new(HeuristicOracle::new()));
        }
        let api_key = self
            .oracle
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok());
        let client = HttpOracle::new(
            self.oracle.provider,
            &self.oracle.base_url,
            &self.oracle.model,
            self.oracle_timeout(),
        )?
        .with_api_key(api_key)
        .with_retry(RetryPolicy::new(self.oracle.max_retries));
        Ok(Arc::new(client))
    }

    /// Executor selected by `[executor]`
    pub fn step_executor(&self) -> Arc<dyn StepExecutor> {
        match self.executor.mode {
            ExecutorKind::Simulated => Arc::new(SimulatedExecutor::new()),
            ExecutorKind::Process => Arc::new(ProcessExecutor::new(Duration::from_secs(
                self.executor.command_timeout_secs,
            ))),
        }
    }

    /// Stores selected by `[storage]`
    pub fn stores(&self) -> Result<Stores> {
        match self.storage.backend {
            StorageBackend::Memory => Ok(Stores::in_memory()),
            StorageBackend::File => Stores::on_disk(&self.data_dir()),
        }
    }

    /// Fully wired orchestrator
    pub fn orchestrator(&self, telemetry: TelemetryCollector) -> Result<CycleOrchestrator> {
        Ok(CycleOrchestrator::builder(self.stores()?)
            .settings(self.orchestrator.clone())
            .fault_profile(self.faults.clone())
            .health(self.health.clone())
            .oracle(self.oracle_client()?)
            .oracle_timeout(self.oracle_timeout())
            .executor(self.step_executor())
            .telemetry(telemetry)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.orchestrator.inject_every, 3);
        assert_eq!(config.health.window, 100);
        assert_eq!(config.oracle.provider, OracleProvider::Heuristic);
        assert_eq!(config.executor.mode, ExecutorKind::Simulated);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [orchestrator]
            settle_secs = 0

            [executor]
            mode = "process"
            "#,
        )
        .unwrap();
        assert_eq!(config.orchestrator.settle_secs, 0);
        assert_eq!(config.orchestrator.manual_settle_secs, 5);
        assert_eq!(config.executor.mode, ExecutorKind::Process);
        assert_eq!(config.executor.command_timeout_secs, 30);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let parsed: std::result::Result<Config, _> = toml::from_str("[oracle]\nprovider = \"crystal-ball\"\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Config::default();
        config.health.window = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.health.services.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.oracle.provider = OracleProvider::Ollama;
        config.oracle.base_url = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.faults.cpu_secs = crate::faults::Span::new(10, 5);
        assert!(matches!(config.validate(), Err(HealError::Config(_))));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.orchestrator.max_cycles = Some(7);
        config.storage.backend = StorageBackend::Memory;
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = Config::load_from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, HealError::Config(_)));
    }

    #[test]
    fn test_expand_path() {
        assert!(!Config::expand_path("~/.autoheal").to_string_lossy().contains('~'));
        assert_eq!(Config::expand_path("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_executor_selection() {
        let mut config = Config::default();
        assert_eq!(config.step_executor().name(), "simulated");
        config.executor.mode = ExecutorKind::Process;
        assert_eq!(config.step_executor().name(), "process");
    }

    #[test]
    fn test_file_storage_under_data_dir() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().to_string_lossy().into_owned();
        config.stores().unwrap();
        assert!(dir.path().join("logs").exists());
    }
}
