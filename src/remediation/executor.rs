//! Step executors
//!
//! A `StepExecutor` turns one command line into an exit code and output.
//! The engine decides what counts as a step; executors only run commands.

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Default bound on one commanded step
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of running one command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub exit_code: i32,
    pub output: String,
    pub error: Option<String>,
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait StepExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, command: &str) -> Result<CommandOutcome>;
}

/// Which executor the configuration selects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    #[default]
    Simulated,
    Process,
}

impl FromStr for ExecutorKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simulated" | "sim" | "dry-run" => Ok(ExecutorKind::Simulated),
            "process" | "shell" => Ok(ExecutorKind::Process),
            other => Err(format!("unknown executor '{}' (expected simulated or process)", other)),
        }
    }
}

/// Coarse command category used to phrase simulated output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    Restart,
    Kill,
    Clean,
    Other,
}

impl CommandClass {
    pub fn of(command: &str) -> Self {
        let lower = command.to_ascii_lowercase();
        if lower.contains("restart") {
            CommandClass::Restart
        } else if lower.contains("kill") {
            CommandClass::Kill
        } else if lower.contains("clean") || lower.contains("rm") {
            CommandClass::Clean
        } else {
            CommandClass::Other
        }
    }
}

/// Never touches the host; every command succeeds
#[derive(Debug, Clone, Default)]
pub struct SimulatedExecutor;

impl SimulatedExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StepExecutor for SimulatedExecutor {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn execute(&self, command: &str) -> Result<CommandOutcome> {
        let output = match CommandClass::of(command) {
            CommandClass::Restart => format!("Simulated restart command: {}", command),
            CommandClass::Kill => format!("Simulated kill command: {}", command),
            CommandClass::Clean => format!("Simulated cleanup: {}", command),
            CommandClass::Other => format!("Simulated execution: {}", command),
        };
        Ok(CommandOutcome {
            exit_code: 0,
            output,
            error: None,
        })
    }
}

/// Runs each command through `sh -c` with a timeout
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    step_timeout: Duration,
}

impl ProcessExecutor {
    pub fn new(step_timeout: Duration) -> Self {
        Self { step_timeout }
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_TIMEOUT)
    }
}

#[async_trait]
impl StepExecutor for ProcessExecutor {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn execute(&self, command: &str) -> Result<CommandOutcome> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).kill_on_drop(true);

        match timeout(self.step_timeout, cmd.output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let exit_code = output.status.code().unwrap_or(-1);
                let error = if exit_code == 0 {
                    None
                } else if stderr.trim().is_empty() {
                    Some(format!("exited with status {}", exit_code))
                } else {
                    Some(stderr.trim_end().to_string())
                };
                Ok(CommandOutcome {
                    exit_code,
                    output: stdout,
                    error,
                })
            }
            Ok(Err(e)) => Ok(CommandOutcome {
                exit_code: -1,
                output: String::new(),
                error: Some(format!("Failed to execute command: {}", e)),
            }),
            Err(_) => Ok(CommandOutcome {
                exit_code: -1,
                output: String::new(),
                error: Some(format!("Command timed out after {}ms", self.step_timeout.as_millis())),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_classes() {
        assert_eq!(CommandClass::of("systemctl RESTART web-api"), CommandClass::Restart);
        assert_eq!(CommandClass::of("pkill -f burn"), CommandClass::Kill);
        assert_eq!(CommandClass::of("rm -f /tmp/x"), CommandClass::Clean);
        assert_eq!(CommandClass::of("docker system clean"), CommandClass::Clean);
        assert_eq!(CommandClass::of("uptime"), CommandClass::Other);
    }

    #[test]
    fn test_executor_kind_parse() {
        assert_eq!("Process".parse::<ExecutorKind>().unwrap(), ExecutorKind::Process);
        assert_eq!("simulated".parse::<ExecutorKind>().unwrap(), ExecutorKind::Simulated);
        assert!("docker".parse::<ExecutorKind>().is_err());
    }

    #[tokio::test]
    async fn test_simulated_always_succeeds() {
        let out = SimulatedExecutor::new().execute("systemctl restart web-api").await.unwrap();
        assert!(out.succeeded());
        assert_eq!(out.output, "Simulated restart command: systemctl restart web-api");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_exit_codes() {
        let exec = ProcessExecutor::default();
        let ok = exec.execute("echo healed").await.unwrap();
        assert!(ok.succeeded());
        assert_eq!(ok.output.trim(), "healed");

        let bad = exec.execute("echo nope >&2; exit 3").await.unwrap();
        assert_eq!(bad.exit_code, 3);
        assert_eq!(bad.error.as_deref(), Some("nope"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_timeout() {
        let exec = ProcessExecutor::new(Duration::from_millis(100));
        let out = exec.execute("sleep 5").await.unwrap();
        assert!(!out.succeeded());
        assert!(out.error.unwrap().contains("timed out"));
    }
}
