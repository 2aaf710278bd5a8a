//! Command-line argument parsing for autoheal
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use crate::config::{Config, StorageBackend};
use crate::faults::FaultKind;
use crate::oracle::OracleProvider;
use crate::remediation::ExecutorKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// autoheal - inject faults, detect them, heal them, repeat
#[derive(Parser, Debug)]
#[command(name = "autoheal")]
#[command(author = "Jerome (Kubashen) Naidoo")]
#[command(version)]
#[command(about = "Self-healing infrastructure simulator", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (only errors and the final summary)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory for records, event logs and oracle traces
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Keep everything in memory for this run
    #[arg(long, global = true)]
    pub in_memory: bool,

    /// Reasoning oracle: heuristic, ollama or openai
    #[arg(long, global = true)]
    pub oracle: Option<OracleProvider>,

    /// Oracle model name
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Step executor: simulated or process
    #[arg(long, global = true)]
    pub executor: Option<ExecutorKind>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Run a single scheduled cycle
    RunOnce,

    /// Run cycles on an interval
    Run {
        /// Seconds between cycles
        #[arg(long)]
        interval: Option<u64>,

        /// Stop after this many cycles
        #[arg(long)]
        max_cycles: Option<u64>,
    },

    /// Run cycles until interrupted
    Forever {
        /// Seconds between cycles
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Trigger a manual cycle that injects a fault (random when omitted)
    Inject {
        /// cpu, memory, errors, crash or disk
        kind: Option<FaultKind>,
    },

    /// Print the current health verdict and per-service status
    Health,

    /// Display current configuration
    Config,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Apply command-line overrides on top of file configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.data_dir {
            config.storage.data_dir = dir.to_string_lossy().into_owned();
            config.storage.backend = StorageBackend::File;
        }
        if self.in_memory {
            config.storage.backend = StorageBackend::Memory;
        }
        if let Some(provider) = self.oracle {
            config.oracle.provider = provider;
        }
        if let Some(model) = &self.model {
            config.oracle.model = model.clone();
        }
        if let Some(mode) = self.executor {
            config.executor.mode = mode;
        }
        match &self.command {
            Commands::Run { interval, max_cycles } => {
                if let Some(secs) = interval {
                    config.orchestrator.cycle_interval_secs = *secs;
                }
                if max_cycles.is_some() {
                    config.orchestrator.max_cycles = *max_cycles;
                }
            }
            Commands::Forever { interval: Some(secs) } => {
                config.orchestrator.cycle_interval_secs = *secs;
            }
            _ => {}
        }
    }
}

impl Verbosity {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Check if should show progress spinners
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Check if should print per-cycle details
    pub fn show_events(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}
