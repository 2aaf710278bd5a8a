//! Host metrics sampler
//!
//! Publishes CPU and memory utilisation into the `metrics` group so that
//! resource faults reach the same classifier as log-borne ones.

use crate::errors::Result;
use crate::store::{EventLog, LogGroup, Record, RecordStore, Table};
use serde::Serialize;
use std::sync::Mutex;
use sysinfo::System;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSample {
    pub cpu: f64,
    pub memory: f64,
}

pub struct MetricsProbe {
    system: Mutex<System>,
}

impl MetricsProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        // first CPU reading is only meaningful relative to a previous refresh
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }

    pub fn sample(&self) -> MetricsSample {
        let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        system.refresh_cpu();
        system.refresh_memory();

        let cpu = system.global_cpu_info().cpu_usage() as f64;
        let total = system.total_memory();
        let memory = if total == 0 {
            0.0
        } else {
            system.used_memory() as f64 / total as f64 * 100.0
        };
        MetricsSample {
            cpu: round1(cpu),
            memory: round1(memory),
        }
    }

    /// Sample and write to the `metrics` group and `system_metrics` table
    pub fn publish(&self, events: &dyn EventLog, records: &dyn RecordStore) -> Result<MetricsSample> {
        let sample = self.sample();
        let value = serde_json::to_value(sample)?;
        events.append_json(LogGroup::Metrics, &value)?;
        records.put(Record::new(Table::SystemMetrics, Uuid::new_v4().to_string(), value))?;
        Ok(sample)
    }
}

impl Default for MetricsProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
