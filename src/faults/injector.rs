//! Fault injector
//!
//! Starts synthetic failures, keeps a registry of what it started and how
//! to undo it, and releases everything on `cleanup()`. Each injection writes
//! its fault event before the effect begins. Effects that outlive a
//! cancelled injection (the disk filler) are registered before they start.

use super::profile::{FaultProfile, CRASH_EXIT_CODES, ERROR_TYPES, STORM_BATCH_LIMIT};
use super::types::{CleanupReport, Fault, FaultKind, FaultState};
use crate::errors::{HealError, Result};
use crate::store::{EventLog, LogGroup};
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const MIB: usize = 1024 * 1024;

/// How a registered fault is undone
enum Reversal {
    Workers {
        cancel: Arc<AtomicBool>,
        handles: Vec<JoinHandle<()>>,
    },
    Buffer(Vec<u8>),
    /// Filler file plus the flag its writer polls between chunks
    File { path: PathBuf, cancel: Arc<AtomicBool> },
    Nothing,
}

impl Reversal {
    fn release(self, join_timeout: Duration) -> std::result::Result<(), String> {
        match self {
            Reversal::Workers { cancel, handles } => {
                cancel.store(true, Ordering::SeqCst);
                let deadline = Instant::now() + join_timeout;
                while handles.iter().any(|h| !h.is_finished()) && Instant::now() < deadline {
                    std::thread::sleep(Duration::from_millis(5));
                }

                let mut detached = 0;
                for handle in handles {
                    if handle.is_finished() {
                        if handle.join().is_err() {
                            warn!("CPU worker panicked before cleanup");
                        }
                    } else {
                        detached += 1;
                    }
                }
                if detached > 0 {
                    return Err(format!("{} CPU workers did not stop within {:?}", detached, join_timeout));
                }
                Ok(())
            }
            Reversal::Buffer(buffer) => {
                debug!(bytes = buffer.len(), "Releasing leaked buffer");
                drop(buffer);
                Ok(())
            }
            Reversal::File { path, cancel } => {
                cancel.store(true, Ordering::SeqCst);
                match std::fs::remove_file(&path) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(format!("{}: {}", path.display(), e)),
                }
            }
            Reversal::Nothing => Ok(()),
        }
    }
}

struct ActiveFault {
    fault: Fault,
    reversal: Reversal,
}

/// Creates, tracks and reverses synthetic failures
pub struct FaultInjector {
    events: Arc<dyn EventLog>,
    profile: FaultProfile,
    registry: Mutex<Vec<ActiveFault>>,
}

impl FaultInjector {
    pub fn new(events: Arc<dyn EventLog>, profile: FaultProfile) -> Self {
        Self {
            events,
            profile,
            registry: Mutex::new(Vec::new()),
        }
    }

    pub fn profile(&self) -> &FaultProfile {
        &self.profile
    }

    /// Registered faults not yet cleaned
    pub fn active_count(&self) -> usize {
        self.registry.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Current view of every registered fault
    pub fn snapshot(&self) -> Vec<Fault> {
        let now = Utc::now();
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry
            .iter_mut()
            .map(|entry| {
                entry.fault.refresh(now);
                entry.fault.clone()
            })
            .collect()
    }

    fn log_fault(&self, kind: FaultKind, details: &serde_json::Value) {
        let event = json!({
            "fault_type": kind.as_str(),
            "details": details,
            "timestamp": Utc::now().to_rfc3339(),
        });
        if let Err(e) = self.events.append_json(LogGroup::Faults, &event) {
            warn!(fault = %kind, error = %e, "Could not record fault event");
        }
    }

    fn register(&self, mut fault: Fault, reversal: Reversal, expired: bool) -> Result<Fault> {
        fault.advance(FaultState::Active)?;
        if expired {
            fault.advance(FaultState::Expired)?;
        }
        info!(fault = %fault.kind, id = %fault.id, "Fault registered");
        let view = fault.clone();
        self.registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ActiveFault { fault, reversal });
        Ok(view)
    }

    /// Track a fault whose effect is still being set up
    fn reserve(&self, fault: Fault, reversal: Reversal) {
        debug!(fault = %fault.kind, id = %fault.id, "Fault reserved");
        self.registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ActiveFault { fault, reversal });
    }

    /// Promote a reserved fault once its effect is in place
    fn activate(&self, id: &str) -> Result<Fault> {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        let entry = registry
            .iter_mut()
            .find(|entry| entry.fault.id == id)
            .ok_or_else(|| HealError::FaultInjection(format!("fault {} was cleaned up while starting", id)))?;
        entry.fault.advance(FaultState::Active)?;
        info!(fault = %entry.fault.kind, id = %entry.fault.id, "Fault registered");
        Ok(entry.fault.clone())
    }

    /// Undo a reserved fault whose setup failed
    fn release_reserved(&self, id: &str) {
        let entry = {
            let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry
                .iter()
                .position(|entry| entry.fault.id == id)
                .map(|idx| registry.remove(idx))
        };
        if let Some(entry) = entry {
            let join_timeout = Duration::from_millis(self.profile.join_timeout_ms);
            if let Err(reason) = entry.reversal.release(join_timeout) {
                warn!(id, %reason, "Could not undo partial fault");
            }
        }
    }

    /// One busy worker per logical CPU until the deadline or cleanup
    pub fn inject_cpu_saturation(&self, duration: Duration) -> Result<Fault> {
        let workers = num_cpus::get();
        let params = json!({ "duration": duration.as_secs(), "cores": workers });
        self.log_fault(FaultKind::CpuSaturation, &params);

        let cancel = Arc::new(AtomicBool::new(false));
        let deadline = Instant::now() + duration;
        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let worker_cancel = Arc::clone(&cancel);
            let spawned = std::thread::Builder::new()
                .name(format!("cpu-burn-{}", i))
                .spawn(move || burn_until(deadline, &worker_cancel));
            match spawned {
                Ok(h) => handles.push(h),
                Err(e) => {
                    // stop whatever already started
                    let _ = Reversal::Workers { cancel, handles }
                        .release(Duration::from_millis(self.profile.join_timeout_ms));
                    return Err(HealError::FaultInjection(format!("spawning CPU worker: {}", e)));
                }
            }
        }

        let fault = Fault::new(FaultKind::CpuSaturation, params).ending_after(duration);
        self.register(fault, Reversal::Workers { cancel, handles }, false)
    }

    /// Allocate and retain `size_mb` MiB until cleanup
    pub fn inject_memory_leak(&self, size_mb: u64, duration: Duration) -> Result<Fault> {
        let params = json!({ "size_mb": size_mb, "duration": duration.as_secs() });
        self.log_fault(FaultKind::MemoryLeak, &params);

        let mut buffer: Vec<u8> = Vec::new();
        for _ in 0..size_mb {
            // touched so the pages are resident
            buffer.extend(std::iter::repeat(0xA5u8).take(MIB));
        }

        let fault = Fault::new(FaultKind::MemoryLeak, params).ending_after(duration);
        self.register(fault, Reversal::Buffer(buffer), false)
    }

    /// Emit ERROR events in batches of `min(rate, 50)` per second for `duration`
    pub async fn inject_error_storm(&self, rate: u32, duration: Duration) -> Result<Fault> {
        let params = json!({ "rate": rate, "duration": duration.as_secs() });
        self.log_fault(FaultKind::ErrorStorm, &params);
        let fault = Fault::new(FaultKind::ErrorStorm, params).ending_after(duration);

        let batch = rate.min(STORM_BATCH_LIMIT);
        let started = tokio::time::Instant::now();
        let mut emitted = 0u64;
        while started.elapsed() < duration {
            for message in storm_batch(batch) {
                if let Err(e) = self.events.append(LogGroup::Faults, &message) {
                    warn!(error = %e, "Dropping storm event");
                } else {
                    emitted += 1;
                }
            }
            let remaining = duration.saturating_sub(started.elapsed());
            tokio::time::sleep(remaining.min(Duration::from_secs(1))).await;
        }
        debug!(emitted, "Error storm finished");

        self.register(fault, Reversal::Nothing, true)
    }

    /// Emit one CRITICAL crash event for `service`
    pub fn inject_service_crash(&self, service: &str) -> Result<Fault> {
        let exit_code = *CRASH_EXIT_CODES
            .choose(&mut rand::thread_rng())
            .unwrap_or(&CRASH_EXIT_CODES[0]);
        let params = json!({ "service": service, "exit_code": exit_code });
        self.log_fault(FaultKind::ServiceCrash, &params);

        let crash = json!({
            "level": "CRITICAL",
            "event": "SERVICE_CRASH",
            "service": service,
            "message": format!("{} has crashed unexpectedly", service),
            "exit_code": exit_code,
            "timestamp": Utc::now().to_rfc3339(),
        });
        self.events
            .append_json(LogGroup::Faults, &crash)
            .map_err(|e| HealError::FaultInjection(format!("crash event for {}: {}", service, e)))?;

        let fault = Fault::new(FaultKind::ServiceCrash, params);
        self.register(fault, Reversal::Nothing, true)
    }

    /// Write a `size_mb` MiB filler file under `dir`
    ///
    /// The fault is registered before the file exists, so a cancelled
    /// injection still leaves its reversal for `cleanup()`.
    pub async fn inject_disk_exhaustion(&self, dir: &Path, size_mb: u64) -> Result<Fault> {
        let path = dir.join(format!("disk_filler_{}.tmp", Utc::now().timestamp_millis()));
        let params = json!({ "path": path.display().to_string(), "size_mb": size_mb });
        self.log_fault(FaultKind::DiskExhaustion, &params);

        let fault = Fault::new(FaultKind::DiskExhaustion, params);
        let id = fault.id.clone();
        let cancel = Arc::new(AtomicBool::new(false));
        self.reserve(
            fault,
            Reversal::File {
                path: path.clone(),
                cancel: Arc::clone(&cancel),
            },
        );

        let writer = {
            let (dir, path) = (dir.to_path_buf(), path.clone());
            tokio::task::spawn_blocking(move || write_filler(&dir, &path, size_mb, &cancel))
        };
        let written = match writer.await {
            Ok(result) => result,
            Err(e) => Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())),
        };
        if let Err(e) = written {
            self.release_reserved(&id);
            return Err(HealError::FaultInjection(format!("filler {}: {}", path.display(), e)));
        }

        self.activate(&id)
    }

    /// Inject `kind` with parameters drawn from the profile
    pub async fn inject(&self, kind: FaultKind) -> Result<Fault> {
        match kind {
            FaultKind::CpuSaturation => {
                let secs = self.profile.cpu_secs.draw(&mut rand::thread_rng());
                self.inject_cpu_saturation(Duration::from_secs(secs))
            }
            FaultKind::MemoryLeak => self.inject_memory_leak(
                self.profile.memory_mb,
                Duration::from_secs(self.profile.memory_secs),
            ),
            FaultKind::ErrorStorm => {
                let (rate, secs) = {
                    let mut rng = rand::thread_rng();
                    (
                        self.profile.storm_rate.draw(&mut rng),
                        self.profile.storm_secs.draw(&mut rng),
                    )
                };
                let rate = u32::try_from(rate).unwrap_or(u32::MAX);
                self.inject_error_storm(rate, Duration::from_secs(secs)).await
            }
            FaultKind::ServiceCrash => {
                let service = self.profile.pick_service(&mut rand::thread_rng());
                self.inject_service_crash(&service)
            }
            FaultKind::DiskExhaustion => {
                let dir = self.profile.disk_path.clone();
                self.inject_disk_exhaustion(&dir, self.profile.disk_mb).await
            }
        }
    }

    /// Uniform over CPU saturation, error storm and service crash
    pub async fn inject_random(&self) -> Result<Fault> {
        let kind = *FaultKind::RANDOM_POOL
            .choose(&mut rand::thread_rng())
            .unwrap_or(&FaultKind::ServiceCrash);
        self.inject(kind).await
    }

    /// Release every registered fault; idempotent and best-effort
    pub fn cleanup(&self) -> CleanupReport {
        let drained: Vec<ActiveFault> = {
            let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *registry)
        };

        let mut report = CleanupReport::default();
        if drained.is_empty() {
            return report;
        }

        let join_timeout = Duration::from_millis(self.profile.join_timeout_ms);
        for ActiveFault { mut fault, reversal } in drained {
            match reversal.release(join_timeout) {
                Ok(()) => {
                    fault.refresh(Utc::now());
                    if let Err(e) = fault.advance(FaultState::Cleaned) {
                        debug!(error = %e, "Fault already past cleanable state");
                    }
                    report.released += 1;
                }
                Err(reason) => {
                    let err = HealError::FaultCleanup {
                        fault: format!("{} {}", fault.kind, fault.id),
                        reason,
                    };
                    warn!(error = %err, "Fault cleanup failed");
                    report.failures.push(err.to_string());
                }
            }
        }

        info!(released = report.released, failures = report.failures.len(), "Faults cleaned up");
        report
    }
}

fn burn_until(deadline: Instant, cancel: &AtomicBool) {
    let mut x: u64 = 0x9E37_79B9_7F4A_7C15;
    while !cancel.load(Ordering::Relaxed) && Instant::now() < deadline {
        for _ in 0..10_000 {
            x = x.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        }
        std::hint::black_box(x);
    }
}

fn storm_batch(size: u32) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..size)
        .map(|_| {
            let error = ERROR_TYPES.choose(&mut rng).copied().unwrap_or(ERROR_TYPES[0]);
            json!({
                "level": "ERROR",
                "error": error,
                "message": format!("{} occurred in service", error),
                "stack_trace": format!("at module.function (line {})", rng.gen_range(1..=1000)),
                "timestamp": Utc::now().to_rfc3339(),
            })
            .to_string()
        })
        .collect()
}

/// Blocking filler writer; removes its own file when cancelled or failing
fn write_filler(dir: &Path, path: &Path, size_mb: u64, cancel: &AtomicBool) -> std::io::Result<()> {
    let cancelled = || std::io::Error::new(std::io::ErrorKind::Interrupted, "filler write cancelled");
    if cancel.load(Ordering::SeqCst) {
        return Err(cancelled());
    }
    std::fs::create_dir_all(dir)?;

    let written = (|| {
        let mut file = std::fs::File::create(path)?;
        let chunk = vec![0u8; MIB];
        for _ in 0..size_mb {
            if cancel.load(Ordering::SeqCst) {
                return Err(cancelled());
            }
            file.write_all(&chunk)?;
        }
        file.flush()
    })();

    // cleanup may have run while the last chunk was in flight
    match written {
        Ok(()) if cancel.load(Ordering::SeqCst) => {
            let _ = std::fs::remove_file(path);
            Err(cancelled())
        }
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = std::fs::remove_file(path);
            Err(e)
        }
    }
}
