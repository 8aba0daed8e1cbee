//! Background CPU utilization sampling from `/proc/stat`.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

/// Aggregate CPU times from the `cpu ` summary line of `/proc/stat`,
/// in clock ticks since boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    /// Idle time, including iowait.
    pub idle: u64,
    /// Sum of all fields.
    pub total: u64,
}

/// Read the aggregate CPU times for the whole machine.
pub fn read_cpu_times() -> io::Result<CpuTimes> {
    let raw = std::fs::read_to_string("/proc/stat")?;
    parse_proc_stat(&raw).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "no aggregate cpu line in /proc/stat")
    })
}

/// Busy percentage (0-100) across the delta between two readings.
/// A zero total delta reads as 0.
pub fn utilization_between(prev: CpuTimes, next: CpuTimes) -> u32 {
    let total_delta = next.total.saturating_sub(prev.total);
    if total_delta == 0 {
        return 0;
    }
    let idle_delta = next.idle.saturating_sub(prev.idle);
    let busy_delta = total_delta.saturating_sub(idle_delta);
    (busy_delta * 100 / total_delta) as u32
}

fn parse_proc_stat(raw: &str) -> Option<CpuTimes> {
    // The first line aggregates every CPU; per-CPU lines are "cpu0", "cpu1", ...
    let line = raw.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|s| s.parse().ok())
        .collect();
    if fields.len() < 4 {
        return None;
    }
    // idle + iowait
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    let total: u64 = fields.iter().sum();
    Some(CpuTimes { idle, total })
}

/// Background-refreshed CPU utilization reading.
///
/// Reports 0 until the first refresh interval has elapsed, and keeps
/// reporting 0 (after a one-time warning) on platforms without
/// `/proc/stat`. Dropping the sampler stops and joins its thread.
pub struct CpuSampler {
    percent: Arc<AtomicU32>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CpuSampler {
    /// Start sampling, refreshing the published reading every `refresh`.
    pub fn start(refresh: Duration) -> Self {
        let percent = Arc::new(AtomicU32::new(0));
        let stop = Arc::new(AtomicBool::new(false));

        let thread_percent = Arc::clone(&percent);
        let thread_stop = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            let mut prev = match read_cpu_times() {
                Ok(times) => times,
                Err(e) => {
                    warn!(error = %e, "cpu sampling unavailable, reporting 0");
                    return;
                }
            };
            debug!(refresh_ms = refresh.as_millis() as u64, "cpu sampler started");

            while !thread_stop.load(Ordering::Relaxed) {
                std::thread::sleep(refresh);
                match read_cpu_times() {
                    Ok(next) => {
                        thread_percent
                            .store(utilization_between(prev, next), Ordering::Relaxed);
                        prev = next;
                    }
                    Err(e) => {
                        warn!(error = %e, "cpu sample failed, keeping last reading");
                    }
                }
            }
        });

        Self {
            percent,
            stop,
            handle: Some(handle),
        }
    }

    /// The most recent busy percentage (0-100). Non-blocking.
    pub fn utilization(&self) -> u32 {
        self.percent.load(Ordering::Relaxed)
    }

    /// A cloneable accessor suitable for `crest-core`'s `PoolHost`.
    pub fn reader(&self) -> impl Fn() -> u32 + Send + Sync + use<> {
        let percent = Arc::clone(&self.percent);
        move || percent.load(Ordering::Relaxed)
    }
}

impl Drop for CpuSampler {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
