//! CPU load sampler.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};
use tracing::debug;

/// Smallest load ever reported, so a sampled idle CPU never reads 0.0.
pub const LOAD_FLOOR: f64 = 0.1;

/// Used when `/proc/stat` cannot be read either.
const PROC_FALLBACK: f64 = 5.0;

/// Used when the measurement itself is unusable.
const MEASUREMENT_FALLBACK: f64 = 1.0;

/// Default measurement window.
const DEFAULT_WINDOW: Duration = Duration::from_millis(300);

/// CPU utilisation sampler.
///
/// A single refresh always reads zero, so every sample is a short window
/// between two refreshes.
pub struct LoadSampler {
    system: System,
    window: Duration,
    stat_path: PathBuf,
}

impl LoadSampler {
    /// Creates a sampler with the default 300ms window.
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    /// Creates a sampler with a custom window.
    pub fn with_window(window: Duration) -> Self {
        Self {
            system: System::new(),
            window,
            stat_path: PathBuf::from("/proc/stat"),
        }
    }

    /// Samples utilisation in percent. Never fails and never returns 0.0.
    pub async fn sample(&mut self) -> f64 {
        let measured = self.measure().await;
        let stat_path = &self.stat_path;
        resolve_load(measured, || read_proc_stat(stat_path))
    }

    async fn measure(&mut self) -> f64 {
        // Calibration refresh; its value is discarded.
        self.system.refresh_cpu_usage();
        tokio::time::sleep(self.window.max(MINIMUM_CPU_UPDATE_INTERVAL)).await;
        self.system.refresh_cpu_usage();

        let usage = self.system.global_cpu_usage() as f64;
        debug!("CPU usage over {:?}: {:.1}%", self.window, usage);
        usage
    }
}

impl Default for LoadSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies the fallback chain and floor to a windowed measurement.
fn resolve_load<F>(measured: f64, fallback: F) -> f64
where
    F: FnOnce() -> Option<f64>,
{
    let load = if !measured.is_finite() {
        MEASUREMENT_FALLBACK
    } else if measured == 0.0 {
        fallback().unwrap_or(PROC_FALLBACK)
    } else {
        measured
    };
    load.clamp(LOAD_FLOOR, 100.0)
}

fn read_proc_stat(path: &Path) -> Option<f64> {
    let content = fs::read_to_string(path).ok()?;
    parse_proc_stat(&content)
}

/// Busy percentage from the aggregate `cpu` line of `/proc/stat`.
///
/// This is a ratio of counters since boot, not a delta, so it is only a
/// rough approximation of current load.
pub fn parse_proc_stat(content: &str) -> Option<f64> {
    let line = content.lines().find(|l| l.starts_with("cpu "))?;
    let parts: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|s| s.parse().ok())
        .collect();

    if parts.len() < 4 {
        return None;
    }

    let idle = parts[3] as f64;
    let total: u64 = parts.iter().sum();
    if total == 0 {
        return None;
    }

    Some(100.0 - (idle / total as f64) * 100.0)
}
