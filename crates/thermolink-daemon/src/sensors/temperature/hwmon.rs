//! Generic hwmon enumeration.

use super::{read_millidegrees, TemperatureProbe};
use crate::sensors::SourceTag;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default hwmon class directory.
pub const HWMON_ROOT: &str = "/sys/class/hwmon";

/// hwmon driver names that report the CPU package or die.
const CPU_DRIVERS: [&str; 4] = ["k10temp", "coretemp", "zenpower", "cpu_thermal"];

/// How a single temperature is chosen out of every hwmon leaf found.
///
/// Leaves belong to unrelated zones (NVMe, chipset, GPU), so neither choice
/// is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ZoneSelection {
    /// Hottest leaf across all devices.
    #[default]
    Hottest,
    /// Hottest leaf of a known CPU driver, else hottest overall.
    PreferCpu,
}

/// One plausible temperature leaf.
#[derive(Debug, Clone, PartialEq)]
struct ZoneReading {
    device: String,
    label: String,
    celsius: f64,
}

/// Scans every `hwmon*/temp*_input` leaf under a root directory.
pub struct HwmonProbe {
    root: PathBuf,
    selection: ZoneSelection,
}

impl HwmonProbe {
    /// Creates a probe rooted at `root`.
    pub fn new<P: AsRef<Path>>(root: P, selection: ZoneSelection) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            selection,
        }
    }

    fn collect(&self) -> Vec<ZoneReading> {
        let mut devices = match sorted_entries(&self.root, |name| name.starts_with("hwmon")) {
            Some(devices) => devices,
            None => {
                debug!("hwmon root {} not readable", self.root.display());
                return Vec::new();
            }
        };
        devices.retain(|d| d.is_dir());

        let mut readings = Vec::new();
        for dir in devices {
            let device = fs::read_to_string(dir.join("name"))
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|_| file_name(&dir));

            let inputs = sorted_entries(&dir, |name| {
                name.starts_with("temp") && name.ends_with("_input")
            })
            .unwrap_or_default();

            for input in inputs {
                let Some(celsius) = read_millidegrees(&input) else {
                    continue;
                };
                let base = file_name(&input).trim_end_matches("_input").to_string();
                let label = fs::read_to_string(dir.join(format!("{}_label", base)))
                    .map(|s| s.trim().to_string())
                    .unwrap_or(base);
                debug!("hwmon: {} - {} = {:.1}°C", device, label, celsius);
                readings.push(ZoneReading {
                    device: device.clone(),
                    label,
                    celsius,
                });
            }
        }
        readings
    }

    fn select<'a>(&self, readings: &'a [ZoneReading]) -> Option<&'a ZoneReading> {
        match self.selection {
            ZoneSelection::Hottest => hottest(readings.iter()),
            ZoneSelection::PreferCpu => hottest(
                readings
                    .iter()
                    .filter(|r| CPU_DRIVERS.contains(&r.device.as_str())),
            )
            .or_else(|| hottest(readings.iter())),
        }
    }

    fn read(&self) -> Option<f64> {
        let readings = self.collect();
        let selected = self.select(&readings)?;
        debug!(
            "hwmon: selected {} - {} = {:.1}°C out of {} leaves",
            selected.device,
            selected.label,
            selected.celsius,
            readings.len()
        );
        Some(selected.celsius)
    }
}

impl Default for HwmonProbe {
    fn default() -> Self {
        Self::new(HWMON_ROOT, ZoneSelection::default())
    }
}

impl TemperatureProbe for HwmonProbe {
    fn source(&self) -> SourceTag {
        SourceTag::HwmonSysfs
    }

    fn probe(&self) -> BoxFuture<'_, Option<f64>> {
        futures::future::ready(self.read()).boxed()
    }
}

fn hottest<'a>(readings: impl Iterator<Item = &'a ZoneReading>) -> Option<&'a ZoneReading> {
    readings.reduce(|a, b| if b.celsius > a.celsius { b } else { a })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Lists entries of `dir` whose file name passes `keep`, sorted by path.
fn sorted_entries<F>(dir: &Path, keep: F) -> Option<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| keep(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.path())
        .collect();
    paths.sort();
    Some(paths)
}
