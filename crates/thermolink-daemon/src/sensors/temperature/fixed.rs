//! Fixed sysfs paths known to carry the CPU die temperature.

use super::{read_millidegrees, TemperatureProbe};
use crate::sensors::SourceTag;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::PathBuf;
use tracing::debug;

/// k10temp on AMD Zen parts sits behind PCI function 00:18.3.
pub const AMD_K10TEMP_PATHS: [&str; 3] = [
    "/sys/devices/pci0000:00/0000:00:18.3/hwmon/hwmon0/temp1_input",
    "/sys/devices/pci0000:00/0000:00:18.3/hwmon/hwmon1/temp1_input",
    "/sys/devices/pci0000:00/0000:00:18.3/hwmon/hwmon2/temp1_input",
];

/// Reads the first usable file out of a fixed list of candidates.
pub struct FixedPathProbe {
    paths: Vec<PathBuf>,
}

impl FixedPathProbe {
    /// Creates a probe over the given candidate files.
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    /// Creates a probe over the AMD k10temp locations.
    pub fn amd() -> Self {
        Self::new(AMD_K10TEMP_PATHS.iter().map(PathBuf::from).collect())
    }

    fn read(&self) -> Option<f64> {
        self.paths.iter().find_map(|path| {
            let celsius = read_millidegrees(path)?;
            debug!("Fixed path {}: {:.1}°C", path.display(), celsius);
            Some(celsius)
        })
    }
}

impl Default for FixedPathProbe {
    fn default() -> Self {
        Self::amd()
    }
}

impl TemperatureProbe for FixedPathProbe {
    fn source(&self) -> SourceTag {
        SourceTag::AmdSpecific
    }

    fn probe(&self) -> BoxFuture<'_, Option<f64>> {
        futures::future::ready(self.read()).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_first_usable_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("hwmon0_temp1_input");
        let garbage = dir.path().join("hwmon1_temp1_input");
        let good = dir.path().join("hwmon2_temp1_input");
        fs::write(&garbage, "not a number\n").unwrap();
        fs::write(&good, "61250\n").unwrap();

        let probe = FixedPathProbe::new(vec![missing, garbage, good]);
        assert_eq!(probe.probe().await, Some(61.25));
        assert_eq!(probe.source(), SourceTag::AmdSpecific);
    }

    #[tokio::test]
    async fn test_out_of_range_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp1_input");
        fs::write(&path, "130000\n").unwrap();

        let probe = FixedPathProbe::new(vec![path]);
        assert_eq!(probe.probe().await, None);
    }

    #[tokio::test]
    async fn test_no_paths() {
        assert_eq!(FixedPathProbe::new(Vec::new()).probe().await, None);
    }
}
