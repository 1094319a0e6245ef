//! CPU temperature sources.
//!
//! Probes are tried strictly in order and the first plausible value wins.
//! When every probe comes up empty the chain still answers, with
//! `SAFE_DEFAULT_CELSIUS`, so the stream never stalls on a missing sensor.

mod fixed;
mod hwmon;
mod lm_sensors;

pub use fixed::{FixedPathProbe, AMD_K10TEMP_PATHS};
pub use hwmon::{HwmonProbe, ZoneSelection, HWMON_ROOT};
pub use lm_sensors::LmSensorsProbe;

use super::{millidegrees_to_celsius, plausible, round1, SourceTag};
use futures::future::BoxFuture;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Temperature reported when no probe produced a value.
pub const SAFE_DEFAULT_CELSIUS: f64 = 40.0;

/// A single way of obtaining the CPU temperature.
pub trait TemperatureProbe: Send + Sync {
    /// Tag recorded on readings from this probe.
    fn source(&self) -> SourceTag;

    /// Attempts a reading in °C. `None` means the source is unavailable.
    fn probe(&self) -> BoxFuture<'_, Option<f64>>;
}

/// Ordered list of temperature probes.
pub struct TemperatureChain {
    probes: Vec<Box<dyn TemperatureProbe>>,
}

impl TemperatureChain {
    /// Creates a chain from probes in priority order.
    pub fn new(probes: Vec<Box<dyn TemperatureProbe>>) -> Self {
        Self { probes }
    }

    /// Returns the first plausible temperature, or the safe default.
    ///
    /// The result is always within `[0, 120]` and rounded to one decimal.
    pub async fn probe(&self) -> (f64, SourceTag) {
        for probe in &self.probes {
            match probe.probe().await.and_then(plausible) {
                Some(celsius) => {
                    debug!("Temperature from {}: {:.1}°C", probe.source(), celsius);
                    return (round1(celsius), probe.source());
                }
                None => debug!("Temperature source {} unavailable", probe.source()),
            }
        }

        warn!(
            "No temperature source available, using safe default {:.1}°C",
            SAFE_DEFAULT_CELSIUS
        );
        (SAFE_DEFAULT_CELSIUS, SourceTag::SafeDefault)
    }

    /// Evaluates every probe, without short-circuiting.
    pub async fn survey(&self) -> Vec<(SourceTag, Option<f64>)> {
        let mut results = Vec::with_capacity(self.probes.len());
        for probe in &self.probes {
            let value = probe.probe().await.and_then(plausible).map(round1);
            results.push((probe.source(), value));
        }
        results
    }
}

/// Reads a sysfs millidegree file.
///
/// Empty, non-numeric and out-of-range contents all yield `None`.
pub(crate) fn read_millidegrees(path: &Path) -> Option<f64> {
    let content = fs::read_to_string(path).ok()?;
    let raw = content.trim();
    if raw.is_empty() {
        return None;
    }
    millidegrees_to_celsius(raw.parse().ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    struct StaticProbe {
        source: SourceTag,
        value: Option<f64>,
    }

    impl TemperatureProbe for StaticProbe {
        fn source(&self) -> SourceTag {
            self.source
        }

        fn probe(&self) -> BoxFuture<'_, Option<f64>> {
            futures::future::ready(self.value).boxed()
        }
    }

    fn chain(values: [Option<f64>; 3]) -> TemperatureChain {
        let tags = [
            SourceTag::AmdSpecific,
            SourceTag::HwmonSysfs,
            SourceTag::LmSensors,
        ];
        TemperatureChain::new(
            tags.into_iter()
                .zip(values)
                .map(|(source, value)| {
                    Box::new(StaticProbe { source, value }) as Box<dyn TemperatureProbe>
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_first_available_wins() {
        let result = chain([Some(48.26), Some(70.0), Some(30.0)]).probe().await;
        assert_eq!(result, (48.3, SourceTag::AmdSpecific));

        let result = chain([None, Some(70.0), Some(30.0)]).probe().await;
        assert_eq!(result, (70.0, SourceTag::HwmonSysfs));

        let result = chain([None, None, Some(30.0)]).probe().await;
        assert_eq!(result, (30.0, SourceTag::LmSensors));
    }

    #[tokio::test]
    async fn test_all_absent_uses_safe_default() {
        let result = chain([None, None, None]).probe().await;
        assert_eq!(result, (40.0, SourceTag::SafeDefault));

        let empty = TemperatureChain::new(Vec::new());
        assert_eq!(empty.probe().await, (40.0, SourceTag::SafeDefault));
    }

    #[tokio::test]
    async fn test_implausible_values_fall_through() {
        let result = chain([Some(150.0), Some(-3.0), Some(f64::NAN)]).probe().await;
        assert_eq!(result, (40.0, SourceTag::SafeDefault));

        let result = chain([Some(121.0), Some(55.5), None]).probe().await;
        assert_eq!(result, (55.5, SourceTag::HwmonSysfs));
    }

    #[tokio::test]
    async fn test_always_in_range() {
        let candidates = [None, Some(-1.0), Some(0.0), Some(64.2), Some(120.0), Some(500.0)];
        for a in candidates {
            for b in candidates {
                for c in candidates {
                    let (celsius, _) = chain([a, b, c]).probe().await;
                    assert!((0.0..=120.0).contains(&celsius));
                }
            }
        }
    }

    #[tokio::test]
    async fn test_survey_reports_every_probe() {
        let survey = chain([None, Some(45.64), Some(200.0)]).survey().await;
        assert_eq!(
            survey,
            vec![
                (SourceTag::AmdSpecific, None),
                (SourceTag::HwmonSysfs, Some(45.6)),
                (SourceTag::LmSensors, None),
            ]
        );
    }

    #[test]
    fn test_read_millidegrees() {
        let dir = tempfile::tempdir().unwrap();
        let cases = [
            ("ok", "45000\n", Some(45.0)),
            ("empty", "", None),
            ("blank", "  \n", None),
            ("text", "N/A\n", None),
            ("hot", "125000\n", None),
            ("negative", "-5000\n", None),
        ];
        for (name, content, expected) in cases {
            let path = dir.path().join(name);
            fs::write(&path, content).unwrap();
            assert_eq!(read_millidegrees(&path), expected, "{}", name);
        }
        assert_eq!(read_millidegrees(&dir.path().join("missing")), None);
    }
}
