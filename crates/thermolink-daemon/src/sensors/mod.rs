//! System sensors module.
//!
//! Provides the CPU temperature and load figures streamed to the display.

mod load;
mod temperature;

pub use load::LoadSampler;
pub use temperature::{
    FixedPathProbe, HwmonProbe, LmSensorsProbe, TemperatureChain, TemperatureProbe,
    ZoneSelection, AMD_K10TEMP_PATHS, HWMON_ROOT, SAFE_DEFAULT_CELSIUS,
};

use chrono::{DateTime, Local};
use std::future::Future;
use thermolink_hw::link::protocol;

/// Lowest temperature accepted from any probe.
pub const MIN_CELSIUS: f64 = 0.0;

/// Highest temperature accepted from any probe.
pub const MAX_CELSIUS: f64 = 120.0;

/// Which probe produced a temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTag {
    /// Fixed AMD k10temp hwmon paths.
    AmdSpecific,
    /// Generic `/sys/class/hwmon` enumeration.
    HwmonSysfs,
    /// lm-sensors `sensors` output.
    LmSensors,
    /// No probe answered.
    SafeDefault,
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceTag::AmdSpecific => write!(f, "amd-specific"),
            SourceTag::HwmonSysfs => write!(f, "hwmon"),
            SourceTag::LmSensors => write!(f, "lm-sensors"),
            SourceTag::SafeDefault => write!(f, "safe-default"),
        }
    }
}

/// One temperature/load sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// CPU temperature in °C, one decimal.
    pub temperature_celsius: f64,
    /// CPU utilisation in percent, one decimal, never below 0.1.
    pub load_percent: f64,
    /// Probe that produced the temperature.
    pub source: SourceTag,
    /// When the sample was assembled.
    pub timestamp: DateTime<Local>,
}

impl Reading {
    /// Creates a reading stamped with the current local time.
    pub fn new(temperature_celsius: f64, load_percent: f64, source: SourceTag) -> Self {
        Self {
            temperature_celsius,
            load_percent,
            source,
            timestamp: Local::now(),
        }
    }

    /// Returns true when both figures are usable numbers.
    pub fn is_valid(&self) -> bool {
        self.temperature_celsius.is_finite() && self.load_percent.is_finite()
    }

    /// Formats the reading as a terminated wire line.
    pub fn wire_line(&self) -> String {
        protocol::encode_reading(self.temperature_celsius, self.load_percent)
    }
}

/// Something that can produce a complete `Reading` on demand.
pub trait ReadingSource {
    /// Samples a reading. Never fails.
    fn read(&mut self) -> impl Future<Output = Reading>;
}

/// Rounds to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Converts a raw millidegree value to °C, rejecting implausible results.
pub fn millidegrees_to_celsius(raw: i64) -> Option<f64> {
    plausible(raw as f64 / 1000.0)
}

/// Returns the temperature if it lies in the accepted physical range.
pub fn plausible(celsius: f64) -> Option<f64> {
    (MIN_CELSIUS..=MAX_CELSIUS)
        .contains(&celsius)
        .then_some(celsius)
}

/// Combines the load sampler and temperature chain into full readings.
pub struct SensorService {
    load: LoadSampler,
    temperature: TemperatureChain,
}

impl SensorService {
    /// Creates a sensor service.
    pub fn new(load: LoadSampler, temperature: TemperatureChain) -> Self {
        Self { load, temperature }
    }

    /// Returns the temperature chain.
    pub fn temperature(&self) -> &TemperatureChain {
        &self.temperature
    }

    /// Returns the load sampler.
    pub fn load_mut(&mut self) -> &mut LoadSampler {
        &mut self.load
    }
}

impl ReadingSource for SensorService {
    async fn read(&mut self) -> Reading {
        // Load first: the temperature probes may spawn `sensors`, which
        // would otherwise show up in the utilisation window.
        let load_percent = self.load.sample().await;
        let (temperature_celsius, source) = self.temperature.probe().await;
        Reading::new(temperature_celsius, round1(load_percent), source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millidegrees_scaling() {
        for m in [0i64, 1, 49, 50, 999, 45_678, 53_249, 119_999, 120_000] {
            let celsius = millidegrees_to_celsius(m).unwrap();
            assert_eq!(round1(celsius), round1(m as f64 / 1000.0));
        }
    }

    #[test]
    fn test_millidegrees_range() {
        assert_eq!(millidegrees_to_celsius(0), Some(0.0));
        assert_eq!(millidegrees_to_celsius(120_000), Some(120.0));
        assert_eq!(millidegrees_to_celsius(120_001), None);
        assert_eq!(millidegrees_to_celsius(-1), None);
        assert_eq!(millidegrees_to_celsius(255_000), None);
    }

    #[test]
    fn test_round1() {
        assert_eq!(round1(45.678), 45.7);
        assert_eq!(round1(45.64), 45.6);
        assert_eq!(round1(40.0), 40.0);
    }

    #[test]
    fn test_wire_line() {
        let reading = Reading::new(53.2, 7.5, SourceTag::HwmonSysfs);
        assert_eq!(reading.wire_line(), "TEMP:53.2|LOAD:7.5\n");
    }

    #[test]
    fn test_reading_is_stamped() {
        let before = Local::now();
        let reading = Reading::new(45.0, 3.0, SourceTag::AmdSpecific);
        assert!(reading.timestamp >= before);
        assert!(reading.timestamp <= Local::now());
    }

    #[test]
    fn test_reading_validity() {
        assert!(Reading::new(40.0, 0.1, SourceTag::SafeDefault).is_valid());
        assert!(!Reading::new(f64::NAN, 5.0, SourceTag::LmSensors).is_valid());
        assert!(!Reading::new(40.0, f64::INFINITY, SourceTag::LmSensors).is_valid());
    }

    #[test]
    fn test_source_tag_display() {
        assert_eq!(SourceTag::AmdSpecific.to_string(), "amd-specific");
        assert_eq!(SourceTag::SafeDefault.to_string(), "safe-default");
    }
}
