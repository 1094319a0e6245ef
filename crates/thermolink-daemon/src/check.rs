//! Sensor availability report.

use std::fmt::Write;

use crate::sensors::{SensorService, SourceTag, SAFE_DEFAULT_CELSIUS};

/// Commands suggested when no temperature source works.
pub const INSTALL_ADVICE: [&str; 2] = ["sudo apt-get install lm-sensors", "sudo sensors-detect"];

/// Result of evaluating every temperature source once.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReport {
    /// Every probe with its value, in chain order.
    pub sources: Vec<(SourceTag, Option<f64>)>,
    /// Current CPU load in percent.
    pub load_percent: f64,
}

impl SensorReport {
    /// Surveys all probes and takes one load sample.
    pub async fn collect(service: &mut SensorService) -> Self {
        let sources = service.temperature().survey().await;
        let load_percent = service.load_mut().sample().await;
        Self {
            sources,
            load_percent,
        }
    }

    /// The source the stream will use, if any answered.
    pub fn active(&self) -> Option<(SourceTag, f64)> {
        self.sources
            .iter()
            .find_map(|(tag, value)| value.map(|v| (*tag, v)))
    }

    /// Human-readable report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Temperature sources:");
        for (tag, value) in &self.sources {
            match value {
                Some(celsius) => {
                    let _ = writeln!(out, "  [ok] {:<14} {:.1}°C", tag.to_string(), celsius);
                }
                None => {
                    let _ = writeln!(out, "  [--] {:<14} unavailable", tag.to_string());
                }
            }
        }
        let _ = writeln!(out, "CPU load: {:.1}%", self.load_percent);

        match self.active() {
            Some((tag, celsius)) => {
                let _ = writeln!(out, "Using {} ({:.1}°C)", tag, celsius);
            }
            None => {
                let _ = writeln!(
                    out,
                    "No temperature source found, {:.1}°C will be sent instead.",
                    SAFE_DEFAULT_CELSIUS
                );
                let _ = writeln!(out, "To get real readings install lm-sensors:");
                for command in INSTALL_ADVICE {
                    let _ = writeln!(out, "  {}", command);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_is_first_available() {
        let report = SensorReport {
            sources: vec![
                (SourceTag::AmdSpecific, None),
                (SourceTag::HwmonSysfs, Some(51.2)),
                (SourceTag::LmSensors, Some(49.0)),
            ],
            load_percent: 12.5,
        };
        assert_eq!(report.active(), Some((SourceTag::HwmonSysfs, 51.2)));

        let text = report.render();
        assert!(text.contains("[--] amd-specific"));
        assert!(text.contains("[ok] hwmon"));
        assert!(text.contains("CPU load: 12.5%"));
        assert!(text.contains("Using hwmon (51.2°C)"));
        assert!(!text.contains("lm-sensors:"));
    }

    #[test]
    fn test_nothing_available_prints_advice() {
        let report = SensorReport {
            sources: vec![
                (SourceTag::AmdSpecific, None),
                (SourceTag::HwmonSysfs, None),
                (SourceTag::LmSensors, None),
            ],
            load_percent: 0.1,
        };
        assert_eq!(report.active(), None);

        let text = report.render();
        assert!(text.contains("40.0°C will be sent instead"));
        assert!(text.contains("sudo sensors-detect"));
    }
}
