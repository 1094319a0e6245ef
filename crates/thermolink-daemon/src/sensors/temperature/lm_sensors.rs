//! lm-sensors `sensors` output.

use super::TemperatureProbe;
use crate::sensors::{plausible, SourceTag};
use futures::future::BoxFuture;
use futures::FutureExt;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Label fragments that mark a CPU temperature line.
const CPU_KEYWORDS: [&str; 5] = ["core", "cpu", "package", "tccd", "tdie"];

fn celsius_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"([+-]?\d+\.?\d*)\s*°C").expect("valid regex"))
}

/// Runs the lm-sensors CLI and averages the CPU lines it prints.
pub struct LmSensorsProbe {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl LmSensorsProbe {
    /// Creates a probe running `program` with a hard timeout.
    pub fn new(program: &str, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            timeout,
        }
    }

    /// Sets extra arguments passed to the program.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    async fn read(&self) -> Option<f64> {
        let mut command = Command::new(&self.program);
        command.args(&self.args).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!("`{}` unavailable: {}", self.program, e);
                return None;
            }
            Err(_) => {
                debug!("`{}` timed out after {:?}", self.program, self.timeout);
                return None;
            }
        };

        if !output.status.success() {
            debug!("`{}` exited with {}", self.program, output.status);
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let temps = parse_cpu_temperatures(&stdout);
        if temps.is_empty() {
            return None;
        }

        let mean = temps.iter().sum::<f64>() / temps.len() as f64;
        debug!(
            "lm-sensors: mean of {} CPU lines = {:.1}°C",
            temps.len(),
            mean
        );
        Some(mean)
    }
}

impl Default for LmSensorsProbe {
    fn default() -> Self {
        Self::new("sensors", Duration::from_secs(3))
    }
}

impl TemperatureProbe for LmSensorsProbe {
    fn source(&self) -> SourceTag {
        SourceTag::LmSensors
    }

    fn probe(&self) -> BoxFuture<'_, Option<f64>> {
        self.read().boxed()
    }
}

/// Extracts plausible temperatures from CPU-labelled lines.
///
/// Only the first `°C` value of a line counts; the rest are limits such as
/// `high = +80.0°C`.
pub fn parse_cpu_temperatures(output: &str) -> Vec<f64> {
    output
        .lines()
        .filter(|line| {
            let lower = line.to_lowercase();
            lower.contains("°c") && CPU_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .filter_map(|line| {
            let captures = celsius_pattern().captures(line)?;
            let celsius = plausible(captures[1].parse().ok()?)?;
            debug!("lm-sensors: {}", line.trim());
            Some(celsius)
        })
        .collect()
}
