//! Configuration management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thermolink_hw::{LinkOptions, BAUD_RATE};

use crate::sensors::{
    FixedPathProbe, HwmonProbe, LmSensorsProbe, TemperatureChain, TemperatureProbe,
    ZoneSelection, AMD_K10TEMP_PATHS, HWMON_ROOT,
};
use crate::streaming::LoopSettings;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Serial device path (None = discover)
    #[serde(default)]
    pub port: Option<String>,

    /// Serial baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Link timing
    #[serde(default)]
    pub link: LinkConfig,

    /// Streaming loop settings
    #[serde(default)]
    pub stream: StreamConfig,

    /// Temperature source settings
    #[serde(default)]
    pub sensors: SensorsConfig,

    /// Log file settings (daemon mode)
    #[serde(default)]
    pub log: LogConfig,
}

/// Serial link timing, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Wait after opening the port before talking to the board
    #[serde(default = "default_settle")]
    pub settle_ms: u64,

    /// Wait after the greeting
    #[serde(default = "default_handshake_wait")]
    pub handshake_wait_ms: u64,

    /// Write timeout per line
    #[serde(default = "default_io_timeout")]
    pub write_timeout_ms: u64,

    /// Serial read timeout
    #[serde(default = "default_io_timeout")]
    pub read_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle(),
            handshake_wait_ms: default_handshake_wait(),
            write_timeout_ms: default_io_timeout(),
            read_timeout_ms: default_io_timeout(),
        }
    }
}

/// Streaming loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Pause between ticks in milliseconds
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    /// Pause after a faulty tick in milliseconds
    #[serde(default = "default_anomaly_interval")]
    pub anomaly_interval_ms: u64,

    /// Consecutive send failures before giving up
    #[serde(default = "default_max_errors")]
    pub max_errors: u32,

    /// Time to wait for a reply after each send in milliseconds
    #[serde(default = "default_response_grace")]
    pub response_grace_ms: u64,

    /// In daemon mode, log every Nth successful send
    #[serde(default = "default_daemon_log_every")]
    pub daemon_log_every: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            anomaly_interval_ms: default_anomaly_interval(),
            max_errors: default_max_errors(),
            response_grace_ms: default_response_grace(),
            daemon_log_every: default_daemon_log_every(),
        }
    }
}

/// Temperature source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorsConfig {
    /// Files probed first, in order
    #[serde(default = "default_fixed_paths")]
    pub fixed_paths: Vec<PathBuf>,

    /// hwmon class directory
    #[serde(default = "default_hwmon_root")]
    pub hwmon_root: PathBuf,

    /// How to pick one hwmon temperature
    #[serde(default)]
    pub hwmon_selection: ZoneSelection,

    /// lm-sensors executable
    #[serde(default = "default_sensors_program")]
    pub sensors_program: String,

    /// Extra arguments for the lm-sensors executable
    #[serde(default)]
    pub sensors_args: Vec<String>,

    /// lm-sensors timeout in milliseconds
    #[serde(default = "default_sensors_timeout")]
    pub sensors_timeout_ms: u64,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            fixed_paths: default_fixed_paths(),
            hwmon_root: default_hwmon_root(),
            hwmon_selection: ZoneSelection::default(),
            sensors_program: default_sensors_program(),
            sensors_args: Vec::new(),
            sensors_timeout_ms: default_sensors_timeout(),
        }
    }
}

/// Log file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log file path (None = home directory, then /tmp)
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Rotate once the file reaches this size
    #[serde(default = "default_log_max_bytes")]
    pub max_bytes: u64,

    /// Rotated files kept
    #[serde(default = "default_log_backups")]
    pub backups: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: None,
            max_bytes: default_log_max_bytes(),
            backups: default_log_backups(),
        }
    }
}

// Default value functions
fn default_baud_rate() -> u32 {
    BAUD_RATE
}

fn default_settle() -> u64 {
    2000
}

fn default_handshake_wait() -> u64 {
    500
}

fn default_io_timeout() -> u64 {
    1000
}

fn default_interval() -> u64 {
    1000
}

fn default_anomaly_interval() -> u64 {
    2000
}

fn default_max_errors() -> u32 {
    10
}

fn default_response_grace() -> u64 {
    100
}

fn default_daemon_log_every() -> u32 {
    10
}

fn default_fixed_paths() -> Vec<PathBuf> {
    AMD_K10TEMP_PATHS
        .iter()
        .map(PathBuf::from)
        .collect()
}

fn default_hwmon_root() -> PathBuf {
    PathBuf::from(HWMON_ROOT)
}

fn default_sensors_program() -> String {
    "sensors".to_string()
}

fn default_sensors_timeout() -> u64 {
    3000
}

fn default_log_max_bytes() -> u64 {
    1024 * 1024
}

fn default_log_backups() -> u32 {
    3
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;
        Ok(config)
    }

    /// Serial link options.
    pub fn link_options(&self) -> LinkOptions {
        LinkOptions {
            baud_rate: self.baud_rate,
            settle: Duration::from_millis(self.link.settle_ms),
            handshake_wait: Duration::from_millis(self.link.handshake_wait_ms),
            write_timeout: Duration::from_millis(self.link.write_timeout_ms),
            read_timeout: Duration::from_millis(self.link.read_timeout_ms),
        }
    }

    /// Streaming loop settings; `log_every` comes from the run mode.
    pub fn loop_settings(&self, log_every: u32) -> LoopSettings {
        LoopSettings {
            interval: Duration::from_millis(self.stream.interval_ms),
            anomaly_interval: Duration::from_millis(self.stream.anomaly_interval_ms),
            response_grace: Duration::from_millis(self.stream.response_grace_ms),
            max_errors: self.stream.max_errors.max(1),
            log_every: log_every.max(1),
        }
    }

    /// Temperature probes in priority order.
    pub fn temperature_chain(&self) -> TemperatureChain {
        let sensors = &self.sensors;
        let probes: Vec<Box<dyn TemperatureProbe>> = vec![
            Box::new(FixedPathProbe::new(sensors.fixed_paths.clone())),
            Box::new(HwmonProbe::new(&sensors.hwmon_root, sensors.hwmon_selection)),
            Box::new(
                LmSensorsProbe::new(
                    &sensors.sensors_program,
                    Duration::from_millis(sensors.sensors_timeout_ms),
                )
                .with_args(sensors.sensors_args.iter().cloned()),
            ),
        ];
        TemperatureChain::new(probes)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            link: LinkConfig::default(),
            stream: StreamConfig::default(),
            sensors: SensorsConfig::default(),
            log: LogConfig::default(),
        }
    }
}
