//! Logging setup.
//!
//! Interactive sessions log to the console. Daemon sessions log to a
//! size-rotated file, falling back to the console when no location is
//! writable.

use anyhow::Result;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Log file name used in the home directory and in /tmp.
const LOG_FILE_NAME: &str = "thermolink.log";

/// How the process was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Foreground session, progress on the console.
    Interactive,
    /// Background service, events to the log file.
    Daemon,
}

/// Where log events end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    Console,
    File(PathBuf),
}

impl std::fmt::Display for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogSink::Console => write!(f, "console"),
            LogSink::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Logging behaviour handed to the streaming loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Active sink.
    pub sink: LogSink,
    /// Log every Nth successful send at info level.
    pub log_every: u32,
}

/// Default daemon log locations, in order of preference.
pub fn default_log_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(format!(".{}", LOG_FILE_NAME)));
    }
    paths.push(std::env::temp_dir().join(LOG_FILE_NAME));
    paths
}

/// Log locations for a configuration: the configured file, or the defaults.
pub fn log_paths(config: &LogConfig) -> Vec<PathBuf> {
    match &config.file {
        Some(file) => vec![file.clone()],
        None => default_log_paths(),
    }
}

/// Installs the global subscriber.
pub fn init(
    mode: Mode,
    verbose: bool,
    config: &LogConfig,
    daemon_log_every: u32,
) -> Result<LogSettings> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::from_default_env().add_directive(level.parse()?);

    if mode == Mode::Interactive {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        info!("Interactive mode, logging to console");
        return Ok(LogSettings {
            sink: LogSink::Console,
            log_every: 1,
        });
    }

    let log_every = daemon_log_every.max(1);
    let mut failures = Vec::new();
    for path in log_paths(config) {
        match RotatingFile::open(&path, config.max_bytes, config.backups) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .init();
                info!("Logging to {}", path.display());
                return Ok(LogSettings {
                    sink: LogSink::File(path),
                    log_every,
                });
            }
            Err(e) => failures.push(format!("{}: {}", path.display(), e)),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    warn!(
        "File logging unavailable ({}), using console",
        failures.join("; ")
    );
    Ok(LogSettings {
        sink: LogSink::Console,
        log_every,
    })
}

/// Append-only log file that rolls over at a size limit.
///
/// On rollover `file` becomes `file.1`, `file.1` becomes `file.2` and so on;
/// the oldest backup beyond `backups` is overwritten.
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    backups: u32,
    file: File,
    written: u64,
}

impl RotatingFile {
    /// Opens (or creates) the log file for appending.
    pub fn open(path: &Path, max_bytes: u64, backups: u32) -> io::Result<Self> {
        let file = open_append(path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            max_bytes,
            backups,
            file,
            written,
        })
    }

    fn backup_path(&self, index: u32) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.backups == 0 {
            self.file = File::create(&self.path)?;
        } else {
            for index in (1..self.backups).rev() {
                let from = self.backup_path(index);
                if from.exists() {
                    fs::rename(&from, self.backup_path(index + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
            self.file = open_append(&self.path)?;
        }
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        let mut file = RotatingFile::open(&path, 10, 2).unwrap();

        file.write_all(b"aaaaaaaa\n").unwrap();
        file.write_all(b"bbbbbbbb\n").unwrap();
        file.write_all(b"cccccccc\n").unwrap();
        file.write_all(b"dddddddd\n").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "dddddddd\n");
        assert_eq!(
            fs::read_to_string(dir.path().join("test.log.1")).unwrap(),
            "cccccccc\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("test.log.2")).unwrap(),
            "bbbbbbbb\n"
        );
        assert!(!dir.path().join("test.log.3").exists());
    }

    #[test]
    fn test_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        fs::write(&path, "old\n").unwrap();

        let mut file = RotatingFile::open(&path, 1024, 3).unwrap();
        file.write_all(b"new\n").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "old\nnew\n");
    }

    #[test]
    fn test_rotation_without_backups_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        let mut file = RotatingFile::open(&path, 5, 0).unwrap();

        file.write_all(b"1234\n").unwrap();
        file.write_all(b"5678\n").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "5678\n");
        assert!(!dir.path().join("test.log.1").exists());
    }

    #[test]
    fn test_open_fails_in_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent").join("test.log");
        assert!(RotatingFile::open(&path, 1024, 3).is_err());
    }

    #[test]
    fn test_log_paths() {
        let config = LogConfig {
            file: Some(PathBuf::from("/var/log/thermolink.log")),
            ..LogConfig::default()
        };
        assert_eq!(
            log_paths(&config),
            vec![PathBuf::from("/var/log/thermolink.log")]
        );

        let defaults = log_paths(&LogConfig::default());
        assert!(defaults.last().unwrap().ends_with("thermolink.log"));
    }

    #[test]
    fn test_sink_display() {
        assert_eq!(LogSink::Console.to_string(), "console");
        assert_eq!(
            LogSink::File(PathBuf::from("/tmp/thermolink.log")).to_string(),
            "/tmp/thermolink.log"
        );
    }
}
