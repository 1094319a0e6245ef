//! Printing the tail of the daemon log.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::LogConfig;
use crate::logging;

/// Lines shown when no count is given.
pub const DEFAULT_LINES: usize = 50;

/// Returns the first existing log file among the known locations.
pub fn find_log_file(config: &LogConfig) -> Option<PathBuf> {
    logging::log_paths(config).into_iter().find(|p| p.is_file())
}

/// Returns the last `count` lines and whether earlier lines were omitted.
pub fn tail_lines(content: &str, count: usize) -> (bool, Vec<&str>) {
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(count);
    (start > 0, lines[start..].to_vec())
}

/// Prints the last `count` lines of the log file.
pub fn show(config: &LogConfig, count: usize) -> Result<()> {
    let Some(path) = find_log_file(config) else {
        println!("No log file found. Looked in:");
        for path in logging::log_paths(config) {
            println!("  {}", path.display());
        }
        return Ok(());
    };
    print_tail(&path, count)
}

fn print_tail(path: &Path, count: usize) -> Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read log file {}", path.display()))?;
    let content = String::from_utf8_lossy(&bytes);

    println!("==> {} <==", path.display());
    let (truncated, lines) = tail_lines(&content, count);
    if truncated {
        println!("...");
    }
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}
