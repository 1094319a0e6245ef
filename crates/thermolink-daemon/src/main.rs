//! thermolink daemon
//!
//! Streams CPU temperature and load to a serial display once per second.

mod check;
mod config;
mod logging;
mod logtail;
mod sensors;
mod service;
mod streaming;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use thermolink_hw::{discover_ports, LinkDevice, PortInfo};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use check::SensorReport;
use config::Config;
use logging::Mode;
use sensors::{LoadSampler, SensorService, SAFE_DEFAULT_CELSIUS};
use streaming::{StopReason, StreamingLoop};

#[derive(Parser)]
#[command(name = "thermolinkd")]
#[command(about = "Stream CPU temperature and load to a serial display")]
#[command(version)]
struct Cli {
    /// Serial device of the display, e.g. /dev/ttyUSB0
    #[arg(short, long)]
    port: Option<String>,

    /// Run in the background, logging to a file
    #[arg(short, long)]
    daemon: bool,

    /// Configuration file (default: ~/.config/thermolink/config.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Report which temperature sources work and exit
    #[arg(long)]
    check_sensors: bool,

    /// List candidate serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Print the end of the daemon log and exit
    #[arg(long)]
    log: bool,

    /// Number of log lines to print
    #[arg(long, default_value_t = logtail::DEFAULT_LINES, requires = "log")]
    lines: usize,

    /// Install a systemd unit for --port and exit
    #[arg(long, requires = "port")]
    create_service: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(cli.config.as_ref())?;

    if cli.check_sensors {
        let mut sensors = sensor_service(&config);
        print!("{}", SensorReport::collect(&mut sensors).await.render());
        return Ok(ExitCode::SUCCESS);
    }

    if cli.log {
        logtail::show(&config.log, cli.lines)?;
        return Ok(ExitCode::SUCCESS);
    }

    if cli.create_service {
        let port = cli.port.as_deref().context("--create-service needs --port")?;
        let created = service::create(port)?;
        return Ok(if created {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    if cli.list_ports {
        list_ports(&discover_ports());
        return Ok(ExitCode::SUCCESS);
    }

    let port = match cli.port.clone().or_else(|| config.port.clone()) {
        Some(port) => port,
        None => {
            let ports = discover_ports();
            if ports.is_empty() {
                eprintln!("No serial ports found. Connect the display and try again.");
                return Ok(ExitCode::FAILURE);
            }
            let stdin = std::io::stdin();
            match choose_port(&ports, stdin.lock())? {
                Some(port) => port,
                None => return Ok(ExitCode::SUCCESS),
            }
        }
    };

    let mode = if cli.daemon {
        Mode::Daemon
    } else {
        Mode::Interactive
    };
    let log_settings = logging::init(
        mode,
        cli.verbose,
        &config.log,
        config.stream.daemon_log_every,
    )?;

    let mut sensors = sensor_service(&config);
    let report = SensorReport::collect(&mut sensors).await;
    if report.active().is_none() {
        warn!(
            "No temperature sources found, sending {:.1}°C. Install lm-sensors and run sensors-detect for real readings",
            SAFE_DEFAULT_CELSIUS
        );
    }

    info!("Starting on {} (log: {})", port, log_settings.sink);
    let link = match LinkDevice::connect(&port, config.link_options()).await {
        Ok(link) => link,
        Err(e) if e.is_connect_error() => {
            error!("Failed to connect to {}: {}", port, e);
            eprintln!("Could not connect to the display on {}: {}", port, e);
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    };

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone())?;

    let settings = config.loop_settings(log_settings.log_every);
    let mut stream = StreamingLoop::new(sensors, link, settings);
    let reason = stream.run(cancel).await?;
    info!(
        "Session on {} ended ({:?}) after {} ticks, {} consecutive failures",
        stream.transport().port_path(),
        stream.state(),
        stream.attempts(),
        stream.budget().count()
    );
    match reason {
        StopReason::Cancelled => Ok(ExitCode::SUCCESS),
        StopReason::BudgetExhausted { .. } => Ok(ExitCode::FAILURE),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    if let Some(path) = path {
        return Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()));
    }
    match dirs::config_dir().map(|dir| dir.join("thermolink").join("config.toml")) {
        Some(path) if path.is_file() => Config::load(&path),
        _ => Ok(Config::default()),
    }
}

fn sensor_service(config: &Config) -> SensorService {
    SensorService::new(LoadSampler::new(), config.temperature_chain())
}

fn spawn_signal_handler(cancel: CancellationToken) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("Received SIGINT, shutting down"),
        }
        cancel.cancel();
    });
    Ok(())
}

fn list_ports(ports: &[PortInfo]) {
    if ports.is_empty() {
        println!("No serial ports found. Connect the display.");
        return;
    }
    println!("Available ports:");
    for (i, port) in ports.iter().enumerate() {
        println!("  {}. {}", i + 1, port);
    }
}

/// Picks a port: the only one, or the user's numbered choice.
///
/// `None` means the user declined or gave an invalid answer.
fn choose_port<R: BufRead>(ports: &[PortInfo], mut input: R) -> Result<Option<String>> {
    if let [only] = ports {
        println!("Using the only available port: {}", only.path);
        return Ok(Some(only.path.clone()));
    }

    list_ports(ports);
    print!(
        "\nSelect a port (1-{}) or press Enter to quit: ",
        ports.len()
    );
    std::io::stdout().flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let choice = line.trim();
    if choice.is_empty() {
        return Ok(None);
    }

    match choice.parse::<usize>() {
        Ok(n) if (1..=ports.len()).contains(&n) => Ok(Some(ports[n - 1].path.clone())),
        _ => {
            println!("Invalid choice");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn ports() -> Vec<PortInfo> {
        ["/dev/ttyUSB0", "/dev/ttyACM0"]
            .into_iter()
            .map(|path| PortInfo {
                path: path.to_string(),
                description: None,
            })
            .collect()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from(["thermolinkd", "--port", "/dev/ttyUSB0", "--daemon", "-v"])
            .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB0"));
        assert!(cli.daemon);
        assert!(cli.verbose);
        assert_eq!(cli.lines, 50);

        let cli = Cli::try_parse_from(["thermolinkd", "--log", "--lines", "20"]).unwrap();
        assert!(cli.log);
        assert_eq!(cli.lines, 20);

        assert!(Cli::try_parse_from(["thermolinkd", "--create-service"]).is_err());
    }

    #[test]
    fn test_single_port_is_chosen() {
        let ports = ports();
        let choice = choose_port(&ports[..1], std::io::empty()).unwrap();
        assert_eq!(choice.as_deref(), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn test_numbered_choice() {
        let choice = choose_port(&ports(), "2\n".as_bytes()).unwrap();
        assert_eq!(choice.as_deref(), Some("/dev/ttyACM0"));

        assert_eq!(choose_port(&ports(), "\n".as_bytes()).unwrap(), None);
        assert_eq!(choose_port(&ports(), "3\n".as_bytes()).unwrap(), None);
        assert_eq!(choose_port(&ports(), "x\n".as_bytes()).unwrap(), None);
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
