//! systemd unit generation.

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory system units are installed into.
pub const UNIT_DIR: &str = "/etc/systemd/system";

/// Parameters of a generated unit.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    /// Account the service runs as.
    pub user: String,
    /// Absolute path of the daemon binary.
    pub executable: PathBuf,
    /// Working directory of the service.
    pub working_dir: PathBuf,
    /// Serial device passed via `--port`.
    pub port: String,
}

impl ServiceSpec {
    /// Builds a spec for the running binary and the invoking user.
    pub fn current(port: &str) -> Result<Self> {
        let executable = std::env::current_exe().context("Failed to locate executable")?;
        let working_dir = std::env::current_dir().context("Failed to read working directory")?;
        Ok(Self {
            user: invoking_user(),
            executable,
            working_dir,
            port: port.to_string(),
        })
    }

    /// Unit name, e.g. `thermolink-alice.service`.
    pub fn unit_name(&self) -> String {
        format!("thermolink-{}.service", self.user)
    }

    /// Unit file path under `dir`.
    pub fn unit_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.unit_name())
    }

    /// Renders the unit file.
    pub fn render(&self) -> String {
        format!(
            "[Unit]\n\
             Description=thermolink CPU temperature and load streamer\n\
             After=network.target\n\
             Wants=network.target\n\
             \n\
             [Service]\n\
             Type=simple\n\
             User={user}\n\
             WorkingDirectory={cwd}\n\
             ExecStart={exe} --daemon --port {port}\n\
             Restart=always\n\
             RestartSec=10\n\
             SyslogIdentifier=thermolink\n\
             SupplementaryGroups=dialout\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n",
            user = self.user,
            cwd = self.working_dir.display(),
            exe = self.executable.display(),
            port = self.port,
        )
    }
}

/// Name of the user who invoked us, looking through `sudo`.
fn invoking_user() -> String {
    ["SUDO_USER", "USER"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|user| !user.is_empty())
        .unwrap_or_else(|| "root".to_string())
}

/// Outcome of an install attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum InstallOutcome {
    Written(PathBuf),
    PermissionDenied(PathBuf),
}

/// Writes the unit into `dir`. Permission problems are reported, not raised.
pub fn install(spec: &ServiceSpec, dir: &Path) -> Result<InstallOutcome> {
    let path = spec.unit_path(dir);
    match std::fs::write(&path, spec.render()) {
        Ok(()) => {
            debug!("Wrote unit file {}", path.display());
            Ok(InstallOutcome::Written(path))
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            Ok(InstallOutcome::PermissionDenied(path))
        }
        Err(e) => {
            Err(e).with_context(|| format!("Failed to write unit file {}", path.display()))
        }
    }
}

/// Renders, prints and installs the unit for `port`.
pub fn create(port: &str) -> Result<bool> {
    let spec = ServiceSpec::current(port)?;
    let rule = "-".repeat(60);

    println!("Creating systemd service: {}", spec.unit_path(Path::new(UNIT_DIR)).display());
    println!("\nUnit file:");
    println!("{}", rule);
    print!("{}", spec.render());
    println!("{}", rule);

    match install(&spec, Path::new(UNIT_DIR))? {
        InstallOutcome::Written(path) => {
            let unit = spec.unit_name();
            println!("Service created: {}", path.display());
            println!("\nManage it with:");
            println!("  sudo systemctl daemon-reload");
            println!("  sudo systemctl enable {}", unit);
            println!("  sudo systemctl start {}", unit);
            println!("  sudo systemctl status {}", unit);
            println!("  sudo journalctl -u {} -f", unit);
            Ok(true)
        }
        InstallOutcome::PermissionDenied(_) => {
            println!("Insufficient permissions. Re-run with sudo:");
            println!(
                "  sudo {} --create-service --port {}",
                spec.executable.display(),
                port
            );
            Ok(false)
        }
    }
}
