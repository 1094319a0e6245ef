//! Serial port discovery.
//!
//! Well-known USB-serial device nodes come first, followed by anything else
//! the serial backend enumerates.

use std::path::Path;
use tokio_serial::SerialPortType;
use tracing::debug;

/// Device nodes commonly created for CH340/CP210x/CDC-ACM boards.
const COMMON_PORTS: [&str; 8] = [
    "/dev/ttyUSB0",
    "/dev/ttyUSB1",
    "/dev/ttyUSB2",
    "/dev/ttyUSB3",
    "/dev/ttyACM0",
    "/dev/ttyACM1",
    "/dev/ttyACM2",
    "/dev/ttyACM3",
];

/// A candidate serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Device path, e.g. `/dev/ttyUSB0`.
    pub path: String,
    /// USB product string, when the backend reports one.
    pub description: Option<String>,
}

impl std::fmt::Display for PortInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.description {
            Some(desc) => {
                let short: String = desc.chars().take(50).collect();
                write!(f, "{} - {}", self.path, short)
            }
            None => write!(f, "{}", self.path),
        }
    }
}

/// Returns the ordered list of candidate display ports on this host.
pub fn discover_ports() -> Vec<PortInfo> {
    let detected = match tokio_serial::available_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(|p| PortInfo {
                description: match p.port_type {
                    SerialPortType::UsbPort(usb) => usb.product,
                    _ => None,
                },
                path: p.port_name,
            })
            .collect(),
        Err(e) => {
            debug!("Serial port enumeration failed: {}", e);
            Vec::new()
        }
    };

    merge_candidates(|path| Path::new(path).exists(), detected)
}

/// Merges well-known nodes that exist with enumerated ports, without
/// duplicates. Enumerated descriptions are attached to well-known nodes.
fn merge_candidates<F>(exists: F, mut detected: Vec<PortInfo>) -> Vec<PortInfo>
where
    F: Fn(&str) -> bool,
{
    detected.sort_by(|a, b| a.path.cmp(&b.path));

    let mut ports: Vec<PortInfo> = COMMON_PORTS
        .iter()
        .filter(|path| exists(path))
        .map(|path| PortInfo {
            path: path.to_string(),
            description: detected
                .iter()
                .find(|d| d.path == *path)
                .and_then(|d| d.description.clone()),
        })
        .collect();

    for port in detected {
        if !ports.iter().any(|p| p.path == port.path) {
            ports.push(port);
        }
    }

    ports
}
