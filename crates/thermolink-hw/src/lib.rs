//! Thermolink Hardware Library
//!
//! Provides the serial link to small microcontroller displays (ESP32 and
//! similar boards) that show the host's CPU temperature and load.

pub mod error;
pub mod link;
pub mod ports;

pub use error::{Error, Result};
pub use link::{LinkDevice, LinkOptions, Transport};
pub use ports::{discover_ports, PortInfo};

/// Serial baud rate expected by the display firmware.
pub const BAUD_RATE: u32 = 115_200;
