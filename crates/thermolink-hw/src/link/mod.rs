//! Display link module.
//!
//! Provides the line-oriented serial connection to the display board.

mod device;

pub mod protocol;

pub use device::{LinkDevice, LinkOptions};

use crate::Result;
use std::future::Future;
use std::time::Duration;

/// A connection that telemetry lines can be pushed through.
///
/// `LinkDevice` is the serial implementation; the streaming loop only
/// depends on this trait so it can be driven without hardware.
pub trait Transport {
    /// Returns true while the underlying stream is open.
    fn is_connected(&self) -> bool;

    /// Writes one line, appending the terminator if missing.
    ///
    /// A single attempt: no retry happens here.
    fn send(&mut self, line: &str) -> impl Future<Output = Result<()>> + Send;

    /// Returns one trimmed reply line if the device has sent anything.
    ///
    /// Never fails; missing data, timeouts and decode errors all yield `None`.
    fn read_response(&mut self, timeout: Duration) -> impl Future<Output = Option<String>> + Send;

    /// Releases the stream. Safe to call any number of times.
    fn close(&mut self);
}
