//! Display link over a serial port.

use super::protocol::{self, HANDSHAKE};
use super::Transport;
use crate::{Error, Result, BAUD_RATE};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_serial::{
    ClearBuffer, DataBits, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits,
};
use tracing::{debug, info};

/// Timing and line settings used when opening the link.
#[derive(Debug, Clone, Copy)]
pub struct LinkOptions {
    /// Serial baud rate.
    pub baud_rate: u32,
    /// Time given to the board to finish booting after the port opens
    /// (opening the port resets most USB-serial boards).
    pub settle: Duration,
    /// Pause after writing the greeting.
    pub handshake_wait: Duration,
    /// Upper bound for a single line write.
    pub write_timeout: Duration,
    /// Serial driver read timeout.
    pub read_timeout: Duration,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            baud_rate: BAUD_RATE,
            settle: Duration::from_secs(2),
            handshake_wait: Duration::from_millis(500),
            write_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
        }
    }
}

/// Display link controller.
pub struct LinkDevice {
    port_path: String,
    options: LinkOptions,
    port: Option<BufReader<SerialStream>>,
    /// Bytes of a reply line still waiting for its terminator.
    pending: Vec<u8>,
}

impl LinkDevice {
    /// Creates a disconnected link for the given device path.
    pub fn new(port_path: &str, options: LinkOptions) -> Self {
        Self {
            port_path: port_path.to_string(),
            options,
            port: None,
            pending: Vec::new(),
        }
    }

    /// Opens the device and performs the handshake.
    pub async fn connect(port_path: &str, options: LinkOptions) -> Result<Self> {
        let mut device = Self::new(port_path, options);
        device.open().await?;
        Ok(device)
    }

    /// Opens the serial port, waits for the board to settle, drops any
    /// boot chatter and sends the greeting.
    pub async fn open(&mut self) -> Result<()> {
        info!("Connecting to {}", self.port_path);

        let mut stream = tokio_serial::new(&self.port_path, self.options.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(self.options.read_timeout)
            .open_native_async()
            .map_err(|e| {
                if let tokio_serial::ErrorKind::Io(kind) = &e.kind {
                    if (*kind == std::io::ErrorKind::NotFound
                        || *kind == std::io::ErrorKind::PermissionDenied)
                        && !std::path::Path::new(&self.port_path).exists()
                    {
                        return Error::LinkNotFound(self.port_path.clone());
                    }
                }
                Error::Serial(e)
            })?;

        debug!(
            "Waiting for device boot ({}ms settle)...",
            self.options.settle.as_millis()
        );
        tokio::time::sleep(self.options.settle).await;

        let stale = stream.bytes_to_read().unwrap_or(0);
        if stale > 0 {
            debug!("Discarding {} stale bytes from {}", stale, self.port_path);
        }
        stream.clear(ClearBuffer::Input)?;

        stream.write_all(HANDSHAKE).await.map_err(Error::Handshake)?;
        stream.flush().await.map_err(Error::Handshake)?;
        tokio::time::sleep(self.options.handshake_wait).await;

        self.port = Some(BufReader::new(stream));
        self.pending.clear();
        info!("Connected to {}", self.port_path);
        Ok(())
    }

    /// Returns the port path.
    pub fn port_path(&self) -> &str {
        &self.port_path
    }
}

impl Transport for LinkDevice {
    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    async fn send(&mut self, line: &str) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        let line = protocol::terminate(line);

        let write = async {
            port.write_all(line.as_bytes()).await?;
            port.flush().await
        };

        match tokio::time::timeout(self.options.write_timeout, write).await {
            Ok(result) => {
                result?;
                debug!("Sent {:?} to {}", line.trim_end(), self.port_path);
                Ok(())
            }
            Err(_) => Err(Error::WriteTimeout),
        }
    }

    async fn read_response(&mut self, timeout: Duration) -> Option<String> {
        let port = self.port.as_mut()?;

        // Only block on a read when something is actually waiting.
        if port.buffer().is_empty() && port.get_ref().bytes_to_read().unwrap_or(0) == 0 {
            return None;
        }

        // A reply cut off by the timeout stays in `pending` and is
        // completed by the next call.
        match tokio::time::timeout(timeout, port.read_until(b'\n', &mut self.pending)).await {
            Ok(Ok(_)) => {
                let raw = std::mem::take(&mut self.pending);
                match String::from_utf8(raw) {
                    Ok(line) => {
                        let trimmed = line.trim();
                        (!trimmed.is_empty()).then(|| trimmed.to_string())
                    }
                    Err(e) => {
                        debug!("Discarding undecodable response: {}", e);
                        None
                    }
                }
            }
            Ok(Err(e)) => {
                debug!("Discarding unreadable response: {}", e);
                self.pending.clear();
                None
            }
            Err(_) => {
                debug!("Partial response ({} bytes) kept for the next read", self.pending.len());
                None
            }
        }
    }

    fn close(&mut self) {
        self.pending.clear();
        if self.port.take().is_some() {
            info!("Closed link to {}", self.port_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_default_options() {
        let options = LinkOptions::default();
        assert_eq!(options.baud_rate, 115_200);
        assert_eq!(options.settle, Duration::from_secs(2));
        assert_eq!(options.handshake_wait, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let mut device = LinkDevice::new("/dev/ttyUSB0", LinkOptions::default());
        assert!(!device.is_connected());
        assert!(matches!(
            device.send("TEMP:40.0|LOAD:1.0").await,
            Err(Error::NotConnected)
        ));
        assert_eq!(device.read_response(Duration::from_millis(10)).await, None);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut device = LinkDevice::new("/dev/ttyUSB0", LinkOptions::default());
        device.close();
        device.close();
        assert!(!device.is_connected());
    }

    #[tokio::test]
    async fn test_missing_device() {
        let result = LinkDevice::connect(
            "/dev/thermolink-missing-device",
            LinkOptions::default(),
        )
        .await;
        match result {
            Err(e) => assert!(e.is_connect_error()),
            Ok(_) => panic!("connect to a missing device succeeded"),
        }
    }

    /// Reads one line written by the host, as the board would.
    async fn board_line(board: &mut SerialStream) -> String {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        while !line.ends_with(b"\n") {
            tokio::time::timeout(Duration::from_secs(2), board.read_exact(&mut byte))
                .await
                .unwrap()
                .unwrap();
            line.push(byte[0]);
        }
        String::from_utf8(line).unwrap()
    }

    fn fast_options() -> LinkOptions {
        LinkOptions {
            settle: Duration::from_millis(100),
            handshake_wait: Duration::from_millis(10),
            ..LinkOptions::default()
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pty_round_trip() {
        let (mut board, host) = SerialStream::pair().unwrap();
        let path = host.name().unwrap();

        // Boot chatter written before the host connects is dropped.
        board.write_all(b"BOOT BANNER\n").await.unwrap();
        board.flush().await.unwrap();

        let mut device = LinkDevice::connect(&path, fast_options()).await.unwrap();
        assert!(device.is_connected());
        assert_eq!(board_line(&mut board).await, "HELLO\n");

        device.send("TEMP:53.2|LOAD:7.5").await.unwrap();
        assert_eq!(board_line(&mut board).await, "TEMP:53.2|LOAD:7.5\n");

        assert_eq!(device.read_response(Duration::from_millis(200)).await, None);

        board.write_all(b"  ERROR: no data\r\n").await.unwrap();
        board.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            device.read_response(Duration::from_millis(500)).await.as_deref(),
            Some("ERROR: no data")
        );

        board.write_all(b"\xff\xfe\n").await.unwrap();
        board.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(device.read_response(Duration::from_millis(500)).await, None);

        device.close();
        assert!(!device.is_connected());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_split_response_is_reassembled() {
        let (mut board, host) = SerialStream::pair().unwrap();
        let path = host.name().unwrap();
        let mut device = LinkDevice::connect(&path, fast_options()).await.unwrap();
        assert_eq!(board_line(&mut board).await, "HELLO\n");

        board.write_all(b"OK 53").await.unwrap();
        board.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(device.read_response(Duration::from_millis(100)).await, None);

        board.write_all(b".2\n").await.unwrap();
        board.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            device.read_response(Duration::from_millis(500)).await.as_deref(),
            Some("OK 53.2")
        );
    }

    // Hardware tests are skipped by default
    #[tokio::test]
    #[ignore]
    async fn test_device_connect() {
        let device = LinkDevice::connect("/dev/ttyUSB0", LinkOptions::default()).await;
        assert!(device.is_ok());
    }
}
