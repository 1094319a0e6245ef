//! Line protocol spoken to the display.
//!
//! Protocol structure:
//! - ASCII, one message per line, `\n` terminated
//! - Greeting sent once after the port opens: `HELLO`
//! - Telemetry line: `TEMP:<celsius:.1>|LOAD:<percent:.1>`
//! - Replies are free text and only inspected for error markers

/// Line terminator.
pub const LINE_TERMINATOR: char = '\n';

/// Greeting written right after the port is opened.
pub const HANDSHAKE: &[u8] = b"HELLO\n";

/// Substrings in a reply that indicate the display is unhappy.
const ERROR_MARKERS: [&str; 2] = ["ERROR", "no data"];

/// Encodes one temperature/load sample as a terminated telemetry line.
pub fn encode_reading(temperature_celsius: f64, load_percent: f64) -> String {
    format!(
        "TEMP:{:.1}|LOAD:{:.1}{}",
        temperature_celsius, load_percent, LINE_TERMINATOR
    )
}

/// Appends the line terminator unless it is already present.
pub fn terminate(line: &str) -> String {
    if line.ends_with(LINE_TERMINATOR) {
        line.to_string()
    } else {
        format!("{}{}", line, LINE_TERMINATOR)
    }
}

/// Returns true when a reply from the display reports an error state.
pub fn is_error_response(response: &str) -> bool {
    ERROR_MARKERS.iter().any(|marker| response.contains(marker))
}
