//! ELM327 diagnostics adapter over a serial line.
//!
//! Implements [`DiagnosticsLink`](crate::telemetry::DiagnosticsLink) for
//! the common ELM327-style OBD-II interface: a request/response protocol
//! where each command is terminated with `\r` and each reply ends with a
//! `>` prompt. The adapter is reset and configured once at open (ATZ,
//! echo off, linefeeds off, automatic protocol), then queried with mode-01
//! PID requests.
//!
//! Every read is bounded twice over: the serial port carries a read
//! timeout, and each transaction runs under an overall deadline. A wedged
//! adapter therefore costs at most [`QUERY_DEADLINE`] per query and never
//! wedges the caller.
//!
//! Response decoding is a pure function ([`parse_response`]) so the hex
//! handling is testable without hardware.

use core::fmt::Write as _;
use std::io::{ErrorKind, Read as _, Write as _};
use std::time::{Duration, Instant};

use log::{info, trace};
use serialport::SerialPort;
use thiserror::Error;

use crate::config::{QUERY_DEADLINE, SERIAL_READ_TIMEOUT};
use crate::telemetry::{DiagnosticsLink, Pid};

/// Deadline for the one-time init commands. ATZ performs a full adapter
/// reset and can take well over a second.
const INIT_DEADLINE: Duration = Duration::from_secs(2);

/// Failure modes of one diagnostics transaction.
#[derive(Error, Debug)]
pub enum ObdError {
    #[error("serial port: {0}")]
    Serial(#[from] serialport::Error),

    #[error("diagnostics link i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("no prompt from adapter within {0:?}")]
    Timeout(Duration),

    #[error("malformed response: {0:?}")]
    Malformed(String),
}

/// ELM327-style adapter owning the serial port.
///
/// The port is the single half-duplex resource shared by all queries;
/// exclusive ownership here plus `&mut self` on
/// [`query`](DiagnosticsLink::query) keeps transactions sequenced.
pub struct Elm327 {
    port: Box<dyn SerialPort>,
}

impl Elm327 {
    /// Open the serial device and run the init handshake.
    ///
    /// Fails if the device cannot be opened or the adapter never answers
    /// with its prompt - at startup that is fatal, per the error policy.
    pub fn open(device: &str, baud: u32) -> Result<Self, ObdError> {
        let port = serialport::new(device, baud).timeout(SERIAL_READ_TIMEOUT).open()?;
        let mut adapter = Self { port };

        // ATZ resets the adapter; the rest quiet the output down to
        // payload-only lines and let it pick the bus protocol itself
        for command in ["ATZ", "ATE0", "ATL0", "ATSP0"] {
            adapter.send(command)?;
            adapter.read_until_prompt(INIT_DEADLINE)?;
        }

        info!("diagnostics link ready on {device} at {baud} baud");
        Ok(adapter)
    }

    /// Write one command, `\r`-terminated.
    fn send(&mut self, command: &str) -> Result<(), ObdError> {
        trace!("obd >> {command}");
        self.port.write_all(command.as_bytes())?;
        self.port.write_all(b"\r")?;
        self.port.flush()?;
        Ok(())
    }

    /// Accumulate reply bytes until the `>` prompt or the deadline.
    ///
    /// Serial read timeouts just re-check the deadline, so a silent
    /// adapter turns into [`ObdError::Timeout`] instead of blocking.
    fn read_until_prompt(&mut self, deadline: Duration) -> Result<String, ObdError> {
        let start = Instant::now();
        let mut raw = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            match self.port.read(&mut byte) {
                Ok(n) if n > 0 => {
                    if byte[0] == b'>' {
                        let text = String::from_utf8_lossy(&raw).into_owned();
                        trace!("obd << {text:?}");
                        return Ok(text);
                    }
                    raw.push(byte[0]);
                }
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::TimedOut => {}
                Err(err) => return Err(err.into()),
            }

            if start.elapsed() >= deadline {
                return Err(ObdError::Timeout(deadline));
            }
        }
    }
}

impl DiagnosticsLink for Elm327 {
    fn query(&mut self, pid: Pid) -> Result<Option<f32>, ObdError> {
        let mut request: heapless::String<8> = heapless::String::new();
        let _ = write!(request, "01{:02X}", pid.code());

        self.send(&request)?;
        let raw = self.read_until_prompt(QUERY_DEADLINE)?;
        parse_response(pid, &raw)
    }
}

// =============================================================================
// Response Decoding
// =============================================================================

/// Decode one raw adapter reply for the given PID.
///
/// Accepts the spaced (`41 0C 1A F8`) and compact (`410C1AF8`) line forms,
/// skips echo and `SEARCHING...` noise, and maps an explicit `NO DATA`
/// reply to `Ok(None)`. Anything else without a usable payload line is
/// [`ObdError::Malformed`].
///
/// Decoding formulas:
/// - engine RPM: `(256 * A + B) / 4` rev/min
/// - vehicle speed: `A` km/h
pub fn parse_response(pid: Pid, raw: &str) -> Result<Option<f32>, ObdError> {
    let mut prefix: heapless::String<4> = heapless::String::new();
    let _ = write!(prefix, "41{:02X}", pid.code());

    for line in raw.split(['\r', '\n']) {
        let line = line.trim();
        if line.is_empty() || line.starts_with("SEARCHING") {
            continue;
        }
        if line.eq_ignore_ascii_case("NO DATA") {
            return Ok(None);
        }

        let compact: String = line.split_whitespace().collect();
        if !compact.to_ascii_uppercase().starts_with(prefix.as_str()) {
            // Echo of our own request, header noise, etc.
            continue;
        }

        let Some(bytes) = hex_bytes(&compact[prefix.len()..]) else {
            return Err(ObdError::Malformed(line.to_string()));
        };
        return decode(pid, &bytes)
            .map(Some)
            .ok_or_else(|| ObdError::Malformed(line.to_string()));
    }

    Err(ObdError::Malformed(raw.trim().to_string()))
}

/// Apply the PID's formula to the payload bytes.
fn decode(pid: Pid, bytes: &[u8]) -> Option<f32> {
    match pid {
        Pid::EngineRpm => {
            let [a, b, ..] = bytes else { return None };
            Some(f32::from(u16::from(*a) * 256 + u16::from(*b)) / 4.0)
        }
        Pid::VehicleSpeed => {
            let [a, ..] = bytes else { return None };
            Some(f32::from(*a))
        }
    }
}

/// Parse a run of hex digit pairs. Returns `None` on odd length or any
/// non-hex character.
fn hex_bytes(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    s.as_bytes()
        .chunks_exact(2)
        .map(|pair| u8::from_str_radix(core::str::from_utf8(pair).ok()?, 16).ok())
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // RPM Decoding Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_rpm_spaced() {
        // 0x1A 0xF8 -> (26 * 256 + 248) / 4 = 1726 rpm
        let value = parse_response(Pid::EngineRpm, "41 0C 1A F8\r").unwrap();
        assert_eq!(value, Some(1726.0));
    }

    #[test]
    fn test_parse_rpm_compact() {
        // 0x0F 0xA0 -> 4000 / 4 = 1000 rpm
        let value = parse_response(Pid::EngineRpm, "410C0FA0\r").unwrap();
        assert_eq!(value, Some(1000.0));
    }

    #[test]
    fn test_parse_rpm_quarter_resolution() {
        // 0x00 0x01 -> 1 / 4 = 0.25 rpm (the formula's native resolution)
        let value = parse_response(Pid::EngineRpm, "41 0C 00 01").unwrap();
        assert_eq!(value, Some(0.25));
    }

    #[test]
    fn test_parse_skips_echo_and_searching() {
        // Echo-on adapters repeat the request; cold adapters announce the
        // protocol scan before answering
        let raw = "010C\rSEARCHING...\r41 0C 1A F8\r";
        let value = parse_response(Pid::EngineRpm, raw).unwrap();
        assert_eq!(value, Some(1726.0));
    }

    // -------------------------------------------------------------------------
    // Speed Decoding Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_speed() {
        // 0x78 -> 120 km/h
        let value = parse_response(Pid::VehicleSpeed, "41 0D 78\r").unwrap();
        assert_eq!(value, Some(120.0));
    }

    #[test]
    fn test_parse_speed_zero() {
        let value = parse_response(Pid::VehicleSpeed, "41 0D 00\r").unwrap();
        assert_eq!(value, Some(0.0));
    }

    #[test]
    fn test_parse_wrong_pid_reply_is_malformed() {
        // An answer for a different PID must not be decoded as ours
        let result = parse_response(Pid::VehicleSpeed, "41 0C 1A F8\r");
        assert!(matches!(result, Err(ObdError::Malformed(_))));
    }

    // -------------------------------------------------------------------------
    // NO DATA and Malformed Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_no_data_is_explicit_none() {
        let value = parse_response(Pid::EngineRpm, "NO DATA\r").unwrap();
        assert_eq!(value, None, "NO DATA is a valid reply meaning no value");
    }

    #[test]
    fn test_parse_empty_reply_is_malformed() {
        let result = parse_response(Pid::EngineRpm, "\r\r");
        assert!(matches!(result, Err(ObdError::Malformed(_))));
    }

    #[test]
    fn test_parse_truncated_payload_is_malformed() {
        // RPM needs two payload bytes
        let result = parse_response(Pid::EngineRpm, "41 0C 1A\r");
        assert!(matches!(result, Err(ObdError::Malformed(_))));
    }

    #[test]
    fn test_parse_bad_hex_is_malformed() {
        let result = parse_response(Pid::EngineRpm, "41 0C ZZ XX\r");
        assert!(matches!(result, Err(ObdError::Malformed(_))));
    }

    #[test]
    fn test_hex_bytes() {
        assert_eq!(hex_bytes("1AF8"), Some(vec![0x1A, 0xF8]));
        assert_eq!(hex_bytes("1AF"), None, "odd length is not a byte run");
        assert_eq!(hex_bytes("1G"), None, "non-hex digit rejected");
        assert_eq!(hex_bytes(""), Some(vec![]));
    }
}
