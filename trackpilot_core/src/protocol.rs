//! Wire protocol for the downstream motor controller.
//!
//! Line-delimited ASCII over serial, `\n` terminated:
//!
//! ```text
//! Host -> controller:
//!   C:<speed>,<steering>   speed -100..100, steering 0..180 (90 center)
//!   E                      emergency stop
//!   R                      reset encoder to zero
//! Controller -> host:
//!   S:<encoder>,<speed>,<steering>   status; encoder cumulative signed
//!   E:<code>                         error report
//! ```
//!
//! The controller's watchdog requires the drive command at 30 Hz or
//! better; the keepalive task owns that retransmission.

use crate::strategies::DriveCommand;
use thiserror::Error;
use tracing::warn;

/// Protocol-level faults.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed line: {0:?}")]
    Malformed(String),

    #[error("unknown frame type: {0:?}")]
    UnknownFrame(String),
}

/// Host-to-controller commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Drive { speed: i8, steering: u8 },
    EmergencyStop,
    ResetEncoder,
}

impl Command {
    /// Builds a drive command, applying the servo inversion at the wire
    /// boundary when the hardware is wired that way.
    pub fn drive(cmd: DriveCommand, servo_inverted: bool) -> Self {
        Command::Drive {
            speed: cmd.speed,
            steering: wire_steering(cmd.steering, servo_inverted),
        }
    }

    /// Encodes the command as one protocol line, terminator included.
    pub fn encode(&self) -> String {
        match *self {
            Command::Drive { speed, steering } => {
                format!("C:{},{}\n", speed.clamp(-100, 100), steering.min(180))
            }
            Command::EmergencyStop => "E\n".to_string(),
            Command::ResetEncoder => "R\n".to_string(),
        }
    }
}

/// Maps the internal steering convention onto the wire.
///
/// Internally `< 90` steers left and `> 90` steers right; an inverted
/// servo expects the mirror image.
pub fn wire_steering(steering: u8, inverted: bool) -> u8 {
    if inverted {
        180 - steering.min(180)
    } else {
        steering.min(180)
    }
}

/// Controller-to-host frames.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    /// Periodic telemetry
    Telemetry {
        encoder: i64,
        speed: i8,
        steering: u8,
    },

    /// Controller-side error report
    Fault(String),
}

impl Status {
    /// Parses one line (without the terminator).
    pub fn parse(line: &str) -> Result<Status, ProtocolError> {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("S:") {
            let mut parts = rest.split(',');
            let encoder = parts
                .next()
                .and_then(|p| p.trim().parse::<i64>().ok())
                .ok_or_else(|| ProtocolError::Malformed(line.to_string()))?;
            let speed = parts
                .next()
                .and_then(|p| p.trim().parse::<i8>().ok())
                .ok_or_else(|| ProtocolError::Malformed(line.to_string()))?;
            let steering = parts
                .next()
                .and_then(|p| p.trim().parse::<u8>().ok())
                .ok_or_else(|| ProtocolError::Malformed(line.to_string()))?;
            Ok(Status::Telemetry {
                encoder,
                speed,
                steering,
            })
        } else if let Some(code) = line.strip_prefix("E:") {
            Ok(Status::Fault(code.trim().to_string()))
        } else {
            Err(ProtocolError::UnknownFrame(line.to_string()))
        }
    }
}

/// Maximum bytes buffered before the reader assumes a lost terminator.
const MAX_LINE: usize = 256;

/// Accumulates serial bytes into status frames.
///
/// A malformed line is discarded and the buffer reset, so a corrupted
/// byte cannot mis-align every following frame.
#[derive(Debug, Default)]
pub struct LineReader {
    buf: Vec<u8>,
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds received bytes; returns every complete, valid frame.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Status> {
        let mut frames = Vec::new();

        for &byte in bytes {
            if byte == b'\n' {
                let line = String::from_utf8_lossy(&self.buf).into_owned();
                self.buf.clear();
                if line.trim().is_empty() {
                    continue;
                }
                match Status::parse(&line) {
                    Ok(frame) => frames.push(frame),
                    Err(e) => {
                        warn!(error = %e, "discarding frame, resetting input buffer");
                        // Reset: drop anything already queued this batch
                        // could follow the corruption.
                        self.buf.clear();
                    }
                }
            } else {
                self.buf.push(byte);
                if self.buf.len() > MAX_LINE {
                    warn!("input buffer overflow, resetting");
                    self.buf.clear();
                }
            }
        }
        frames
    }
}
