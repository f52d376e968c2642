// Sensorlink - Serial sensor concentrator to cloud telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Offline replay of a recorded trace dump
//!
//! A [`ReplayLog`] loads the data-log responses out of a dump written
//! by [`crate::trace::TraceLog`] and answers requests from them: state
//! and registration requests get a canned network-status frame, each
//! queued-message request gets the next stored sample, and the log
//! ends with the canonical end-of-queue frame. [`ReplayLink`] wraps
//! the log behind [`SerialLink`] so the driver replays a capture
//! without modification.
//!
//! The loaded log and its cursor live in these session objects; there
//! is no process-wide replay state.

use crate::command::Command;
use crate::driver::SerialLink;
use crate::error::{DecodeError, Result};
use crate::frame::{self, Frame};
use crate::trace::unescape_bytes;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Canned network-status reply used for non-poll requests
pub const CANNED_NETWORK_STATUS: [u8; 15] = [
    0xC5, 0x0C, 0x00, 0x23, 0xC8, 0x00, 0x00, 0x00, 0x05, 0x00, 0x15, 0x44, 0x01, 0x30, 0xE8,
];

/// Terminal end-of-queue reply
pub const END_OF_QUEUE_FRAME: [u8; 10] =
    [0xC5, 0x07, 0x00, 0x24, 0xC8, 0x00, 0x00, 0x00, 0x0C, 0x3D];

/// A loaded trace dump and its replay cursor
#[derive(Debug, Clone)]
pub struct ReplayLog {
    entries: Vec<Vec<u8>>,
    cursor: usize,
}

impl ReplayLog {
    /// Load a dump file, keeping only valid data-log responses
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::from_reader(BufReader::new(file))?)
    }

    /// Parse dump lines from any reader
    pub fn from_reader(reader: impl BufRead) -> io::Result<Self> {
        let mut entries = Vec::new();

        for line in reader.lines() {
            let line = line?;
            // A dump line holds two escaped literals; the second is
            // the response. Anything that does not parse is skipped.
            let Some(response) = second_literal(&line).and_then(unescape_bytes) else {
                continue;
            };
            if response.get(frame::OFFSET_COMMAND) != Some(&Command::DataLog.code()) {
                log::debug!("TOSS: {}", line.trim());
                continue;
            }
            if frame::verify_crc(&response).is_err() {
                log::debug!("TOSS (bad CRC): {}", line.trim());
                continue;
            }
            log::debug!("KEEP: {}", line.trim());
            entries.push(response);
        }

        log::info!("Replay log loaded, {} data-log message(s)", entries.len());
        Ok(Self { entries, cursor: 0 })
    }

    /// Build a log directly from frames (for tests)
    pub fn from_frames(entries: Vec<Vec<u8>>) -> Self {
        Self { entries, cursor: 0 }
    }

    /// Number of stored data-log frames
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing was loaded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Frames not yet replayed
    pub fn remaining(&self) -> usize {
        self.entries.len() - self.cursor
    }

    /// The next stored data-log frame, `None` once exhausted
    pub fn next_sample(&mut self) -> Option<Vec<u8>> {
        let entry = self.entries.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(entry)
    }

    /// Rewind the cursor to the start
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Answer one request by command code
    ///
    /// State and registration requests get the canned network status;
    /// queue polls get the next sample, then the end-of-queue frame.
    pub fn respond(&mut self, request: Command) -> Result<Vec<u8>> {
        match request {
            Command::UpdateNetworkState | Command::RegisterDevice => {
                Ok(CANNED_NETWORK_STATUS.to_vec())
            }
            Command::QueuedMessage => Ok(self
                .next_sample()
                .unwrap_or_else(|| END_OF_QUEUE_FRAME.to_vec())),
            other => Err(DecodeError::UnknownCommand(other.code()).into()),
        }
    }
}

fn second_literal(line: &str) -> Option<&str> {
    let first = line.find("b'")?;
    let first_end = first + 2 + line[first + 2..].find('\'')?;
    let second = first_end + 1 + line[first_end + 1..].find("b'")?;
    let second_end = second + 2 + line[second + 2..].find('\'')?;
    Some(&line[second..=second_end])
}

/// A [`SerialLink`] that answers from a [`ReplayLog`]
pub struct ReplayLink {
    log: ReplayLog,
    pending: Option<Vec<u8>>,
}

impl ReplayLink {
    /// Wrap a loaded log
    pub fn new(log: ReplayLog) -> Self {
        Self { log, pending: None }
    }

    /// The wrapped log
    pub fn log(&self) -> &ReplayLog {
        &self.log
    }
}

impl SerialLink for ReplayLink {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let parsed = Frame::parse(bytes)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
        let command = Command::from_u8(parsed.command).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "request not in command table")
        })?;
        let response = self
            .log
            .respond(command)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
        self.pending = Some(response);
        Ok(())
    }

    fn receive(&mut self) -> io::Result<Vec<u8>> {
        Ok(self.pending.take().unwrap_or_default())
    }
}
