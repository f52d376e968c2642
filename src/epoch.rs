// Sensorlink - Serial sensor concentrator to cloud telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Protocol-epoch time handling
//!
//! The wire protocol counts seconds from its own epoch of
//! 2010-01-01 00:00:00 UTC, carried on the wire as a little-endian
//! 32-bit value. A raw value of zero means "no timestamp".

use chrono::{TimeZone, Utc};

/// Seconds between the Unix epoch and the protocol epoch (2010-01-01 UTC)
pub const PROTOCOL_EPOCH_UNIX: u64 = 1_262_304_000;

/// Current wall-clock time as Unix seconds
pub fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Current wall-clock time as protocol-epoch seconds
pub fn protocol_now() -> u32 {
    to_protocol(unix_now())
}

/// Convert Unix seconds to protocol-epoch seconds
///
/// Times before the protocol epoch saturate to zero.
pub fn to_protocol(unix: u64) -> u32 {
    unix.saturating_sub(PROTOCOL_EPOCH_UNIX) as u32
}

/// Convert protocol-epoch seconds back to Unix seconds
pub fn from_protocol(secs: u32) -> u64 {
    PROTOCOL_EPOCH_UNIX + u64::from(secs)
}

/// Format Unix seconds as `"2015-12-18 19:32:27 UTC"`
pub fn format_timestamp(unix: u64) -> String {
    match Utc.timestamp_opt(unix as i64, 0).single() {
        Some(when) => when.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "None".to_string(),
    }
}
