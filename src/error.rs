// Sensorlink - Serial sensor concentrator to cloud telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for Sensorlink
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Result type alias for Sensorlink operations
pub type Result<T> = std::result::Result<T, SensorlinkError>;

/// Main error type for Sensorlink operations
#[derive(Error, Debug)]
pub enum SensorlinkError {
    /// Wire frame error
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Response decode error
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Device monitor error
    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),

    /// Session state machine error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Collaborator transport error (serial, TCP, alert sink)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors in the basic wire form of a frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes than the minimum frame size
    #[error("Frame too short: {len} bytes")]
    TooShort { len: usize },

    /// First byte is not the start delimiter
    #[error("Frame lacks start delimiter, saw 0x{byte:02X}")]
    BadStartMarker { byte: u8 },

    /// Total size disagrees with the length byte
    #[error("Frame length is {len}, expected {expected} (or {expected} plus CRC)")]
    LengthMismatch { len: usize, expected: usize },

    /// Frame has no trailing CRC byte
    #[error("Frame lacks CRC")]
    CrcMissing,

    /// Trailing CRC byte does not match the computed value
    #[error("Frame has bad CRC: saw 0x{actual:02X}, expected 0x{expected:02X}")]
    CrcMismatch { expected: u8, actual: u8 },

    /// Payload cannot be expressed by the one-byte length field
    #[error("Payload too large: {len} bytes exceeds maximum {max}")]
    PayloadTooLarge { len: usize, max: usize },
}

/// Errors while decoding a well-formed frame into a response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Frame form or CRC error
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Command code is not in the command table
    #[error("Unknown command: 0x{0:02X}")]
    UnknownCommand(u8),

    /// Payload length disagrees with the command table rule
    #[error("Command 0x{command:02X} payload is {actual} bytes, expected {expected}")]
    PayloadLengthMismatch {
        command: u8,
        expected: usize,
        actual: usize,
    },

    /// Sensor-type-specific remainder error
    #[error(transparent)]
    Sensor(#[from] SensorDataError),

    /// Network state byte outside the {0, 1} enumeration
    #[error("Bad network state value: {0}")]
    InvalidStateByte(u8),

    /// Protocol version nibble outside the supported range
    #[error("Protocol version outside 0-3 range: {0}")]
    ProtocolVersionOutOfRange(u8),
}

/// Errors in the sensor-type-specific portion of a data log
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorDataError {
    /// Remainder shorter than the type/state prefix
    #[error("Sensor data too short: {len} bytes, need at least 3")]
    TooShort { len: usize },

    /// Remainder length wrong for the sensor type
    #[error("Sensor type {sensor_type} expects {expected} data byte(s), saw {actual}")]
    LengthMismatch {
        sensor_type: u16,
        expected: &'static str,
        actual: usize,
    },
}

/// Errors raised by the per-device post-processor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// A device reported a different sensor type than its first sample
    #[error("Device {device_id}: sensor type changed from {expected} to {actual}")]
    TypeMismatch {
        device_id: u32,
        expected: u16,
        actual: u16,
    },
}

/// Errors raised by the session state machine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The state machine was driven from an inconsistent state
    #[error("Bad state: {0}")]
    BadState(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SensorlinkError::Frame(FrameError::CrcMismatch {
            expected: 0x1E,
            actual: 0xFF,
        });
        let msg = format!("{}", err);
        assert!(msg.contains("CRC"));
        assert!(msg.contains("1E"));
    }

    #[test]
    fn test_error_conversion() {
        let frame_err = FrameError::CrcMissing;
        let err: SensorlinkError = frame_err.into();
        assert!(matches!(err, SensorlinkError::Frame(_)));

        let decode_err: DecodeError = SensorDataError::TooShort { len: 1 }.into();
        assert!(matches!(decode_err, DecodeError::Sensor(_)));
    }
}
