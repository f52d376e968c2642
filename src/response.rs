// Sensorlink - Serial sensor concentrator to cloud telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Tagged response decoding
//!
//! Every inbound frame decodes to a [`Response`] carrying the raw
//! validated bytes plus one [`ResponseKind`] variant with the concrete
//! fields of that response kind. Selection is an exhaustive match on
//! the decoded [`Command`].

use crate::command::Command;
use crate::epoch;
use crate::error::DecodeError;
use crate::frame::{self, Frame};
use crate::sensor::{self, SensorReading, UnitPrefs};
use std::fmt;

/// Queued-message status byte that marks the end of the queue
pub const QUEUE_EMPTY_STATUS: u8 = 0x0C;

/// Network state carried by update-network-state and status frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NetworkState {
    /// Network idle; concentrator flushes its state
    ResetIdle = 0,
    /// Network active; concentrator accepts registrations and polls
    ActiveResume = 1,
}

impl NetworkState {
    /// Parse the one-byte wire form
    pub fn from_u8(byte: u8) -> Result<Self, DecodeError> {
        match byte {
            0 => Ok(NetworkState::ResetIdle),
            1 => Ok(NetworkState::ActiveResume),
            other => Err(DecodeError::InvalidStateByte(other)),
        }
    }

    /// The one-byte wire form
    pub fn byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkState::ResetIdle => write!(f, "reset/idle"),
            NetworkState::ActiveResume => write!(f, "active/resume"),
        }
    }
}

/// One logged sensor sample from a data-log frame
#[derive(Debug, Clone, PartialEq)]
pub struct DataLogSample {
    /// Reporting device id
    pub device_id: u32,
    /// Sample time as Unix seconds; `None` when the wire timestamp is zero
    pub sample_time: Option<u64>,
    /// Access-point side signal strength, dBm
    pub ap_signal: i8,
    /// Device side signal strength, dBm
    pub device_signal: i8,
    /// Battery voltage in volts
    pub battery_voltage: f64,
    /// Sensor-type-specific reading
    pub sensor: SensorReading,
}

/// Decoded payload of one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseKind {
    /// Acknowledge / echo of an update-network-state request
    NetworkStateAck {
        state: NetworkState,
        /// Protocol-epoch seconds carried by the frame
        time: u32,
    },
    /// Acknowledge / echo of a register-wireless-device request
    DeviceAck { address: u32 },
    /// Concentrator network status
    NetworkStatus {
        network_id: u32,
        device_count: u16,
        channel: u8,
        network: u8,
        state: NetworkState,
        /// Protocol version from the status byte's upper nibble (0-3)
        protocol_version: u8,
        /// Status from the lower nibble
        status: u8,
    },
    /// Queued-message status; status [`QUEUE_EMPTY_STATUS`] ends the queue
    QueuedStatus { device_id: u32, status: u8 },
    /// Parent routing info for a device
    ParentInfo {
        device_id: u32,
        parent_id: u32,
        firmware: String,
    },
    /// One logged sensor sample
    DataLogSample(DataLogSample),
}

/// One decoded inbound frame: command code, raw bytes, typed payload
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Wire command code
    pub code: u8,
    /// The raw validated frame, CRC included
    pub raw: Vec<u8>,
    /// Typed payload
    pub kind: ResponseKind,
}

impl Response {
    /// Decode a received frame with default unit preferences
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        Self::decode_with(bytes, &UnitPrefs::default())
    }

    /// Decode a received frame
    ///
    /// Leading bytes before the start delimiter are discarded (serial
    /// noise). The CRC must be present and correct.
    pub fn decode_with(bytes: &[u8], prefs: &UnitPrefs) -> Result<Self, DecodeError> {
        let start = bytes
            .iter()
            .position(|&b| b == frame::START_DELIMITER)
            .unwrap_or(bytes.len());
        let bytes = &bytes[start..];

        frame::verify_crc(bytes)?;
        let parsed = Frame::parse(bytes)?;

        let command =
            Command::from_u8(parsed.command).ok_or(DecodeError::UnknownCommand(parsed.command))?;

        if let Some(expected) = command.payload_len() {
            if parsed.payload.len() != expected {
                return Err(DecodeError::PayloadLengthMismatch {
                    command: parsed.command,
                    expected,
                    actual: parsed.payload.len(),
                });
            }
        }

        let payload = &parsed.payload;
        let kind = match command {
            Command::UpdateNetworkState => ResponseKind::NetworkStateAck {
                state: NetworkState::from_u8(payload[0])?,
                time: u32::from_le_bytes([payload[1], payload[2], payload[3], payload[4]]),
            },
            Command::RegisterDevice => ResponseKind::DeviceAck {
                address: u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
            },
            Command::NetworkStatus => decode_network_status(payload)?,
            Command::QueuedMessage => ResponseKind::QueuedStatus {
                device_id: u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
                status: payload[4],
            },
            Command::ParentMessage => ResponseKind::ParentInfo {
                device_id: u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
                parent_id: u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]),
                firmware: format!(
                    "{}.{}.{}.{}",
                    payload[8], payload[9], payload[10], payload[11]
                ),
            },
            Command::DataLog => decode_data_log(parsed.command, payload, prefs)?,
        };

        Ok(Self {
            code: parsed.command,
            raw: bytes.to_vec(),
            kind,
        })
    }

    /// The decoded command, always present for a decoded response
    pub fn command(&self) -> Command {
        // A Response is only ever built from a table command.
        Command::from_u8(self.code).expect("decoded response carries a table command")
    }

    /// True for the canonical end-of-queue status
    pub fn is_end_of_queue(&self) -> bool {
        matches!(
            self.kind,
            ResponseKind::QueuedStatus {
                status: QUEUE_EMPTY_STATUS,
                ..
            }
        )
    }

    /// The sample, when this is a data-log response
    pub fn data_log(&self) -> Option<&DataLogSample> {
        match &self.kind {
            ResponseKind::DataLogSample(sample) => Some(sample),
            _ => None,
        }
    }
}

fn decode_network_status(payload: &[u8]) -> Result<ResponseKind, DecodeError> {
    let status_byte = payload[9];
    let protocol_version = (status_byte & 0xF0) >> 4;
    if protocol_version > 3 {
        return Err(DecodeError::ProtocolVersionOutOfRange(protocol_version));
    }

    Ok(ResponseKind::NetworkStatus {
        network_id: u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
        device_count: u16::from_le_bytes([payload[4], payload[5]]),
        channel: payload[6],
        network: payload[7],
        state: NetworkState::from_u8(payload[8])?,
        protocol_version,
        status: status_byte & 0x0F,
    })
}

fn decode_data_log(
    command: u8,
    payload: &[u8],
    prefs: &UnitPrefs,
) -> Result<ResponseKind, DecodeError> {
    // Fixed prefix plus at least the sensor type/state header.
    const MIN_LEN: usize = 14;
    if payload.len() < MIN_LEN {
        return Err(DecodeError::PayloadLengthMismatch {
            command,
            expected: MIN_LEN,
            actual: payload.len(),
        });
    }

    let raw_time = u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
    let sample_time = if raw_time == 0 {
        None
    } else {
        Some(epoch::from_protocol(raw_time))
    };

    Ok(ResponseKind::DataLogSample(DataLogSample {
        device_id: u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
        sample_time,
        ap_signal: payload[8] as i8,
        device_signal: payload[9] as i8,
        battery_voltage: (150.0 + f64::from(payload[10])) / 100.0,
        sensor: sensor::decode(&payload[11..], prefs)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{SampleValue, SensorKind};

    #[test]
    fn test_decode_network_state_ack() {
        let bytes = [0xC5, 0x07, 0x00, 0x21, 0x01, 0x39, 0xB5, 0x31, 0x0B, 0x1E];
        let response = Response::decode(&bytes).unwrap();
        assert_eq!(response.code, 0x21);
        assert_eq!(response.raw, bytes.to_vec());
        assert_eq!(
            response.kind,
            ResponseKind::NetworkStateAck {
                state: NetworkState::ActiveResume,
                time: 0x0B31_B539,
            }
        );
    }

    #[test]
    fn test_decode_device_ack() {
        let bytes = [0xC5, 0x06, 0x00, 0x22, 0xB4, 0x74, 0x01, 0x00, 0x57];
        let response = Response::decode(&bytes).unwrap();
        assert_eq!(
            response.kind,
            ResponseKind::DeviceAck { address: 95412 }
        );
    }

    #[test]
    fn test_decode_network_status() {
        let bytes = [
            0xC5, 0x0C, 0x00, 0x23, 0xC8, 0x00, 0x00, 0x00, 0x02, 0x00, 0x07, 0x80, 0x01, 0x30,
            0x6C,
        ];
        let response = Response::decode(&bytes).unwrap();
        match response.kind {
            ResponseKind::NetworkStatus {
                network_id,
                device_count,
                channel,
                network,
                state,
                protocol_version,
                status,
            } => {
                assert_eq!(network_id, 200);
                assert_eq!(device_count, 2);
                assert_eq!(channel, 0x07);
                assert_eq!(network, 0x80);
                assert_eq!(state, NetworkState::ActiveResume);
                assert_eq!(protocol_version, 3);
                assert_eq!(status, 0);
            }
            other => panic!("expected network status, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_queued_status() {
        let bytes = [0xC5, 0x07, 0x00, 0x24, 0x85, 0x03, 0x00, 0x00, 0x00, 0x7F];
        let response = Response::decode(&bytes).unwrap();
        assert_eq!(
            response.kind,
            ResponseKind::QueuedStatus {
                device_id: 901,
                status: 0,
            }
        );
        assert!(!response.is_end_of_queue());
    }

    #[test]
    fn test_decode_end_of_queue() {
        let bytes = [0xC5, 0x07, 0x00, 0x24, 0xC8, 0x00, 0x00, 0x00, 0x0C, 0x3D];
        let response = Response::decode(&bytes).unwrap();
        assert!(response.is_end_of_queue());
    }

    #[test]
    fn test_decode_parent_message() {
        let bytes = [
            0xC5, 0x0E, 0x00, 0x52, 0xC8, 0x00, 0x00, 0x00, 0xC8, 0x00, 0x00, 0x00, 0x02, 0x05,
            0x00, 0x00, 0xA5,
        ];
        let response = Response::decode(&bytes).unwrap();
        assert_eq!(
            response.kind,
            ResponseKind::ParentInfo {
                device_id: 200,
                parent_id: 200,
                firmware: "2.5.0.0".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_data_log() {
        // Device 95412, open/closed sensor, zero timestamp.
        let bytes = [
            0xC5, 0x12, 0x02, 0x56, 0xB4, 0x74, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0xD1, 0xD1,
            0xA1, 0x09, 0x00, 0x02, 0x00, 0x00, 0x7B,
        ];
        let response = Response::decode(&bytes).unwrap();
        let sample = response.data_log().expect("data log sample");
        assert_eq!(sample.device_id, 95412);
        assert_eq!(sample.sample_time, None);
        assert_eq!(sample.ap_signal, -47);
        assert_eq!(sample.device_signal, -47);
        assert_eq!(sample.battery_voltage, (150.0 + 161.0) / 100.0);
        assert_eq!(sample.sensor.kind(), Some(SensorKind::OpenClosed));
        assert_eq!(sample.sensor.state, 0x02);
        assert_eq!(
            sample.sensor.primary.as_ref().unwrap().value,
            SampleValue::Digital(false)
        );
    }

    #[test]
    fn test_decode_data_log_with_time() {
        let bytes = [
            0xC5, 0x12, 0x02, 0x56, 0xB4, 0x74, 0x01, 0x00, 0x25, 0xF0, 0x53, 0x0B, 0xD7, 0xD7,
            0x95, 0x09, 0x00, 0x02, 0x00, 0x00, 0xE0,
        ];
        let response = Response::decode(&bytes).unwrap();
        let sample = response.data_log().unwrap();
        let raw_time = u32::from_le_bytes([0x25, 0xF0, 0x53, 0x0B]);
        assert_eq!(sample.sample_time, Some(epoch::from_protocol(raw_time)));
    }

    #[test]
    fn test_decode_skips_leading_noise() {
        let mut bytes = vec![0x00, 0x12, 0x99];
        bytes.extend_from_slice(&[0xC5, 0x07, 0x00, 0x24, 0xC8, 0x00, 0x00, 0x00, 0x0C, 0x3D]);
        let response = Response::decode(&bytes).unwrap();
        assert!(response.is_end_of_queue());
    }

    #[test]
    fn test_decode_unknown_command() {
        // Valid frame form and CRC, but the command is not in the table.
        let bytes = crate::frame::wrap(&[0x20, 0x01, 0x02, 0x03, 0x04, 0x05]).unwrap();
        assert_eq!(
            Response::decode(&bytes),
            Err(DecodeError::UnknownCommand(0x20))
        );
    }

    #[test]
    fn test_decode_payload_length_mismatch() {
        // register_wireless_device with a 5-byte payload instead of 4.
        let bytes = crate::frame::wrap(&[0x22, 0x01, 0x02, 0x03, 0x04, 0x05]).unwrap();
        assert_eq!(
            Response::decode(&bytes),
            Err(DecodeError::PayloadLengthMismatch {
                command: 0x22,
                expected: 4,
                actual: 5,
            })
        );
    }

    #[test]
    fn test_decode_requires_crc() {
        let bytes = [0xC5, 0x07, 0x00, 0x24, 0xC8, 0x00, 0x00, 0x00, 0x0C];
        assert_eq!(
            Response::decode(&bytes),
            Err(DecodeError::Frame(crate::error::FrameError::CrcMissing))
        );
    }

    #[test]
    fn test_raw_reencodes_exactly() {
        let bytes = [
            0xC5, 0x11, 0x00, 0x56, 0xB5, 0x74, 0x01, 0x00, 0xE8, 0xF1, 0x53, 0x0B, 0xD3, 0xD3,
            0xA2, 0x03, 0x00, 0x00, 0x00, 0x98,
        ];
        let response = Response::decode(&bytes).unwrap();
        let frame = Frame::parse(&response.raw).unwrap();
        assert_eq!(frame.to_bytes().unwrap(), bytes.to_vec());
    }
}
