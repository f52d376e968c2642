// Sensorlink - Serial sensor concentrator to cloud telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Gateway polling state machine
//!
//! One [`Session`] drives exactly one concentrator. Each call to
//! [`Session::next_request`] produces the next outbound frame given the
//! current state and the sensor address list:
//!
//! ```text
//! Unknown -> Reset -> Resume -> Register (one per sensor) -> Poll -> Poll ...
//! ```
//!
//! Poll self-loops forever; there is no terminal state. The poll
//! counter pre-increments and wraps within 0-255, so the emitted
//! sequence is 1, 2, ..., 255, 0, 1, ...

use crate::command::Command;
use crate::epoch;
use crate::error::{FrameError, Result, SessionError};
use crate::frame;
use crate::response::{NetworkState, Response, ResponseKind};

/// States of the polling state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing sent yet
    Unknown,
    /// Reset/idle request sent
    Reset,
    /// Active/resume request sent
    Resume,
    /// Walking the sensor address list
    Register,
    /// Polling the message queue
    Poll,
}

/// Encode an update-network-state request (command 0x21)
///
/// `time` is in protocol-epoch seconds.
pub fn encode_update_network_state(
    state: NetworkState,
    time: u32,
) -> std::result::Result<Vec<u8>, FrameError> {
    let mut body = Vec::with_capacity(6);
    body.push(Command::UpdateNetworkState.code());
    body.push(state.byte());
    body.extend_from_slice(&time.to_le_bytes());
    frame::wrap(&body)
}

/// Encode a register-wireless-device request (command 0x22)
pub fn encode_register_device(address: u32) -> std::result::Result<Vec<u8>, FrameError> {
    let mut body = Vec::with_capacity(5);
    body.push(Command::RegisterDevice.code());
    body.extend_from_slice(&address.to_le_bytes());
    frame::wrap(&body)
}

/// Encode a queued-message request (command 0x24)
pub fn encode_queued_message_request(
    gateway: u32,
    counter: u8,
) -> std::result::Result<Vec<u8>, FrameError> {
    let mut body = Vec::with_capacity(6);
    body.push(Command::QueuedMessage.code());
    body.extend_from_slice(&gateway.to_le_bytes());
    body.push(counter);
    frame::wrap(&body)
}

/// State for one concentrator connection
///
/// Created once per session; mutated by every [`next_request`] call and
/// by responses that reveal the protocol version.
///
/// [`next_request`]: Session::next_request
#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    sensors: Vec<u32>,
    cursor: Option<usize>,
    poll_counter: u8,
    gateway_address: u32,
    protocol_version: u8,
}

impl Session {
    /// Create a session for the concentrator at `gateway_address`
    pub fn new(gateway_address: u32) -> Self {
        Self {
            state: SessionState::Unknown,
            sensors: Vec::new(),
            cursor: None,
            poll_counter: 0,
            gateway_address,
            protocol_version: 1,
        }
    }

    /// Current state machine node
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The concentrator address used in poll requests
    pub fn gateway_address(&self) -> u32 {
        self.gateway_address
    }

    /// Change the concentrator address
    pub fn set_gateway_address(&mut self, address: u32) {
        self.gateway_address = address;
    }

    /// Protocol version learned from network-status responses
    pub fn protocol_version(&self) -> u8 {
        self.protocol_version
    }

    /// The ordered sensor address list
    pub fn sensors(&self) -> &[u32] {
        &self.sensors
    }

    /// Add a sensor address; duplicates are ignored
    ///
    /// Mutating the list deactivates any registration in progress.
    pub fn add_sensor(&mut self, address: u32) {
        if !self.sensors.contains(&address) {
            self.sensors.push(address);
        }
        self.cursor = None;
    }

    /// Remove a sensor address if present
    pub fn remove_sensor(&mut self, address: u32) {
        self.sensors.retain(|&a| a != address);
        self.cursor = None;
    }

    /// Drop all sensor addresses
    pub fn clear_sensors(&mut self) {
        self.sensors.clear();
        self.cursor = None;
    }

    /// Return the machine to its initial state
    pub fn reset(&mut self) {
        self.state = SessionState::Unknown;
        self.cursor = None;
    }

    /// Re-synchronize the poll counter
    ///
    /// The next queued-message request is numbered `value + 1`
    /// (wrapping within 0-255).
    pub fn reset_poll_counter(&mut self, value: u8) {
        self.poll_counter = value;
    }

    /// Learn from a decoded response
    ///
    /// Network-status responses carry the concentrator's protocol
    /// version.
    pub fn observe(&mut self, response: &Response) {
        if let ResponseKind::NetworkStatus {
            protocol_version, ..
        } = response.kind
        {
            self.protocol_version = protocol_version;
        }
    }

    /// Produce the next outbound request
    ///
    /// `Ok(None)` means no frame this cycle (resume with an empty
    /// sensor list). The Register state requires an active cursor; if
    /// the sensor list was mutated mid-registration this is a
    /// [`SessionError::BadState`].
    pub fn next_request(&mut self) -> Result<Option<Vec<u8>>> {
        let request = match self.state {
            SessionState::Unknown => {
                let frame =
                    encode_update_network_state(NetworkState::ResetIdle, epoch::protocol_now())?;
                self.state = SessionState::Reset;
                Some(frame)
            }
            SessionState::Reset => {
                let frame =
                    encode_update_network_state(NetworkState::ActiveResume, epoch::protocol_now())?;
                self.state = SessionState::Resume;
                Some(frame)
            }
            SessionState::Resume => {
                if self.sensors.is_empty() {
                    // Nothing to register; delay one cycle and poll.
                    self.cursor = None;
                    self.state = SessionState::Poll;
                    None
                } else {
                    self.cursor = Some(0);
                    self.state = SessionState::Register;
                    Some(encode_register_device(self.sensors[0])?)
                }
            }
            SessionState::Register => {
                let cursor = self.cursor.ok_or(SessionError::BadState(
                    "register state without an active cursor",
                ))?;
                let next = cursor + 1;
                if next < self.sensors.len() {
                    self.cursor = Some(next);
                    Some(encode_register_device(self.sensors[next])?)
                } else {
                    // Last address sent; repeat active/resume once, as
                    // the vendor's own server tool does.
                    self.cursor = None;
                    self.state = SessionState::Poll;
                    Some(encode_update_network_state(
                        NetworkState::ActiveResume,
                        epoch::protocol_now(),
                    )?)
                }
            }
            SessionState::Poll => {
                self.poll_counter = self.poll_counter.wrapping_add(1);
                Some(encode_queued_message_request(
                    self.gateway_address,
                    self.poll_counter,
                )?)
            }
        };

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SensorlinkError;
    use crate::frame::OFFSET_COMMAND;

    #[test]
    fn test_encode_update_network_state() {
        let time = u32::from_le_bytes([0x22, 0x63, 0x3B, 0x0B]);
        let frame = encode_update_network_state(NetworkState::ResetIdle, time).unwrap();
        assert_eq!(
            frame,
            vec![0xC5, 0x07, 0x00, 0x21, 0x00, 0x22, 0x63, 0x3B, 0x0B, 0xB1]
        );

        let time = u32::from_le_bytes([0x39, 0xB5, 0x31, 0x0B]);
        let frame = encode_update_network_state(NetworkState::ActiveResume, time).unwrap();
        assert_eq!(
            frame,
            vec![0xC5, 0x07, 0x00, 0x21, 0x01, 0x39, 0xB5, 0x31, 0x0B, 0x1E]
        );
    }

    #[test]
    fn test_encode_register_device() {
        assert_eq!(
            encode_register_device(95412).unwrap(),
            vec![0xC5, 0x06, 0x00, 0x22, 0xB4, 0x74, 0x01, 0x00, 0x57]
        );
        assert_eq!(
            encode_register_device(95413).unwrap(),
            vec![0xC5, 0x06, 0x00, 0x22, 0xB5, 0x74, 0x01, 0x00, 0x2E]
        );
        assert_eq!(
            encode_register_device(96002).unwrap(),
            vec![0xC5, 0x06, 0x00, 0x22, 0x02, 0x77, 0x01, 0x00, 0xF3]
        );
    }

    #[test]
    fn test_encode_queued_message_request() {
        assert_eq!(
            encode_queued_message_request(200, 0).unwrap(),
            vec![0xC5, 0x07, 0x00, 0x24, 0xC8, 0x00, 0x00, 0x00, 0x00, 0x85]
        );
        assert_eq!(
            encode_queued_message_request(200, 1).unwrap(),
            vec![0xC5, 0x07, 0x00, 0x24, 0xC8, 0x00, 0x00, 0x00, 0x01, 0x12]
        );
        assert_eq!(
            encode_queued_message_request(200, 2).unwrap(),
            vec![0xC5, 0x07, 0x00, 0x24, 0xC8, 0x00, 0x00, 0x00, 0x02, 0x3C]
        );
        assert_eq!(
            encode_queued_message_request(200, 255).unwrap(),
            vec![0xC5, 0x07, 0x00, 0x24, 0xC8, 0x00, 0x00, 0x00, 0xFF, 0xB9]
        );
    }

    fn command_of(frame: &[u8]) -> u8 {
        frame[OFFSET_COMMAND]
    }

    #[test]
    fn test_registration_sequence() {
        let mut session = Session::new(200);
        session.add_sensor(95412);
        session.add_sensor(95413);
        session.add_sensor(96002);

        // reset, resume, three registrations, one final resume
        let first = session.next_request().unwrap().unwrap();
        assert_eq!(command_of(&first), 0x21);
        assert_eq!(first[4], 0x00); // reset/idle
        assert_eq!(session.state(), SessionState::Reset);

        let second = session.next_request().unwrap().unwrap();
        assert_eq!(command_of(&second), 0x21);
        assert_eq!(second[4], 0x01); // active/resume

        for expected in [95412u32, 95413, 96002] {
            let frame = session.next_request().unwrap().unwrap();
            assert_eq!(command_of(&frame), 0x22);
            assert_eq!(
                u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]),
                expected
            );
            assert_eq!(session.state(), SessionState::Register);
        }

        let sixth = session.next_request().unwrap().unwrap();
        assert_eq!(command_of(&sixth), 0x21);
        assert_eq!(sixth[4], 0x01);
        assert_eq!(session.state(), SessionState::Poll);
    }

    #[test]
    fn test_poll_counter_wraps() {
        let mut session = Session::new(200);
        // Empty sensor list: resume emits nothing and drops into Poll.
        session.next_request().unwrap();
        session.next_request().unwrap();
        assert!(session.next_request().unwrap().is_none());
        assert_eq!(session.state(), SessionState::Poll);

        // Counter byte is at offset 8 of the 0x24 frame.
        for expected in 1..=255u32 {
            let frame = session.next_request().unwrap().unwrap();
            assert_eq!(command_of(&frame), 0x24);
            assert_eq!(u32::from(frame[8]), expected);
        }
        let frame = session.next_request().unwrap().unwrap();
        assert_eq!(frame[8], 0); // wrapped
        let frame = session.next_request().unwrap().unwrap();
        assert_eq!(frame[8], 1);
    }

    #[test]
    fn test_reset_poll_counter() {
        let mut session = Session::new(200);
        session.next_request().unwrap();
        session.next_request().unwrap();
        session.next_request().unwrap();

        session.next_request().unwrap(); // counter 1
        session.reset_poll_counter(0);
        let frame = session.next_request().unwrap().unwrap();
        assert_eq!(frame[8], 1);

        session.reset_poll_counter(41);
        let frame = session.next_request().unwrap().unwrap();
        assert_eq!(frame[8], 42);
    }

    #[test]
    fn test_reset_returns_to_unknown() {
        let mut session = Session::new(200);
        session.next_request().unwrap();
        session.next_request().unwrap();
        assert_eq!(session.state(), SessionState::Resume);

        session.reset();
        assert_eq!(session.state(), SessionState::Unknown);
        let frame = session.next_request().unwrap().unwrap();
        assert_eq!(frame[4], 0x00); // back to reset/idle
    }

    #[test]
    fn test_duplicate_sensor_ignored() {
        let mut session = Session::new(200);
        session.add_sensor(95412);
        session.add_sensor(95412);
        assert_eq!(session.sensors(), &[95412]);

        session.remove_sensor(95412);
        assert!(session.sensors().is_empty());
    }

    #[test]
    fn test_register_without_cursor_is_bad_state() {
        let mut session = Session::new(200);
        session.add_sensor(95412);
        session.add_sensor(95413);
        session.next_request().unwrap(); // reset
        session.next_request().unwrap(); // resume
        session.next_request().unwrap(); // register 95412
        assert_eq!(session.state(), SessionState::Register);

        // Mutating the list deactivates the cursor mid-registration.
        session.clear_sensors();
        let result = session.next_request();
        assert!(matches!(
            result,
            Err(SensorlinkError::Session(SessionError::BadState(_)))
        ));
    }

    #[test]
    fn test_observe_learns_protocol_version() {
        let mut session = Session::new(200);
        assert_eq!(session.protocol_version(), 1);

        let bytes = [
            0xC5, 0x0C, 0x00, 0x23, 0xC8, 0x00, 0x00, 0x00, 0x02, 0x00, 0x07, 0x80, 0x01, 0x30,
            0x6C,
        ];
        let response = Response::decode(&bytes).unwrap();
        session.observe(&response);
        assert_eq!(session.protocol_version(), 3);
    }
}
