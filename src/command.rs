// Sensorlink - Serial sensor concentrator to cloud telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Command code table
//!
//! One entry per supported command, pairing the numeric wire code with
//! its symbolic name and payload-length rule. The decode strategy for
//! each command is the exhaustive match in [`crate::response`]; the
//! table itself is static and complete at compile time, so there is no
//! "not yet initialized" state.

use std::fmt;

/// Commands of the concentrator wire protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Outbound: set the network state (reset/idle or active/resume)
    UpdateNetworkState = 0x21,
    /// Outbound: register one wireless device id with the concentrator
    RegisterDevice = 0x22,
    /// Inbound: concentrator network status
    NetworkStatus = 0x23,
    /// Outbound request and inbound status for the message queue
    QueuedMessage = 0x24,
    /// Inbound: parent routing info for a device
    ParentMessage = 0x52,
    /// Inbound: one logged sensor sample
    DataLog = 0x56,
}

/// All table entries, in wire-code order
pub const COMMANDS: [Command; 6] = [
    Command::UpdateNetworkState,
    Command::RegisterDevice,
    Command::NetworkStatus,
    Command::QueuedMessage,
    Command::ParentMessage,
    Command::DataLog,
];

impl Command {
    /// Look up a command by wire code
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x21 => Some(Command::UpdateNetworkState),
            0x22 => Some(Command::RegisterDevice),
            0x23 => Some(Command::NetworkStatus),
            0x24 => Some(Command::QueuedMessage),
            0x52 => Some(Command::ParentMessage),
            0x56 => Some(Command::DataLog),
            _ => None,
        }
    }

    /// The numeric wire code
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Symbolic name
    pub fn name(self) -> &'static str {
        match self {
            Command::UpdateNetworkState => "update_network_state",
            Command::RegisterDevice => "register_wireless_device",
            Command::NetworkStatus => "network_status",
            Command::QueuedMessage => "queued_message",
            Command::ParentMessage => "parent_message",
            Command::DataLog => "data_log_message",
        }
    }

    /// Expected payload length, or `None` for variable-length commands
    pub fn payload_len(self) -> Option<usize> {
        match self {
            Command::UpdateNetworkState => Some(5),
            Command::RegisterDevice => Some(4),
            Command::NetworkStatus => Some(10),
            Command::QueuedMessage => Some(5),
            Command::ParentMessage => Some(12),
            Command::DataLog => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.code())
    }
}
