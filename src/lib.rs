// Sensorlink - Serial sensor concentrator to cloud telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Sensorlink - Serial sensor concentrator to cloud telemetry bridge
//!
//! A protocol gateway for wired sensor-network concentrators: it polls
//! the concentrator over a serial line, decodes per-sensor telemetry,
//! raises change alerts, and batches the raw frames up to a cloud
//! endpoint over TCP.
//!
//! ## Key Features
//!
//! - **Frame codec**: wire frame encode/decode with CRC-8 validation
//! - **Polling state machine**: reset, resume, register, poll - one
//!   session per concentrator
//! - **Sensor decoding**: per-type engineering values and units
//! - **Alerting**: per-device running statistics and change alerts
//! - **Batched uplink**: bounded FIFO with heartbeat keep-alive
//!
//! ## Quick Start
//!
//! ```rust
//! use sensorlink::{Response, Session};
//!
//! // One session drives one concentrator.
//! let mut session = Session::new(200);
//! session.add_sensor(95412);
//!
//! // The first request resets the network.
//! let request = session.next_request().unwrap().expect("a frame");
//! assert_eq!(request[3], 0x21);
//!
//! // Decode a received frame.
//! let response = Response::decode(&[
//!     0xC5, 0x07, 0x00, 0x24, 0xC8, 0x00, 0x00, 0x00, 0x0C, 0x3D,
//! ])
//! .unwrap();
//! assert!(response.is_end_of_queue());
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   serial    ┌─────────────────────────────────┐
//! │ Concentrator │ ◄─────────► │  Driver                         │
//! └──────────────┘             │   Session ─► Frame/Response     │
//!                              │      │            │             │
//!                              │      ▼            ▼             │
//!                              │   Monitors     Uploader ──► TCP │
//!                              │      │                          │
//!                              │      ▼                          │
//!                              │   AlertSink                     │
//!                              └─────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`frame`]: wire frame codec and CRC-8
//! - [`command`]: command code table
//! - [`response`]: tagged response decoding
//! - [`sensor`]: sensor-type payload decoding
//! - [`session`]: gateway polling state machine
//! - [`monitor`]: per-device statistics and alerts
//! - [`uplink`]: upload batching queue and heartbeat
//! - [`driver`]: the fixed-period poll loop
//! - [`trace`]: diagnostic request/response dumps
//! - [`replay`]: offline replay of recorded dumps

// Modules
pub mod command;
pub mod config;
pub mod driver;
pub mod epoch;
pub mod error;
pub mod frame;
pub mod monitor;
pub mod replay;
pub mod response;
pub mod sensor;
pub mod session;
pub mod trace;
pub mod uplink;

// Re-exports for convenient access
pub use command::Command;
pub use config::{AlertSpec, SiteConfig};
pub use driver::{CycleReport, Driver, MemorySerialLink, SerialLink};
pub use error::{
    DecodeError, FrameError, MonitorError, Result, SensorDataError, SensorlinkError, SessionError,
};
pub use frame::Frame;
pub use monitor::{
    AlertEvent, AlertSink, DeviceMonitor, MemoryAlertSink, RunningStat, SmoothingWeights,
};
pub use replay::{ReplayLink, ReplayLog};
pub use response::{DataLogSample, NetworkState, Response, ResponseKind, QUEUE_EMPTY_STATUS};
pub use sensor::{Measurement, SampleValue, SensorKind, SensorReading, UnitPrefs};
pub use session::{Session, SessionState};
pub use uplink::{CloudLink, MemoryCloudLink, TcpCloudLink, UploadOutcome, Uploader};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
