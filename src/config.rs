// Sensorlink - Serial sensor concentrator to cloud telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Site configuration
//!
//! Everything site-specific lives here: the concentrator address, the
//! sensor list, the cloud endpoint, pacing, smoothing weights, unit
//! preferences, and the per-device alert table.

use crate::monitor::SmoothingWeights;
use crate::sensor::UnitPrefs;
use std::collections::HashMap;
use std::time::Duration;

/// Alert table entry for one device
#[derive(Debug, Clone)]
pub struct AlertSpec {
    /// Message prefix, e.g. `"Alert: Manager's Door After Hours"`
    pub description: String,
    /// Text pair for two-state sensors: (when false, when true)
    pub tags: Option<(String, String)>,
    /// Forward changes to the alert sink
    pub notify: bool,
}

impl AlertSpec {
    /// Create an alert entry with the given description
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            tags: None,
            notify: false,
        }
    }

    /// Attach a (when false, when true) text pair for digital values
    pub fn with_tags(mut self, when_false: impl Into<String>, when_true: impl Into<String>) -> Self {
        self.tags = Some((when_false.into(), when_true.into()));
        self
    }

    /// Forward changes to the alert sink
    pub fn notify(mut self) -> Self {
        self.notify = true;
        self
    }
}

/// Site-level configuration
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Concentrator address (from the device label)
    pub gateway_address: u32,

    /// Ordered list of sensor device ids to register
    pub sensor_addresses: Vec<u32>,

    /// Cloud telemetry host
    pub cloud_host: String,

    /// Cloud telemetry port
    pub cloud_port: u16,

    /// Heartbeat interval in seconds: an empty upload is sent when no
    /// data has gone out for this long
    pub heartbeat_secs: u64,

    /// Target duration of one poll cycle
    pub poll_cycle: Duration,

    /// Settle delay between writing a request and reading its response
    pub settle_delay: Duration,

    /// Bounded read retries before treating a response as absent
    pub read_retries: u32,

    /// Upload queue capacity
    pub upload_capacity: usize,

    /// Smoothing weights for battery and signal statistics
    pub weights: SmoothingWeights,

    /// Unit and polarity preferences for sensor decoding
    pub units: UnitPrefs,

    /// Per-device alert table
    pub alerts: HashMap<u32, AlertSpec>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            gateway_address: 0,
            sensor_addresses: Vec::new(),
            cloud_host: String::new(),
            cloud_port: 3000,
            heartbeat_secs: 890,
            poll_cycle: Duration::from_secs(1),
            settle_delay: Duration::from_millis(100),
            read_retries: 3,
            upload_capacity: 1000,
            weights: SmoothingWeights::default(),
            units: UnitPrefs::default(),
            alerts: HashMap::new(),
        }
    }
}

impl SiteConfig {
    /// Create a configuration for one concentrator
    pub fn new(gateway_address: u32) -> Self {
        Self {
            gateway_address,
            ..Default::default()
        }
    }

    /// Set the ordered sensor list
    pub fn with_sensors(mut self, addresses: impl Into<Vec<u32>>) -> Self {
        self.sensor_addresses = addresses.into();
        self
    }

    /// Set the cloud endpoint
    pub fn with_cloud(mut self, host: impl Into<String>, port: u16) -> Self {
        self.cloud_host = host.into();
        self.cloud_port = port;
        self
    }

    /// Set the heartbeat interval
    pub fn with_heartbeat_secs(mut self, secs: u64) -> Self {
        self.heartbeat_secs = secs;
        self
    }

    /// Add one alert table entry
    pub fn with_alert(mut self, device_id: u32, alert: AlertSpec) -> Self {
        self.alerts.insert(device_id, alert);
        self
    }
}
