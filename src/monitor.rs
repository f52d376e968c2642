// Sensorlink - Serial sensor concentrator to cloud telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Per-device running statistics and change alerts
//!
//! A [`DeviceMonitor`] accumulates smoothed battery and signal
//! statistics for one device and raises an alert when the primary
//! sensor value changes. Monitors update strictly in sample-decode
//! order, so the smoothing and min/max results are deterministic for a
//! fixed input sequence.

use crate::config::AlertSpec;
use crate::epoch;
use crate::error::{MonitorError, Result};
use crate::response::DataLogSample;
use crate::sensor::{round2, Measurement, SampleValue};
use std::io;

/// Where formatted alerts are delivered
///
/// The delivery transport (email, webhook, ...) is outside this crate;
/// implementors only need `send(subject, body)`.
pub trait AlertSink {
    /// Deliver one alert
    fn send(&mut self, subject: &str, body: &str) -> io::Result<()>;
}

/// In-memory sink for tests and local inspection
#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    /// Every (subject, body) pair sent
    pub sent: Vec<(String, String)>,
}

impl MemoryAlertSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlertSink for MemoryAlertSink {
    fn send(&mut self, subject: &str, body: &str) -> io::Result<()> {
        self.sent.push((subject.to_string(), body.to_string()));
        Ok(())
    }
}

/// Exponential-moving-average weights; 1.0 disables smoothing
#[derive(Debug, Clone, Copy)]
pub struct SmoothingWeights {
    /// Weight of a new battery sample
    pub battery: f64,
    /// Weight of a new signal sample
    pub signal: f64,
}

impl Default for SmoothingWeights {
    fn default() -> Self {
        Self {
            battery: 0.25,
            signal: 0.9,
        }
    }
}

/// Smoothed value plus the raw running extremes of one field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningStat {
    /// Smoothed value, rounded to two decimals
    pub smoothed: f64,
    /// Minimum raw sample seen
    pub min: f64,
    /// Maximum raw sample seen
    pub max: f64,
}

impl RunningStat {
    fn first(value: f64) -> Self {
        Self {
            smoothed: value,
            min: value,
            max: value,
        }
    }

    fn update(&mut self, value: f64, weight: f64) {
        if weight >= 1.0 {
            self.smoothed = value;
        } else {
            self.smoothed = round2(self.smoothed * (1.0 - weight) + value * weight);
        }
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

fn observe(stat: &mut Option<RunningStat>, value: f64, weight: f64) {
    match stat {
        Some(stat) => stat.update(value, weight),
        None => *stat = Some(RunningStat::first(value)),
    }
}

/// A formatted state-change alert
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    /// Reporting device id
    pub device_id: u32,
    /// Short message, e.g. `" Alert: Door = Door Open"`
    pub subject: String,
    /// Subject plus the sample timestamp
    pub body: String,
    /// Whether the event was forwarded to the sink
    pub notified: bool,
}

/// Running statistics and alert state for one device
///
/// Created lazily on a device's first sample and kept for the life of
/// the session. The sensor type observed in the first sample is fixed;
/// a later sample of a different type is a
/// [`MonitorError::TypeMismatch`].
#[derive(Debug)]
pub struct DeviceMonitor {
    device_id: u32,
    weights: SmoothingWeights,
    alert: Option<AlertSpec>,
    sensor_type: Option<u16>,
    last_sample: Option<DataLogSample>,
    last_time: Option<u64>,
    battery: Option<RunningStat>,
    ap_signal: Option<RunningStat>,
    device_signal: Option<RunningStat>,
    last_primary: Option<Measurement>,
}

impl DeviceMonitor {
    /// Create a monitor for one device
    pub fn new(device_id: u32) -> Self {
        Self {
            device_id,
            weights: SmoothingWeights::default(),
            alert: None,
            sensor_type: None,
            last_sample: None,
            last_time: None,
            battery: None,
            ap_signal: None,
            device_signal: None,
            last_primary: None,
        }
    }

    /// Attach an alert table entry
    pub fn with_alert(mut self, alert: AlertSpec) -> Self {
        self.alert = Some(alert);
        self
    }

    /// Use custom smoothing weights
    pub fn with_weights(mut self, weights: SmoothingWeights) -> Self {
        self.weights = weights;
        self
    }

    /// The monitored device id
    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    /// Battery statistics, once a sample has been seen
    pub fn battery(&self) -> Option<&RunningStat> {
        self.battery.as_ref()
    }

    /// Access-point signal statistics
    pub fn ap_signal(&self) -> Option<&RunningStat> {
        self.ap_signal.as_ref()
    }

    /// Device signal statistics
    pub fn device_signal(&self) -> Option<&RunningStat> {
        self.device_signal.as_ref()
    }

    /// The most recent raw sample
    pub fn last_sample(&self) -> Option<&DataLogSample> {
        self.last_sample.as_ref()
    }

    /// The most recent primary value
    pub fn last_primary(&self) -> Option<&Measurement> {
        self.last_primary.as_ref()
    }

    /// Fold one sample into the statistics and check for a change alert
    ///
    /// Returns the alert event when the primary value changed, `None`
    /// otherwise. The device's first-ever sample primes the statistics
    /// and records the state but never notifies the sink; this
    /// suppresses alert storms on restart, and also means an alarm
    /// condition already true before the session started goes
    /// unreported until it changes again.
    pub fn process(
        &mut self,
        sample: &DataLogSample,
        sink: &mut dyn AlertSink,
    ) -> Result<Option<AlertEvent>> {
        let first_sample = self.sensor_type.is_none();
        match self.sensor_type {
            None => {
                log::info!("First data seen for device id:{}", self.device_id);
                self.sensor_type = Some(sample.sensor.type_code);
            }
            Some(expected) if expected != sample.sensor.type_code => {
                return Err(MonitorError::TypeMismatch {
                    device_id: self.device_id,
                    expected,
                    actual: sample.sensor.type_code,
                }
                .into());
            }
            Some(_) => {}
        }

        let now = sample.sample_time.unwrap_or_else(epoch::unix_now);
        self.last_time = Some(now);

        observe(&mut self.battery, sample.battery_voltage, self.weights.battery);
        observe(
            &mut self.ap_signal,
            f64::from(sample.ap_signal),
            self.weights.signal,
        );
        observe(
            &mut self.device_signal,
            f64::from(sample.device_signal),
            self.weights.signal,
        );

        let current = sample.sensor.primary.clone();
        self.last_sample = Some(sample.clone());

        let changed = match (&self.last_primary, &current) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(previous), Some(current)) => previous.value != current.value,
        };
        if !changed {
            return Ok(None);
        }

        let measurement = current.clone().expect("changed implies a primary value");
        self.last_primary = current;

        let alert = match &self.alert {
            Some(alert) => alert,
            None => {
                log::info!(
                    "Device {} changed to {} (no alert entry)",
                    self.device_id,
                    measurement
                );
                return Ok(None);
            }
        };

        let mut subject = format!(" {} = ", alert.description);
        match (&alert.tags, &measurement.value) {
            (Some((when_false, when_true)), SampleValue::Digital(value)) => {
                subject.push_str(if *value { when_true } else { when_false });
            }
            _ => subject.push_str(&measurement.to_string()),
        }
        let body = format!("{} ({})", subject, epoch::format_timestamp(now));
        log::info!("{}", body);

        let notified = alert.notify && !first_sample;
        if notified {
            sink.send(&subject, &body)?;
        }

        Ok(Some(AlertEvent {
            device_id: self.device_id,
            subject,
            body,
            notified,
        }))
    }

    /// One-line operator summary of the device
    pub fn summary(&self) -> String {
        let mut report = format!("Sensor:{}", self.device_id);
        if self.last_sample.is_none() {
            report.push_str(" is offline/undetected.");
            return report;
        }

        if let Some(primary) = &self.last_primary {
            report.push_str(&format!(" {}", primary));
        }
        if let Some(time) = self.last_time {
            report.push_str(&format!("\t{}", epoch::format_timestamp(time)));
        }
        if let Some(battery) = &self.battery {
            report.push_str(&format!(" bat:{:.2}v", battery.smoothed));
        }
        if let Some(ap) = &self.ap_signal {
            report.push_str(&format!(
                " AP:{:.0} ({:.0}:{:.0})",
                ap.smoothed, ap.min, ap.max
            ));
        }
        if let Some(dev) = &self.device_signal {
            report.push_str(&format!(
                " DV:{:.0} ({:.0}:{:.0})",
                dev.smoothed, dev.min, dev.max
            ));
        }
        report
    }
}
