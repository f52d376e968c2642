// Sensorlink - Serial sensor concentrator to cloud telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Fixed-period poll loop
//!
//! The [`Driver`] composes the whole pipeline: it asks the session for
//! the next request, exchanges it over the serial link, decodes the
//! response, feeds data-log samples through the per-device monitors,
//! queues raw frames for upload, and ends every cycle with an upload
//! or heartbeat tick.
//!
//! Everything is synchronous and single-threaded; one request is
//! outstanding at a time and responses are consumed strictly in issue
//! order.

use crate::config::SiteConfig;
use crate::epoch;
use crate::error::Result;
use crate::monitor::{AlertEvent, AlertSink, DeviceMonitor};
use crate::response::{Response, ResponseKind, QUEUE_EMPTY_STATUS};
use crate::session::Session;
use crate::trace::{self, TraceLog};
use crate::uplink::{CloudLink, UploadOutcome, Uploader};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io::{self, Write};
use std::thread;
use std::time::Instant;

/// The serial transport collaborator
///
/// `receive` returns whatever arrived within the transport's own
/// timeout; an empty buffer means nothing did.
pub trait SerialLink {
    /// Write one request frame
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;
    /// Read one response, empty when none arrived in time
    fn receive(&mut self) -> io::Result<Vec<u8>>;
}

/// Scripted in-memory serial link for tests
#[derive(Debug, Default)]
pub struct MemorySerialLink {
    /// Every frame sent
    pub sent: Vec<Vec<u8>>,
    /// Responses handed out in order; empty once exhausted
    pub responses: std::collections::VecDeque<Vec<u8>>,
}

impl MemorySerialLink {
    /// Create an empty link
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a scripted response
    pub fn push_response(&mut self, response: Vec<u8>) {
        self.responses.push_back(response);
    }
}

impl SerialLink for MemorySerialLink {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.sent.push(frame.to_vec());
        Ok(())
    }

    fn receive(&mut self) -> io::Result<Vec<u8>> {
        Ok(self.responses.pop_front().unwrap_or_default())
    }
}

/// What one poll cycle did
#[derive(Debug)]
pub struct CycleReport {
    /// Cycle index, counted from zero
    pub cycle: u32,
    /// The request sent, when the session emitted one
    pub request: Option<Vec<u8>>,
    /// The decoded response, when one arrived
    pub response: Option<Response>,
    /// Alert raised by this cycle's sample
    pub alert: Option<AlertEvent>,
    /// Whether the canonical end-of-queue status was seen
    pub end_of_queue: bool,
    /// Result of the upload tick
    pub upload: UploadOutcome,
}

/// The poll-loop engine for one concentrator session
pub struct Driver {
    config: SiteConfig,
    session: Session,
    uploader: Uploader,
    monitors: HashMap<u32, DeviceMonitor>,
    trace: Option<TraceLog<Box<dyn Write>>>,
    cycle: u32,
}

impl Driver {
    /// Build a driver from the site configuration
    pub fn new(config: SiteConfig) -> Self {
        let mut session = Session::new(config.gateway_address);
        for &address in &config.sensor_addresses {
            session.add_sensor(address);
        }

        let uploader = Uploader::new(config.gateway_address)
            .with_capacity(config.upload_capacity)
            .with_heartbeat_secs(config.heartbeat_secs);

        Self {
            config,
            session,
            uploader,
            monitors: HashMap::new(),
            trace: None,
            cycle: 0,
        }
    }

    /// The session state machine
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Mutable access to the session (e.g. to resync the poll counter)
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// The upload queue
    pub fn uploader(&self) -> &Uploader {
        &self.uploader
    }

    /// The monitor for one device, once it has reported
    pub fn monitor(&self, device_id: u32) -> Option<&DeviceMonitor> {
        self.monitors.get(&device_id)
    }

    /// All device monitors
    pub fn monitors(&self) -> impl Iterator<Item = &DeviceMonitor> {
        self.monitors.values()
    }

    /// Mirror every request/response pair to `writer`
    pub fn set_trace(&mut self, writer: Box<dyn Write>) {
        self.trace = Some(TraceLog::new(writer));
    }

    /// Stop mirroring
    pub fn clear_trace(&mut self) {
        self.trace = None;
    }

    /// Run one poll cycle
    ///
    /// An empty serial response after the bounded retries is "no data
    /// this cycle", not an error. Frame, CRC, and payload errors from
    /// the decode surface to the caller, which owns the retry/skip/
    /// abort policy.
    pub fn poll_cycle(
        &mut self,
        serial: &mut dyn SerialLink,
        cloud: &mut dyn CloudLink,
        alerts: &mut dyn AlertSink,
    ) -> Result<CycleReport> {
        let cycle = self.cycle;
        self.cycle += 1;

        let request = self.session.next_request()?;

        let mut response_bytes = Vec::new();
        if let Some(ref frame) = request {
            log::debug!("{:03}: REQ {}", cycle, trace::escape_bytes(frame));
            serial.send(frame)?;

            // Allow the response to queue up before the first read.
            thread::sleep(self.config.settle_delay);

            let mut retry = 0;
            loop {
                response_bytes = serial.receive()?;
                if !response_bytes.is_empty() {
                    break;
                }
                retry += 1;
                if retry >= self.config.read_retries {
                    break;
                }
                log::debug!("     retry:{}", retry);
            }
            log::debug!("     RSP {}", trace::escape_bytes(&response_bytes));

            if let Some(trace) = self.trace.as_mut() {
                trace.record(frame, &response_bytes)?;
            }
        }

        let mut report = CycleReport {
            cycle,
            request,
            response: None,
            alert: None,
            end_of_queue: false,
            upload: UploadOutcome::Idle,
        };

        if !response_bytes.is_empty() {
            let response = Response::decode_with(&response_bytes, &self.config.units)?;
            self.session.observe(&response);

            match &response.kind {
                ResponseKind::DataLogSample(sample) => {
                    let monitor = match self.monitors.entry(sample.device_id) {
                        Entry::Occupied(entry) => entry.into_mut(),
                        Entry::Vacant(entry) => {
                            let mut monitor = DeviceMonitor::new(sample.device_id)
                                .with_weights(self.config.weights);
                            if let Some(alert) = self.config.alerts.get(&sample.device_id) {
                                monitor = monitor.with_alert(alert.clone());
                            }
                            entry.insert(monitor)
                        }
                    };
                    report.alert = monitor.process(sample, alerts)?;
                    self.uploader.enqueue(response.raw.clone());
                }
                ResponseKind::QueuedStatus {
                    status: QUEUE_EMPTY_STATUS,
                    ..
                } => {
                    self.session.reset_poll_counter(0);
                    report.end_of_queue = true;
                }
                _ => {}
            }

            report.response = Some(response);
        }

        report.upload = self.uploader.upload_or_heartbeat(cloud, epoch::unix_now());
        Ok(report)
    }

    /// Drive poll cycles at the configured period
    ///
    /// With `stop_at_queue_end` the loop returns after the first
    /// end-of-queue status; otherwise it polls forever.
    pub fn run(
        &mut self,
        serial: &mut dyn SerialLink,
        cloud: &mut dyn CloudLink,
        alerts: &mut dyn AlertSink,
        stop_at_queue_end: bool,
    ) -> Result<()> {
        loop {
            let start = Instant::now();
            let report = self.poll_cycle(serial, cloud, alerts)?;

            if report.end_of_queue && stop_at_queue_end {
                log::info!("End of queue seen, stopping");
                return Ok(());
            }

            let elapsed = start.elapsed();
            if elapsed < self.config.poll_cycle {
                thread::sleep(self.config.poll_cycle - elapsed);
            }
        }
    }
}
