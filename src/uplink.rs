// Sensorlink - Serial sensor concentrator to cloud telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Upload batching queue and heartbeat
//!
//! Raw validated frames queue up here and drain into one batched upload
//! over TCP. When the queue stays empty, a periodic empty upload (a
//! heartbeat) keeps the cloud session alive.
//!
//! # Upload wire format
//!
//! ```text
//! [GATEWAY_ID: 4 LE] [SECURITY: 4 x 0] [VERSION: 1 = 2] [SEQ: 1]
//! [POWER: 2 x 0] [MSG_TYPE: 2] [COUNT: 2 LE]
//! ( [TIMESTAMP: 4 LE] [FRAME 1] [FRAME 2] ... when COUNT > 0 )
//! ```
//!
//! The sequence number wraps within 0-127 and increments on every
//! build. The timestamp is in protocol-epoch seconds.

use crate::epoch;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

/// Upload format version byte
pub const UPLOAD_VERSION: u8 = 2;

/// Message type: put data
pub const MSG_TYPE_PUT_DATA: [u8; 2] = [0x00, 0x00];

/// Message type: get id list
pub const MSG_TYPE_GET_ID_LIST: [u8; 2] = [0x02, 0x00];

/// Largest sequence number before wrapping to zero
pub const SEQ_NO_MAX: u8 = 0x7F;

/// Default queue capacity
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default heartbeat interval in seconds
pub const DEFAULT_HEARTBEAT_SECS: u64 = 890;

// OEM pass-code and battery/solar power fields, unused here
const RESERVED_SECURITY: [u8; 4] = [0; 4];
const RESERVED_POWER: [u8; 2] = [0; 2];

/// The cloud endpoint collaborator
///
/// One upload is connect, send, receive, close. Implementations own
/// their connection state.
pub trait CloudLink {
    /// Open the connection
    fn connect(&mut self) -> io::Result<()>;
    /// Send one complete upload
    fn send(&mut self, data: &[u8]) -> io::Result<()>;
    /// Await the endpoint's response
    fn receive(&mut self) -> io::Result<Vec<u8>>;
    /// Close the connection
    fn close(&mut self);
}

/// Plain TCP implementation of [`CloudLink`]
pub struct TcpCloudLink {
    host: String,
    port: u16,
    read_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpCloudLink {
    /// Create a link to `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            read_timeout: Duration::from_secs(10),
            stream: None,
        }
    }

    /// Use a custom response read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "not connected"))
    }
}

impl CloudLink for TcpCloudLink {
    fn connect(&mut self) -> io::Result<()> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))?;
        stream.set_read_timeout(Some(self.read_timeout))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream()?.write_all(data)
    }

    fn receive(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; 4096];
        let n = self.stream()?.read(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    fn close(&mut self) {
        self.stream = None;
    }
}

/// In-memory endpoint for tests
#[derive(Debug)]
pub struct MemoryCloudLink {
    /// Whether `connect` succeeds
    pub accept: bool,
    /// Every upload received
    pub uploads: Vec<Vec<u8>>,
    /// Response returned to `receive`
    pub response: Vec<u8>,
    connected: bool,
}

impl MemoryCloudLink {
    /// Create an accepting endpoint
    pub fn new() -> Self {
        Self {
            accept: true,
            uploads: Vec::new(),
            response: vec![0x00],
            connected: false,
        }
    }

    /// Create an endpoint that refuses connections
    pub fn refusing() -> Self {
        Self {
            accept: false,
            ..Self::new()
        }
    }
}

impl Default for MemoryCloudLink {
    fn default() -> Self {
        Self::new()
    }
}

impl CloudLink for MemoryCloudLink {
    fn connect(&mut self) -> io::Result<()> {
        if !self.accept {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ));
        }
        self.connected = true;
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        if !self.connected {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "not connected"));
        }
        self.uploads.push(data.to_vec());
        Ok(())
    }

    fn receive(&mut self) -> io::Result<Vec<u8>> {
        if !self.connected {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "not connected"));
        }
        Ok(self.response.clone())
    }

    fn close(&mut self) {
        self.connected = false;
    }
}

/// Outcome of one upload tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Queue empty and heartbeat not yet due
    Idle,
    /// Connect failed; the queue is untouched
    ConnectFailed,
    /// Batch sent; `response` is `None` when the transfer failed after
    /// the drain (the batch is lost, see [`Uploader::upload`])
    Uploaded {
        count: u16,
        response: Option<Vec<u8>>,
    },
}

/// Bounded FIFO of raw frames with batched drain
pub struct Uploader {
    gateway_id: u32,
    capacity: usize,
    heartbeat_secs: u64,
    seq_no: u8,
    queue: VecDeque<Vec<u8>>,
    oldest_unix: u64,
    last_upload_unix: u64,
    last_elapsed: Option<Duration>,
}

impl Uploader {
    /// Create an uploader for the given gateway id
    pub fn new(gateway_id: u32) -> Self {
        Self {
            gateway_id,
            capacity: DEFAULT_CAPACITY,
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
            seq_no: 0,
            queue: VecDeque::new(),
            oldest_unix: 0,
            last_upload_unix: 0,
            last_elapsed: None,
        }
    }

    /// Use a custom queue capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Use a custom heartbeat interval
    pub fn with_heartbeat_secs(mut self, secs: u64) -> Self {
        self.heartbeat_secs = secs;
        self
    }

    /// Number of queued frames
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Current sequence number (used by the next build)
    pub fn sequence(&self) -> u8 {
        self.seq_no
    }

    /// Force the sequence number; out-of-range values reset to zero
    pub fn set_sequence(&mut self, value: u8) {
        self.seq_no = if value > SEQ_NO_MAX { 0 } else { value };
    }

    /// Enqueue wall-time of the oldest unflushed frame, 0 when empty
    pub fn oldest_time(&self) -> u64 {
        self.oldest_unix
    }

    /// Seconds the oldest unflushed frame has waited, 0 when empty
    pub fn queue_age(&self, now: u64) -> u64 {
        if self.oldest_unix == 0 {
            0
        } else {
            now.saturating_sub(self.oldest_unix)
        }
    }

    /// Elapsed time of the last upload exchange
    pub fn last_elapsed(&self) -> Option<Duration> {
        self.last_elapsed
    }

    /// Queue one raw validated frame
    ///
    /// At capacity the oldest frame is evicted and the discard logged.
    pub fn enqueue(&mut self, raw_frame: Vec<u8>) {
        if self.queue.len() >= self.capacity {
            self.queue.pop_front();
            log::error!("Upload queue full - discarded 1 old message");
        }
        if self.oldest_unix == 0 {
            self.oldest_unix = epoch::unix_now();
        }
        self.queue.push_back(raw_frame);
        log::debug!("Upload queue - added 1 message, size = {}", self.queue.len());
    }

    /// Drain the whole queue into one upload byte sequence
    ///
    /// `force_time` substitutes the batch timestamp (protocol-epoch
    /// seconds) for reproducible tests. The sequence number increments
    /// per call; the queue and oldest-time reset to empty.
    pub fn build_upload(&mut self, force_time: Option<u32>) -> Vec<u8> {
        let mut out = self.build_header();

        let count = self.queue.len() as u16;
        out.extend_from_slice(&count.to_le_bytes());
        log::debug!("Upload - count = {}", count);

        if count > 0 {
            let time = force_time.unwrap_or_else(epoch::protocol_now);
            out.extend_from_slice(&time.to_le_bytes());
            for frame in self.queue.drain(..) {
                out.extend_from_slice(&frame);
            }
        }

        self.oldest_unix = 0;
        out
    }

    fn build_header(&mut self) -> Vec<u8> {
        let mut out = Vec::with_capacity(14);
        out.extend_from_slice(&self.gateway_id.to_le_bytes());
        out.extend_from_slice(&RESERVED_SECURITY);
        out.push(UPLOAD_VERSION);
        out.push(self.seq_no);
        self.seq_no = if self.seq_no >= SEQ_NO_MAX {
            0
        } else {
            self.seq_no + 1
        };
        out.extend_from_slice(&RESERVED_POWER);
        out.extend_from_slice(&MSG_TYPE_PUT_DATA);
        out
    }

    /// Upload when data is queued, else heartbeat when one is due
    pub fn upload_or_heartbeat(&mut self, link: &mut dyn CloudLink, now: u64) -> UploadOutcome {
        if !self.queue.is_empty() {
            return self.upload(link);
        }
        if now.saturating_sub(self.last_upload_unix) > self.heartbeat_secs {
            // Nothing queued, but refresh the cloud session health.
            return self.upload(link);
        }
        UploadOutcome::Idle
    }

    /// Perform one upload
    ///
    /// The connection is confirmed *before* the queue is drained, so a
    /// connect failure leaves all data queued. A send or receive
    /// failure after the drain is not rolled back: delivery is
    /// at-most-once and the batch is lost.
    pub fn upload(&mut self, link: &mut dyn CloudLink) -> UploadOutcome {
        log::info!("Upload - begin, count = {}", self.queue.len());

        if let Err(err) = link.connect() {
            log::warn!("Upload - failed to connect: {}", err);
            return UploadOutcome::ConnectFailed;
        }

        let count = self.queue.len() as u16;
        let data = self.build_upload(None);
        self.last_upload_unix = epoch::unix_now();

        let start = Instant::now();
        let response = match link.send(&data).and_then(|_| link.receive()) {
            Ok(response) => Some(response),
            Err(err) => {
                log::warn!("Upload - transfer failed after drain: {}", err);
                None
            }
        };
        link.close();
        let elapsed = start.elapsed();
        self.last_elapsed = Some(elapsed);

        if response.is_some() {
            log::debug!("Upload - successful, time={:.2} sec", elapsed.as_secs_f64());
        }

        UploadOutcome::Uploaded { count, response }
    }
}
