//! Offline trace access: opens a pcap capture file and yields its records
//! in stored order.

use pcap::{Capture, Offline};
use std::fmt;
use std::path::Path;

/// Errors from opening or reading a trace file.
#[derive(Debug)]
pub enum TraceError {
    /// pcap could not open or read the file.
    Pcap(pcap::Error),
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceError::Pcap(e) => write!(f, "trace error: {}", e),
        }
    }
}

impl std::error::Error for TraceError {}

impl From<pcap::Error> for TraceError {
    fn from(e: pcap::Error) -> Self {
        TraceError::Pcap(e)
    }
}

/// One capture record: arrival time, original wire length, captured bytes.
#[derive(Debug)]
pub struct TraceRecord<'a> {
    /// Seconds since the epoch, with microsecond fraction.
    pub timestamp: f64,
    /// Length on the wire (may exceed `data.len()` under snaplen).
    pub wire_len: u32,
    pub data: &'a [u8],
}

/// A pcap capture file being read front to back.
pub struct Trace {
    cap: Capture<Offline>,
}

impl Trace {
    /// Open a capture file for reading.
    pub fn open(path: &Path) -> Result<Self, TraceError> {
        let cap = Capture::from_file(path)?;
        tracing::info!(path = %path.display(), "trace opened");
        Ok(Trace { cap })
    }

    /// The next record, or `None` at end of file.
    ///
    /// The returned record borrows the capture's internal buffer and must
    /// be consumed before the next call.
    pub fn next_record(&mut self) -> Result<Option<TraceRecord<'_>>, TraceError> {
        match self.cap.next_packet() {
            Ok(packet) => {
                let header = packet.header;
                let timestamp =
                    header.ts.tv_sec as f64 + header.ts.tv_usec as f64 / 1_000_000.0;
                Ok(Some(TraceRecord {
                    timestamp,
                    wire_len: header.len,
                    data: packet.data,
                }))
            }
            Err(pcap::Error::NoMorePackets) => Ok(None),
            Err(e) => Err(TraceError::Pcap(e)),
        }
    }
}
