//! Packet transport to the CH9329.
//!
//! Everything that produces packets talks to a [`PacketSink`].  The session
//! picks one implementation when it starts:
//!
//! - [`serial::TransportDriver`]: a serial port drained by one writer thread.
//! - [`null::NullSink`]: accepts and discards, for test mode or when no
//!   port is configured or the port cannot be opened.
//!
//! Submission never blocks on I/O.  Packets are moved into the sink and
//! written strictly in submission order.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use hidkvm_core::{DevicePacket, PacketSequence};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod null;
pub mod recording;
pub mod serial;

/// Default UART speed of the CH9329.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Serial port path and speed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialEndpoint {
    pub path: String,
    pub baud_rate: u32,
}

impl SerialEndpoint {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
        }
    }
}

impl fmt::Display for SerialEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} baud", self.path, self.baud_rate)
    }
}

/// Error type for transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The serial endpoint could not be opened.
    #[error("cannot open {endpoint}: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: serialport::Error,
    },

    #[error("failed to start writer thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}

/// Counters reported by a sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportStats {
    /// Packets that reached the port.
    pub written: u64,
    /// Packets discarded without a write attempt (closed sink or null sink).
    pub dropped: u64,
    /// Relative moves skipped because the previous one was still in flight.
    pub coalesced: u64,
    /// Write calls that returned an error.
    pub faults: u64,
}

/// Lock-free counters shared between a sink's producers and its writer.
#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    written: AtomicU64,
    dropped: AtomicU64,
    coalesced: AtomicU64,
    faults: AtomicU64,
}

impl StatCounters {
    pub(crate) fn wrote(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dropped(&self, n: u64) {
        self.dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> TransportStats {
        TransportStats {
            written: self.written.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }
}

/// Consumer of device packets.
///
/// Every method returns immediately.  Implementations must be shareable
/// between the dispatch thread and the caller thread.
pub trait PacketSink: Send + Sync {
    /// Queues one packet.
    fn submit(&self, packet: DevicePacket);

    /// Queues a sequence as one unit; nothing is interleaved inside it.
    fn submit_sequence(&self, sequence: PacketSequence);

    /// Queues a relative move unless the previous one is still being
    /// written.  Returns `false` when the move was dropped.
    fn submit_move(&self, packet: DevicePacket) -> bool;

    /// Stops accepting packets, drains what is queued within a bounded time
    /// and releases the device.  Idempotent.
    fn close(&self);

    fn stats(&self) -> TransportStats;

    /// Short label for logs and status output.
    fn describe(&self) -> String;
}
