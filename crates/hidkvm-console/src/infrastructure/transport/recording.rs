//! In-memory sink for tests.
//!
//! Records every submitted packet in order, flattening sequences and dropping
//! their settle steps.  The move gate can be held shut to reproduce a
//! relative move that is still being written.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hidkvm_core::{DevicePacket, PacketSequence};
use parking_lot::Mutex;

use super::{PacketSink, StatCounters, TransportStats};

/// A [`PacketSink`] that keeps what it is given.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    inner: Arc<Recorded>,
}

#[derive(Debug, Default)]
struct Recorded {
    packets: Mutex<Vec<Vec<u8>>>,
    sequences: Mutex<usize>,
    move_in_flight: AtomicBool,
    hold_moves: AtomicBool,
    closed: AtomicBool,
    counters: StatCounters,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bytes of every packet received so far.
    pub fn packets(&self) -> Vec<Vec<u8>> {
        self.inner.packets.lock().clone()
    }

    /// Command bytes of every packet received so far.
    pub fn commands(&self) -> Vec<u8> {
        self.inner.packets.lock().iter().map(|p| p[3]).collect()
    }

    /// Number of sequences submitted.
    pub fn sequence_count(&self) -> usize {
        *self.inner.sequences.lock()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.inner.packets.lock().clear();
    }

    /// While `true`, accepted moves stay "in flight" until [`Self::finish_move`].
    pub fn hold_moves(&self, hold: bool) {
        self.inner.hold_moves.store(hold, Ordering::SeqCst);
        if !hold {
            self.finish_move();
        }
    }

    /// Marks the in-flight move as written.
    pub fn finish_move(&self) {
        self.inner.move_in_flight.store(false, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn record(&self, packet: &DevicePacket) {
        if self.is_closed() {
            self.inner.counters.dropped(1);
            return;
        }
        self.inner.packets.lock().push(packet.as_bytes().to_vec());
        self.inner.counters.wrote();
    }
}

impl PacketSink for RecordingSink {
    fn submit(&self, packet: DevicePacket) {
        self.record(&packet);
    }

    fn submit_sequence(&self, sequence: PacketSequence) {
        *self.inner.sequences.lock() += 1;
        for packet in sequence.packets() {
            self.record(packet);
        }
    }

    fn submit_move(&self, packet: DevicePacket) -> bool {
        if self.inner.move_in_flight.load(Ordering::SeqCst) {
            self.inner.counters.coalesced();
            return false;
        }
        if self.inner.hold_moves.load(Ordering::SeqCst) {
            self.inner.move_in_flight.store(true, Ordering::SeqCst);
        }
        self.record(&packet);
        true
    }

    fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    fn stats(&self) -> TransportStats {
        self.inner.counters.snapshot()
    }

    fn describe(&self) -> String {
        "recording".to_string()
    }
}
