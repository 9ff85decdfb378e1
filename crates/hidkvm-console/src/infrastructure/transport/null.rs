//! No-op sink for test mode and sessions without a usable serial port.

use hidkvm_core::{DevicePacket, PacketSequence};
use tracing::debug;

use super::{PacketSink, StatCounters, TransportStats};

/// Logs every packet at debug level and discards it.
#[derive(Debug, Default)]
pub struct NullSink {
    counters: StatCounters,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PacketSink for NullSink {
    fn submit(&self, packet: DevicePacket) {
        debug!("null sink: {packet}");
        self.counters.dropped(1);
    }

    fn submit_sequence(&self, sequence: PacketSequence) {
        for packet in sequence.packets() {
            debug!("null sink: {packet}");
        }
        self.counters.dropped(sequence.packets().count() as u64);
    }

    fn submit_move(&self, packet: DevicePacket) -> bool {
        self.submit(packet);
        true
    }

    fn close(&self) {}

    fn stats(&self) -> TransportStats {
        self.counters.snapshot()
    }

    fn describe(&self) -> String {
        "null".to_string()
    }
}
