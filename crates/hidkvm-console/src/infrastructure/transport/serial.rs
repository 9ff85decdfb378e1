//! Serial transport: one writer thread per open port.
//!
//! # How submission stays non-blocking (for beginners)
//!
//! A 14-byte keyboard report takes about 15 ms to leave a 9600 baud UART.
//! Writing on the thread that handles input would stall every following
//! event, so producers only push a job into an unbounded `mpsc` channel and
//! return.  A single writer thread owns the port, pops jobs in order and
//! performs the blocking writes.  Because there is exactly one writer, jobs
//! reach the wire in the order they were submitted.
//!
//! Relative mouse moves are the exception to "queue everything": a fast
//! mouse produces far more moves than the UART can carry.  An `AtomicBool`
//! marks a move as in flight from submission until its write call returns;
//! moves submitted in between are dropped and counted as coalesced.  The
//! chip never acknowledges reports, so "write returned" is the best signal
//! available.
//!
//! `close()` waits a bounded time for the queue to drain.  If the writer is
//! still busy when that time is up, an abort flag tells it to discard the
//! rest of the queue at the next job or sequence step and release the port.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hidkvm_core::{DevicePacket, PacketSequence, SequenceStep};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use super::{PacketSink, SerialEndpoint, StatCounters, TransportError, TransportStats};

/// Read/write timeout applied to the serial port.
pub const PORT_TIMEOUT: Duration = Duration::from_millis(100);

/// Upper bound on how long `close()` waits for queued jobs to drain.
pub const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

enum Job {
    Packet(DevicePacket),
    Sequence(PacketSequence),
    Move(DevicePacket),
    Close(Sender<()>),
}

/// A [`PacketSink`] backed by a writer thread.
pub struct TransportDriver {
    label: String,
    jobs: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    move_in_flight: Arc<AtomicBool>,
    abort: Arc<AtomicBool>,
    counters: Arc<StatCounters>,
}

impl TransportDriver {
    /// Opens `endpoint` and starts the writer thread.
    ///
    /// # Errors
    ///
    /// [`TransportError::Connection`] if the port cannot be opened.
    pub fn open(endpoint: &SerialEndpoint) -> Result<Self, TransportError> {
        let port = serialport::new(&endpoint.path, endpoint.baud_rate)
            .timeout(PORT_TIMEOUT)
            .open()
            .map_err(|source| TransportError::Connection {
                endpoint: endpoint.to_string(),
                source,
            })?;

        info!("serial port opened: {endpoint}");
        Self::from_writer(port, endpoint.to_string())
    }

    /// Starts a writer thread over any byte sink.
    ///
    /// # Errors
    ///
    /// [`TransportError::ThreadSpawn`] if the thread cannot be created.
    pub fn from_writer<W>(writer: W, label: impl Into<String>) -> Result<Self, TransportError>
    where
        W: Write + Send + 'static,
    {
        let label = label.into();
        let (tx, rx) = mpsc::channel();
        let move_in_flight = Arc::new(AtomicBool::new(false));
        let abort = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(StatCounters::default());

        let worker = {
            let writer_state = WriterState {
                move_in_flight: Arc::clone(&move_in_flight),
                abort: Arc::clone(&abort),
                counters: Arc::clone(&counters),
            };
            thread::Builder::new()
                .name("hidkvm-serial-writer".to_string())
                .spawn(move || run_writer(writer, rx, writer_state))?
        };

        Ok(Self {
            label,
            jobs: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            move_in_flight,
            abort,
            counters,
        })
    }

    fn enqueue(&self, job: Job, packets: u64) -> bool {
        let guard = self.jobs.lock();
        let sent = match guard.as_ref() {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        };
        if !sent {
            trace!("transport closed; {packets} packet(s) dropped");
            self.counters.dropped(packets);
        }
        sent
    }
}

impl PacketSink for TransportDriver {
    fn submit(&self, packet: DevicePacket) {
        self.enqueue(Job::Packet(packet), 1);
    }

    fn submit_sequence(&self, sequence: PacketSequence) {
        let packets = sequence.packets().count() as u64;
        self.enqueue(Job::Sequence(sequence), packets);
    }

    fn submit_move(&self, packet: DevicePacket) -> bool {
        if self
            .move_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.counters.coalesced();
            return false;
        }
        if self.enqueue(Job::Move(packet), 1) {
            true
        } else {
            self.move_in_flight.store(false, Ordering::Release);
            false
        }
    }

    fn close(&self) {
        let Some(tx) = self.jobs.lock().take() else {
            return;
        };

        let (done_tx, done_rx) = mpsc::channel();
        let queued = tx.send(Job::Close(done_tx)).is_ok();
        drop(tx);

        let worker = self.worker.lock().take();
        if queued && done_rx.recv_timeout(CLOSE_DRAIN_TIMEOUT).is_ok() {
            if let Some(worker) = worker {
                let _ = worker.join();
            }
            debug!("transport {} closed", self.label);
        } else {
            // The writer discards what is left after its current write and
            // drops the port.
            self.abort.store(true, Ordering::Release);
            warn!(
                "transport {} did not drain within {:?}; abandoning queued packets",
                self.label, CLOSE_DRAIN_TIMEOUT
            );
        }
    }

    fn stats(&self) -> TransportStats {
        self.counters.snapshot()
    }

    fn describe(&self) -> String {
        format!("serial {}", self.label)
    }
}

impl Drop for TransportDriver {
    fn drop(&mut self) {
        self.close();
    }
}

struct WriterState {
    move_in_flight: Arc<AtomicBool>,
    abort: Arc<AtomicBool>,
    counters: Arc<StatCounters>,
}

impl WriterState {
    fn aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }
}

fn run_writer<W: Write>(mut port: W, jobs: Receiver<Job>, state: WriterState) {
    let counters = &state.counters;
    while let Ok(job) = jobs.recv() {
        if state.aborted() {
            discard(job, &jobs, &state);
            break;
        }
        match job {
            Job::Packet(packet) => write_packet(&mut port, packet, counters),
            Job::Move(packet) => {
                write_packet(&mut port, packet, counters);
                state.move_in_flight.store(false, Ordering::Release);
            }
            Job::Sequence(sequence) => {
                let mut steps = sequence.into_steps().into_iter();
                while let Some(step) = steps.next() {
                    if state.aborted() {
                        let left = std::iter::once(step)
                            .chain(steps.by_ref())
                            .filter(|step| matches!(step, SequenceStep::Packet(_)))
                            .count();
                        counters.dropped(left as u64);
                        break;
                    }
                    match step {
                        SequenceStep::Packet(packet) => write_packet(&mut port, packet, counters),
                        SequenceStep::Settle(pause) => thread::sleep(pause),
                    }
                }
            }
            Job::Close(done) => {
                let _ = port.flush();
                let _ = done.send(());
                return;
            }
        }
    }
    drop(port);
}

/// Counts `first` and everything still queued as dropped.
fn discard(first: Job, jobs: &Receiver<Job>, state: &WriterState) {
    let mut dropped = 0u64;
    for job in std::iter::once(first).chain(jobs.try_iter()) {
        dropped += match job {
            Job::Packet(_) | Job::Move(_) => 1,
            Job::Sequence(sequence) => sequence.packets().count() as u64,
            Job::Close(_) => 0,
        };
    }
    state.move_in_flight.store(false, Ordering::Release);
    state.counters.dropped(dropped);
    debug!("writer aborted; {dropped} queued packet(s) discarded");
}

fn write_packet<W: Write>(port: &mut W, packet: DevicePacket, counters: &StatCounters) {
    trace!("tx {packet}");
    match port.write_all(packet.as_bytes()).and_then(|()| port.flush()) {
        Ok(()) => counters.wrote(),
        Err(e) => {
            counters.fault();
            warn!("serial write failed ({packet}): {e}");
        }
    }
}
