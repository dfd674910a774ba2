//! Asynchronous readback worker
//!
//! Simulates GPU readback latency. Producers hand a future and its payload
//! to background threads, which wait out the latency and resolve the future
//! off the simulation thread.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use async_channel::{bounded, Receiver, Sender};
use contracts::{ContractError, Payload, ReportMode};
use controller::AsyncFuture;
use tracing::{debug, instrument, trace, warn};

/// One outstanding readback
#[derive(Debug)]
pub struct ReadbackJob {
    pub future: AsyncFuture,
    pub payload: Payload,
    /// Simulated readback time
    pub latency: Duration,
}

impl ReadbackJob {
    pub fn new(future: AsyncFuture, payload: impl Into<Payload>, latency: Duration) -> Self {
        Self {
            future,
            payload: payload.into(),
            latency,
        }
    }
}

/// Latency of a `Readback` mode; `None` for `Immediate`
pub fn latency(mode: ReportMode) -> Option<Duration> {
    match mode {
        ReportMode::Immediate => None,
        ReportMode::Readback { latency_ms } => Some(Duration::from_millis(latency_ms)),
    }
}

/// Readback counters
#[derive(Debug, Default)]
pub struct ReadbackMetrics {
    submitted: AtomicU64,
    completed: AtomicU64,
    /// Future was invalidated or already reported
    failed: AtomicU64,
    in_flight: AtomicUsize,
}

/// Point-in-time copy of [`ReadbackMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadbackSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub in_flight: usize,
}

impl ReadbackMetrics {
    pub fn snapshot(&self) -> ReadbackSnapshot {
        ReadbackSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Acquire),
        }
    }
}

/// Pool of readback threads
///
/// The queue is bounded; `submit` blocks the caller while it is full, which
/// stands in for readback backpressure.
pub struct ReadbackWorker {
    tx: Sender<ReadbackJob>,
    metrics: Arc<ReadbackMetrics>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl ReadbackWorker {
    /// Start `threads` readback threads
    #[instrument(name = "readback_worker_spawn")]
    pub fn spawn(threads: usize, queue_capacity: usize) -> Self {
        let (tx, rx) = bounded(queue_capacity.max(1));
        let metrics = Arc::new(ReadbackMetrics::default());

        let handles = (0..threads.max(1))
            .map(|index| {
                let rx = rx.clone();
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || readback_loop(index, rx, metrics))
            })
            .collect();

        debug!(threads, queue_capacity, "Readback worker started");
        Self {
            tx,
            metrics,
            threads: Mutex::new(handles),
        }
    }

    /// Queue one readback
    pub fn submit(&self, job: ReadbackJob) -> Result<(), ContractError> {
        self.metrics.in_flight.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = self.tx.send_blocking(job) {
            self.metrics.in_flight.fetch_sub(1, Ordering::AcqRel);
            return Err(ContractError::Other(format!(
                "readback worker is shut down, job for capture {} dropped",
                e.into_inner().future.capture_id()
            )));
        }
        self.metrics.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Readbacks submitted but not yet reported
    pub fn in_flight(&self) -> usize {
        self.metrics.in_flight.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> ReadbackSnapshot {
        self.metrics.snapshot()
    }

    /// Wait until every submitted readback has reported; `false` on timeout
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.in_flight() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// Close the queue and join the threads; queued jobs still run
    #[instrument(name = "readback_worker_shutdown", skip(self))]
    pub fn shutdown(&self) {
        self.tx.close();
        let handles = std::mem::take(
            &mut *self
                .threads
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            if handle.join().is_err() {
                warn!("Readback thread panicked");
            }
        }
        debug!(metrics = ?self.metrics.snapshot(), "Readback worker stopped");
    }
}

impl Drop for ReadbackWorker {
    fn drop(&mut self) {
        self.tx.close();
    }
}

fn readback_loop(index: usize, rx: Receiver<ReadbackJob>, metrics: Arc<ReadbackMetrics>) {
    trace!(thread = index, "Readback thread started");
    while let Ok(job) = rx.recv_blocking() {
        if !job.latency.is_zero() {
            std::thread::sleep(job.latency);
        }

        let capture_id = job.future.capture_id();
        let slot = job.future.slot();
        match job.future.report(job.payload) {
            Ok(()) => {
                metrics.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                metrics.failed.fetch_add(1, Ordering::Relaxed);
                warn!(capture_id = %capture_id, slot = %slot, error = %e, "Readback report failed");
            }
        }
        metrics.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
    trace!(thread = index, "Readback thread stopped");
}
