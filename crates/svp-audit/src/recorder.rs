// recorder.rs — Hands verdicts to the log sink off the audit path.
//
// `record()` only formats the verdict and pushes it onto a bounded channel;
// a dedicated worker thread owns the sink and does the I/O. A sink failure,
// or a full queue behind a stalled sink, is logged and counted, never
// returned: whether a verdict could be persisted does not change the verdict.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use svp_policy::Verdict;

use crate::error::AuditError;
use crate::record::VerdictRecord;
use crate::sink::LogSink;

/// Records that may wait for the sink before new ones are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct Counters {
    recorded: AtomicU64,
    failures: AtomicU64,
}

/// Asynchronous verdict recorder.
///
/// Dropping the recorder (or calling [`shutdown`](Self::shutdown)) drains
/// every queued record into the sink before returning.
pub struct VerdictRecorder {
    sender: Option<SyncSender<VerdictRecord>>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl VerdictRecorder {
    /// Start a worker thread that owns `sink`, queueing up to
    /// [`DEFAULT_QUEUE_CAPACITY`] records.
    pub fn spawn<S>(sink: S) -> Result<Self, AuditError>
    where
        S: LogSink + Send + 'static,
    {
        Self::with_capacity(sink, DEFAULT_QUEUE_CAPACITY)
    }

    /// Start a worker thread that owns `sink`, queueing up to `capacity`
    /// records (at least one).
    pub fn with_capacity<S>(mut sink: S, capacity: usize) -> Result<Self, AuditError>
    where
        S: LogSink + Send + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel::<VerdictRecord>(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let worker_counters = Arc::clone(&counters);

        let worker = thread::Builder::new()
            .name("svp-verdict-recorder".to_string())
            .spawn(move || {
                for mut record in receiver {
                    match sink.append(&mut record) {
                        Ok(()) => {
                            worker_counters.recorded.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            worker_counters.failures.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(
                                trace_id = %record.trace_id,
                                error = %e,
                                "failed to persist verdict record"
                            );
                        }
                    }
                }
            })?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            counters,
        })
    }

    /// Queue a verdict for persistence. Never blocks and never fails; a
    /// verdict that finds the queue full is dropped and counted.
    pub fn record(&self, verdict: &Verdict) {
        let record = VerdictRecord::from(verdict);
        let sent = match &self.sender {
            Some(sender) => sender.try_send(record).map_err(|e| match e {
                TrySendError::Full(_) => AuditError::QueueFull,
                TrySendError::Disconnected(_) => AuditError::RecorderClosed,
            }),
            None => Err(AuditError::RecorderClosed),
        };
        if let Err(e) = sent {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(trace_id = %verdict.trace_id, error = %e, "verdict not recorded");
        }
    }

    /// Records the sink accepted so far.
    pub fn recorded(&self) -> u64 {
        self.counters.recorded.load(Ordering::Relaxed)
    }

    /// Records that could not be persisted so far.
    pub fn failures(&self) -> u64 {
        self.counters.failures.load(Ordering::Relaxed)
    }

    /// Drain the queue, stop the worker, and return `(recorded, failures)`.
    pub fn shutdown(mut self) -> (u64, u64) {
        self.close();
        (self.recorded(), self.failures())
    }

    fn close(&mut self) {
        // Dropping the sender ends the worker's receive loop.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("verdict recorder worker panicked");
            }
        }
    }
}

impl Drop for VerdictRecorder {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use svp_policy::{AuditEngine, AuditRequest, GateSettings, HashingEmbedder, InvariantCatalog};

    struct FailingSink;

    impl LogSink for FailingSink {
        fn append(&mut self, _record: &mut VerdictRecord) -> Result<(), AuditError> {
            Err(AuditError::WriteFailed(std::io::Error::other("disk full")))
        }
    }

    fn verdict(amount: f64) -> Verdict {
        AuditEngine::new(
            InvariantCatalog::builtin().unwrap(),
            Arc::new(HashingEmbedder::default()),
            GateSettings::default(),
        )
        .audit(&AuditRequest::new("Pay vendor invoice", "FINANCE").with_amount(amount))
        .unwrap()
    }

    #[test]
    fn records_reach_sink_in_order() {
        let sink = MemorySink::new(10).unwrap();
        let recorder = VerdictRecorder::spawn(sink.clone()).unwrap();
        let first = verdict(100.0);
        let second = verdict(9000.0);
        recorder.record(&first);
        recorder.record(&second);

        assert_eq!(recorder.shutdown(), (2, 0));
        let records = sink.snapshot();
        assert_eq!(records[0].trace_id, first.trace_id);
        assert_eq!(records[1].trace_id, second.trace_id);
    }

    #[test]
    fn sink_failures_are_counted_not_raised() {
        let recorder = VerdictRecorder::spawn(FailingSink).unwrap();
        recorder.record(&verdict(100.0));
        recorder.record(&verdict(100.0));
        assert_eq!(recorder.shutdown(), (0, 2));
    }

    /// Holds every append until the test releases it.
    struct StalledSink {
        release: mpsc::Receiver<()>,
    }

    impl LogSink for StalledSink {
        fn append(&mut self, _record: &mut VerdictRecord) -> Result<(), AuditError> {
            let _ = self.release.recv();
            Ok(())
        }
    }

    #[test]
    fn stalled_sink_bounds_the_queue() {
        let (release, stalled) = mpsc::channel();
        let recorder = VerdictRecorder::with_capacity(StalledSink { release: stalled }, 2).unwrap();

        let verdict = verdict(100.0);
        for _ in 0..10 {
            recorder.record(&verdict);
        }
        // At most one record in the sink plus two queued; the rest dropped.
        assert!(recorder.failures() >= 7);

        for _ in 0..10 {
            release.send(()).unwrap();
        }
        let (recorded, failures) = recorder.shutdown();
        assert_eq!(recorded + failures, 10);
        assert!(recorded <= 3);
    }

    #[test]
    fn drop_drains_queue() {
        let sink = MemorySink::new(10).unwrap();
        {
            let recorder = VerdictRecorder::spawn(sink.clone()).unwrap();
            for _ in 0..5 {
                recorder.record(&verdict(1.0));
            }
        }
        assert_eq!(sink.len(), 5);
    }
}
