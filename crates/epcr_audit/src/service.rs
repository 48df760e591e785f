//! The double-buffered log service.

use crate::entry::{describe_error, LogEntry};
use crate::error::{AuditError, AuditResult};
use crate::sink::LogSink;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Configuration for the log service.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Upper bound on how long an accepted entry waits before it is drained.
    pub flush_period: Duration,
    /// Buffer length that wakes the flusher before the period elapses.
    pub flush_threshold: usize,
}

impl LogConfig {
    /// Creates a configuration with the given flush period.
    pub fn new(flush_period: Duration) -> Self {
        Self {
            flush_period,
            flush_threshold: 1024,
        }
    }

    /// Sets the flush period.
    pub fn with_flush_period(mut self, period: Duration) -> Self {
        self.flush_period = period;
        self
    }

    /// Sets the early-wake threshold. Values below 1 are treated as 1.
    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold.max(1);
        self
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// The producer-side buffer. Only the swap happens under its lock.
#[derive(Default)]
struct ActiveBuffer {
    entries: Vec<LogEntry>,
    next_seq: u64,
}

#[derive(Default)]
struct Control {
    running: bool,
    shutdown: bool,
    /// Drain passes requested (explicit flushes and threshold wakes).
    requested: u64,
    /// Highest request number known to be drained.
    completed: u64,
    /// Request number of the most recent pass whose sink write failed, and
    /// the error. Cleared by the next successful write.
    failure: Option<(u64, String)>,
}

struct Shared {
    active: Mutex<ActiveBuffer>,
    control: Mutex<Control>,
    wake: Condvar,
    drained: Condvar,
    threshold: usize,
}

/// A cloneable producer handle for the audit log.
///
/// `append` never touches the sink; it returns as soon as the entry is in
/// the active buffer.
#[derive(Clone)]
pub struct AuditLog {
    shared: Arc<Shared>,
}

impl AuditLog {
    /// Accepts an entry and returns its sequence number.
    pub fn append(&self, mut entry: LogEntry) -> u64 {
        let (seq, buffered) = {
            let mut active = self.shared.active.lock();
            entry.seq = active.next_seq;
            active.next_seq += 1;
            active.entries.push(entry);
            (active.next_seq - 1, active.entries.len())
        };

        if buffered >= self.shared.threshold {
            let mut ctl = self.shared.control.lock();
            ctl.requested += 1;
            self.shared.wake.notify_one();
        }
        seq
    }

    /// Records an informational entry.
    pub fn record(&self, source: &str, message: impl Into<String>) -> u64 {
        self.append(LogEntry::new(source, message))
    }

    /// Records a failure together with the full cause chain of `err`.
    pub fn record_error(
        &self,
        source: &str,
        message: impl Into<String>,
        err: &(dyn std::error::Error + 'static),
    ) -> u64 {
        self.append(LogEntry::new(source, message).with_error(describe_error(err)))
    }

    /// Returns the number of entries waiting in the active buffer.
    pub fn pending(&self) -> usize {
        self.shared.active.lock().entries.len()
    }

    /// Blocks until every entry appended before this call is durable.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::NotRunning`] if no flusher is running, and
    /// [`AuditError::SinkFailed`] if the sink rejected the entries. Rejected
    /// entries stay queued and are written ahead of newer ones on the next
    /// pass.
    pub fn flush(&self) -> AuditResult<()> {
        let mut ctl = self.shared.control.lock();
        if !ctl.running {
            return Err(AuditError::NotRunning);
        }
        ctl.requested += 1;
        let target = ctl.requested;
        self.shared.wake.notify_one();

        while ctl.completed < target {
            if !ctl.running {
                return Err(AuditError::NotRunning);
            }
            self.shared.drained.wait(&mut ctl);
        }
        match &ctl.failure {
            Some((through, reason)) if *through >= target => {
                Err(AuditError::SinkFailed(reason.clone()))
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Owns the flusher thread and the sink.
///
/// The service has an explicit lifecycle: [`LogService::start`] spawns the
/// flusher, [`LogService::stop`] asks it to drain whatever is buffered and
/// joins it. Entries appended before `start` are kept and drained on the
/// first pass.
pub struct LogService {
    shared: Arc<Shared>,
    sink: Option<Box<dyn LogSink>>,
    flusher: Option<JoinHandle<()>>,
    period: Duration,
}

impl LogService {
    /// Creates a stopped service writing to `sink`.
    pub fn new(sink: Box<dyn LogSink>, config: LogConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                active: Mutex::new(ActiveBuffer::default()),
                control: Mutex::new(Control::default()),
                wake: Condvar::new(),
                drained: Condvar::new(),
                threshold: config.flush_threshold.max(1),
            }),
            sink: Some(sink),
            flusher: None,
            period: config.flush_period,
        }
    }

    /// Returns a producer handle.
    pub fn handle(&self) -> AuditLog {
        AuditLog {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Returns true while the flusher thread runs.
    pub fn is_running(&self) -> bool {
        self.flusher.is_some()
    }

    /// Spawns the flusher thread.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::AlreadyStarted`] if the service was started
    /// before, or an I/O error if the thread cannot be spawned.
    pub fn start(&mut self) -> AuditResult<()> {
        let sink = self.sink.take().ok_or(AuditError::AlreadyStarted)?;
        self.shared.control.lock().running = true;

        let shared = Arc::clone(&self.shared);
        let period = self.period;
        let spawned = thread::Builder::new()
            .name("epcr-audit-flusher".into())
            .spawn(move || run_flusher(&shared, sink, period));

        match spawned {
            Ok(handle) => {
                self.flusher = Some(handle);
                tracing::debug!(?period, "audit flusher started");
                Ok(())
            }
            Err(err) => {
                self.shared.control.lock().running = false;
                Err(AuditError::Io(err))
            }
        }
    }

    /// Drains everything buffered and joins the flusher.
    ///
    /// Calling `stop` on a service that is not running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::FlusherPanicked`] if the flusher thread panicked.
    pub fn stop(&mut self) -> AuditResult<()> {
        let Some(handle) = self.flusher.take() else {
            return Ok(());
        };

        {
            let mut ctl = self.shared.control.lock();
            ctl.shutdown = true;
            self.shared.wake.notify_one();
        }
        let joined = handle.join();

        {
            let mut ctl = self.shared.control.lock();
            ctl.running = false;
            self.shared.drained.notify_all();
        }
        tracing::debug!("audit flusher stopped");
        joined.map_err(|_| AuditError::FlusherPanicked)
    }
}

impl Drop for LogService {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::error!(error = %err, "audit log teardown failed");
        }
    }
}

fn run_flusher(shared: &Shared, mut sink: Box<dyn LogSink>, period: Duration) {
    let mut spare: Vec<LogEntry> = Vec::new();
    let mut held: Vec<LogEntry> = Vec::new();
    loop {
        let (target, shutdown) = {
            let mut ctl = shared.control.lock();
            if !ctl.shutdown && ctl.requested == ctl.completed {
                shared.wake.wait_for(&mut ctl, period);
            }
            (ctl.requested, ctl.shutdown)
        };

        let written = drain_generation(shared, &mut held, &mut spare, sink.as_mut());

        {
            let mut ctl = shared.control.lock();
            ctl.completed = ctl.completed.max(target);
            match written {
                Ok(()) => ctl.failure = None,
                Err(err) => {
                    tracing::error!(error = %err, held = held.len(), "audit sink write failed");
                    ctl.failure = Some((target, err.to_string()));
                }
            }
            shared.drained.notify_all();
        }

        if shutdown {
            if !held.is_empty() {
                tracing::error!(lost = held.len(), "audit entries dropped at shutdown");
            }
            break;
        }
    }
}

/// Swaps the active buffer with `spare` and writes the swapped-out
/// generation behind any entries still `held` from a failed write.
///
/// On error every entry stays in `held`, in sequence order.
fn drain_generation(
    shared: &Shared,
    held: &mut Vec<LogEntry>,
    spare: &mut Vec<LogEntry>,
    sink: &mut dyn LogSink,
) -> std::io::Result<()> {
    {
        let mut active = shared.active.lock();
        if !active.entries.is_empty() {
            std::mem::swap(&mut active.entries, spare);
        }
    }
    held.append(spare);
    if held.is_empty() {
        return Ok(());
    }

    sink.write_batch(held)?;
    held.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{FileSink, MemorySink};
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;
    use tempfile::TempDir;

    /// Rejects its first `failures` batches, then forwards to a memory sink.
    struct FlakySink {
        failures: Arc<AtomicUsize>,
        inner: MemorySink,
    }

    impl LogSink for FlakySink {
        fn write_batch(&mut self, entries: &[LogEntry]) -> io::Result<()> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.inner.write_batch(entries)
        }
    }

    fn idle_config() -> LogConfig {
        LogConfig::new(Duration::from_secs(60)).with_flush_threshold(usize::MAX)
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn append_does_not_write() {
        let sink = MemorySink::new();
        let mut service = LogService::new(Box::new(sink.clone()), idle_config());
        service.start().unwrap();
        let log = service.handle();

        log.record("test", "buffered");
        assert_eq!(log.pending(), 1);
        assert!(sink.entries().is_empty());

        log.flush().unwrap();
        assert_eq!(sink.entries().len(), 1);
        assert_eq!(log.pending(), 0);
    }

    #[test]
    fn stop_drains_buffered_entries() {
        let sink = MemorySink::new();
        let mut service = LogService::new(Box::new(sink.clone()), idle_config());
        let log = service.handle();
        service.start().unwrap();

        for i in 0..10 {
            log.record("test", format!("entry {i}"));
        }
        service.stop().unwrap();

        let entries = sink.entries();
        assert_eq!(entries.len(), 10);
        assert_eq!(entries[9].message, "entry 9");
        assert!(!service.is_running());
    }

    #[test]
    fn entries_before_start_are_kept() {
        let sink = MemorySink::new();
        let mut service = LogService::new(Box::new(sink.clone()), idle_config());
        let log = service.handle();
        log.record("early", "before start");

        service.start().unwrap();
        log.flush().unwrap();
        assert_eq!(sink.entries()[0].source, "early");
    }

    #[test]
    fn threshold_wakes_flusher() {
        let sink = MemorySink::new();
        let config = LogConfig::new(Duration::from_secs(60)).with_flush_threshold(5);
        let mut service = LogService::new(Box::new(sink.clone()), config);
        service.start().unwrap();
        let log = service.handle();

        for _ in 0..5 {
            log.record("test", "x");
        }
        assert!(wait_for(|| sink.entries().len() == 5));
    }

    #[test]
    fn period_wakes_flusher() {
        let sink = MemorySink::new();
        let config = LogConfig::new(Duration::from_millis(10)).with_flush_threshold(usize::MAX);
        let mut service = LogService::new(Box::new(sink.clone()), config);
        service.start().unwrap();

        service.handle().record("test", "eventually");
        assert!(wait_for(|| sink.entries().len() == 1));
    }

    #[test]
    fn lifecycle_errors() {
        let mut service = LogService::new(Box::new(MemorySink::new()), idle_config());
        assert!(matches!(
            service.handle().flush(),
            Err(AuditError::NotRunning)
        ));
        service.start().unwrap();
        assert!(matches!(service.start(), Err(AuditError::AlreadyStarted)));
        service.stop().unwrap();
        service.stop().unwrap();
    }

    #[test]
    fn record_error_keeps_cause() {
        let sink = MemorySink::new();
        let mut service = LogService::new(Box::new(sink.clone()), idle_config());
        service.start().unwrap();
        let err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        service.handle().record_error("connection", "attempt 1 failed", &err);
        service.stop().unwrap();

        let entries = sink.entries();
        assert_eq!(entries[0].error.as_deref(), Some("refused"));
    }

    #[test]
    fn rejected_generation_is_reported_and_retried() {
        let sink = MemorySink::new();
        let flaky = FlakySink {
            failures: Arc::new(AtomicUsize::new(1)),
            inner: sink.clone(),
        };
        let mut service = LogService::new(Box::new(flaky), idle_config());
        service.start().unwrap();
        let log = service.handle();

        log.record("transfer", "accepted entry");
        let err = log.flush().unwrap_err();
        assert!(matches!(err, AuditError::SinkFailed(ref reason) if reason.contains("disk full")));
        assert!(sink.entries().is_empty());

        log.record("transfer", "second");
        service.stop().unwrap();

        let messages: Vec<_> = sink.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["accepted entry", "second"]);
    }

    #[test]
    fn flush_after_recovery_succeeds() {
        let sink = MemorySink::new();
        let flaky = FlakySink {
            failures: Arc::new(AtomicUsize::new(1)),
            inner: sink.clone(),
        };
        let mut service = LogService::new(Box::new(flaky), idle_config());
        service.start().unwrap();
        let log = service.handle();

        log.record("a", "first");
        assert!(log.flush().is_err());
        log.flush().unwrap();

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].seq, 0);
        assert_eq!(sink.batch_count(), 1);
    }

    #[test]
    fn file_sink_receives_all_generations() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");
        let sink = FileSink::open(&path).unwrap();
        let mut service = LogService::new(Box::new(sink), idle_config());
        service.start().unwrap();
        let log = service.handle();

        log.record("a", "first");
        log.flush().unwrap();
        log.record("b", "second");
        service.stop().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let seqs: Vec<u64> = content
            .lines()
            .map(|l| serde_json::from_str::<LogEntry>(l).unwrap().seq)
            .collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    fn concurrent_appends(threads: usize, per_thread: usize, threshold: usize) {
        let sink = MemorySink::new();
        let config = LogConfig::new(Duration::from_millis(1)).with_flush_threshold(threshold);
        let mut service = LogService::new(Box::new(sink.clone()), config);
        service.start().unwrap();

        let workers: Vec<_> = (0..threads)
            .map(|t| {
                let log = service.handle();
                thread::spawn(move || {
                    for i in 0..per_thread {
                        log.record(&format!("t{t}"), format!("{i}"));
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        service.stop().unwrap();

        let entries = sink.entries();
        assert_eq!(entries.len(), threads * per_thread);

        // Sink order is the linearized arrival order.
        for pair in entries.windows(2) {
            assert!(pair[0].seq < pair[1].seq);
        }

        // Each producer's entries appear once, in its own order.
        let unique: HashSet<_> = entries
            .iter()
            .map(|e| (e.source.clone(), e.message.clone()))
            .collect();
        assert_eq!(unique.len(), entries.len());
        for t in 0..threads {
            let source = format!("t{t}");
            let mine: Vec<usize> = entries
                .iter()
                .filter(|e| e.source == source)
                .map(|e| e.message.parse().unwrap())
                .collect();
            assert_eq!(mine, (0..per_thread).collect::<Vec<_>>());
        }
    }

    #[test]
    fn concurrent_appends_are_written_exactly_once() {
        concurrent_appends(8, 500, 64);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn any_interleaving_is_complete(
            threads in 1usize..6,
            per_thread in 0usize..200,
            threshold in 1usize..50,
        ) {
            concurrent_appends(threads, per_thread, threshold);
        }
    }
}
