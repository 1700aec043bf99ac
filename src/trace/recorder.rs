use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use log::info;

use super::{MergeSummary, SinkKind, TraceEntry, TraceLog, TraceSink};
use crate::error::RecorderError;
use crate::shutdown::ShutdownState;

/// The recording library the rewritten call sites report to.
pub trait Recorder: Send + Sync {
    fn configure_counting(&self, enabled: bool);

    /// Streams every subsequent entry to `sink`, which must be an open socket.
    fn bind_socket(&self, sink: Arc<TraceSink>) -> Result<(), RecorderError>;

    /// Accumulates entries in memory for a later merge into `sink`'s log file.
    fn bind_log_file(&self, sink: Arc<TraceSink>) -> Result<(), RecorderError>;

    fn flush_to_disk(&self, verbose: bool) -> Result<FlushSummary, RecorderError>;

    fn record(&self, entry: TraceEntry);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushSummary {
    File {
        merge: MergeSummary,
        /// Distinct entries recorded during this run.
        run_entries: usize,
    },
    Socket { written: u64, dropped: u64 },
}

pub struct TraceRecorder {
    counting: AtomicBool,
    shutdown: Arc<ShutdownState>,
    sink: OnceLock<Arc<TraceSink>>,
    log: TraceLog,
}

impl TraceRecorder {
    pub fn new(shutdown: Arc<ShutdownState>) -> Self {
        TraceRecorder {
            counting: AtomicBool::new(false),
            shutdown,
            sink: OnceLock::new(),
            log: TraceLog::new(),
        }
    }

    pub fn counting(&self) -> bool {
        self.counting.load(Ordering::Relaxed)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_shutting_down()
    }

    pub fn log(&self) -> &TraceLog {
        &self.log
    }

    fn bind(&self, sink: Arc<TraceSink>, expected: SinkKind) -> Result<(), RecorderError> {
        if sink.kind() != Some(expected) {
            return Err(RecorderError::WrongSink { expected: expected.as_str() });
        }
        self.sink.set(sink).map_err(|_| RecorderError::AlreadyBound)
    }
}

impl Recorder for TraceRecorder {
    fn configure_counting(&self, enabled: bool) {
        self.counting.store(enabled, Ordering::Relaxed);
    }

    fn bind_socket(&self, sink: Arc<TraceSink>) -> Result<(), RecorderError> {
        self.bind(sink, SinkKind::Socket)
    }

    fn bind_log_file(&self, sink: Arc<TraceSink>) -> Result<(), RecorderError> {
        self.bind(sink, SinkKind::File)
    }

    fn flush_to_disk(&self, verbose: bool) -> Result<FlushSummary, RecorderError> {
        let sink = self.sink.get().ok_or(RecorderError::Unbound)?;
        match sink.kind() {
            Some(SinkKind::File) => {
                let run = self.log.snapshot();
                if verbose {
                    for (entry, count) in &run {
                        info!("{}", entry.to_line(self.counting().then_some(*count)));
                    }
                }
                let merge = sink.merge_counts(&run, self.counting())?;
                info!(
                    "trace log {}: {} entries ({} new, {} updated)",
                    merge.path.display(),
                    merge.lines,
                    merge.added,
                    merge.updated
                );
                Ok(FlushSummary::File { merge, run_entries: run.len() })
            }
            _ => {
                let (written, dropped) = (sink.written(), sink.dropped());
                info!("streamed {written} trace entries, dropped {dropped}");
                Ok(FlushSummary::Socket { written, dropped })
            }
        }
    }

    fn record(&self, entry: TraceEntry) {
        if self.shutdown.is_shutting_down() {
            return;
        }
        match self.sink.get() {
            Some(sink) if sink.kind() == Some(SinkKind::Socket) => {
                sink.send_line(entry.to_line(None));
            }
            _ => self.log.record(entry),
        }
    }
}

impl FlushSummary {
    pub fn log_path(&self) -> Option<&Path> {
        match self {
            FlushSummary::File { merge, .. } => Some(merge.path.as_path()),
            FlushSummary::Socket { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TraceKind;

    fn entry(target: &str) -> TraceEntry {
        TraceEntry::new(TraceKind::ClassForName, target, "app.Main.main", Some(5), "")
    }

    #[test]
    fn file_binding_requires_file_sink() {
        let recorder = TraceRecorder::new(ShutdownState::new());
        let unopened = Arc::new(TraceSink::new());
        assert!(matches!(
            recorder.bind_log_file(unopened),
            Err(RecorderError::WrongSink { expected: "file" })
        ));
        assert!(matches!(recorder.flush_to_disk(false), Err(RecorderError::Unbound)));
    }

    #[test]
    fn binds_once() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(TraceSink::new());
        sink.open_offline(dir.path()).unwrap();
        let recorder = TraceRecorder::new(ShutdownState::new());
        recorder.bind_log_file(Arc::clone(&sink)).unwrap();
        assert!(matches!(recorder.bind_log_file(sink), Err(RecorderError::AlreadyBound)));
    }

    #[test]
    fn counts_and_flushes_to_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(TraceSink::new());
        sink.open_offline(dir.path()).unwrap();

        let recorder = TraceRecorder::new(ShutdownState::new());
        recorder.configure_counting(true);
        recorder.bind_log_file(Arc::clone(&sink)).unwrap();
        recorder.record(entry("a.A"));
        recorder.record(entry("a.A"));
        recorder.record(entry("b.B"));

        let summary = recorder.flush_to_disk(true).unwrap();
        assert!(matches!(summary, FlushSummary::File { run_entries: 2, .. }));
        let text = std::fs::read_to_string(summary.log_path().unwrap()).unwrap();
        assert_eq!(
            text,
            "Class.forName;a.A;app.Main.main;5;;2\nClass.forName;b.B;app.Main.main;5;;1\n"
        );
    }

    #[test]
    fn records_are_ignored_after_shutdown_begins() {
        let state = ShutdownState::new();
        let recorder = TraceRecorder::new(Arc::clone(&state));
        recorder.record(entry("a.A"));
        state.begin();
        recorder.record(entry("a.A"));
        assert_eq!(recorder.log().count(&entry("a.A")), 1);
        assert!(recorder.is_shutting_down());
    }
}
