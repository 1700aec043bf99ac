//! The single trace destination of a run.
//!
//! A [`TraceSink`] moves `Unopened -> Open -> Closed` exactly once. Offline
//! it owns `<dir>/refl.log`; online it owns a TCP connection fed by a
//! writer thread through a bounded queue.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use super::{merge_log, TraceEntry};
use crate::config::{Endpoint, LOG_FILE_NAME};
use crate::error::SinkError;

/// Events queued for the socket writer before new ones are dropped.
pub const QUEUE_CAPACITY: usize = 4096;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);
const CLOSE_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    File,
    Socket,
}

impl SinkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SinkKind::File => "file",
            SinkKind::Socket => "socket",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    Unopened,
    Open,
    Closed,
}

/// Outcome of merging one run into the trace log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub path: PathBuf,
    pub lines: usize,
    pub updated: usize,
    pub added: usize,
    pub preserved: usize,
}

enum Backend {
    File {
        path: PathBuf,
        file: File,
    },
    Socket {
        peer: String,
        stream: TcpStream,
        tx: SyncSender<String>,
        done: Mutex<Receiver<()>>,
    },
}

enum SinkState {
    Unopened,
    Open(Backend),
    Closed,
}

pub struct TraceSink {
    state: RwLock<SinkState>,
    kind: OnceLock<SinkKind>,
    written: Arc<AtomicU64>,
    dropped: AtomicU64,
}

impl Default for TraceSink {
    fn default() -> Self {
        TraceSink {
            state: RwLock::new(SinkState::Unopened),
            kind: OnceLock::new(),
            written: Arc::new(AtomicU64::new(0)),
            dropped: AtomicU64::new(0),
        }
    }
}

impl TraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `<dir>/refl.log` for merging. Existing content is kept until
    /// the flush folds the run into it.
    pub fn open_offline(&self, dir: &Path) -> Result<PathBuf, SinkError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        ensure_unopened(&state)?;

        let path = dir.join(LOG_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| SinkError::OpenLog { path: path.clone(), source })?;

        debug!("trace log {} opened", path.display());
        let _ = self.kind.set(SinkKind::File);
        *state = SinkState::Open(Backend::File { path: path.clone(), file });
        Ok(path)
    }

    /// Connects to the collector and starts the writer thread.
    pub fn open_online(&self, endpoint: &Endpoint) -> Result<(), SinkError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        ensure_unopened(&state)?;

        let peer = endpoint.to_string();
        let stream = connect(endpoint)?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        stream.set_nodelay(true)?;

        let (tx, rx) = mpsc::sync_channel::<String>(QUEUE_CAPACITY);
        let (done_tx, done) = mpsc::channel();
        let writer = stream.try_clone()?;
        let written = Arc::clone(&self.written);
        let writer_peer = peer.clone();
        thread::Builder::new()
            .name("playout-trace-writer".into())
            .spawn(move || {
                drain(writer, rx, &written, &writer_peer);
                let _ = done_tx.send(());
            })?;

        info!("streaming trace to {peer}");
        let _ = self.kind.set(SinkKind::Socket);
        *state = SinkState::Open(Backend::Socket { peer, stream, tx, done: Mutex::new(done) });
        Ok(())
    }

    /// Set once the sink has been opened; stays set after close.
    pub fn kind(&self) -> Option<SinkKind> {
        self.kind.get().copied()
    }

    pub fn status(&self) -> SinkStatus {
        match &*self.state.read().unwrap_or_else(|e| e.into_inner()) {
            SinkState::Unopened => SinkStatus::Unopened,
            SinkState::Open(_) => SinkStatus::Open,
            SinkState::Closed => SinkStatus::Closed,
        }
    }

    /// Queues one line for the collector without blocking.
    ///
    /// Returns `false` and counts the line as dropped when the sink is not
    /// an open socket, the queue is full or the writer has stopped.
    pub fn send_line(&self, line: String) -> bool {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let sent = match &*state {
            SinkState::Open(Backend::Socket { tx, .. }) => match tx.try_send(line) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
            },
            _ => false,
        };
        if !sent {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        sent
    }

    /// Folds `run` into the open trace log, summing counts with whatever the
    /// log already holds, and rewrites the file.
    pub fn merge_counts(
        &self,
        run: &[(TraceEntry, u64)],
        counting: bool,
    ) -> Result<MergeSummary, SinkError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let (path, file) = match &mut *state {
            SinkState::Open(Backend::File { path, file }) => (path.clone(), file),
            _ => return Err(SinkError::NoLogFile),
        };

        let mut raw = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut raw)?;
        let existing = String::from_utf8_lossy(&raw);

        let merged = merge_log(&existing, run, counting);

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(merged.to_text().as_bytes())?;
        file.flush()?;
        file.sync_data()?;

        Ok(MergeSummary {
            path,
            lines: merged.lines.len(),
            updated: merged.updated,
            added: merged.added,
            preserved: merged.preserved,
        })
    }

    /// Releases the underlying resource. Returns `false` if the sink was
    /// already closed or never opened. Release errors are logged.
    pub fn close(&self) -> bool {
        let previous = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *state, SinkState::Closed)
        };

        match previous {
            SinkState::Unopened | SinkState::Closed => return false,
            SinkState::Open(Backend::File { path, file }) => {
                if let Err(e) = file.sync_all() {
                    warn!("error closing trace log {}: {e}", path.display());
                }
                debug!("trace log {} closed", path.display());
            }
            SinkState::Open(Backend::Socket { peer, stream, tx, done }) => {
                drop(tx);
                let waited = done.into_inner().unwrap_or_else(|e| e.into_inner()).recv_timeout(CLOSE_WAIT);
                if let Err(RecvTimeoutError::Timeout) = waited {
                    warn!("trace writer for {peer} did not finish in {CLOSE_WAIT:?}");
                }
                if let Err(e) = stream.shutdown(Shutdown::Both) {
                    warn!("error closing connection to {peer}: {e}");
                }
                debug!("connection to {peer} closed");
            }
        }
        true
    }

    /// Lines handed to the socket.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Lines that never reached the socket.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn ensure_unopened(state: &SinkState) -> Result<(), SinkError> {
    match state {
        SinkState::Unopened => Ok(()),
        SinkState::Open(_) => Err(SinkError::AlreadyOpened("open")),
        SinkState::Closed => Err(SinkError::AlreadyOpened("closed")),
    }
}

fn connect(endpoint: &Endpoint) -> Result<TcpStream, SinkError> {
    let addrs: Vec<_> = (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()
        .map_err(|_| SinkError::Resolve(endpoint.to_string()))?
        .collect();

    let mut last_err = None;
    for addr in &addrs {
        match TcpStream::connect_timeout(addr, CONNECT_TIMEOUT) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("connect to {addr} failed: {e}");
                last_err = Some(e);
            }
        }
    }
    match last_err {
        Some(source) => Err(SinkError::Connect { addr: endpoint.to_string(), source }),
        None => Err(SinkError::Resolve(endpoint.to_string())),
    }
}

fn drain(stream: TcpStream, rx: Receiver<String>, written: &AtomicU64, peer: &str) {
    let mut out = BufWriter::new(stream);
    while let Ok(first) = rx.recv() {
        let mut next = Some(first);
        while let Some(line) = next {
            if let Err(e) = out.write_all(line.as_bytes()).and_then(|()| out.write_all(b"\n")) {
                warn!("trace stream to {peer} failed, dropping further events: {e}");
                return;
            }
            written.fetch_add(1, Ordering::Relaxed);
            next = rx.try_recv().ok();
        }
        if let Err(e) = out.flush() {
            warn!("trace stream to {peer} failed, dropping further events: {e}");
            return;
        }
    }
    if let Err(e) = out.flush() {
        warn!("final flush to {peer} failed: {e}");
    }
}
