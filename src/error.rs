//! Error types for attach-time setup and the trace pipeline.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::sys::jvmti::jvmtiError;

/// A host-side operation failed.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("{op} failed: {code}")]
    Jvmti { op: &'static str, code: jvmtiError },
    #[error("path is not valid for the host: {}", .0.display())]
    InvalidPath(PathBuf),
    #[error("{0}")]
    Other(String),
}

impl HostError {
    pub fn jvmti(op: &'static str, code: jvmtiError) -> Self {
        HostError::Jvmti { op, code }
    }
}

/// The support archive could not be made resolvable.
#[derive(Debug, Error)]
pub enum InjectError {
    #[error("support archive location not configured (set PLAYOUT_SUPPORT_JAR)")]
    NotConfigured,
    #[error("support archive {} not found", .0.display())]
    NotFound(PathBuf),
    #[error("support archive {} is unreadable: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("support library for reflection log not found in {} (missing {entry})", .path.display())]
    MissingResource { path: PathBuf, entry: &'static str },
    #[error("cannot append support archive to the bootstrap search path: {0}")]
    Host(#[from] HostError),
}

/// The loaded-class snapshot could not be taken or persisted.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("cannot enumerate loaded classes: {0}")]
    Host(#[from] HostError),
    #[error("cannot persist class archive to {}: {source}", .dir.display())]
    Persist {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Interception could not be installed.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("host does not support retransformation of loaded classes")]
    RetransformUnsupported,
    #[error("dispatch class {0} is not loaded")]
    TargetNotLoaded(&'static str),
    #[error("dispatch class {0} cannot be modified")]
    TargetNotModifiable(&'static str),
    #[error("retransformation of dispatch classes failed: {0}")]
    Retransform(#[source] HostError),
    #[error("cannot enumerate loaded classes: {0}")]
    Host(#[source] HostError),
}

/// Opening or writing a trace sink failed.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("trace sink is already {0}")]
    AlreadyOpened(&'static str),
    #[error("no trace log is open")]
    NoLogFile,
    #[error("cannot open trace log {}: {source}", .path.display())]
    OpenLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot resolve {0}")]
    Resolve(String),
    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The recorder was bound to the wrong kind of sink or could not flush.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("expected a {expected} sink")]
    WrongSink { expected: &'static str },
    #[error("no trace sink bound")]
    Unbound,
    #[error("recorder is already bound to a sink")]
    AlreadyBound,
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// The support runtime could not be linked to the recorder.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("support class {0} not resolvable")]
    ClassNotFound(&'static str),
    #[error("support method {class}.{method} not found")]
    MethodNotFound {
        class: &'static str,
        method: &'static str,
    },
    #[error("RegisterNatives on {class} failed with {code}")]
    RegisterNatives { class: &'static str, code: i32 },
    #[error("no JNI environment on the attaching thread")]
    NoJniEnv,
}

/// The shutdown flush could not complete.
#[derive(Debug, Error)]
pub enum FlushError {
    #[error("cannot persist late-loaded classes to {}: {source}", .dir.display())]
    Archive {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Recorder(#[from] RecorderError),
}

/// Fatal attach failure. Every variant ends the process with status 1.
#[derive(Debug, Error)]
pub enum AttachError {
    #[error("host does not support retransformation of loaded classes")]
    RetransformUnsupported,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Inject(#[from] InjectError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Install(#[from] InstallError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Recorder(#[from] RecorderError),
    #[error(transparent)]
    Link(#[from] LinkError),
}

impl AttachError {
    /// Usage errors print the usage text; everything else is logged.
    pub fn is_usage(&self) -> bool {
        matches!(self, AttachError::Config(_))
    }

    pub fn exit_code(&self) -> i32 {
        1
    }
}
