//! Common imports for code driving the agent.

pub use crate::bootstrap::{AgentBootstrap, AgentContext, SupportLink};
pub use crate::config::{AgentConfiguration, Destination, Endpoint, Mode};
pub use crate::env::{JniEnv, Jvmti, LocalRef};
pub use crate::error::AttachError;
pub use crate::export_agent;
pub use crate::event_callbacks;
pub use crate::hooks::{ClassFileEvent, ClassFileHook, ClassIdentity, HookPhase, HookRegistry, LoaderId};
pub use crate::host::{ClassKind, InstrumentationHost, LoadedClass};
pub use crate::installer::CallSiteRewriter;
pub use crate::sys::{jni, jvmti};
pub use crate::trace::{Recorder, TraceEntry, TraceKind, TraceRecorder, TraceSink};
pub use crate::{Agent, ClassFileLoad};
