//! Exactly-once teardown.
//!
//! The host may report termination more than once (`VMDeath` followed by
//! `Agent_OnUnload`, or from racing threads). [`ShutdownCoordinator::terminate`]
//! runs its callbacks on the first call only.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, error};

use crate::trace::{SinkKind, TraceSink};

/// Process-wide teardown flag. Flips `false -> true` once.
#[derive(Debug, Default)]
pub struct ShutdownState(AtomicBool);

impl ShutdownState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Marks teardown as started. Only the first caller gets `true`.
    pub fn begin(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

type Callback = Box<dyn FnOnce() + Send>;

pub struct ShutdownCoordinator {
    state: Arc<ShutdownState>,
    callbacks: Mutex<Vec<(&'static str, Callback)>>,
}

impl ShutdownCoordinator {
    pub fn new(state: Arc<ShutdownState>) -> Self {
        ShutdownCoordinator { state, callbacks: Mutex::new(Vec::new()) }
    }

    pub fn state(&self) -> &Arc<ShutdownState> {
        &self.state
    }

    /// Appends `callback` to the teardown list. Callbacks run in
    /// registration order.
    pub fn register<F>(&self, name: &'static str, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.state.is_shutting_down() {
            debug!("shutdown already started, not registering {name}");
            return;
        }
        self.callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name, Box::new(callback)));
    }

    /// Registers the flush of `sink`. A socket is closed before `flush`
    /// runs; any sink is closed after it. Flush errors are logged.
    pub fn register_flush<F, E>(&self, sink: Arc<TraceSink>, flush: F)
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: fmt::Display,
    {
        self.register("trace flush", move || {
            if sink.kind() == Some(SinkKind::Socket) {
                sink.close();
            }
            if let Err(e) = flush() {
                error!("cannot flush trace: {e}");
            }
            sink.close();
        });
    }

    /// Runs the teardown list if no one has yet. Returns whether this call
    /// did the work.
    pub fn terminate(&self) -> bool {
        if !self.state.begin() {
            debug!("shutdown already handled");
            return false;
        }

        let callbacks = std::mem::take(&mut *self.callbacks.lock().unwrap_or_else(|e| e.into_inner()));
        for (name, callback) in callbacks {
            debug!("running shutdown step: {name}");
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
                error!("shutdown step {name} panicked: {}", panic_message(&*payload));
            }
        }
        true
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
