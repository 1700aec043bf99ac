//! Class-file hooks with scoped registration.
//!
//! Every class definition or retransformation the host reports is routed
//! through a [`HookRegistry`]. Hooks are installed with
//! [`HookRegistry::install`], which hands back a [`HookRegistration`] guard.
//! Dropping the guard removes the hook, so a phase that fails halfway
//! through cannot leave its hook behind for later class loads.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use log::{debug, trace};

/// Which class loader defined a class.
///
/// Object loaders are identified by their identity hash code, which is
/// stable for the lifetime of the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LoaderId {
    Bootstrap,
    Object(i32),
}

/// A class is identified by its internal name and defining loader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassIdentity {
    /// Internal form, e.g. `java/lang/String`.
    pub name: String,
    pub loader: LoaderId,
}

impl ClassIdentity {
    pub fn new(name: impl Into<String>, loader: LoaderId) -> Self {
        ClassIdentity { name: name.into(), loader }
    }

    pub fn bootstrap(name: impl Into<String>) -> Self {
        Self::new(name, LoaderId::Bootstrap)
    }
}

impl fmt::Display for ClassIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.loader {
            LoaderId::Bootstrap => f.write_str(&self.name),
            LoaderId::Object(hash) => write!(f, "{}@{:08x}", self.name, hash),
        }
    }
}

/// One class file passing through the host's load/retransform machinery.
#[derive(Debug)]
pub struct ClassFileEvent<'a> {
    pub identity: ClassIdentity,
    pub bytecode: &'a [u8],
    /// `true` for retransformation of an already loaded class.
    pub redefining: bool,
}

pub trait ClassFileHook: Send + Sync {
    /// Returns replacement bytecode, or `None` to leave the class unchanged.
    fn on_class_file(&self, event: &ClassFileEvent<'_>) -> Option<Vec<u8>>;
}

impl<F> ClassFileHook for F
where
    F: Fn(&ClassFileEvent<'_>) -> Option<Vec<u8>> + Send + Sync,
{
    fn on_class_file(&self, event: &ClassFileEvent<'_>) -> Option<Vec<u8>> {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    Snapshot,
    Intercept,
    LateCapture,
}

struct Installed {
    id: u64,
    phase: HookPhase,
    hook: Arc<dyn ClassFileHook>,
}

#[derive(Default)]
pub struct HookRegistry {
    next_id: AtomicU64,
    hooks: RwLock<Vec<Installed>>,
}

impl HookRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `hook` until the returned guard is dropped.
    #[must_use = "the hook is removed as soon as the registration is dropped"]
    pub fn install(self: &Arc<Self>, phase: HookPhase, hook: Arc<dyn ClassFileHook>) -> HookRegistration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.hooks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Installed { id, phase, hook });
        debug!("{phase:?} hook #{id} installed");
        HookRegistration { registry: Arc::clone(self), id, phase }
    }

    fn remove(&self, id: u64) -> bool {
        let mut hooks = self.hooks.write().unwrap_or_else(|e| e.into_inner());
        let before = hooks.len();
        hooks.retain(|h| h.id != id);
        hooks.len() != before
    }

    /// Runs every registered hook in registration order, feeding each the
    /// bytecode produced by the previous one. Returns the final bytecode if
    /// any hook replaced it.
    pub fn dispatch(&self, event: &ClassFileEvent<'_>) -> Option<Vec<u8>> {
        // Snapshot the list so hooks run without the lock held; a hook may
        // load classes and re-enter dispatch on the same thread.
        let hooks: Vec<Arc<dyn ClassFileHook>> = {
            let guard = self.hooks.read().unwrap_or_else(|e| e.into_inner());
            if guard.is_empty() {
                return None;
            }
            guard.iter().map(|h| Arc::clone(&h.hook)).collect()
        };

        let mut replaced: Option<Vec<u8>> = None;
        for hook in hooks {
            let output = {
                let current = ClassFileEvent {
                    identity: event.identity.clone(),
                    bytecode: replaced.as_deref().unwrap_or(event.bytecode),
                    redefining: event.redefining,
                };
                hook.on_class_file(&current)
            };
            if let Some(bytes) = output {
                trace!("{} replaced ({} bytes)", event.identity, bytes.len());
                replaced = Some(bytes);
            }
        }
        replaced
    }

    pub fn active_phases(&self) -> Vec<HookPhase> {
        self.hooks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|h| h.phase)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.read().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

/// Keeps a hook registered. The hook is removed when this is dropped.
pub struct HookRegistration {
    registry: Arc<HookRegistry>,
    id: u64,
    phase: HookPhase,
}

impl HookRegistration {
    pub fn phase(&self) -> HookPhase {
        self.phase
    }

    /// Removes the hook now. Equivalent to dropping the guard.
    pub fn release(self) {}
}

impl Drop for HookRegistration {
    fn drop(&mut self) {
        if self.registry.remove(self.id) {
            debug!("{:?} hook #{} removed", self.phase, self.id);
        }
    }
}

impl fmt::Debug for HookRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistration")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn event(name: &str, bytes: &'static [u8]) -> ClassFileEvent<'static> {
        ClassFileEvent { identity: ClassIdentity::bootstrap(name), bytecode: bytes, redefining: false }
    }

    #[test]
    fn registration_is_scoped() {
        let registry = HookRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let counter = Arc::clone(&calls);
            let _reg = registry.install(
                HookPhase::Snapshot,
                Arc::new(move |_: &ClassFileEvent<'_>| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    None
                }),
            );
            assert_eq!(registry.active_phases(), vec![HookPhase::Snapshot]);
            registry.dispatch(&event("a/A", b"A"));
        }
        assert!(registry.is_empty());
        registry.dispatch(&event("b/B", b"B"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatch_chains_replacements() {
        let registry = HookRegistry::new();
        let _first = registry.install(
            HookPhase::Intercept,
            Arc::new(|e: &ClassFileEvent<'_>| {
                let mut out = e.bytecode.to_vec();
                out.push(b'1');
                Some(out)
            }),
        );
        let seen = Arc::new(RwLock::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _second = registry.install(
            HookPhase::LateCapture,
            Arc::new(move |e: &ClassFileEvent<'_>| {
                sink.write().unwrap().push(e.bytecode.to_vec());
                None
            }),
        );

        let out = registry.dispatch(&event("x/X", b"0"));
        assert_eq!(out.as_deref(), Some(&b"01"[..]));
        assert_eq!(seen.read().unwrap().as_slice(), &[b"01".to_vec()]);
    }

    #[test]
    fn reentrant_dispatch_does_not_deadlock() {
        let registry = HookRegistry::new();
        let inner = Arc::clone(&registry);
        let depth = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&depth);
        let _reg = registry.install(
            HookPhase::Intercept,
            Arc::new(move |_: &ClassFileEvent<'_>| {
                if d.fetch_add(1, Ordering::SeqCst) == 0 {
                    inner.dispatch(&event("nested/N", b"N"));
                }
                None
            }),
        );
        registry.dispatch(&event("outer/O", b"O"));
        assert_eq!(depth.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn identity_display() {
        assert_eq!(ClassIdentity::bootstrap("java/lang/Class").to_string(), "java/lang/Class");
        assert_eq!(
            ClassIdentity::new("app/Main", LoaderId::Object(0x2a)).to_string(),
            "app/Main@0000002a"
        );
    }
}
