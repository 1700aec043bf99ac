//! Rewriting the runtime's reflective dispatch classes.
//!
//! Every reflective call in the process funnels through a handful of
//! bootstrap classes. Rewriting those once instruments all call sites; the
//! rewritten code then reports to the support runtime on its own, so the
//! hook is removed again as soon as the forced retransformation returns.

use std::sync::{Arc, Mutex};

use log::{debug, info};

use crate::error::InstallError;
use crate::hooks::{ClassFileEvent, ClassFileHook, HookPhase, LoaderId};
use crate::host::InstrumentationHost;

/// Bootstrap classes implementing class lookup and reflective invocation.
pub const INTERCEPT_TARGETS: [&str; 3] = [
    "java/lang/Class",
    "java/lang/reflect/Method",
    "java/lang/reflect/Constructor",
];

/// Inserts the call-site recording logic into a class.
pub trait CallSiteRewriter: Send + Sync {
    /// Returns the rewritten class, or `None` to leave it unchanged.
    fn rewrite(&self, class_name: &str, bytecode: &[u8]) -> Option<Vec<u8>>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Dispatch classes the rewriter actually changed.
    pub rewritten: Vec<String>,
}

struct InterceptHook {
    rewriter: Arc<dyn CallSiteRewriter>,
    rewritten: Mutex<Vec<String>>,
}

impl ClassFileHook for InterceptHook {
    fn on_class_file(&self, event: &ClassFileEvent<'_>) -> Option<Vec<u8>> {
        let name = event.identity.name.as_str();
        if event.identity.loader != LoaderId::Bootstrap || !INTERCEPT_TARGETS.contains(&name) {
            return None;
        }
        let out = self.rewriter.rewrite(name, event.bytecode)?;
        debug!("rewrote {name} ({} -> {} bytes)", event.bytecode.len(), out.len());
        self.rewritten
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(name.to_owned());
        Some(out)
    }
}

pub struct InterceptionInstaller {
    rewriter: Arc<dyn CallSiteRewriter>,
}

impl InterceptionInstaller {
    pub fn new(rewriter: Arc<dyn CallSiteRewriter>) -> Self {
        InterceptionInstaller { rewriter }
    }

    /// Rewrites the dispatch classes. No hook is left registered when this
    /// returns, whether it succeeds or not.
    pub fn install<H>(&self, host: &H) -> Result<InstallReport, InstallError>
    where
        H: InstrumentationHost + ?Sized,
    {
        if !host.can_retransform() {
            return Err(InstallError::RetransformUnsupported);
        }

        let loaded = host.loaded_classes().map_err(InstallError::Host)?;
        let mut targets = Vec::with_capacity(INTERCEPT_TARGETS.len());
        for target in INTERCEPT_TARGETS {
            let class = loaded
                .iter()
                .find(|c| c.identity.name == target && c.identity.loader == LoaderId::Bootstrap)
                .ok_or(InstallError::TargetNotLoaded(target))?;
            if !class.modifiable {
                return Err(InstallError::TargetNotModifiable(target));
            }
            targets.push(class.handle);
        }

        let hook = Arc::new(InterceptHook {
            rewriter: Arc::clone(&self.rewriter),
            rewritten: Mutex::new(Vec::new()),
        });
        let registration = host
            .hooks()
            .install(HookPhase::Intercept, Arc::clone(&hook) as Arc<dyn ClassFileHook>);
        host.retransform(&targets).map_err(InstallError::Retransform)?;
        registration.release();

        let rewritten = std::mem::take(&mut *hook.rewritten.lock().unwrap_or_else(|e| e.into_inner()));
        info!("reflective dispatch instrumented: {}", rewritten.join(", "));
        Ok(InstallReport { rewritten })
    }
}
