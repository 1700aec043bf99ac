//! The instrumentation surface the attach sequence drives.
//!
//! [`InstrumentationHost`] is implemented over JVMTI by
//! [`JvmtiHost`](crate::jvmti_host::JvmtiHost). The orchestration code only
//! talks to this trait, which keeps it testable without a JVM.

use std::path::Path;
use std::sync::Arc;

use crate::error::HostError;
use crate::hooks::{ClassIdentity, HookRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Primitive,
    Array,
    Instance,
}

impl ClassKind {
    /// Classifies a JVM type signature (`I`, `[B`, `Ljava/lang/Object;`).
    pub fn from_signature(signature: &str) -> Self {
        match signature.as_bytes().first() {
            Some(b'[') => ClassKind::Array,
            Some(b'L') => ClassKind::Instance,
            _ => ClassKind::Primitive,
        }
    }
}

/// A class the host reports as currently loaded.
#[derive(Debug, Clone)]
pub struct LoadedClass<C> {
    pub handle: C,
    pub identity: ClassIdentity,
    pub kind: ClassKind,
    pub modifiable: bool,
}

impl<C> LoadedClass<C> {
    /// Core runtime classes under `java/lang/`. When one of them is
    /// unmodifiable it is skipped without a warning; modifiable ones are
    /// archived like any other class.
    pub fn is_platform_core(&self) -> bool {
        self.identity.name.starts_with("java/lang/")
    }
}

pub trait InstrumentationHost {
    /// Host-specific class handle passed back to [`retransform`](Self::retransform).
    type Class: Copy;

    /// Whether already-loaded classes can be retransformed.
    fn can_retransform(&self) -> bool;

    fn loaded_classes(&self) -> Result<Vec<LoadedClass<Self::Class>>, HostError>;

    /// Re-delivers the current bytecode of `classes` through the hook registry.
    fn retransform(&self, classes: &[Self::Class]) -> Result<(), HostError>;

    /// Makes `archive` visible to every class loader in the process.
    fn append_to_bootstrap_search(&self, archive: &Path) -> Result<(), HostError>;

    fn hooks(&self) -> &Arc<HookRegistry>;
}
