//! [`InstrumentationHost`] over a live JVMTI environment.

use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::error::HostError;
use crate::hooks::{ClassIdentity, HookRegistry, LoaderId};
use crate::host::{ClassKind, InstrumentationHost, LoadedClass};
use crate::jvmti_wrapper::Jvmti;
use crate::sys::jni;

pub struct JvmtiHost<'a> {
    jvmti: &'a Jvmti,
    hooks: Arc<HookRegistry>,
}

impl<'a> JvmtiHost<'a> {
    /// `hooks` must be the registry the agent's `ClassFileLoadHook` feeds.
    pub fn new(jvmti: &'a Jvmti, hooks: Arc<HookRegistry>) -> Self {
        JvmtiHost { jvmti, hooks }
    }

    fn describe(&self, klass: jni::jclass) -> Result<LoadedClass<jni::jclass>, HostError> {
        let signature = self
            .jvmti
            .get_class_signature(klass)
            .map_err(|code| HostError::jvmti("GetClassSignature", code))?;
        let kind = ClassKind::from_signature(&signature);
        let name = match kind {
            ClassKind::Instance => internal_name(&signature).to_owned(),
            _ => signature,
        };
        let loader = self
            .jvmti
            .get_class_loader(klass)
            .map_err(|code| HostError::jvmti("GetClassLoader", code))?;
        let loader = loader_id(self.jvmti, loader)?;
        let modifiable = self
            .jvmti
            .is_modifiable_class(klass)
            .map_err(|code| HostError::jvmti("IsModifiableClass", code))?;

        Ok(LoadedClass {
            handle: klass,
            identity: ClassIdentity::new(name, loader),
            kind,
            modifiable,
        })
    }
}

/// Identifies a defining loader by its identity hash. A null loader is the
/// bootstrap loader.
pub fn loader_id(jvmti: &Jvmti, loader: jni::jobject) -> Result<LoaderId, HostError> {
    if loader.is_null() {
        return Ok(LoaderId::Bootstrap);
    }
    jvmti
        .get_object_hash_code(loader)
        .map(LoaderId::Object)
        .map_err(|code| HostError::jvmti("GetObjectHashCode", code))
}

fn internal_name(signature: &str) -> &str {
    signature
        .strip_prefix('L')
        .and_then(|s| s.strip_suffix(';'))
        .unwrap_or(signature)
}

impl InstrumentationHost for JvmtiHost<'_> {
    type Class = jni::jclass;

    fn can_retransform(&self) -> bool {
        self.jvmti
            .get_capabilities()
            .map(|caps| caps.can_retransform_classes())
            .unwrap_or(false)
    }

    fn loaded_classes(&self) -> Result<Vec<LoadedClass<Self::Class>>, HostError> {
        let classes = self
            .jvmti
            .get_loaded_classes()
            .map_err(|code| HostError::jvmti("GetLoadedClasses", code))?;
        let mut out = Vec::with_capacity(classes.len());
        for klass in classes {
            match self.describe(klass) {
                Ok(class) => out.push(class),
                // classes still being prepared, or whose loader cannot be hashed
                Err(e) => debug!("skipping loaded class: {e}"),
            }
        }
        Ok(out)
    }

    fn retransform(&self, classes: &[Self::Class]) -> Result<(), HostError> {
        self.jvmti
            .retransform_classes(classes)
            .map_err(|code| HostError::jvmti("RetransformClasses", code))
    }

    fn append_to_bootstrap_search(&self, archive: &Path) -> Result<(), HostError> {
        let segment = archive
            .to_str()
            .ok_or_else(|| HostError::InvalidPath(archive.to_path_buf()))?;
        self.jvmti
            .add_to_bootstrap_class_loader_search(segment)
            .map_err(|code| HostError::jvmti("AddToBootstrapClassLoaderSearch", code))
    }

    fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }
}
