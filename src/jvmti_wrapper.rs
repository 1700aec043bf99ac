//! The JVMTI calls the agent makes.
//!
//! Every call returns `Result<_, jvmtiError>`. Memory the VM allocates for a
//! result (class lists, signatures) is copied out and released before the
//! call returns.

use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr;

use crate::sys::jni;
use crate::sys::jvmti::{self, jvmtiError};

/// Calls a function from the JVMTI table and maps its status to a `Result`.
/// A slot the VM leaves empty reads as `NOT_AVAILABLE`.
macro_rules! call {
    ($self:ident . $name:ident ( $($arg:expr),* $(,)? )) => {{
        let f = (*(*$self.env).functions).$name.ok_or(jvmtiError::NOT_AVAILABLE)?;
        match f($self.env, $($arg),*) {
            jvmtiError::NONE => Ok(()),
            err => Err(err),
        }
    }};
}

pub struct Jvmti {
    env: *mut jvmti::jvmtiEnv,
}

// A JVMTI environment may be used from any thread, unlike a JNIEnv.
unsafe impl Send for Jvmti {}
unsafe impl Sync for Jvmti {}

impl Jvmti {
    /// Fetches a JVMTI 1.2 environment from the VM. The error is the JNI
    /// status `GetEnv` returned.
    pub fn new(vm: *mut jni::JavaVM) -> Result<Self, jni::jint> {
        let mut env: *mut c_void = ptr::null_mut();
        let rc = unsafe { ((**vm).GetEnv)(vm, &mut env, jvmti::JVMTI_VERSION_1_2) };
        if rc != jni::JNI_OK || env.is_null() {
            return Err(rc);
        }
        Ok(Jvmti { env: env.cast() })
    }

    #[cfg(test)]
    pub(crate) fn from_env(env: *mut jvmti::jvmtiEnv) -> Self {
        Jvmti { env }
    }

    pub fn get_capabilities(&self) -> Result<jvmti::jvmtiCapabilities, jvmtiError> {
        let mut caps = jvmti::jvmtiCapabilities::default();
        unsafe { call!(self.GetCapabilities(&mut caps))? };
        Ok(caps)
    }

    /// Asks for the capabilities `configure` sets, minus those this VM can
    /// never grant, and returns what the environment holds afterwards.
    pub fn add_capabilities_with(
        &self,
        configure: impl FnOnce(&mut jvmti::jvmtiCapabilities),
    ) -> Result<jvmti::jvmtiCapabilities, jvmtiError> {
        let mut wanted = jvmti::jvmtiCapabilities::default();
        configure(&mut wanted);

        let mut potential = jvmti::jvmtiCapabilities::default();
        unsafe { call!(self.GetPotentialCapabilities(&mut potential))? };
        if !potential.can_retransform_classes() {
            wanted.set_can_retransform_classes(false);
        }

        unsafe { call!(self.AddCapabilities(&wanted))? };
        self.get_capabilities()
    }

    pub fn set_event_callbacks(&self, callbacks: jvmti::jvmtiEventCallbacks) -> Result<(), jvmtiError> {
        let size = std::mem::size_of::<jvmti::jvmtiEventCallbacks>() as jni::jint;
        unsafe { call!(self.SetEventCallbacks(&callbacks, size)) }
    }

    /// Enables each event for all threads, stopping at the first failure.
    pub fn enable_events_global(&self, events: &[u32]) -> Result<(), jvmtiError> {
        for &event in events {
            unsafe { call!(self.SetEventNotificationMode(jvmti::JVMTI_ENABLE, event, ptr::null_mut()))? };
        }
        Ok(())
    }

    fn deallocate<T>(&self, mem: *mut T) -> Result<(), jvmtiError> {
        if mem.is_null() {
            return Ok(());
        }
        unsafe { call!(self.Deallocate(mem.cast())) }
    }

    /// Copies `bytes` into VM-owned memory, the only kind a ClassFileLoadHook
    /// may hand back as replacement class data.
    pub fn allocate_copy(&self, bytes: &[u8]) -> Result<(*mut u8, jni::jint), jvmtiError> {
        let len = jni::jint::try_from(bytes.len()).map_err(|_| jvmtiError::ILLEGAL_ARGUMENT)?;
        let mut mem: *mut u8 = ptr::null_mut();
        unsafe {
            call!(self.Allocate(jni::jlong::from(len), &mut mem))?;
            ptr::copy_nonoverlapping(bytes.as_ptr(), mem, bytes.len());
        }
        Ok((mem, len))
    }

    pub fn get_loaded_classes(&self) -> Result<Vec<jni::jclass>, jvmtiError> {
        let mut count: jni::jint = 0;
        let mut classes: *mut jni::jclass = ptr::null_mut();
        unsafe { call!(self.GetLoadedClasses(&mut count, &mut classes))? };
        if classes.is_null() {
            return Ok(Vec::new());
        }
        let len = usize::try_from(count).unwrap_or(0);
        let out = unsafe { std::slice::from_raw_parts(classes, len) }.to_vec();
        self.deallocate(classes)?;
        Ok(out)
    }

    /// JVM type signature of a class: `Ljava/lang/String;`, `I`, `[B`.
    pub fn get_class_signature(&self, class: jni::jclass) -> Result<String, jvmtiError> {
        let mut sig: *mut c_char = ptr::null_mut();
        unsafe { call!(self.GetClassSignature(class, &mut sig, ptr::null_mut()))? };
        if sig.is_null() {
            return Err(jvmtiError::NULL_POINTER);
        }
        let out = unsafe { CStr::from_ptr(sig) }.to_string_lossy().into_owned();
        self.deallocate(sig)?;
        Ok(out)
    }

    /// The defining loader, null for the bootstrap loader.
    pub fn get_class_loader(&self, class: jni::jclass) -> Result<jni::jobject, jvmtiError> {
        let mut loader: jni::jobject = ptr::null_mut();
        unsafe { call!(self.GetClassLoader(class, &mut loader))? };
        Ok(loader)
    }

    pub fn get_object_hash_code(&self, object: jni::jobject) -> Result<jni::jint, jvmtiError> {
        let mut hash: jni::jint = 0;
        unsafe { call!(self.GetObjectHashCode(object, &mut hash))? };
        Ok(hash)
    }

    pub fn is_modifiable_class(&self, class: jni::jclass) -> Result<bool, jvmtiError> {
        let mut modifiable: jni::jboolean = 0;
        unsafe { call!(self.IsModifiableClass(class, &mut modifiable))? };
        Ok(modifiable != 0)
    }

    /// Redelivers the current bytecode of `classes` to ClassFileLoadHook.
    pub fn retransform_classes(&self, classes: &[jni::jclass]) -> Result<(), jvmtiError> {
        if classes.is_empty() {
            return Ok(());
        }
        let count = jni::jint::try_from(classes.len()).map_err(|_| jvmtiError::ILLEGAL_ARGUMENT)?;
        unsafe { call!(self.RetransformClasses(count, classes.as_ptr())) }
    }

    pub fn add_to_bootstrap_class_loader_search(&self, segment: &str) -> Result<(), jvmtiError> {
        let segment = CString::new(segment).map_err(|_| jvmtiError::ILLEGAL_ARGUMENT)?;
        unsafe { call!(self.AddToBootstrapClassLoaderSearch(segment.as_ptr())) }
    }
}
