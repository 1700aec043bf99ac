//! JNI calls used to reach the support runtime.
//!
//! This is deliberately narrow: class and static-method lookup, `String` and
//! `byte[]` conversion, native registration and exception hygiene.
//!
//! ```rust,ignore
//! let env = unsafe { JniEnv::from_vm(vm) }.ok_or(LinkError::NoJniEnv)?;
//! let class = LocalRef::new(&env, env.find_class("playout/rt/ReflectionLog")?);
//! env.register_natives(class.get(), &methods)?;
//! ```

use std::ffi::{CStr, CString};
use std::ptr;

use crate::sys::jni;

/// The JNI environment of one thread.
///
/// Not `Send`: a thread that needs JNI fetches its own through
/// [`JniEnv::from_vm`].
pub struct JniEnv {
    env: *mut jni::JNIEnv,
}

impl JniEnv {
    /// # Safety
    ///
    /// `env` must be the live environment of the calling thread.
    pub unsafe fn from_raw(env: *mut jni::JNIEnv) -> Self {
        JniEnv { env }
    }

    /// The environment of the calling thread, or `None` if the thread is not
    /// attached to the VM.
    ///
    /// # Safety
    ///
    /// `vm` must be a live `JavaVM` pointer.
    pub unsafe fn from_vm(vm: *mut jni::JavaVM) -> Option<Self> {
        let mut env: *mut std::ffi::c_void = ptr::null_mut();
        let rc = ((**vm).GetEnv)(vm, &mut env, jni::JNI_VERSION_1_6);
        (rc == jni::JNI_OK && !env.is_null()).then(|| JniEnv { env: env.cast() })
    }

    pub fn raw(&self) -> *mut jni::JNIEnv {
        self.env
    }

    fn fns(&self) -> &jni::JNINativeInterface_ {
        // SAFETY: `env` came from the VM and points at its function table.
        unsafe { &**self.env }
    }

    /// Looks a class up by internal name, `playout/rt/ReflectionLog`.
    pub fn find_class(&self, name: &str) -> Option<jni::jclass> {
        let name = CString::new(name).ok()?;
        let class = unsafe { (self.fns().FindClass)(self.env, name.as_ptr()) };
        non_null(class)
    }

    pub fn get_static_method_id(&self, class: jni::jclass, name: &str, sig: &str) -> Option<jni::jmethodID> {
        let (name, sig) = (CString::new(name).ok()?, CString::new(sig).ok()?);
        let id = unsafe { (self.fns().GetStaticMethodID)(self.env, class, name.as_ptr(), sig.as_ptr()) };
        non_null(id)
    }

    /// Invokes a static method returning an object. The result may be null,
    /// and an exception may be pending afterwards.
    pub fn call_static_object_method(
        &self,
        class: jni::jclass,
        method: jni::jmethodID,
        args: &[jni::jvalue],
    ) -> jni::jobject {
        unsafe { (self.fns().CallStaticObjectMethodA)(self.env, class, method, args.as_ptr()) }
    }

    pub fn register_natives(&self, class: jni::jclass, methods: &[jni::JNINativeMethod]) -> Result<(), jni::jint> {
        let count = methods.len() as jni::jint;
        match unsafe { (self.fns().RegisterNatives)(self.env, class, methods.as_ptr(), count) } {
            jni::JNI_OK => Ok(()),
            code => Err(code),
        }
    }

    pub fn exception_check(&self) -> bool {
        unsafe { (self.fns().ExceptionCheck)(self.env) != 0 }
    }

    /// Describes and clears a pending exception. Returns whether one was pending.
    pub fn take_exception(&self) -> bool {
        if !self.exception_check() {
            return false;
        }
        unsafe {
            (self.fns().ExceptionDescribe)(self.env);
            (self.fns().ExceptionClear)(self.env);
        }
        true
    }

    pub fn new_string_utf(&self, s: &str) -> Option<jni::jstring> {
        let s = CString::new(s).ok()?;
        non_null(unsafe { (self.fns().NewStringUTF)(self.env, s.as_ptr()) })
    }

    /// Reads a Java string. Null gives `None`; modified UTF-8 that is not
    /// valid UTF-8 is converted lossily.
    pub fn get_string_utf(&self, s: jni::jstring) -> Option<String> {
        if s.is_null() {
            return None;
        }
        let fns = self.fns();
        unsafe {
            let chars = (fns.GetStringUTFChars)(self.env, s, ptr::null_mut());
            if chars.is_null() {
                return None;
            }
            let text = CStr::from_ptr(chars).to_string_lossy().into_owned();
            (fns.ReleaseStringUTFChars)(self.env, s, chars);
            Some(text)
        }
    }

    /// Copies `bytes` into a new Java `byte[]`.
    pub fn new_byte_array_from(&self, bytes: &[u8]) -> Option<jni::jbyteArray> {
        let len = jni::jsize::try_from(bytes.len()).ok()?;
        let fns = self.fns();
        unsafe {
            let array = non_null((fns.NewByteArray)(self.env, len))?;
            (fns.SetByteArrayRegion)(self.env, array, 0, len, bytes.as_ptr().cast());
            Some(array)
        }
    }

    /// Copies a Java `byte[]` out. Null or unreadable arrays give `None`.
    pub fn byte_array_to_vec(&self, array: jni::jbyteArray) -> Option<Vec<u8>> {
        non_null(array)?;
        let fns = self.fns();
        let len = unsafe { (fns.GetArrayLength)(self.env, array) };
        let mut out = vec![0u8; usize::try_from(len).ok()?];
        unsafe { (fns.GetByteArrayRegion)(self.env, array, 0, len, out.as_mut_ptr().cast()) };
        if self.take_exception() {
            return None;
        }
        Some(out)
    }

    pub fn new_global_ref(&self, obj: jni::jobject) -> jni::jobject {
        unsafe { (self.fns().NewGlobalRef)(self.env, obj) }
    }

    pub fn delete_local_ref(&self, obj: jni::jobject) {
        unsafe { (self.fns().DeleteLocalRef)(self.env, obj) }
    }
}

fn non_null<T>(p: *mut T) -> Option<*mut T> {
    (!p.is_null()).then_some(p)
}

/// Deletes a local reference when dropped.
///
/// Native frames entered from class-file hooks can run for a long time, so
/// every local created there is released explicitly.
pub struct LocalRef<'a> {
    env: &'a JniEnv,
    obj: jni::jobject,
}

impl<'a> LocalRef<'a> {
    pub fn new(env: &'a JniEnv, obj: jni::jobject) -> Self {
        LocalRef { env, obj }
    }

    pub fn get(&self) -> jni::jobject {
        self.obj
    }
}

impl Drop for LocalRef<'_> {
    fn drop(&mut self) {
        if !self.obj.is_null() {
            self.env.delete_local_ref(self.obj);
        }
    }
}
