//! Call-site rewriting delegated to the support runtime.

use log::warn;

use crate::installer::CallSiteRewriter;
use crate::jni_wrapper::{JniEnv, LocalRef};
use crate::sys::jni;

pub const REWRITER_CLASS: &str = "playout/rt/ReflectionRewriter";
pub const TRANSFORM_METHOD: &str = "transform";
pub const TRANSFORM_SIGNATURE: &str = "(Ljava/lang/String;[B)[B";

/// Calls `ReflectionRewriter.transform(String, byte[])` in the support
/// archive on whichever thread delivers the class.
pub struct SupportRewriter {
    vm: *mut jni::JavaVM,
    class: jni::jclass,
    transform: jni::jmethodID,
}

// The class is held as a global reference and method ids are valid on any
// thread; each call fetches the JNIEnv of the calling thread.
unsafe impl Send for SupportRewriter {}
unsafe impl Sync for SupportRewriter {}

impl SupportRewriter {
    /// # Safety
    ///
    /// `vm` must outlive the rewriter, `class` must be a global reference
    /// and `transform` a static method id of that class.
    pub unsafe fn new(vm: *mut jni::JavaVM, class: jni::jclass, transform: jni::jmethodID) -> Self {
        SupportRewriter { vm, class, transform }
    }
}

impl CallSiteRewriter for SupportRewriter {
    fn rewrite(&self, class_name: &str, bytecode: &[u8]) -> Option<Vec<u8>> {
        let env = unsafe { JniEnv::from_vm(self.vm) }?;

        let name = LocalRef::new(&env, env.new_string_utf(class_name)?);
        let input = LocalRef::new(&env, env.new_byte_array_from(bytecode)?);
        let args = [jni::jvalue { l: name.get() }, jni::jvalue { l: input.get() }];
        let result = LocalRef::new(&env, env.call_static_object_method(self.class, self.transform, &args));

        if env.take_exception() {
            warn!("support rewriter threw while rewriting {class_name}, leaving it unchanged");
            return None;
        }
        if result.get().is_null() {
            return None;
        }
        let out = env.byte_array_to_vec(result.get())?;
        (out.as_slice() != bytecode).then_some(out)
    }
}
