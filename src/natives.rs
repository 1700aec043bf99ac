//! Native half of the support runtime.
//!
//! The rewritten dispatch classes call `ReflectionLog.record(...)`, which is
//! declared `native` in the support archive and bound here to the agent's
//! [`TraceRecorder`].

use std::ffi::c_void;
use std::sync::{Arc, OnceLock};

use log::{debug, info, warn};

use crate::bootstrap::SupportLink;
use crate::error::LinkError;
use crate::installer::CallSiteRewriter;
use crate::jni_wrapper::{JniEnv, LocalRef};
use crate::rewriter::{SupportRewriter, REWRITER_CLASS, TRANSFORM_METHOD, TRANSFORM_SIGNATURE};
use crate::sys::jni;
use crate::trace::{Recorder, TraceEntry, TraceKind, TraceRecorder};

pub const LOG_CLASS: &str = "playout/rt/ReflectionLog";

// Native methods have no receiver to carry state, so the recorder they
// report to is process-wide.
static RECORDER: OnceLock<Arc<TraceRecorder>> = OnceLock::new();

/// Links through JNI on the attaching thread.
pub struct JniSupportLink {
    vm: *mut jni::JavaVM,
}

impl JniSupportLink {
    /// # Safety
    ///
    /// `vm` must be the live VM the agent was loaded into.
    pub unsafe fn new(vm: *mut jni::JavaVM) -> Self {
        JniSupportLink { vm }
    }
}

impl SupportLink for JniSupportLink {
    fn link(&self, recorder: Arc<TraceRecorder>) -> Result<Arc<dyn CallSiteRewriter>, LinkError> {
        let env = unsafe { JniEnv::from_vm(self.vm) }.ok_or(LinkError::NoJniEnv)?;

        if RECORDER.set(recorder).is_err() {
            warn!("support runtime already linked, keeping the first recorder");
        }

        let log_class = LocalRef::new(&env, find(&env, LOG_CLASS)?);
        let methods = [
            jni::JNINativeMethod {
                name: c"record".as_ptr(),
                signature: c"(Ljava/lang/String;Ljava/lang/String;Ljava/lang/String;ILjava/lang/String;)V"
                    .as_ptr(),
                fnPtr: native_record as *mut c_void,
            },
            jni::JNINativeMethod {
                name: c"shuttingDown".as_ptr(),
                signature: c"()Z".as_ptr(),
                fnPtr: native_shutting_down as *mut c_void,
            },
        ];
        if let Err(code) = env.register_natives(log_class.get(), &methods) {
            env.take_exception();
            return Err(LinkError::RegisterNatives { class: LOG_CLASS, code });
        }
        debug!("natives registered on {LOG_CLASS}");

        let rewriter_class = LocalRef::new(&env, find(&env, REWRITER_CLASS)?);
        let transform = env
            .get_static_method_id(rewriter_class.get(), TRANSFORM_METHOD, TRANSFORM_SIGNATURE)
            .ok_or_else(|| {
                env.take_exception();
                LinkError::MethodNotFound { class: REWRITER_CLASS, method: TRANSFORM_METHOD }
            })?;
        let global = env.new_global_ref(rewriter_class.get());
        if global.is_null() {
            return Err(LinkError::ClassNotFound(REWRITER_CLASS));
        }

        info!("support runtime linked");
        let rewriter = unsafe { SupportRewriter::new(self.vm, global, transform) };
        Ok(Arc::new(rewriter))
    }
}

fn find(env: &JniEnv, class: &'static str) -> Result<jni::jclass, LinkError> {
    env.find_class(class).ok_or_else(|| {
        env.take_exception();
        LinkError::ClassNotFound(class)
    })
}

unsafe extern "system" fn native_record(
    env: *mut jni::JNIEnv,
    _class: jni::jclass,
    kind: jni::jstring,
    target: jni::jstring,
    container: jni::jstring,
    line: jni::jint,
    meta: jni::jstring,
) {
    let Some(recorder) = RECORDER.get() else {
        return;
    };
    let env = JniEnv::from_raw(env);
    let Some(kind) = env.get_string_utf(kind) else {
        return;
    };
    let kind = match kind.parse::<TraceKind>() {
        Ok(kind) => kind,
        Err(e) => {
            debug!("ignoring reflective event: {e}");
            return;
        }
    };
    let text = |s| env.get_string_utf(s).unwrap_or_default();
    recorder.record(TraceEntry::new(
        kind,
        &text(target),
        &text(container),
        u32::try_from(line).ok(),
        &text(meta),
    ));
}

unsafe extern "system" fn native_shutting_down(
    _env: *mut jni::JNIEnv,
    _class: jni::jclass,
) -> jni::jboolean {
    RECORDER.get().map_or(false, |r| r.is_shutting_down()) as jni::jboolean
}
