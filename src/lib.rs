//! # playout-agent
//!
//! A JVM agent that records every reflective call site of a running program
//! and archives the bytecode of the classes it loaded, so the run can later
//! be replayed against an exact copy of the program.
//!
//! The agent is loaded with
//!
//! ```bash
//! java -agentpath:./target/release/libplayout_agent.so=count,/tmp/out MyApp
//! ```
//!
//! or attached to a live VM. Options follow
//! `[verbose,][count,](<directory> | socket,<host>:<port>)`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 PlayOutAgent (agent)                     │
//! │     JVMTI lifecycle, ClassFileLoadHook dispatch          │
//! ├─────────────────────────────────────────────────────────┤
//! │                AgentBootstrap (bootstrap)                │
//! │  injector → snapshot → trace sink → installer → shutdown │
//! ├─────────────────────────────────────────────────────────┤
//! │          InstrumentationHost (host, jvmti_host)          │
//! │       hooks::HookRegistry - scoped class-file hooks      │
//! ├─────────────────────────────────────────────────────────┤
//! │              Safe wrappers (env module)                  │
//! │        env::Jvmti, env::JniEnv, env::LocalRef            │
//! ├─────────────────────────────────────────────────────────┤
//! │              Raw FFI bindings (sys module)               │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Option parsing, usage text, output directory |
//! | [`bootstrap`] | The attach sequence and [`bootstrap::AgentContext`] |
//! | [`injector`] | Support archive validation and bootstrap search path |
//! | [`snapshot`] | Class archive and loaded-class snapshot |
//! | [`installer`] | Rewriting of the reflective dispatch classes |
//! | [`trace`] | Trace entries, counts, sinks and the recorder |
//! | [`shutdown`] | Exactly-once flush at VM death |

pub mod sys;
pub mod env;
pub mod prelude;

pub mod agent;
pub mod bootstrap;
pub mod classfile;
pub mod config;
pub mod error;
pub mod hooks;
pub mod host;
pub mod injector;
pub mod installer;
pub mod jvmti_host;
pub mod logging;
pub mod natives;
pub mod rewriter;
pub mod shutdown;
pub mod snapshot;
pub mod trace;

#[doc(hidden)]
pub mod jvmti_wrapper;
#[doc(hidden)]
pub mod jni_wrapper;

use std::ffi::{c_char, c_uchar, CStr};
use std::sync::OnceLock;

pub use crate::sys::jni;
use crate::sys::jvmti;

/// Arguments of one `ClassFileLoadHook` event, as the VM passed them.
///
/// To replace the class, allocate the new bytes with
/// `Jvmti::allocate_copy` and store them through `new_data_len` and
/// `new_data`.
pub struct ClassFileLoad {
    pub class_being_redefined: jni::jclass,
    pub loader: jni::jobject,
    /// Null for some hidden and anonymous classes.
    pub name: *const c_char,
    pub data_len: jni::jint,
    pub data: *const c_uchar,
    pub new_data_len: *mut jni::jint,
    pub new_data: *mut *mut c_uchar,
}

/// Lifecycle of a loaded agent library.
///
/// Events fire on arbitrary VM threads. Use [`export_agent!`] to generate the
/// library entry points for an implementation.
pub trait Agent: Send + Sync {
    /// `Agent_OnLoad`, before the VM has initialised. Returns a JNI status.
    fn on_load(&self, vm: *mut jni::JavaVM, options: &str) -> jni::jint;

    /// `Agent_OnAttach`, in a running VM.
    fn on_attach(&self, vm: *mut jni::JavaVM, options: &str) -> jni::jint {
        self.on_load(vm, options)
    }

    fn on_unload(&self) {}

    fn vm_init(&self) {}

    fn vm_death(&self) {}

    fn class_file_load(&self, _event: ClassFileLoad) {}
}

static AGENT: OnceLock<Box<dyn Agent>> = OnceLock::new();

/// Creates the process-wide agent and runs its load or attach handler.
/// A second load into the same VM is refused with `JNI_ERR`.
///
/// # Safety
///
/// `options` must be null or a NUL-terminated string.
#[doc(hidden)]
pub unsafe fn enter_agent(
    vm: *mut jni::JavaVM,
    options: *const c_char,
    attach: bool,
    create: fn() -> Box<dyn Agent>,
) -> jni::jint {
    let options = if options.is_null() {
        ""
    } else {
        CStr::from_ptr(options).to_str().unwrap_or("")
    };
    let mut created = false;
    let agent = AGENT.get_or_init(|| {
        created = true;
        create()
    });
    match (created, attach) {
        (false, _) => jni::JNI_ERR,
        (true, false) => agent.on_load(vm, options),
        (true, true) => agent.on_attach(vm, options),
    }
}

#[doc(hidden)]
pub fn leave_agent() {
    if let Some(agent) = AGENT.get() {
        agent.on_unload();
    }
}

unsafe extern "system" fn on_vm_init(_: *mut jvmti::jvmtiEnv, _: *mut jni::JNIEnv, _: jni::jthread) {
    if let Some(agent) = AGENT.get() {
        agent.vm_init();
    }
}

unsafe extern "system" fn on_vm_death(_: *mut jvmti::jvmtiEnv, _: *mut jni::JNIEnv) {
    if let Some(agent) = AGENT.get() {
        agent.vm_death();
    }
}

#[allow(clippy::too_many_arguments)]
unsafe extern "system" fn on_class_file_load(
    _: *mut jvmti::jvmtiEnv,
    _: *mut jni::JNIEnv,
    class_being_redefined: jni::jclass,
    loader: jni::jobject,
    name: *const c_char,
    _protection_domain: jni::jobject,
    data_len: jni::jint,
    data: *const c_uchar,
    new_data_len: *mut jni::jint,
    new_data: *mut *mut c_uchar,
) {
    if let Some(agent) = AGENT.get() {
        agent.class_file_load(ClassFileLoad {
            class_being_redefined,
            loader,
            name,
            data_len,
            data,
            new_data_len,
            new_data,
        });
    }
}

/// Callback table routing `VMInit`, `VMDeath` and `ClassFileLoadHook` to the
/// loaded [`Agent`]. The events still have to be enabled with
/// `Jvmti::enable_events_global`.
pub fn event_callbacks() -> jvmti::jvmtiEventCallbacks {
    jvmti::jvmtiEventCallbacks {
        VMInit: Some(on_vm_init),
        VMDeath: Some(on_vm_death),
        ClassFileLoadHook: Some(on_class_file_load),
        ..Default::default()
    }
}

/// Exports `Agent_OnLoad`, `Agent_OnAttach` and `Agent_OnUnload` for an
/// [`Agent`] type implementing [`Default`]. One instance exists per VM.
///
/// ```rust,ignore
/// export_agent!(PlayOutAgent);
/// ```
#[macro_export]
macro_rules! export_agent {
    ($agent:ty) => {
        fn __playout_create_agent() -> Box<dyn $crate::Agent> {
            Box::new(<$agent as Default>::default())
        }

        #[no_mangle]
        pub unsafe extern "system" fn Agent_OnLoad(
            vm: *mut $crate::jni::JavaVM,
            options: *mut std::ffi::c_char,
            _reserved: *mut std::ffi::c_void,
        ) -> $crate::jni::jint {
            $crate::enter_agent(vm, options, false, __playout_create_agent)
        }

        #[no_mangle]
        pub unsafe extern "system" fn Agent_OnAttach(
            vm: *mut $crate::jni::JavaVM,
            options: *mut std::ffi::c_char,
            _reserved: *mut std::ffi::c_void,
        ) -> $crate::jni::jint {
            $crate::enter_agent(vm, options, true, __playout_create_agent)
        }

        #[no_mangle]
        pub unsafe extern "system" fn Agent_OnUnload(_vm: *mut $crate::jni::JavaVM) {
            $crate::leave_agent()
        }
    };
}

export_agent!(crate::agent::PlayOutAgent);
