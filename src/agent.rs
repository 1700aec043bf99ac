//! The exported agent.
//!
//! `Agent_OnLoad` only acquires JVMTI and arms the events; the attach
//! sequence runs on `VMInit`, once the VM can load the support runtime.
//! `Agent_OnAttach` arrives in a live VM and runs it immediately.

use std::ffi::CStr;
use std::sync::{Arc, OnceLock};

use log::{debug, error, warn};

use crate::bootstrap::{AgentBootstrap, AgentContext};
use crate::classfile;
use crate::config;
use crate::error::HostError;
use crate::hooks::{ClassFileEvent, ClassIdentity, HookRegistry};
use crate::jvmti_host::{loader_id, JvmtiHost};
use crate::jvmti_wrapper::Jvmti;
use crate::logging;
use crate::natives::JniSupportLink;
use crate::sys::jvmti::{JVMTI_EVENT_CLASS_FILE_LOAD_HOOK, JVMTI_EVENT_VM_DEATH, JVMTI_EVENT_VM_INIT};
use crate::{event_callbacks, jni, Agent, ClassFileLoad};

struct VmPtr(*mut jni::JavaVM);

// The JavaVM pointer is valid on every thread for the life of the VM.
unsafe impl Send for VmPtr {}
unsafe impl Sync for VmPtr {}

#[derive(Default)]
pub struct PlayOutAgent {
    vm: OnceLock<VmPtr>,
    jvmti: OnceLock<Jvmti>,
    hooks: Arc<HookRegistry>,
    options: OnceLock<String>,
    context: OnceLock<AgentContext>,
}

impl PlayOutAgent {
    fn setup(&self, vm: *mut jni::JavaVM, options: &str, events: &[u32]) -> Result<(), HostError> {
        let jvmti = Jvmti::new(vm)
            .map_err(|code| HostError::Other(format!("no JVMTI environment (GetEnv returned {code})")))?;

        let caps = jvmti
            .add_capabilities_with(|caps| caps.set_can_retransform_classes(true))
            .map_err(|code| HostError::jvmti("AddCapabilities", code))?;
        if !caps.can_retransform_classes() {
            warn!("this VM cannot retransform classes");
        }

        jvmti
            .set_event_callbacks(event_callbacks())
            .map_err(|code| HostError::jvmti("SetEventCallbacks", code))?;
        jvmti
            .enable_events_global(events)
            .map_err(|code| HostError::jvmti("SetEventNotificationMode", code))?;

        let _ = self.vm.set(VmPtr(vm));
        let _ = self.jvmti.set(jvmti);
        let _ = self.options.set(options.to_owned());
        Ok(())
    }

    /// Runs the attach sequence. Any failure ends the process.
    fn start(&self) {
        let (Some(jvmti), Some(vm)) = (self.jvmti.get(), self.vm.get()) else {
            error!("agent started before JVMTI was acquired");
            std::process::exit(1);
        };
        let options = self.options.get().map(String::as_str).unwrap_or("");

        let host = JvmtiHost::new(jvmti, Arc::clone(&self.hooks));
        let link = unsafe { JniSupportLink::new(vm.0) };
        match AgentBootstrap::from_env().attach(&host, &link, options) {
            Ok(context) => {
                if self.context.set(context).is_err() {
                    warn!("agent attached twice, ignoring the second context");
                }
            }
            Err(e) if e.is_usage() => {
                error!("{e}");
                config::usage_and_exit();
            }
            Err(e) => {
                error!("{e}");
                std::process::exit(e.exit_code());
            }
        }
    }

    fn terminate(&self) {
        if let Some(context) = self.context.get() {
            context.terminate();
        }
    }
}

impl Agent for PlayOutAgent {
    fn on_load(&self, vm: *mut jni::JavaVM, options: &str) -> jni::jint {
        logging::init();
        let events = [JVMTI_EVENT_VM_INIT, JVMTI_EVENT_VM_DEATH, JVMTI_EVENT_CLASS_FILE_LOAD_HOOK];
        match self.setup(vm, options, &events) {
            Ok(()) => jni::JNI_OK,
            Err(e) => {
                error!("{e}");
                jni::JNI_ERR
            }
        }
    }

    fn on_attach(&self, vm: *mut jni::JavaVM, options: &str) -> jni::jint {
        logging::init();
        let events = [JVMTI_EVENT_VM_DEATH, JVMTI_EVENT_CLASS_FILE_LOAD_HOOK];
        if let Err(e) = self.setup(vm, options, &events) {
            error!("{e}");
            return jni::JNI_ERR;
        }
        self.start();
        jni::JNI_OK
    }

    fn on_unload(&self) {
        self.terminate();
    }

    fn vm_init(&self) {
        self.start();
    }

    fn vm_death(&self) {
        self.terminate();
    }

    fn class_file_load(&self, event: ClassFileLoad) {
        if self.hooks.is_empty() || event.data.is_null() || event.data_len <= 0 {
            return;
        }
        let Some(jvmti) = self.jvmti.get() else {
            return;
        };

        let bytecode = unsafe { std::slice::from_raw_parts(event.data, event.data_len as usize) };
        let name = if event.name.is_null() {
            match classfile::class_name(bytecode) {
                Ok(name) => name,
                Err(e) => {
                    debug!("unnamed class with unreadable class file: {e}");
                    return;
                }
            }
        } else {
            unsafe { CStr::from_ptr(event.name) }.to_string_lossy().into_owned()
        };

        let loader = match loader_id(jvmti, event.loader) {
            Ok(loader) => loader,
            Err(e) => {
                debug!("not dispatching {name}: {e}");
                return;
            }
        };
        let class = ClassFileEvent {
            identity: ClassIdentity::new(name, loader),
            bytecode,
            redefining: !event.class_being_redefined.is_null(),
        };
        let Some(replacement) = self.hooks.dispatch(&class) else {
            return;
        };

        match jvmti.allocate_copy(&replacement) {
            Ok((mem, len)) => unsafe {
                *event.new_data_len = len;
                *event.new_data = mem;
            },
            Err(code) => warn!("cannot hand back rewritten {}: {code}", class.identity),
        }
    }
}
