//! Safe wrappers over the JVMTI and JNI environment pointers.
//!
//! [`Jvmti`] covers what the agent needs from JVMTI: capabilities, event
//! setup, loaded-class inspection, retransformation, JVMTI-owned memory and
//! the bootstrap class loader search path. [`JniEnv`] covers the calls into
//! the support runtime. Every operation reports host failures through
//! `Result` or `Option`.
//!
//! ```rust,ignore
//! use playout_agent::env::Jvmti;
//!
//! let jvmti = Jvmti::new(vm)?;
//! let caps = jvmti.add_capabilities_with(|c| c.set_can_retransform_classes(true))?;
//! if caps.can_retransform_classes() {
//!     jvmti.retransform_classes(&classes)?;
//! }
//! ```
//!
//! A `JniEnv` is only valid on the thread it was obtained on; use
//! [`JniEnv::from_vm`] on other threads.

pub use crate::jni_wrapper::{JniEnv, LocalRef};
pub use crate::jvmti_wrapper::Jvmti;
