//! Raw FFI bindings for the parts of JNI and JVMTI the agent calls.
//!
//! Both vtables keep the exact slot layout of `jni.h` / `jvmti.h`. Slots the
//! agent never calls are declared as opaque `reserved*` arrays so every named
//! function pointer still lands on its real offset.

pub mod jni;
pub mod jvmti;
