// playout-agent/src/sys/jni.rs
//
// JNI (Java Native Interface) bindings, restricted to the functions the
// agent calls. Slot indices follow jni.h (0-based); gaps are reserved arrays.
//
// The JNI function table has been append-only since JDK 1.6, so the
// indices below are valid for every JDK the agent supports (8+).

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

use std::ffi::{c_char, c_void};

pub type jint = i32;
pub type jlong = i64;
pub type jbyte = i8;
pub type jboolean = u8;
pub type jsize = jint;

// References are opaque to the agent.
pub type jobject = *mut c_void;
pub type jclass = jobject;
pub type jstring = jobject;
pub type jarray = jobject;
pub type jthread = jobject;
pub type jbyteArray = jarray;
pub type jmethodID = *mut c_void;

/// Argument slot for the `Call*MethodA` family. Only object arguments are
/// passed; `j` keeps the union at eight bytes on every target.
#[repr(C)]
#[derive(Copy, Clone)]
pub union jvalue {
    pub j: jlong,
    pub l: jobject,
}

pub const JNI_OK: jint = 0;
pub const JNI_ERR: jint = -1;

pub const JNI_VERSION_1_6: jint = 0x0001_0006;

/// One entry for `RegisterNatives`.
#[repr(C)]
pub struct JNINativeMethod {
    pub name: *const c_char,
    pub signature: *const c_char,
    pub fnPtr: *mut c_void,
}

pub type JNIEnv = *const JNINativeInterface_;
pub type JavaVM = *const JNIInvokeInterface_;

#[repr(C)]
pub struct JNINativeInterface_ {
    // 0-3: Reserved
    pub reserved0_3: [*mut c_void; 4],
    // 4-5: GetVersion, DefineClass
    pub reserved4_5: [*mut c_void; 2],

    // 6: FindClass
    pub FindClass: unsafe extern "system" fn(env: *mut JNIEnv, name: *const c_char) -> jclass,

    // 7-15: reflection bridges, hierarchy, Throw*, ExceptionOccurred
    pub reserved7_15: [*mut c_void; 9],

    // 16-17: Exceptions
    pub ExceptionDescribe: unsafe extern "system" fn(env: *mut JNIEnv),
    pub ExceptionClear: unsafe extern "system" fn(env: *mut JNIEnv),

    // 18-20: FatalError, local frames
    pub reserved18_20: [*mut c_void; 3],

    // 21: NewGlobalRef
    pub NewGlobalRef: unsafe extern "system" fn(env: *mut JNIEnv, obj: jobject) -> jobject,
    // 22: DeleteGlobalRef
    pub reserved22: [*mut c_void; 1],
    // 23: DeleteLocalRef
    pub DeleteLocalRef: unsafe extern "system" fn(env: *mut JNIEnv, obj: jobject),

    // 24-112: object, instance method and field operations
    pub reserved24_112: [*mut c_void; 89],

    // 113: GetStaticMethodID
    pub GetStaticMethodID: unsafe extern "system" fn(
        env: *mut JNIEnv,
        cls: jclass,
        name: *const c_char,
        sig: *const c_char,
    ) -> jmethodID,

    // 114-115: CallStaticObjectMethod, CallStaticObjectMethodV
    pub reserved114_115: [*mut c_void; 2],

    // 116: CallStaticObjectMethodA
    pub CallStaticObjectMethodA: unsafe extern "system" fn(
        env: *mut JNIEnv,
        cls: jclass,
        methodID: jmethodID,
        args: *const jvalue,
    ) -> jobject,

    // 117-166: remaining static calls, static fields, UTF-16 strings
    pub reserved117_166: [*mut c_void; 50],

    // 167: NewStringUTF
    pub NewStringUTF: unsafe extern "system" fn(env: *mut JNIEnv, utf: *const c_char) -> jstring,
    // 168: GetStringUTFLength
    pub reserved168: [*mut c_void; 1],
    // 169-170: UTF string access
    pub GetStringUTFChars:
        unsafe extern "system" fn(env: *mut JNIEnv, str: jstring, isCopy: *mut jboolean) -> *const c_char,
    pub ReleaseStringUTFChars:
        unsafe extern "system" fn(env: *mut JNIEnv, str: jstring, chars: *const c_char),

    // 171: GetArrayLength
    pub GetArrayLength: unsafe extern "system" fn(env: *mut JNIEnv, array: jarray) -> jsize,

    // 172-175: object arrays, NewBooleanArray
    pub reserved172_175: [*mut c_void; 4],

    // 176: NewByteArray
    pub NewByteArray: unsafe extern "system" fn(env: *mut JNIEnv, len: jsize) -> jbyteArray,

    // 177-199: other array constructors, element access, GetBooleanArrayRegion
    pub reserved177_199: [*mut c_void; 23],

    // 200: GetByteArrayRegion
    pub GetByteArrayRegion: unsafe extern "system" fn(
        env: *mut JNIEnv,
        array: jbyteArray,
        start: jsize,
        len: jsize,
        buf: *mut jbyte,
    ),

    // 201-207
    pub reserved201_207: [*mut c_void; 7],

    // 208: SetByteArrayRegion
    pub SetByteArrayRegion: unsafe extern "system" fn(
        env: *mut JNIEnv,
        array: jbyteArray,
        start: jsize,
        len: jsize,
        buf: *const jbyte,
    ),

    // 209-214
    pub reserved209_214: [*mut c_void; 6],

    // 215: RegisterNatives
    pub RegisterNatives: unsafe extern "system" fn(
        env: *mut JNIEnv,
        clazz: jclass,
        methods: *const JNINativeMethod,
        nMethods: jint,
    ) -> jint,

    // 216-227: UnregisterNatives, monitors, critical regions, weak refs
    pub reserved216_227: [*mut c_void; 12],

    // 228: ExceptionCheck
    pub ExceptionCheck: unsafe extern "system" fn(env: *mut JNIEnv) -> jboolean,
}

#[repr(C)]
pub struct JNIInvokeInterface_ {
    pub reserved0: *mut c_void,
    pub reserved1: *mut c_void,
    pub reserved2: *mut c_void,

    pub DestroyJavaVM: unsafe extern "system" fn(vm: *mut JavaVM) -> jint,
    pub AttachCurrentThread:
        unsafe extern "system" fn(vm: *mut JavaVM, penv: *mut *mut c_void, args: *mut c_void) -> jint,
    pub DetachCurrentThread: unsafe extern "system" fn(vm: *mut JavaVM) -> jint,
    pub GetEnv:
        unsafe extern "system" fn(vm: *mut JavaVM, penv: *mut *mut c_void, version: jint) -> jint,
    pub AttachCurrentThreadAsDaemon:
        unsafe extern "system" fn(vm: *mut JavaVM, penv: *mut *mut c_void, args: *mut c_void) -> jint,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    const SLOT: usize = size_of::<*mut c_void>();

    #[test]
    fn native_interface_slots_match_jni_h() {
        assert_eq!(offset_of!(JNINativeInterface_, FindClass), 6 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, ExceptionDescribe), 16 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, NewGlobalRef), 21 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, DeleteLocalRef), 23 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, GetStaticMethodID), 113 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, CallStaticObjectMethodA), 116 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, NewStringUTF), 167 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, GetStringUTFChars), 169 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, GetArrayLength), 171 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, NewByteArray), 176 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, GetByteArrayRegion), 200 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, SetByteArrayRegion), 208 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, RegisterNatives), 215 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, ExceptionCheck), 228 * SLOT);
    }

    #[test]
    fn invoke_interface_get_env_slot() {
        assert_eq!(offset_of!(JNIInvokeInterface_, GetEnv), 6 * SLOT);
    }
}
