#![allow(dead_code)]

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use playout_agent::bootstrap::SupportLink;
use playout_agent::error::{HostError, LinkError};
use playout_agent::hooks::{ClassFileEvent, ClassIdentity, HookRegistry, LoaderId};
use playout_agent::host::{ClassKind, InstrumentationHost, LoadedClass};
use playout_agent::injector::SUPPORT_MARKER;
use playout_agent::installer::{CallSiteRewriter, INTERCEPT_TARGETS};
use playout_agent::trace::TraceRecorder;
use zip::write::FileOptions;
use zip::ZipWriter;

pub const APP_LOADER: LoaderId = LoaderId::Object(0x1234);

pub struct FakeClass {
    pub identity: ClassIdentity,
    pub kind: ClassKind,
    pub modifiable: bool,
    pub bytecode: Vec<u8>,
    pub fail_retransform: bool,
}

/// An in-memory VM: a fixed set of loaded classes whose bytecode is routed
/// through the hook registry on retransformation.
pub struct FakeHost {
    pub retransform_supported: bool,
    classes: Vec<FakeClass>,
    hooks: Arc<HookRegistry>,
    pub appended: Mutex<Vec<PathBuf>>,
    /// Bytecode installed by retransformation, by class index.
    pub redefined: Mutex<HashMap<usize, Vec<u8>>>,
}

impl FakeHost {
    /// A VM with the reflective dispatch classes, `java/lang/String`, a
    /// hidden class the VM refuses to modify, a primitive and an array, and
    /// no application classes.
    pub fn new() -> Self {
        let mut host = FakeHost {
            retransform_supported: true,
            classes: Vec::new(),
            hooks: HookRegistry::new(),
            appended: Mutex::new(Vec::new()),
            redefined: Mutex::new(HashMap::new()),
        };
        for target in INTERCEPT_TARGETS {
            host = host.with_class(ClassIdentity::bootstrap(target), true);
        }
        host.with_class(ClassIdentity::bootstrap("java/lang/String"), true)
            .with_class(ClassIdentity::bootstrap("java/lang/invoke/LambdaForm$MH"), false)
            .with_special("I", ClassKind::Primitive)
            .with_special("[Ljava/lang/Object;", ClassKind::Array)
    }

    pub fn with_class(mut self, identity: ClassIdentity, modifiable: bool) -> Self {
        let bytecode = format!("bytes of {}", identity.name).into_bytes();
        self.classes.push(FakeClass {
            identity,
            kind: ClassKind::Instance,
            modifiable,
            bytecode,
            fail_retransform: false,
        });
        self
    }

    pub fn with_app_class(self, name: &str) -> Self {
        self.with_class(ClassIdentity::new(name, APP_LOADER), true)
    }

    pub fn with_failing_class(self, name: &str) -> Self {
        self.with_app_class(name).fail_retransform_of(name)
    }

    /// Makes every retransformation of `name` fail.
    pub fn fail_retransform_of(mut self, name: &str) -> Self {
        for class in self.classes.iter_mut().filter(|c| c.identity.name == name) {
            class.fail_retransform = true;
        }
        self
    }

    pub fn without_class(mut self, name: &str) -> Self {
        self.classes.retain(|c| c.identity.name != name);
        self
    }

    fn with_special(mut self, signature: &str, kind: ClassKind) -> Self {
        self.classes.push(FakeClass {
            identity: ClassIdentity::bootstrap(signature),
            kind,
            modifiable: false,
            bytecode: Vec::new(),
            fail_retransform: false,
        });
        self
    }

    pub fn without_retransform(mut self) -> Self {
        self.retransform_supported = false;
        self
    }

    /// Defines a new class, as the VM would on first load.
    pub fn load_class(&self, identity: ClassIdentity, bytecode: &[u8]) -> Vec<u8> {
        let event = ClassFileEvent { identity, bytecode, redefining: false };
        self.hooks.dispatch(&event).unwrap_or_else(|| bytecode.to_vec())
    }

    pub fn redefined_bytes(&self, name: &str) -> Option<Vec<u8>> {
        let index = self.classes.iter().position(|c| c.identity.name == name)?;
        self.redefined.lock().unwrap().get(&index).cloned()
    }
}

impl InstrumentationHost for FakeHost {
    type Class = usize;

    fn can_retransform(&self) -> bool {
        self.retransform_supported
    }

    fn loaded_classes(&self) -> Result<Vec<LoadedClass<usize>>, HostError> {
        Ok(self
            .classes
            .iter()
            .enumerate()
            .map(|(handle, c)| LoadedClass {
                handle,
                identity: c.identity.clone(),
                kind: c.kind,
                modifiable: c.modifiable,
            })
            .collect())
    }

    fn retransform(&self, classes: &[usize]) -> Result<(), HostError> {
        for &index in classes {
            let class = &self.classes[index];
            if class.fail_retransform || !class.modifiable {
                return Err(HostError::Other(format!("cannot retransform {}", class.identity.name)));
            }
            let event = ClassFileEvent {
                identity: class.identity.clone(),
                bytecode: &class.bytecode,
                redefining: true,
            };
            if let Some(bytes) = self.hooks.dispatch(&event) {
                self.redefined.lock().unwrap().insert(index, bytes);
            }
        }
        Ok(())
    }

    fn append_to_bootstrap_search(&self, archive: &Path) -> Result<(), HostError> {
        self.appended.lock().unwrap().push(archive.to_path_buf());
        Ok(())
    }

    fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }
}

/// Appends `+traced` to every class it is given.
pub struct MarkingRewriter;

pub const MARK: &[u8] = b"+traced";

impl CallSiteRewriter for MarkingRewriter {
    fn rewrite(&self, _class_name: &str, bytecode: &[u8]) -> Option<Vec<u8>> {
        let mut out = bytecode.to_vec();
        out.extend_from_slice(MARK);
        Some(out)
    }
}

/// Stands in for the JNI link: keeps the recorder so tests can play the
/// part of the rewritten dispatch classes.
#[derive(Default)]
pub struct FakeLink {
    pub recorder: Mutex<Option<Arc<TraceRecorder>>>,
}

impl FakeLink {
    pub fn recorder(&self) -> Arc<TraceRecorder> {
        self.recorder.lock().unwrap().clone().expect("link was not called")
    }
}

impl SupportLink for FakeLink {
    fn link(&self, recorder: Arc<TraceRecorder>) -> Result<Arc<dyn CallSiteRewriter>, LinkError> {
        *self.recorder.lock().unwrap() = Some(recorder);
        Ok(Arc::new(MarkingRewriter))
    }
}

/// Writes a support archive into `dir`, with or without the marker class.
pub fn support_jar(dir: &Path, with_marker: bool) -> PathBuf {
    let path = dir.join("playout-rt.jar");
    let mut zip = ZipWriter::new(File::create(&path).unwrap());
    zip.start_file("playout/rt/ReflectionRewriter.class", FileOptions::default()).unwrap();
    zip.write_all(&[0xca, 0xfe, 0xba, 0xbe]).unwrap();
    if with_marker {
        zip.start_file(SUPPORT_MARKER, FileOptions::default()).unwrap();
        zip.write_all(&[0xca, 0xfe, 0xba, 0xbe]).unwrap();
    }
    zip.finish().unwrap();
    path
}
