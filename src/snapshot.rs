//! Archiving the bytecode of already-loaded classes.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use crate::error::SnapshotError;
use crate::hooks::{ClassFileEvent, ClassFileHook, ClassIdentity, HookPhase, HookRegistration, HookRegistry, LoaderId};
use crate::host::{ClassKind, InstrumentationHost};

/// In-memory class archive, one record per class identity.
#[derive(Debug, Default)]
pub struct ClassArchive {
    records: Mutex<BTreeMap<ClassIdentity, Vec<u8>>>,
    /// Loader whose class owns each file written so far, by class name.
    owners: Mutex<BTreeMap<String, LoaderId>>,
}

/// A pending write of one class's bytecode.
#[must_use]
pub struct ClassWrite<'a> {
    archive: &'a ClassArchive,
    identity: ClassIdentity,
}

impl ClassWrite<'_> {
    /// Stores `bytes`, replacing any earlier record for the same class.
    pub fn write_bytecode(self, bytes: &[u8]) {
        self.archive
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(self.identity, bytes.to_vec());
    }
}

impl ClassArchive {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn begin_class_write(&self, identity: ClassIdentity) -> ClassWrite<'_> {
        ClassWrite { archive: self, identity }
    }

    pub fn contains(&self, identity: &ClassIdentity) -> bool {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes every buffered record to `<dir>/<internal/name>.class` and
    /// empties the buffer. Returns the number of files written.
    ///
    /// The file for a name belongs to the first loader whose class was
    /// written there, the bootstrap loader first. Same-named classes of other
    /// loaders are reported and left out.
    pub fn persist_all(&self, dir: &Path) -> io::Result<usize> {
        let records = std::mem::take(&mut *self.records.lock().unwrap_or_else(|e| e.into_inner()));
        let mut owners = self.owners.lock().unwrap_or_else(|e| e.into_inner());
        let mut written = 0;
        for (identity, bytes) in records {
            let Some(path) = class_path(dir, &identity.name) else {
                warn!("not archiving class with unusable name {:?}", identity.name);
                continue;
            };
            let owner = *owners.entry(identity.name.clone()).or_insert(identity.loader);
            if owner != identity.loader {
                warn!(
                    "not archiving {identity}: {} already holds the class of another loader",
                    path.display()
                );
                continue;
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &bytes)?;
            written += 1;
        }
        debug!("persisted {written} classes to {}", dir.display());
        Ok(written)
    }
}

impl ClassFileHook for ClassArchive {
    fn on_class_file(&self, event: &ClassFileEvent<'_>) -> Option<Vec<u8>> {
        self.begin_class_write(event.identity.clone()).write_bytecode(event.bytecode);
        None
    }
}

fn class_path(dir: &Path, internal_name: &str) -> Option<PathBuf> {
    let (package, simple) = match internal_name.rsplit_once('/') {
        Some((package, simple)) => (Some(package), simple),
        None => (None, internal_name),
    };
    let mut path = dir.to_path_buf();
    for segment in package.into_iter().flat_map(|p| p.split('/')).chain([simple]) {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
            return None;
        }
        path.push(segment);
    }
    path.set_file_name(format!("{simple}.class"));
    Some(path)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SnapshotReport {
    pub archived: usize,
    /// Unmodifiable primitives, arrays and platform-core classes passed
    /// over silently.
    pub skipped: usize,
    /// Classes that should have been archived but were not.
    pub warnings: Vec<String>,
    /// Class files written to the destination directory.
    pub persisted: usize,
}

pub struct ClassSnapshotter;

impl ClassSnapshotter {
    /// Routes the current bytecode of every eligible loaded class into
    /// `archive` and persists it under `dir`.
    ///
    /// The snapshot hook is only registered for the duration of this call.
    pub fn snapshot<H>(
        host: &H,
        archive: &Arc<ClassArchive>,
        dir: &Path,
    ) -> Result<SnapshotReport, SnapshotError>
    where
        H: InstrumentationHost + ?Sized,
    {
        let classes = host.loaded_classes()?;
        let mut report = SnapshotReport::default();

        let registration =
            host.hooks().install(HookPhase::Snapshot, Arc::clone(archive) as Arc<dyn ClassFileHook>);

        for class in &classes {
            if !class.modifiable {
                if class.kind != ClassKind::Instance || class.is_platform_core() {
                    report.skipped += 1;
                } else {
                    report.warnings.push(unarchived(&class.identity, None));
                }
                continue;
            }
            match host.retransform(&[class.handle]) {
                Ok(()) if archive.contains(&class.identity) => report.archived += 1,
                Ok(()) => report.warnings.push(unarchived(&class.identity, None)),
                Err(e) => report.warnings.push(unarchived(&class.identity, Some(e.to_string()))),
            }
        }

        let persisted = archive.persist_all(dir);
        drop(registration);

        report.persisted = persisted.map_err(|source| SnapshotError::Persist {
            dir: dir.to_path_buf(),
            source,
        })?;
        info!(
            "archived {} loaded classes ({} skipped, {} not archivable)",
            report.archived,
            report.skipped,
            report.warnings.len()
        );
        Ok(report)
    }
}

fn unarchived(identity: &ClassIdentity, cause: Option<String>) -> String {
    let message = match cause {
        Some(cause) => format!("cannot archive class {}: {cause}", identity.name),
        None => format!("cannot archive class {}", identity.name),
    };
    warn!("{message}");
    message
}

/// Keeps archiving classes loaded after the snapshot until the returned
/// registration is dropped.
pub fn capture_late(hooks: &Arc<HookRegistry>, archive: &Arc<ClassArchive>) -> HookRegistration {
    hooks.install(HookPhase::LateCapture, Arc::clone(archive) as Arc<dyn ClassFileHook>)
}
