mod common;

use std::fs;

use common::{FakeHost, APP_LOADER};
use playout_agent::error::SnapshotError;
use playout_agent::hooks::{ClassIdentity, HookPhase, LoaderId};
use playout_agent::host::InstrumentationHost;
use playout_agent::snapshot::{capture_late, ClassArchive, ClassSnapshotter};

#[test]
fn archives_every_eligible_class_and_skips_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new()
        .with_app_class("app/Main")
        .with_app_class("app/model/Order")
        .with_class(ClassIdentity::new("lib/Codec", LoaderId::Object(7)), true);
    let archive = ClassArchive::new();

    let report = ClassSnapshotter::snapshot(&host, &archive, dir.path()).unwrap();
    // three app classes, three dispatch classes and java/lang/String
    assert_eq!(report.archived, 7);
    assert_eq!(report.persisted, 7);
    // the hidden LambdaForm class, a primitive and an array
    assert_eq!(report.skipped, 3);
    assert!(report.warnings.is_empty());

    assert_eq!(fs::read(dir.path().join("app/model/Order.class")).unwrap(), b"bytes of app/model/Order");
    assert_eq!(fs::read(dir.path().join("lib/Codec.class")).unwrap(), b"bytes of lib/Codec");
    assert_eq!(fs::read(dir.path().join("java/lang/String.class")).unwrap(), b"bytes of java/lang/String");
    assert!(!dir.path().join("java/lang/invoke/LambdaForm$MH.class").exists());
    assert!(archive.is_empty());
    assert!(host.hooks().is_empty());
}

#[test]
fn each_unarchivable_class_yields_one_warning() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new()
        .with_class(ClassIdentity::new("app/Sealed", APP_LOADER), false)
        .with_failing_class("app/Broken")
        .with_app_class("app/Fine");
    let archive = ClassArchive::new();

    let report = ClassSnapshotter::snapshot(&host, &archive, dir.path()).unwrap();
    assert_eq!(report.archived, 5);
    assert_eq!(report.warnings.len(), 2);
    assert!(report.warnings.iter().any(|w| w == "cannot archive class app/Sealed"));
    assert!(report.warnings.iter().any(|w| w.starts_with("cannot archive class app/Broken: ")));
    assert!(dir.path().join("app/Fine.class").exists());
}

#[test]
fn modifiable_platform_classes_are_archived() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new()
        .with_class(ClassIdentity::bootstrap("java/lang/Thread"), true)
        .with_class(ClassIdentity::bootstrap("java/lang/ref/Finalizer"), false);
    let archive = ClassArchive::new();

    let report = ClassSnapshotter::snapshot(&host, &archive, dir.path()).unwrap();
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert_eq!(report.skipped, 4);
    for name in ["java/lang/Thread", "java/lang/Class", "java/lang/reflect/Method", "java/lang/reflect/Constructor"] {
        let path = dir.path().join(format!("{name}.class"));
        assert_eq!(fs::read(&path).unwrap(), format!("bytes of {name}").into_bytes(), "{name}");
    }
    assert!(!dir.path().join("java/lang/ref/Finalizer.class").exists());
}

#[test]
fn hook_is_removed_when_persisting_fails() {
    let dir = tempfile::tempdir().unwrap();
    let blocked = dir.path().join("blocked");
    fs::write(&blocked, "").unwrap();
    let host = FakeHost::new().with_app_class("app/Main");
    let archive = ClassArchive::new();

    let err = ClassSnapshotter::snapshot(&host, &archive, &blocked).unwrap_err();
    assert!(matches!(err, SnapshotError::Persist { .. }));
    assert!(host.hooks().is_empty());
}

#[test]
fn late_capture_lasts_until_released() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new();
    let archive = ClassArchive::new();

    let registration = capture_late(host.hooks(), &archive);
    assert_eq!(registration.phase(), HookPhase::LateCapture);
    host.load_class(ClassIdentity::new("app/Plugin", APP_LOADER), b"plugin");
    assert!(archive.contains(&ClassIdentity::new("app/Plugin", APP_LOADER)));

    drop(registration);
    host.load_class(ClassIdentity::new("app/Later", APP_LOADER), b"later");
    assert_eq!(archive.len(), 1);

    assert_eq!(archive.persist_all(dir.path()).unwrap(), 1);
    assert_eq!(fs::read(dir.path().join("app/Plugin.class")).unwrap(), b"plugin");
}
