mod common;

use std::fs;
use std::path::Path;

use common::{support_jar, FakeHost, FakeLink};
use playout_agent::bootstrap::AgentBootstrap;
use playout_agent::injector::SupportInjector;
use playout_agent::trace::{Recorder, TraceEntry, TraceKind};

fn run(jar: &Path, options: &str, calls: &[(&str, usize)]) {
    let host = FakeHost::new().with_app_class("app/Main");
    let link = FakeLink::default();
    let ctx = AgentBootstrap::new(SupportInjector::with_archive(jar))
        .attach(&host, &link, options)
        .unwrap();
    let recorder = link.recorder();
    for &(target, times) in calls {
        for _ in 0..times {
            recorder.record(TraceEntry::new(TraceKind::ClassGetMethod, target, "app.Main.main", Some(7), "run"));
        }
    }
    assert!(ctx.terminate());
}

#[test]
fn counts_accumulate_across_runs() {
    let tmp = tempfile::tempdir().unwrap();
    let jar = support_jar(tmp.path(), true);
    let out = tmp.path().join("out");
    let options = format!("count,{}", out.display());

    run(&jar, &options, &[("app.A", 2), ("app.B", 1)]);
    run(&jar, &options, &[("app.A", 3), ("app.C", 1)]);

    assert_eq!(
        fs::read_to_string(out.join("refl.log")).unwrap(),
        "Class.getMethod;app.A;app.Main.main;7;run;5\n\
         Class.getMethod;app.B;app.Main.main;7;run;1\n\
         Class.getMethod;app.C;app.Main.main;7;run;1\n"
    );
}

#[test]
fn foreign_lines_survive_a_merge() {
    let tmp = tempfile::tempdir().unwrap();
    let jar = support_jar(tmp.path(), true);
    let out = tmp.path().join("out");
    fs::create_dir_all(&out).unwrap();
    fs::write(
        out.join("refl.log"),
        "# collected on build host\nClass.getMethod;app.A;app.Main.main;7;run;4\n",
    )
    .unwrap();

    run(&jar, &format!("verbose,count,{}", out.display()), &[("app.A", 1)]);

    assert_eq!(
        fs::read_to_string(out.join("refl.log")).unwrap(),
        "Class.getMethod;app.A;app.Main.main;7;run;5\n# collected on build host\n"
    );
}

#[test]
fn a_run_without_calls_keeps_the_log() {
    let tmp = tempfile::tempdir().unwrap();
    let jar = support_jar(tmp.path(), true);
    let out = tmp.path().join("out");
    let options = format!("count,{}", out.display());

    run(&jar, &options, &[("app.A", 1)]);
    run(&jar, &options, &[]);

    assert_eq!(
        fs::read_to_string(out.join("refl.log")).unwrap(),
        "Class.getMethod;app.A;app.Main.main;7;run;1\n"
    );
}

#[test]
fn an_uncounted_run_does_not_erase_counts() {
    let tmp = tempfile::tempdir().unwrap();
    let jar = support_jar(tmp.path(), true);
    let out = tmp.path().join("out");
    let counted = format!("count,{}", out.display());
    let plain = out.display().to_string();
    let log = || fs::read_to_string(out.join("refl.log")).unwrap();

    run(&jar, &counted, &[("app.A", 3)]);
    assert_eq!(log(), "Class.getMethod;app.A;app.Main.main;7;run;3\n");
    run(&jar, &plain, &[("app.A", 3), ("app.B", 1)]);
    assert_eq!(
        log(),
        "Class.getMethod;app.A;app.Main.main;7;run;6\n\
         Class.getMethod;app.B;app.Main.main;7;run\n"
    );
    run(&jar, &counted, &[("app.A", 3)]);
    assert_eq!(
        log(),
        "Class.getMethod;app.A;app.Main.main;7;run;9\n\
         Class.getMethod;app.B;app.Main.main;7;run\n"
    );
}
