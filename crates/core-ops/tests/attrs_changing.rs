mod common;

use common::*;

use core_ops::job::{execute, Job};
use core_ops::jobs::attrs_changing::{
    AttrsChangingCommand, AttrsChangingJob, FlagChanges, Ownage, Permissions, Times,
};
use core_ops::operation::{Operation, OperationState};
use core_vfs::{file_flags, Flags, MemHost, VfsHost};

#[test]
fn chmod_of_a_single_file() {
    let host = MemHost::new();
    make_file(&host, "/target", b"x");
    host.set_permissions("/target", 0o755).unwrap();

    let command = AttrsChangingCommand {
        items: vec![item(&host, "/", "target")],
        permissions: Some(Permissions {
            grp_r: Some(false),
            grp_x: Some(false),
            oth_r: Some(false),
            oth_x: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    };
    let op = Operation::new("attrs", Box::new(AttrsChangingJob::new(command)), "chmod");
    op.start();
    assert!(op.wait_for(std::time::Duration::from_secs(5)));

    assert_eq!(op.state(), OperationState::Completed);
    assert_eq!(stat_mode(&host, "/target"), 0o700);
}

#[test]
fn recursive_chflags_reports_every_item() {
    let host = MemHost::new();
    host.create_directory("/test", 0o755).unwrap();
    host.create_directory("/test/dir", 0o755).unwrap();
    make_file(&host, "/test/dir/file.txt", b"x");

    let command = AttrsChangingCommand {
        items: vec![item(&host, "/", "test")],
        flags: Some(FlagChanges {
            u_hidden: Some(true),
            ..Default::default()
        }),
        apply_to_subdirs: true,
        ..Default::default()
    };
    let sink = ReportSink::new();
    let mut job = AttrsChangingJob::new(command);
    sink.attach(job.base());
    execute(&mut job);

    assert!(job.base().control().is_completed());
    for path in ["/test", "/test/dir", "/test/dir/file.txt"] {
        let st = host.stat(path, Flags::empty()).unwrap();
        assert_ne!(st.flags & file_flags::UF_HIDDEN, 0, "no flag on {path}");
    }
    let mut processed = sink.processed_paths();
    processed.sort();
    assert_eq!(
        processed,
        vec![
            "/test".to_string(),
            "/test/dir".to_string(),
            "/test/dir/file.txt".to_string()
        ]
    );
}

#[test]
fn chown_changes_ownership() {
    let host = MemHost::new();
    make_file(&host, "/f", b"x");

    let command = AttrsChangingCommand {
        items: vec![item(&host, "/", "f")],
        ownage: Some(Ownage {
            uid: Some(501),
            gid: Some(20),
        }),
        ..Default::default()
    };
    let mut job = AttrsChangingJob::new(command);
    execute(&mut job);

    assert!(job.base().control().is_completed());
    let st = host.stat("/f", Flags::empty()).unwrap();
    assert_eq!((st.uid, st.gid), (501, 20));
}

#[test]
fn mtime_is_applied() {
    let host = MemHost::new();
    make_file(&host, "/f", b"x");

    let command = AttrsChangingCommand {
        items: vec![item(&host, "/", "f")],
        times: Some(Times {
            mtime: Some(123_456),
            ..Default::default()
        }),
        ..Default::default()
    };
    let mut job = AttrsChangingJob::new(command);
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert_eq!(host.stat("/f", Flags::empty()).unwrap().mtime.sec, 123_456);
}

#[test]
fn a_command_without_changes_is_a_no_op() {
    let host = MemHost::new();
    make_file(&host, "/f", b"x");

    let command = AttrsChangingCommand {
        items: vec![item(&host, "/", "f")],
        ..Default::default()
    };
    let mut job = AttrsChangingJob::new(command);
    execute(&mut job);
    assert!(job.base().control().is_completed());
}
