mod common;

use common::*;

use core_ops::job::{execute, Job};
use core_ops::jobs::copying::callbacks::{CopyDestExistsResolution, LockedItemResolution};
use core_ops::jobs::copying::options::{
    ChecksumVerification, CopyingOptions, ExistBehavior, LockedItemBehavior,
};
use core_ops::jobs::copying::CopyingJob;
use core_ops::statistics::SourceType;
use core_vfs::{file_flags, Flags, HostFeatures, MemHost, VfsHost};

fn copy_options() -> CopyingOptions {
    CopyingOptions::default()
}

fn move_options() -> CopyingOptions {
    CopyingOptions {
        docopy: false,
        ..CopyingOptions::default()
    }
}

#[test]
fn copies_a_single_file_into_an_existing_directory() {
    let host = MemHost::new();
    host.create_directory("/src", 0o755).unwrap();
    host.create_directory("/dst", 0o755).unwrap();
    make_file(&host, "/src/file.txt", b"payload");

    let mut job = CopyingJob::new(
        vec![item(&host, "/src", "file.txt")],
        "/dst",
        host.clone(),
        copy_options(),
    );
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert_eq!(read_file(&*host, "/dst/file.txt"), b"payload");
    assert_eq!(read_file(&*host, "/src/file.txt"), b"payload");
    assert_eq!(
        job.base().statistics().volume_processed(SourceType::Bytes),
        7
    );
}

#[test]
fn copies_a_directory_tree_recursively() {
    let host = MemHost::new();
    host.create_directory("/src", 0o755).unwrap();
    host.create_directory("/src/tree", 0o755).unwrap();
    host.create_directory("/src/tree/sub", 0o755).unwrap();
    make_file(&host, "/src/tree/a.txt", b"aa");
    make_file(&host, "/src/tree/sub/b.txt", b"bbb");
    host.create_symlink("/src/tree/link", "/elsewhere").unwrap();
    host.create_directory("/dst", 0o755).unwrap();

    let mut job = CopyingJob::new(
        vec![item(&host, "/src", "tree")],
        "/dst",
        host.clone(),
        copy_options(),
    );
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert!(host.stat("/dst/tree", Flags::empty()).unwrap().is_dir());
    assert_eq!(read_file(&*host, "/dst/tree/a.txt"), b"aa");
    assert_eq!(read_file(&*host, "/dst/tree/sub/b.txt"), b"bbb");
    assert_eq!(host.read_symlink("/dst/tree/link").unwrap(), "/elsewhere");
}

#[test]
fn builds_missing_destination_parents() {
    let host = MemHost::new();
    host.create_directory("/src", 0o755).unwrap();
    make_file(&host, "/src/f", b"x");

    let mut job = CopyingJob::new(
        vec![item(&host, "/src", "f")],
        "/a/b/c/",
        host.clone(),
        copy_options(),
    );
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert_eq!(read_file(&*host, "/a/b/c/f"), b"x");
}

#[test]
fn move_within_one_host_renames_and_keeps_content() {
    let host = MemHost::new();
    host.create_directory("/src", 0o755).unwrap();
    host.create_directory("/dst", 0o755).unwrap();
    make_file(&host, "/src/f", b"moved");

    let mut job = CopyingJob::new(
        vec![item(&host, "/src", "f")],
        "/dst",
        host.clone(),
        move_options(),
    );
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert!(!host.exists("/src/f"));
    assert_eq!(read_file(&*host, "/dst/f"), b"moved");
}

#[test]
fn move_across_hosts_copies_then_deletes_the_source() {
    let src_host = MemHost::new();
    let dst_host = MemHost::new();
    src_host.create_directory("/src", 0o755).unwrap();
    make_file(&src_host, "/src/f", b"crossing");
    dst_host.create_directory("/dst", 0o755).unwrap();

    let mut job = CopyingJob::new(
        vec![item(&src_host, "/src", "f")],
        "/dst",
        dst_host.clone(),
        move_options(),
    );
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert!(!src_host.exists("/src/f"));
    assert_eq!(read_file(&*dst_host, "/dst/f"), b"crossing");
}

#[test]
fn move_of_a_directory_across_hosts_deletes_children_before_parents() {
    let src_host = MemHost::new();
    let dst_host = MemHost::new();
    src_host.create_directory("/d", 0o755).unwrap();
    src_host.create_directory("/d/inner", 0o755).unwrap();
    make_file(&src_host, "/d/inner/f", b"1");

    let mut job = CopyingJob::new(
        vec![item(&src_host, "/", "d")],
        "/d",
        dst_host.clone(),
        move_options(),
    );
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert!(!src_host.exists("/d"));
    assert_eq!(read_file(&*dst_host, "/d/inner/f"), b"1");
}

#[test]
fn skip_all_leaves_an_existing_destination_alone() {
    let host = MemHost::new();
    host.create_directory("/src", 0o755).unwrap();
    host.create_directory("/dst", 0o755).unwrap();
    make_file(&host, "/src/f", b"new");
    make_file(&host, "/dst/f", b"old");

    let options = CopyingOptions {
        exist_behavior: ExistBehavior::SkipAll,
        ..copy_options()
    };
    let mut job = CopyingJob::new(vec![item(&host, "/src", "f")], "/dst", host.clone(), options);
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert_eq!(read_file(&*host, "/dst/f"), b"old");
}

#[test]
fn overwrite_all_replaces_an_existing_destination() {
    let host = MemHost::new();
    host.create_directory("/src", 0o755).unwrap();
    host.create_directory("/dst", 0o755).unwrap();
    make_file(&host, "/src/f", b"new content");
    make_file(&host, "/dst/f", b"old");

    let options = CopyingOptions {
        exist_behavior: ExistBehavior::OverwriteAll,
        ..copy_options()
    };
    let mut job = CopyingJob::new(vec![item(&host, "/src", "f")], "/dst", host.clone(), options);
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert_eq!(read_file(&*host, "/dst/f"), b"new content");
}

#[test]
fn overwrite_old_skips_a_newer_destination() {
    let host = MemHost::new();
    host.create_directory("/src", 0o755).unwrap();
    host.create_directory("/dst", 0o755).unwrap();
    make_file(&host, "/src/f", b"stale");
    make_file(&host, "/dst/f", b"fresh");
    set_mtime(&host, "/src/f", 100);
    set_mtime(&host, "/dst/f", 200);

    let options = CopyingOptions {
        exist_behavior: ExistBehavior::OverwriteOld,
        ..copy_options()
    };
    let mut job = CopyingJob::new(vec![item(&host, "/src", "f")], "/dst", host.clone(), options);
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert_eq!(read_file(&*host, "/dst/f"), b"fresh");
}

#[test]
fn overwrite_old_replaces_an_older_destination() {
    let host = MemHost::new();
    host.create_directory("/src", 0o755).unwrap();
    host.create_directory("/dst", 0o755).unwrap();
    make_file(&host, "/src/f", b"fresher");
    make_file(&host, "/dst/f", b"ancient");
    set_mtime(&host, "/src/f", 200);
    set_mtime(&host, "/dst/f", 100);

    let options = CopyingOptions {
        exist_behavior: ExistBehavior::OverwriteOld,
        copy_file_times: false,
        ..copy_options()
    };
    let mut job = CopyingJob::new(vec![item(&host, "/src", "f")], "/dst", host.clone(), options);
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert_eq!(read_file(&*host, "/dst/f"), b"fresher");
}

#[test]
fn keep_both_picks_the_next_free_name() {
    let host = MemHost::new();
    host.create_directory("/src", 0o755).unwrap();
    host.create_directory("/dst", 0o755).unwrap();
    make_file(&host, "/src/item.zip", b"second");
    make_file(&host, "/dst/item.zip", b"first");

    let options = CopyingOptions {
        exist_behavior: ExistBehavior::KeepBoth,
        ..copy_options()
    };
    let mut job = CopyingJob::new(
        vec![item(&host, "/src", "item.zip")],
        "/dst",
        host.clone(),
        options,
    );
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert_eq!(read_file(&*host, "/dst/item.zip"), b"first");
    assert_eq!(read_file(&*host, "/dst/item 2.zip"), b"second");
}

#[test]
fn ask_behaviour_consults_the_conflict_callback() {
    let host = MemHost::new();
    host.create_directory("/src", 0o755).unwrap();
    host.create_directory("/dst", 0o755).unwrap();
    make_file(&host, "/src/f", b"new");
    make_file(&host, "/dst/f", b"old");

    let mut job = CopyingJob::new(
        vec![item(&host, "/src", "f")],
        "/dst",
        host.clone(),
        copy_options(),
    );
    job.callbacks.on_copy_destination_already_exists =
        Box::new(|_, _, _| CopyDestExistsResolution::Overwrite);
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert_eq!(read_file(&*host, "/dst/f"), b"new");
}

#[test]
fn verification_passes_for_an_uncorrupted_copy() {
    let host = MemHost::new();
    host.create_directory("/src", 0o755).unwrap();
    host.create_directory("/dst", 0o755).unwrap();
    let content: Vec<u8> = (0..100_000u32).map(|v| v as u8).collect();
    make_file(&host, "/src/big", &content);

    let failures = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let failures2 = std::sync::Arc::clone(&failures);
    let options = CopyingOptions {
        verification: ChecksumVerification::Always,
        ..copy_options()
    };
    let mut job = CopyingJob::new(vec![item(&host, "/src", "big")], "/dst", host.clone(), options);
    job.callbacks.on_file_verification_failed = Box::new(move |path, _| {
        failures2.lock().unwrap().push(path.to_string());
    });
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert!(failures.lock().unwrap().is_empty());
    assert_eq!(read_file(&*host, "/dst/big"), content);
}

#[test]
fn locked_source_move_unlocks_when_told_to() {
    let host = MemHost::new();
    host.create_directory("/src", 0o755).unwrap();
    host.create_directory("/dst", 0o755).unwrap();
    make_file(&host, "/src/f", b"locked");
    host.set_flags("/src/f", file_flags::UF_IMMUTABLE, Flags::NO_FOLLOW)
        .unwrap();

    let options = CopyingOptions {
        docopy: false,
        locked_items_behavior: LockedItemBehavior::UnlockAll,
        ..CopyingOptions::default()
    };
    let mut job = CopyingJob::new(vec![item(&host, "/src", "f")], "/dst", host.clone(), options);
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert!(!host.exists("/src/f"));
    assert_eq!(read_file(&*host, "/dst/f"), b"locked");
}

#[test]
fn locked_source_move_can_be_resolved_by_the_callback() {
    let host = MemHost::new();
    host.create_directory("/src", 0o755).unwrap();
    host.create_directory("/dst", 0o755).unwrap();
    make_file(&host, "/src/f", b"locked");
    host.set_flags("/src/f", file_flags::UF_IMMUTABLE, Flags::NO_FOLLOW)
        .unwrap();

    let mut job = CopyingJob::new(
        vec![item(&host, "/src", "f")],
        "/dst",
        host.clone(),
        move_options(),
    );
    job.callbacks.on_locked_item_issue = Box::new(|_, _, _, _| LockedItemResolution::Unlock);
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert_eq!(read_file(&*host, "/dst/f"), b"locked");
}

#[test]
fn sidecar_files_are_not_copied_when_the_volume_lacks_xattr_storage() {
    let host = MemHost::new();
    host.set_features(HostFeatures::SET_TIMES | HostFeatures::SET_PERMISSIONS);
    host.create_directory("/src", 0o755).unwrap();
    host.create_directory("/src/d", 0o755).unwrap();
    make_file(&host, "/src/d/x", b"payload");
    make_file(&host, "/src/d/._x", b"ea blob");
    host.create_directory("/dst", 0o755).unwrap();

    let mut job = CopyingJob::new(
        vec![item(&host, "/src", "d")],
        "/dst",
        host.clone(),
        copy_options(),
    );
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert_eq!(read_file(&*host, "/dst/d/x"), b"payload");
    assert!(!host.exists("/dst/d/._x"));
}

#[test]
fn stopping_before_execution_copies_nothing() {
    let host = MemHost::new();
    host.create_directory("/src", 0o755).unwrap();
    host.create_directory("/dst", 0o755).unwrap();
    make_file(&host, "/src/f", b"data");

    let mut job = CopyingJob::new(
        vec![item(&host, "/src", "f")],
        "/dst",
        host.clone(),
        copy_options(),
    );
    job.base().control().stop();
    execute(&mut job);

    assert!(job.base().control().is_stopped());
    assert!(!host.exists("/dst/f"));
}

#[test]
fn item_reports_mark_processed_files() {
    let host = MemHost::new();
    host.create_directory("/src", 0o755).unwrap();
    host.create_directory("/dst", 0o755).unwrap();
    make_file(&host, "/src/f", b"data");

    let sink = ReportSink::new();
    let mut job = CopyingJob::new(
        vec![item(&host, "/src", "f")],
        "/dst",
        host.clone(),
        copy_options(),
    );
    sink.attach(job.base());
    execute(&mut job);

    assert_eq!(sink.processed_paths(), vec!["/src/f".to_string()]);
}
