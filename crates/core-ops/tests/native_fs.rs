//! Jobs driven against the real filesystem through the native host.

use std::sync::Arc;

use core_ops::job::{execute, Job};
use core_ops::jobs::copying::options::{ChecksumVerification, CopyingOptions};
use core_ops::jobs::copying::CopyingJob;
use core_ops::jobs::linkage::{LinkageJob, LinkageType};
use core_vfs::{ListingItem, NativeHost, VfsHostPtr};

fn native_item(host: &Arc<NativeHost>, directory: &str, name: &str) -> ListingItem {
    init_tracing();
    let host: VfsHostPtr = host.clone();
    ListingItem::from_stat(host, directory, name).unwrap()
}

/// RUST_LOG-driven output for debugging failing runs.
fn init_tracing() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

#[test]
fn copies_a_file_between_directories() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let host = NativeHost::new();
    let src_dir = dir.path().join("src");
    let dst_dir = dir.path().join("dst");
    std::fs::create_dir(&src_dir)?;
    std::fs::create_dir(&dst_dir)?;
    let payload: Vec<u8> = (0..200_000u32).map(|v| (v % 251) as u8).collect();
    std::fs::write(src_dir.join("blob.bin"), &payload)?;

    let mut job = CopyingJob::new(
        vec![native_item(&host, src_dir.to_str().unwrap(), "blob.bin")],
        dst_dir.to_str().unwrap(),
        host.clone(),
        CopyingOptions {
            verification: ChecksumVerification::Always,
            copy_unix_owners: false,
            ..CopyingOptions::default()
        },
    );
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert_eq!(std::fs::read(dst_dir.join("blob.bin"))?, payload);
    assert_eq!(std::fs::read(src_dir.join("blob.bin"))?, payload);
    Ok(())
}

#[test]
fn moves_a_file_within_the_same_volume_by_renaming() {
    let dir = tempfile::tempdir().unwrap();
    let host = NativeHost::new();
    let src_dir = dir.path().join("src");
    let dst_dir = dir.path().join("dst");
    std::fs::create_dir(&src_dir).unwrap();
    std::fs::create_dir(&dst_dir).unwrap();
    std::fs::write(src_dir.join("f.txt"), b"moved").unwrap();

    let mut job = CopyingJob::new(
        vec![native_item(&host, src_dir.to_str().unwrap(), "f.txt")],
        dst_dir.to_str().unwrap(),
        host.clone(),
        CopyingOptions {
            docopy: false,
            copy_unix_owners: false,
            ..CopyingOptions::default()
        },
    );
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert!(!src_dir.join("f.txt").exists());
    assert_eq!(std::fs::read(dst_dir.join("f.txt")).unwrap(), b"moved");
}

#[test]
fn copies_a_tree_with_symlinks_preserved() {
    let dir = tempfile::tempdir().unwrap();
    let host = NativeHost::new();
    let src_dir = dir.path().join("src");
    std::fs::create_dir_all(src_dir.join("tree/sub")).unwrap();
    std::fs::write(src_dir.join("tree/a"), b"a").unwrap();
    std::fs::write(src_dir.join("tree/sub/b"), b"b").unwrap();
    std::os::unix::fs::symlink("sub/b", src_dir.join("tree/lnk")).unwrap();
    let dst_dir = dir.path().join("dst");
    std::fs::create_dir(&dst_dir).unwrap();

    let mut job = CopyingJob::new(
        vec![native_item(&host, src_dir.to_str().unwrap(), "tree")],
        dst_dir.to_str().unwrap(),
        host.clone(),
        CopyingOptions {
            copy_unix_owners: false,
            ..CopyingOptions::default()
        },
    );
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert_eq!(std::fs::read(dst_dir.join("tree/a")).unwrap(), b"a");
    assert_eq!(std::fs::read(dst_dir.join("tree/sub/b")).unwrap(), b"b");
    let link = std::fs::read_link(dst_dir.join("tree/lnk")).unwrap();
    assert_eq!(link.to_str().unwrap(), "sub/b");
}

#[test]
fn creates_a_hardlink_on_the_native_host() {
    let dir = tempfile::tempdir().unwrap();
    let host = NativeHost::new();
    let original = dir.path().join("orig");
    std::fs::write(&original, b"shared").unwrap();
    let link = dir.path().join("hard");

    let mut job = LinkageJob::new(
        link.to_str().unwrap().to_string(),
        original.to_str().unwrap().to_string(),
        host.clone(),
        LinkageType::CreateHardlink,
    );
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert_eq!(std::fs::read(&link).unwrap(), b"shared");
    let a = std::fs::metadata(&original).unwrap();
    let b = std::fs::metadata(&link).unwrap();
    assert_eq!(
        std::os::unix::fs::MetadataExt::ino(&a),
        std::os::unix::fs::MetadataExt::ino(&b)
    );
}
