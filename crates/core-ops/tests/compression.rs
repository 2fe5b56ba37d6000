mod common;

use common::*;

use std::io::Read;

use core_ops::job::{execute, Job};
use core_ops::jobs::compression::CompressionJob;
use core_vfs::{MemHost, VfsHost};

fn archive_bytes(host: &MemHost, path: &str) -> Vec<u8> {
    read_file(host, path)
}

#[test]
fn packs_a_tree_into_a_zip() {
    let host = MemHost::new();
    host.create_directory("/src", 0o755).unwrap();
    host.create_directory("/src/tree", 0o755).unwrap();
    host.create_directory("/src/tree/sub", 0o755).unwrap();
    make_file(&host, "/src/tree/a.txt", b"alpha");
    make_file(&host, "/src/tree/sub/b.txt", b"bravo bravo");
    host.create_directory("/out", 0o755).unwrap();

    let mut job = CompressionJob::new(
        vec![item(&host, "/src", "tree")],
        "/out",
        host.clone(),
        String::new(),
    );
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert_eq!(job.target_archive_path(), "/out/tree.zip");

    let bytes = archive_bytes(&host, "/out/tree.zip");
    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let names: Vec<String> = (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .collect();
    assert!(names.iter().any(|n| n == "tree/a.txt"));
    assert!(names.iter().any(|n| n == "tree/sub/b.txt"));

    let mut content = String::new();
    zip.by_name("tree/a.txt")
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    assert_eq!(content, "alpha");
}

#[test]
fn an_occupied_archive_name_moves_to_the_next_free_one() {
    let host = MemHost::new();
    host.create_directory("/src", 0o755).unwrap();
    make_file(&host, "/src/doc", b"1");
    host.create_directory("/out", 0o755).unwrap();
    make_file(&host, "/out/doc.zip", b"taken");

    let mut job = CompressionJob::new(
        vec![item(&host, "/src", "doc")],
        "/out",
        host.clone(),
        String::new(),
    );
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert_eq!(job.target_archive_path(), "/out/doc 2.zip");
    assert_eq!(read_file(&*host, "/out/doc.zip"), b"taken");
}

#[test]
fn multiple_items_produce_an_archive_named_archive() {
    let host = MemHost::new();
    host.create_directory("/src", 0o755).unwrap();
    make_file(&host, "/src/a", b"1");
    make_file(&host, "/src/b", b"2");
    host.create_directory("/out", 0o755).unwrap();

    let mut job = CompressionJob::new(
        vec![item(&host, "/src", "a"), item(&host, "/src", "b")],
        "/out",
        host.clone(),
        String::new(),
    );
    execute(&mut job);

    assert!(job.base().control().is_completed());
    assert_eq!(job.target_archive_path(), "/out/Archive.zip");
}

#[test]
fn an_empty_source_set_still_yields_a_readable_archive() {
    let host = MemHost::new();
    host.create_directory("/out", 0o755).unwrap();

    let mut job = CompressionJob::new(Vec::new(), "/out", host.clone(), String::new());
    execute(&mut job);

    assert!(job.base().control().is_completed());
    let bytes = archive_bytes(&host, "/out/Archive.zip");
    let zip = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    assert!(zip.len() <= 1);
}

#[test]
fn an_encrypted_archive_requires_the_password() {
    let host = MemHost::new();
    host.create_directory("/src", 0o755).unwrap();
    make_file(&host, "/src/secret", b"classified");
    host.create_directory("/out", 0o755).unwrap();

    let mut job = CompressionJob::new(
        vec![item(&host, "/src", "secret")],
        "/out",
        host.clone(),
        "hunter2".into(),
    );
    assert!(job.is_encrypted());
    execute(&mut job);
    assert!(job.base().control().is_completed());

    let bytes = archive_bytes(&host, "/out/secret.zip");
    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let mut content = Vec::new();
    zip.by_index_decrypt(0, b"hunter2")
        .unwrap()
        .read_to_end(&mut content)
        .unwrap();
    assert_eq!(content, b"classified");
}

#[test]
fn symlinks_are_stored_as_links() {
    let host = MemHost::new();
    host.create_directory("/src", 0o755).unwrap();
    host.create_directory("/src/d", 0o755).unwrap();
    host.create_symlink("/src/d/link", "/pointee").unwrap();
    host.create_directory("/out", 0o755).unwrap();

    let mut job = CompressionJob::new(
        vec![item(&host, "/src", "d")],
        "/out",
        host.clone(),
        String::new(),
    );
    execute(&mut job);
    assert!(job.base().control().is_completed());

    let bytes = archive_bytes(&host, "/out/d.zip");
    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let mut content = String::new();
    zip.by_name("d/link")
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    assert_eq!(content, "/pointee");
}
