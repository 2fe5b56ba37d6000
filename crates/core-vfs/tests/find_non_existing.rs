use core_vfs::{find_non_existing_item_path, MemHost, OpenFlags, VfsHost};

fn touch(host: &MemHost, path: &str) {
    let mut file = host.create_file(path).unwrap();
    file.open(OpenFlags::WRITE | OpenFlags::CREATE).unwrap();
    file.close().unwrap();
}

#[test]
fn regular_file_without_extension() {
    let host = MemHost::new();
    touch(&host, "/item");
    assert_eq!(find_non_existing_item_path("/item", &*host, None), "/item 2");
}

#[test]
fn doesnt_check_the_initial_path() {
    let host = MemHost::new();
    assert_eq!(find_non_existing_item_path("/item", &*host, None), "/item 2");
}

#[test]
fn regular_file_with_extension() {
    let host = MemHost::new();
    touch(&host, "/item.zip");
    assert_eq!(find_non_existing_item_path("/item.zip", &*host, None), "/item 2.zip");
}

#[test]
fn skips_existing_candidates() {
    let host = MemHost::new();
    touch(&host, "/item.zip");
    for i in 2..=4 {
        touch(&host, &format!("/item {i}.zip"));
    }
    assert_eq!(find_non_existing_item_path("/item.zip", &*host, None), "/item 5.zip");
}

#[test]
fn checks_magnitudes_of_tens() {
    let host = MemHost::new();
    touch(&host, "/item.zip");
    for i in 2..=9 {
        touch(&host, &format!("/item {i}.zip"));
    }
    assert_eq!(find_non_existing_item_path("/item.zip", &*host, None), "/item 10.zip");
}

#[test]
fn checks_magnitudes_of_hundreds() {
    let host = MemHost::new();
    touch(&host, "/item.zip");
    for i in 2..=99 {
        touch(&host, &format!("/item {i}.zip"));
    }
    assert_eq!(find_non_existing_item_path("/item.zip", &*host, None), "/item 100.zip");
}

#[test]
fn returns_empty_string_on_cancellation() {
    let host = MemHost::new();
    let cancel = || true;
    assert_eq!(find_non_existing_item_path("/item.zip", &*host, Some(&cancel)), "");
}
