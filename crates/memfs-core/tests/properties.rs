// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Behavioural properties of the filesystem engine

use memfs_core::{ErrorKind, FsConfig, FsCore, LinkKind, OpenMode, Permissions, MAX_FILES};

fn create_test_fs() -> FsCore {
    FsCore::new(FsConfig::in_memory()).expect("init")
}

fn write(fs: &mut FsCore, path: &str, data: &[u8]) {
    let h = fs.open_file(path, OpenMode::Write).unwrap();
    fs.write_file(h, data).unwrap();
    fs.close_file(h).unwrap();
}

fn read(fs: &mut FsCore, path: &str) -> Vec<u8> {
    let h = fs.open_file(path, OpenMode::Read).unwrap();
    let data = fs.read_file(h).unwrap();
    fs.close_file(h).unwrap();
    data
}

#[test]
fn current_path_resolves_back_to_cwd() {
    let mut fs = create_test_fs();
    fs.create_directory("/a").unwrap();
    fs.create_directory("/a/b").unwrap();
    fs.create_directory("/a/b/c").unwrap();
    fs.create_symbolic_link("/a/b", "/shortcut").unwrap();

    for path in ["/a", "/a/b", "/a/b/c", "/shortcut/c", "/a/b/c/../..", "/"] {
        let target = fs.get_file_by_path(path).unwrap();
        fs.change_directory(path).unwrap();
        let cwd = fs.get_current_path().unwrap();
        assert_eq!(fs.get_file_by_path(&cwd).unwrap(), target, "via {}", path);
    }
}

#[test]
fn capacity_is_exact() {
    let mut fs = create_test_fs();
    for i in 0..MAX_FILES {
        fs.create_file(&format!("/f{}", i)).unwrap();
    }
    let err = fs.create_file("/overflow").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
    let err = fs.create_directory("/overflow").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CapacityExceeded);

    fs.delete_file("/f0").unwrap();
    fs.create_file("/overflow").unwrap();
    assert_eq!(fs.stats().nodes, MAX_FILES);
}

#[test]
fn hard_link_write_propagates() {
    let mut fs = create_test_fs();
    fs.create_directory("/a").unwrap();
    fs.create_file("/a/b.txt").unwrap();
    write(&mut fs, "/a/b.txt", b"x");
    fs.create_hard_link("/a/b.txt", "/a/c.txt").unwrap();

    write(&mut fs, "/a/c.txt", b"y");
    assert_eq!(read(&mut fs, "/a/b.txt"), b"y");
}

#[test]
fn deleting_one_alias_keeps_the_other() {
    let mut fs = create_test_fs();
    fs.create_file("/a").unwrap();
    write(&mut fs, "/a", b"shared");
    fs.create_hard_link("/a", "/b").unwrap();
    let bytes_before = fs.stats().content_bytes;

    fs.delete_file("/a").unwrap();
    assert_eq!(read(&mut fs, "/b"), b"shared");
    let info = fs.stat("/b").unwrap();
    assert_eq!(info.refcount, 1);
    assert_eq!(info.link, LinkKind::None);
    assert_eq!(fs.stats().content_bytes, bytes_before);

    fs.delete_file("/b").unwrap();
    assert_eq!(fs.stats().content_bytes, 0);
    assert_eq!(fs.stats().nodes, 0);
}

#[test]
fn read_only_file_rejects_write_open() {
    let mut fs = create_test_fs();
    fs.create_file("/f").unwrap();
    fs.set_permissions("/f", Permissions::Read).unwrap();
    let err = fs.open_file("/f", OpenMode::Write).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    fs.open_file("/f", OpenMode::Read).unwrap();
}

#[test]
fn permissions_follow_hard_links() {
    let mut fs = create_test_fs();
    fs.create_file("/f").unwrap();
    fs.create_hard_link("/f", "/g").unwrap();
    fs.set_permissions("/g", Permissions::Write).unwrap();
    assert_eq!(fs.stat("/f").unwrap().permissions, Permissions::Write);
    let err = fs.open_file("/f", OpenMode::Read).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[test]
fn dangling_symlink() {
    let mut fs = create_test_fs();
    fs.create_directory("/a").unwrap();
    fs.create_symbolic_link("/a/missing", "/a/link").unwrap();
    let err = fs.open_file("/a/link", OpenMode::Read).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn symlink_to_deleted_target() {
    let mut fs = create_test_fs();
    fs.create_file("/target").unwrap();
    fs.create_symbolic_link("/target", "/link").unwrap();
    fs.open_file("/link", OpenMode::Read).unwrap();
    fs.delete_file("/target").unwrap();
    let err = fs.open_file("/link", OpenMode::Read).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn name_collision() {
    let mut fs = create_test_fs();
    fs.create_directory("/a").unwrap();
    fs.create_file("/a/b.txt").unwrap();
    let err = fs.create_file("/a/b.txt").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    let err = fs.create_directory("/a/b.txt").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(fs.list_files("/a").unwrap(), vec!["b.txt"]);
}

#[test]
fn move_into_descendant_leaves_tree_unchanged() {
    let mut fs = create_test_fs();
    fs.create_directory("/a").unwrap();
    fs.create_directory("/a/sub").unwrap();
    fs.create_file("/a/sub/f").unwrap();
    let before = (fs.list_files("/").unwrap(), fs.list_files("/a").unwrap());

    let err = fs.move_file("/a", "/a/sub").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CyclicLink);

    let after = (fs.list_files("/").unwrap(), fs.list_files("/a").unwrap());
    assert_eq!(before, after);
    assert_eq!(fs.list_files("/a/sub").unwrap(), vec!["f"]);
    assert_eq!(fs.stats().nodes, 3);
}

#[test]
fn cyclic_symlinks_are_reported() {
    let mut fs = create_test_fs();
    fs.create_symbolic_link("/b", "/a").unwrap();
    fs.create_symbolic_link("/a", "/b").unwrap();
    let err = fs.open_file("/a", OpenMode::Read).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CyclicLink);
    assert_eq!(fs.read_link("/a").unwrap(), "/b");
}

#[test]
fn path_too_long_is_rejected() {
    let mut fs = create_test_fs();
    let limits = fs.config().limits.clone();
    let name = "d".repeat(limits.max_name_length);
    // Nest directories until the next level would overflow the path limit
    let mut path = String::new();
    loop {
        let next = format!("{}/{}", path, name);
        if next.len() > limits.max_path_length {
            break;
        }
        fs.create_directory(&next).unwrap();
        path = next;
    }
    fs.change_directory(&path).unwrap();
    let err = fs.create_directory(&name).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathTooLong);
    assert!(fs.get_current_path().unwrap().len() <= limits.max_path_length);
}

#[test]
fn move_respects_path_limit() {
    let mut config = FsConfig::in_memory();
    config.limits.max_path_length = 12;
    let mut fs = FsCore::new(config).unwrap();
    fs.create_directory("/abcde").unwrap();
    fs.create_directory("/abcde/fg").unwrap();
    fs.create_directory("/hijkl").unwrap();
    // "/hijkl/abcde/fg" would be 15 bytes
    let err = fs.move_file("/abcde", "/hijkl").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathTooLong);
    assert_eq!(fs.list_files("/").unwrap(), vec!["abcde", "hijkl"]);
}

#[test]
fn failed_operations_do_not_consume_capacity() {
    let mut config = FsConfig::in_memory();
    config.limits.max_files = 2;
    let mut fs = FsCore::new(config).unwrap();
    fs.create_file("/a").unwrap();
    assert!(fs.create_file("/a").is_err());
    assert!(fs.create_hard_link("/missing", "/b").is_err());
    fs.create_file("/b").unwrap();
    assert_eq!(fs.stats().nodes, 2);
}
