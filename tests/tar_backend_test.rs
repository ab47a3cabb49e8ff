mod common;

use common::{Kind, find, names, read_tar, read_tar_bz2, read_tar_gz};
use relocpack::{ArchiveOptions, ArchiveWriter, TarArchive, TarMode, archive};
use std::io::Cursor;
use tempfile::TempDir;

#[test]
fn test_tar_bz2_round_trip() {
    let dir = TempDir::new().unwrap();
    common::sample_tree(dir.path());

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = archive(
        &mut cursor,
        "env.tar.bz2",
        "env",
        "tar.bz2",
        &ArchiveOptions::default(),
    )
    .unwrap();
    writer.add(dir.path().join("bin"), "bin").unwrap();
    writer.add(dir.path().join("bin/tool"), "bin/tool").unwrap();
    writer
        .add(dir.path().join("lib/libfoo.so"), "lib/libfoo.so")
        .unwrap();
    writer.finish().unwrap();

    let entries = read_tar_bz2(cursor.get_ref());
    assert_eq!(names(&entries), vec!["env/bin", "env/bin/tool", "env/lib/libfoo.so"]);

    assert_eq!(find(&entries, "env/bin").kind, Kind::Directory);
    let tool = find(&entries, "env/bin/tool");
    assert_eq!(tool.kind, Kind::File);
    assert_eq!(tool.data, b"#!/bin/sh\necho tool\n");
    #[cfg(unix)]
    assert_eq!(tool.mode & 0o777, 0o755);
    assert_eq!(find(&entries, "env/lib/libfoo.so").data, b"libfoo");
}

#[test]
fn test_directory_is_added_without_children() {
    let dir = TempDir::new().unwrap();
    common::sample_tree(dir.path());

    let mut cursor = Cursor::new(Vec::new());
    let writer = archive(
        &mut cursor,
        "env.tar.bz2",
        "env",
        "tar.bz2",
        &ArchiveOptions::default(),
    )
    .unwrap();
    relocpack::scoped(writer, |writer| writer.add(dir.path(), "")).unwrap();

    let entries = read_tar_bz2(cursor.get_ref());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "env");
    assert_eq!(entries[0].kind, Kind::Directory);
}

#[cfg(unix)]
#[test]
fn test_dangling_symlink_is_archived_as_link() {
    let dir = TempDir::new().unwrap();
    let link = dir.path().join("python");
    std::os::unix::fs::symlink("python3.12", &link).unwrap();

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = archive(
        &mut cursor,
        "env.tar.bz2",
        "env",
        "tar.bz2",
        &ArchiveOptions::default(),
    )
    .unwrap();
    writer.add(&link, "bin/python").unwrap();
    writer.finish().unwrap();

    let entries = read_tar_bz2(cursor.get_ref());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "env/bin/python");
    assert_eq!(entries[0].kind, Kind::Symlink);
    assert_eq!(entries[0].link.as_deref(), Some("python3.12"));
    assert!(entries[0].data.is_empty());
}

#[test]
fn test_add_bytes_uses_data_length() {
    let dir = TempDir::new().unwrap();
    let reference = dir.path().join("activate");
    std::fs::write(&reference, vec![b'x'; 4096]).unwrap();

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = archive(
        &mut cursor,
        "env.tar.bz2",
        "env",
        "tar.bz2",
        &ArchiveOptions::default(),
    )
    .unwrap();
    writer.add_bytes(&reference, b"hello", "bin/activate").unwrap();
    writer.finish().unwrap();

    let entries = read_tar_bz2(cursor.get_ref());
    let activate = find(&entries, "env/bin/activate");
    assert_eq!(activate.kind, Kind::File);
    assert_eq!(activate.data, b"hello");
}

#[test]
fn test_invalid_bzip2_level_is_rejected() {
    let mut cursor = Cursor::new(Vec::new());
    let options = ArchiveOptions::new().compress_level(0);
    let result = archive(&mut cursor, "env.tar.bz2", "env", "tar.bz2", &options);
    assert!(matches!(result, Err(relocpack::Error::InvalidArgument(_))));
}

#[test]
fn test_plain_and_gzip_modes() {
    let dir = TempDir::new().unwrap();
    common::sample_tree(dir.path());
    let source = dir.path().join("lib/libfoo.so");

    let mut plain = Vec::new();
    {
        let backend = TarArchive::new(&mut plain, TarMode::Plain);
        let mut writer = ArchiveWriter::new("plain.tar", "env", Box::new(backend));
        writer.add(&source, "lib/libfoo.so").unwrap();
        writer.finish().unwrap();
    }
    let entries = read_tar(plain.as_slice());
    assert_eq!(names(&entries), vec!["env/lib/libfoo.so"]);

    let mut gzip = Vec::new();
    {
        let backend = TarArchive::new(&mut gzip, TarMode::Gzip(9));
        let mut writer = ArchiveWriter::new("gzip.tar.gz", "env", Box::new(backend));
        writer.add(&source, "lib/libfoo.so").unwrap();
        writer.finish().unwrap();
    }
    assert_eq!(&gzip[..2], &[0x1f, 0x8b]);
    let entries = read_tar_gz(&gzip);
    assert_eq!(find(&entries, "env/lib/libfoo.so").data, b"libfoo");
}

#[test]
fn test_abandoned_writer_still_produces_valid_stream() {
    let dir = TempDir::new().unwrap();
    common::sample_tree(dir.path());

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = archive(
            &mut cursor,
            "env.tar.bz2",
            "env",
            "tar.bz2",
            &ArchiveOptions::default(),
        )
        .unwrap();
        writer
            .add(dir.path().join("lib/libfoo.so"), "lib/libfoo.so")
            .unwrap();
    }

    let entries = read_tar_bz2(cursor.get_ref());
    assert_eq!(names(&entries), vec!["env/lib/libfoo.so"]);
}

#[cfg(unix)]
#[test]
fn test_add_bytes_keeps_long_link_target() {
    let dir = TempDir::new().unwrap();
    let long_target = format!("{}/libpython3.12.so.1.0", "nested-directory".repeat(8));
    assert!(long_target.len() > 100);
    let link = dir.path().join("libpython.so");
    std::os::unix::fs::symlink(&long_target, &link).unwrap();

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = archive(
        &mut cursor,
        "env.tar.bz2",
        "env",
        "tar.bz2",
        &ArchiveOptions::default(),
    )
    .unwrap();
    writer.add_bytes(&link, b"", "lib/libpython.so").unwrap();
    writer
        .add_bytes(&link, b"ignored", "lib/libpython-alias.so")
        .unwrap();
    writer.finish().unwrap();

    let entries = read_tar_bz2(cursor.get_ref());
    assert_eq!(
        names(&entries),
        vec!["env/lib/libpython.so", "env/lib/libpython-alias.so"]
    );
    for entry in &entries {
        assert_eq!(entry.kind, Kind::Symlink);
        assert_eq!(entry.link.as_deref(), Some(long_target.as_str()));
        assert!(entry.data.is_empty());
    }
}
