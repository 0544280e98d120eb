use std::fs;

#[test]
fn bytes_round_trip_preserves_name_and_content() {
    let stream = tarball::from_bytes("notes/report.txt", b"line one\nline two\n").unwrap();
    let entry = tarball::first_entry(&stream).unwrap();
    assert_eq!(entry.name, "notes/report.txt");
    assert_eq!(entry.data, b"line one\nline two\n");
    assert_eq!(entry.size, 18);
}

#[test]
fn file_archive_uses_the_given_arcname() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("local-name.bin");
    fs::write(&src, b"\x00\x01\x02").unwrap();

    let stream = tarball::from_file(&src, "remote-name.bin").unwrap();
    let entry = tarball::first_entry(&stream).unwrap();
    assert_eq!(entry.name, "remote-name.bin");
    assert_eq!(entry.data, b"\x00\x01\x02");
}

#[test]
fn tree_archive_nests_entries_under_root_name() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("main.py"), b"print('hi')\n").unwrap();
    fs::create_dir(dir.path().join("pkg")).unwrap();
    fs::write(dir.path().join("pkg/util.py"), b"x = 1\n").unwrap();

    let stream = tarball::from_tree(dir.path(), "project").unwrap();
    let mut names: Vec<String> = tarball::entries(&stream)
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["project/main.py", "project/pkg/util.py"]);
}

#[test]
fn unpack_first_creates_parent_dirs_and_reports_size() {
    let stream = tarball::from_bytes("a.txt", b"hello").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("deep/nested/a.txt");

    let size = tarball::unpack_first(&stream, &dest).unwrap();
    assert_eq!(size, 5);
    assert_eq!(fs::read(&dest).unwrap(), b"hello");
}

#[test]
fn multi_entry_stream_uses_first_entry_only() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"first").unwrap();
    fs::write(dir.path().join("b.txt"), b"second").unwrap();

    let stream = tarball::from_tree(dir.path(), "out").unwrap();
    let first = tarball::first_entry(&stream).unwrap();
    let all = tarball::entries(&stream).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(first.name, all[0].name);
}
