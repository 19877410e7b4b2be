//! End-to-end copies through `--local`, with real `tar` processes on both sides

use predicates::prelude::*;

fn setup_test_env() -> (tempfile::TempDir, tempfile::TempDir) {
    let src_dir = tempfile::tempdir().unwrap();
    let dst_dir = tempfile::tempdir().unwrap();
    (src_dir, dst_dir)
}

/// Where `path` lands when extracted under `dst`: tar strips the leading `/`
fn extracted(dst: &std::path::Path, path: &std::path::Path) -> std::path::PathBuf {
    dst.join(path.strip_prefix("/").unwrap())
}

fn podcp_local(src_path: &std::path::Path, dst_dir: &std::path::Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("podcp").unwrap();
    cmd.args([
        "--local",
        "--src-pod",
        "pod-a",
        "--src-path",
        src_path.to_str().unwrap(),
        "--dst-pod",
        "pod-b",
        "--dst-dir",
        dst_dir.to_str().unwrap(),
    ]);
    cmd
}

#[test]
fn test_copy_single_file() {
    let (src_dir, dst_dir) = setup_test_env();
    let src_file = src_dir.path().join("report.txt");
    std::fs::write(&src_file, "quarterly numbers\n").unwrap();
    podcp_local(&src_file, dst_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Copy succeeded"));
    let copied = extracted(dst_dir.path(), &src_file);
    assert_eq!(
        std::fs::read_to_string(copied).unwrap(),
        "quarterly numbers\n"
    );
}

#[test]
fn test_copy_directory_larger_than_buffer() {
    let (src_dir, dst_dir) = setup_test_env();
    let tree = src_dir.path().join("data");
    std::fs::create_dir_all(tree.join("nested/deeper")).unwrap();
    let big: Vec<u8> = (0..3 * 1024 * 1024u32).map(|i| (i % 253) as u8).collect();
    std::fs::write(tree.join("big.bin"), &big).unwrap();
    std::fs::write(tree.join("nested/a.txt"), "a").unwrap();
    std::fs::write(tree.join("nested/deeper/b.txt"), "b").unwrap();
    podcp_local(&tree, dst_dir.path())
        .args(["--buffer-size", "4KiB"])
        .assert()
        .success();
    let copied = extracted(dst_dir.path(), &tree);
    assert_eq!(std::fs::read(copied.join("big.bin")).unwrap(), big);
    assert_eq!(
        std::fs::read_to_string(copied.join("nested/a.txt")).unwrap(),
        "a"
    );
    assert_eq!(
        std::fs::read_to_string(copied.join("nested/deeper/b.txt")).unwrap(),
        "b"
    );
}

#[test]
fn test_summary_reports_bytes() {
    let (src_dir, dst_dir) = setup_test_env();
    let src_file = src_dir.path().join("small.txt");
    std::fs::write(&src_file, "x").unwrap();
    podcp_local(&src_file, dst_dir.path())
        .arg("--summary")
        .assert()
        .success()
        .stdout(predicate::str::contains("bytes relayed:"))
        .stdout(predicate::str::contains("elapsed:"));
}

#[test]
fn test_missing_source_path_fails() {
    let (src_dir, dst_dir) = setup_test_env();
    let missing = src_dir.path().join("does-not-exist");
    podcp_local(&missing, dst_dir.path())
        .args(["--diagnostics", "discard"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("Copy succeeded").not())
        .stderr(predicate::str::contains("failed"));
}

#[test]
fn test_missing_destination_dir_fails() {
    let (src_dir, dst_dir) = setup_test_env();
    let src_file = src_dir.path().join("report.txt");
    std::fs::write(&src_file, "content").unwrap();
    let missing = dst_dir.path().join("no-such-dir");
    podcp_local(&src_file, &missing)
        .args(["--diagnostics", "discard"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("destination failed"));
    assert!(!missing.exists());
}

#[test]
fn test_missing_archiver_is_reported() {
    let (src_dir, dst_dir) = setup_test_env();
    let src_file = src_dir.path().join("report.txt");
    std::fs::write(&src_file, "content").unwrap();
    podcp_local(&src_file, dst_dir.path())
        .args(["--tar-command", "/nonexistent/tar"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not found"))
        .stderr(predicate::str::contains("/nonexistent/tar"));
}

#[test]
fn test_timeout_tears_down_both_sides() {
    use std::os::unix::fs::PermissionsExt;
    let (src_dir, dst_dir) = setup_test_env();
    let src_file = src_dir.path().join("report.txt");
    std::fs::write(&src_file, "content").unwrap();
    // an archiver that never finishes, on both sides
    let slow_tar = src_dir.path().join("slow-tar");
    std::fs::write(&slow_tar, "#!/bin/sh\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&slow_tar, std::fs::Permissions::from_mode(0o755)).unwrap();
    let start = std::time::Instant::now();
    podcp_local(&src_file, dst_dir.path())
        .args(["--tar-command", slow_tar.to_str().unwrap(), "--timeout", "1s"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("Copy succeeded").not())
        .stderr(predicate::str::contains("copy timed out after 1s"));
    assert!(
        start.elapsed() < std::time::Duration::from_secs(15),
        "took {:?}",
        start.elapsed()
    );
}
