use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::process::{Command, Output};
use tempfile::TempDir;

fn stampkeeper(args: &[&str], lock_dir: &TempDir) -> Output {
    Command::new(env!("CARGO_BIN_EXE_stampkeeper"))
        .args(args)
        .env("NO_COLOR", "1")
        // Keep the instance lock away from other test runs
        .env("TMPDIR", lock_dir.path())
        .env("TEMP", lock_dir.path())
        .env("TMP", lock_dir.path())
        .output()
        .expect("Failed to run stampkeeper")
}

#[test]
fn test_cli_missing_directory_fails() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope");
    let output_file = tmp.path().join("files.json");

    let output = stampkeeper(
        &["--path", missing.to_str().unwrap(), "--output", output_file.to_str().unwrap()],
        &tmp,
    );

    assert!(!output.status.success(), "missing directory must fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("doesn't exist"), "Unexpected stderr: {}", stderr);
    assert!(!output_file.exists());
}

#[test]
fn test_cli_empty_directory_writes_no_snapshot() {
    let root = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let output_file = work.path().join("files.json");

    let output = stampkeeper(
        &["-p", root.path().to_str().unwrap(), "-o", output_file.to_str().unwrap()],
        &work,
    );

    assert!(!output.status.success(), "empty inventory must fail");
    assert!(!output_file.exists());
}

#[test]
fn test_cli_snapshot_then_restore() -> anyhow::Result<()> {
    let root = TempDir::new()?;
    let work = TempDir::new()?;
    let output_file = work.path().join("files.json");
    let file = root.path().join("photo.jpg");
    fs::write(&file, b"pixels")?;
    fs::write(root.path().join(".hidden"), b"skip me")?;
    set_file_mtime(&file, FileTime::from_unix_time(1_000_000_000, 0))?;

    let root_arg = root.path().to_str().unwrap();
    let out_arg = output_file.to_str().unwrap();

    let output = stampkeeper(&["-p", root_arg, "-o", out_arg], &work);
    assert!(output.status.success(), "first run failed: {:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[OK]"), "Unexpected stdout: {}", stdout);

    let saved = fs::read_to_string(&output_file)?;
    assert!(saved.contains("\"photo.jpg\""));
    assert!(!saved.contains(".hidden"));

    // Simulate a copy tool bumping the modification time
    set_file_mtime(&file, FileTime::from_unix_time(1_700_000_000, 0))?;

    let output = stampkeeper(&["-p", root_arg, "-o", out_arg, "--restore", "-j", "2"], &work);
    assert!(output.status.success(), "restore run failed: {:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("RESTORED MTIME"), "Unexpected stdout: {}", stdout);
    assert!(stdout.contains("photo.jpg"));

    let meta = fs::metadata(&file)?;
    assert_eq!(FileTime::from_last_modification_time(&meta).unix_seconds(), 1_000_000_000);
    Ok(())
}

#[test]
fn test_cli_rejects_zero_workers() {
    let root = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    fs::write(root.path().join("a.txt"), "a").unwrap();
    let output_file = work.path().join("files.json");

    let output = stampkeeper(
        &[
            "-p",
            root.path().to_str().unwrap(),
            "-o",
            output_file.to_str().unwrap(),
            "--workers",
            "0",
        ],
        &work,
    );

    assert!(!output.status.success());
    assert!(!output_file.exists());
}

#[test]
fn test_cli_missing_output_directory_fails() {
    let root = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    fs::write(root.path().join("a.txt"), "a").unwrap();
    let output_file = work.path().join("no-such-dir").join("files.json");

    let output = stampkeeper(
        &["-p", root.path().to_str().unwrap(), "-o", output_file.to_str().unwrap()],
        &work,
    );

    assert!(!output.status.success(), "unwritable output must fail");
    assert!(!output_file.exists());
    assert!(!work.path().join("no-such-dir").exists());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stdout.contains("extract infos for all files:"), "Unexpected stdout: {}", stdout);
    assert!(stderr.contains("[KO]"), "Unexpected stderr: {}", stderr);
    assert!(stderr.contains("Can't write file"), "Unexpected stderr: {}", stderr);
}
