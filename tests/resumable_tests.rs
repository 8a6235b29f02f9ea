// Tests for the resumable uploader

mod common;

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use common::MockRemote;
use internxt_backup::remote::RemoteClient;
use internxt_backup::transfer::{ResumableUploader, RESUMABLE_THRESHOLD};

/// A file one byte past the resumable threshold; sparse, so cheap to create.
fn large_file(dir: &Path) -> PathBuf {
    let path = dir.join("big.bin");
    let file = File::create(&path).unwrap();
    file.set_len(RESUMABLE_THRESHOLD + 1).unwrap();
    path
}

fn uploader(remote: Arc<MockRemote>, state_dir: &TempDir) -> ResumableUploader {
    ResumableUploader::new(remote)
        .with_state_dir(state_dir.path().to_path_buf())
        .with_delay_fn(|_| Duration::ZERO)
}

#[tokio::test]
async fn test_sub_threshold_file_is_delegated() {
    let dir = TempDir::new().unwrap();
    let state_dir = TempDir::new().unwrap();
    let file = common::write_file(dir.path(), "small.txt", b"hello");

    let remote = Arc::new(MockRemote::new());
    let uploader = uploader(Arc::clone(&remote), &state_dir);

    let report = uploader
        .upload_large_file(&file, "/Backups/small.txt", None)
        .await;

    assert!(report.success);
    assert_eq!(report.bytes_uploaded, 5);
    assert_eq!(remote.upload_count(), 1);
    // No state file for delegated uploads
    assert!(!uploader.can_resume(&file));
}

#[tokio::test]
async fn test_sub_threshold_failure_reports_zero_bytes() {
    let dir = TempDir::new().unwrap();
    let state_dir = TempDir::new().unwrap();
    let file = common::write_file(dir.path(), "small.txt", b"hello");

    let remote = Arc::new(MockRemote::new());
    remote.fail_upload("/Backups/small.txt", u32::MAX);
    let uploader = uploader(Arc::clone(&remote), &state_dir);

    let report = uploader
        .upload_large_file(&file, "/Backups/small.txt", None)
        .await;

    assert!(!report.success);
    assert_eq!(report.bytes_uploaded, 0);
}

#[tokio::test]
async fn test_success_clears_state_and_progress() {
    let dir = TempDir::new().unwrap();
    let state_dir = TempDir::new().unwrap();
    let file = large_file(dir.path());

    let remote = Arc::new(MockRemote::new());
    let uploader = uploader(Arc::clone(&remote), &state_dir);

    let report = uploader
        .upload_large_file(&file, "/Backups/big.bin", None)
        .await;

    assert!(report.success);
    assert_eq!(report.bytes_uploaded, RESUMABLE_THRESHOLD + 1);
    assert!(!uploader.state_path(&file).exists());
    assert_eq!(uploader.get_progress(&file), 0);
    assert!(!uploader.can_resume(&file));
}

#[tokio::test]
async fn test_exhausted_retries_persist_state() {
    let dir = TempDir::new().unwrap();
    let state_dir = TempDir::new().unwrap();
    let file = large_file(dir.path());

    let remote = Arc::new(MockRemote::new());
    remote.fail_upload("/Backups/big.bin", u32::MAX);
    let uploader = uploader(Arc::clone(&remote), &state_dir);

    let report = uploader
        .upload_large_file(&file, "/Backups/big.bin", None)
        .await;

    assert!(!report.success);
    assert!(report.error.unwrap().contains("connection reset"));
    // Initial attempt plus three retries
    assert_eq!(remote.upload_count(), 4);
    assert!(uploader.state_path(&file).exists());
    assert!(uploader.can_resume(&file));
}

#[tokio::test]
async fn test_retry_succeeds_within_the_ladder() {
    let dir = TempDir::new().unwrap();
    let state_dir = TempDir::new().unwrap();
    let file = large_file(dir.path());

    let remote = Arc::new(MockRemote::new());
    remote.fail_upload("/Backups/big.bin", 2);
    let uploader = uploader(Arc::clone(&remote), &state_dir);

    let report = uploader
        .upload_large_file(&file, "/Backups/big.bin", None)
        .await;

    assert!(report.success);
    assert_eq!(remote.upload_count(), 3);
    assert!(!uploader.state_path(&file).exists());
}

#[tokio::test]
async fn test_persisted_state_allows_resume_on_next_invocation() {
    let dir = TempDir::new().unwrap();
    let state_dir = TempDir::new().unwrap();
    let file = large_file(dir.path());

    let remote = Arc::new(MockRemote::new());
    remote.fail_upload("/Backups/big.bin", u32::MAX);
    let uploader = uploader(Arc::clone(&remote), &state_dir);

    let first = uploader
        .upload_large_file(&file, "/Backups/big.bin", None)
        .await;
    assert!(!first.success);
    assert!(uploader.can_resume(&file));

    // The connection recovers; the next invocation resumes and completes
    remote.fail_upload("/Backups/big.bin", 0);
    let second = uploader
        .upload_large_file(&file, "/Backups/big.bin", None)
        .await;
    assert!(second.success);
    assert!(!uploader.can_resume(&file));
}

#[tokio::test]
async fn test_checksum_mismatch_discards_stale_state() {
    let dir = TempDir::new().unwrap();
    let state_dir = TempDir::new().unwrap();
    let file = large_file(dir.path());

    let remote = Arc::new(MockRemote::new());
    remote.fail_upload("/Backups/big.bin", u32::MAX);
    let uploader = uploader(Arc::clone(&remote), &state_dir);

    // Plant state for different content
    let stale = serde_json::json!({
        "filePath": file.to_string_lossy(),
        "remotePath": "/Backups/big.bin",
        "chunkSize": 50 * 1024 * 1024u64,
        "totalChunks": 3,
        "uploadedChunks": [0, 1],
        "checksum": "not-the-real-checksum",
        "timestamp": "2024-01-01T00:00:00Z"
    });
    fs::write(
        uploader.state_path(&file),
        serde_json::to_string_pretty(&stale).unwrap(),
    )
    .unwrap();

    let report = uploader
        .upload_large_file(&file, "/Backups/big.bin", None)
        .await;
    assert!(!report.success);

    // The persisted state was rebuilt from scratch
    let raw = fs::read_to_string(uploader.state_path(&file)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["uploadedChunks"].as_array().unwrap().len(), 0);
    assert_ne!(value["checksum"], "not-the-real-checksum");
}

#[tokio::test]
async fn test_backoff_is_invoked_once_per_retry() {
    let dir = TempDir::new().unwrap();
    let state_dir = TempDir::new().unwrap();
    let file = large_file(dir.path());

    let remote = Arc::new(MockRemote::new());
    remote.fail_upload("/Backups/big.bin", u32::MAX);

    let attempts = Arc::new(std::sync::Mutex::new(Vec::new()));
    let recorder = Arc::clone(&attempts);
    let uploader = ResumableUploader::new(Arc::clone(&remote) as Arc<dyn RemoteClient>)
        .with_state_dir(state_dir.path().to_path_buf())
        .with_delay_fn(move |attempt| {
            recorder.lock().unwrap().push(attempt);
            Duration::ZERO
        });

    uploader
        .upload_large_file(&file, "/Backups/big.bin", None)
        .await;

    // One backoff per retry, attempts numbered from one
    assert_eq!(*attempts.lock().unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_persisted_state_format() {
    let dir = TempDir::new().unwrap();
    let state_dir = TempDir::new().unwrap();
    let file = large_file(dir.path());

    let remote = Arc::new(MockRemote::new());
    remote.fail_upload("/Backups/big.bin", u32::MAX);
    let uploader = uploader(Arc::clone(&remote), &state_dir);

    uploader
        .upload_large_file(&file, "/Backups/big.bin", None)
        .await;

    let raw = fs::read_to_string(uploader.state_path(&file)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

    assert_eq!(value["filePath"], file.to_string_lossy().as_ref());
    assert_eq!(value["remotePath"], "/Backups/big.bin");
    assert!(value["chunkSize"].is_u64());
    assert!(value["totalChunks"].as_u64().unwrap() >= 1);
    assert!(value["uploadedChunks"].is_array());
    // SHA-256 hex
    assert_eq!(value["checksum"].as_str().unwrap().len(), 64);
    assert!(value["timestamp"].is_string());
}

#[tokio::test]
async fn test_composed_progress_scales_by_chunk_count() {
    let dir = TempDir::new().unwrap();
    let state_dir = TempDir::new().unwrap();
    let file = large_file(dir.path());

    let remote = Arc::new(MockRemote::new());
    // 50 MiB chunks over 100 MiB + 1 byte: three chunks
    let uploader = ResumableUploader::new(Arc::clone(&remote) as Arc<dyn RemoteClient>)
        .with_state_dir(state_dir.path().to_path_buf())
        .with_delay_fn(|_| Duration::ZERO);

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    let report = uploader
        .upload_large_file(
            &file,
            "/Backups/big.bin",
            Some(Arc::new(move |percent| {
                recorder.lock().unwrap().push(percent);
            })),
        )
        .await;

    assert!(report.success);
    // The mock reports 100% of the streamed call, which is one third of the
    // whole file when no chunks were previously recorded
    assert_eq!(*seen.lock().unwrap(), vec![33]);
}

#[tokio::test]
async fn test_state_file_name_includes_basename() {
    let state_dir = TempDir::new().unwrap();
    let remote = Arc::new(MockRemote::new());
    let uploader = uploader(remote, &state_dir);

    let path = uploader.state_path(Path::new("/data/big.bin"));
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("big.bin."));
    assert!(name.ends_with(".upload-state.json"));
}

#[tokio::test]
async fn test_clear_state_is_idempotent() {
    let state_dir = TempDir::new().unwrap();
    let remote = Arc::new(MockRemote::new());
    let uploader = uploader(remote, &state_dir);

    let file = Path::new("/data/never-uploaded.bin");
    uploader.clear_state(file);
    uploader.clear_state(file);
    assert_eq!(uploader.get_progress(file), 0);
}
