// Content digest computation
// MD5 drives change detection; SHA-256 guards resumable upload state

use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::{Digest as Md5Digest, Md5};
use memmap2::Mmap;
use sha2::{Digest as Sha2Digest, Sha256};

use crate::error::BackupError;

// Files below this size are memory-mapped instead of read through a buffer
const MMAP_THRESHOLD: u64 = 2 * 1024 * 1024 * 1024; // 2GB

const BUFFER_SIZE: usize = 1024 * 1024; // 1MB

/// MD5 hex digest of an in-memory byte slice.
pub fn md5_bytes(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    Md5Digest::update(&mut hasher, data);
    bytes_to_hex(&Md5Digest::finalize(hasher))
}

/// MD5 hex digest of a file's content.
///
/// Files smaller than 2GB are memory-mapped to avoid kernel-to-userspace copy
/// overhead; larger (or unmappable) files fall back to buffered reading.
///
/// # Safety
///
/// Memory mapping assumes the file is not modified by other processes during
/// hashing. A concurrent writer can make the digest inconsistent, which the
/// change-detection layer treats as "changed" on the next scan.
pub fn md5_file(path: &Path) -> Result<String, BackupError> {
    let mut hasher = Md5::new();
    hash_file_into(path, &mut |data| Md5Digest::update(&mut hasher, data))?;
    Ok(bytes_to_hex(&Md5Digest::finalize(hasher)))
}

/// SHA-256 hex digest of a file's content.
pub fn sha256_file(path: &Path) -> Result<String, BackupError> {
    let mut hasher = Sha256::new();
    hash_file_into(path, &mut |data| Sha2Digest::update(&mut hasher, data))?;
    Ok(bytes_to_hex(&Sha2Digest::finalize(hasher)))
}

/// MD5 hex digest of a file, computed off the async runtime.
pub async fn md5_file_async(path: &Path) -> Result<String, BackupError> {
    let path = path.to_path_buf();
    let path_for_err = path.clone();
    tokio::task::spawn_blocking(move || md5_file(&path))
        .await
        .map_err(|e| {
            BackupError::from_io_error(
                std::io::Error::new(std::io::ErrorKind::Other, e),
                "hashing",
                Some(path_for_err),
            )
        })?
}

/// SHA-256 hex digest of a file, computed off the async runtime.
pub async fn sha256_file_async(path: &Path) -> Result<String, BackupError> {
    let path = path.to_path_buf();
    let path_for_err = path.clone();
    tokio::task::spawn_blocking(move || sha256_file(&path))
        .await
        .map_err(|e| {
            BackupError::from_io_error(
                std::io::Error::new(std::io::ErrorKind::Other, e),
                "hashing",
                Some(path_for_err),
            )
        })?
}

/// Feed a file's bytes into `update`, choosing mmap or buffered I/O by size.
fn hash_file_into(
    path: &Path,
    update: &mut dyn FnMut(&[u8]),
) -> Result<(), BackupError> {
    let file = File::open(path)
        .map_err(|e| BackupError::from_io_error(e, "reading", Some(path.to_path_buf())))?;

    let file_size = file
        .metadata()
        .map_err(|e| BackupError::from_io_error(e, "reading metadata", Some(path.to_path_buf())))?
        .len();

    if file_size > 0 && file_size < MMAP_THRESHOLD {
        match unsafe { Mmap::map(&file) } {
            Ok(mmap) => {
                update(&mmap[..]);
                return Ok(());
            }
            Err(_) => {
                // Fall through to buffered reading
            }
        }
    }

    let mut file = file;
    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| BackupError::from_io_error(e, "reading", Some(path.to_path_buf())))?;
        if bytes_read == 0 {
            break;
        }
        update(&buffer[..bytes_read]);
    }

    Ok(())
}

/// Convert bytes to a lowercase hexadecimal string
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_md5_bytes_known_vector() {
        // RFC 1321 test vector
        assert_eq!(md5_bytes(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_bytes(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_md5_file_matches_bytes() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"test content").unwrap();

        let from_file = md5_file(file.path()).unwrap();
        let from_bytes = md5_bytes(b"test content");
        assert_eq!(from_file, from_bytes);
    }

    #[test]
    fn test_sha256_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"test content").unwrap();

        let digest = sha256_file(file.path()).unwrap();
        assert_eq!(digest.len(), 64);
        // Stable across invocations
        assert_eq!(digest, sha256_file(file.path()).unwrap());
    }

    #[test]
    fn test_empty_file() {
        let file = NamedTempFile::new().unwrap();
        assert_eq!(
            md5_file(file.path()).unwrap(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }
}
