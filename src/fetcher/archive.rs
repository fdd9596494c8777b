use crate::error::{InstallerError, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};

/// Integrity checks for a downloaded ZIP archive.
pub struct ArchiveValidator;

impl ArchiveValidator {
    /// Read every entry to the end so the CRC of each one is checked.
    ///
    /// Returns the number of entries.
    pub fn self_test(path: &Path) -> Result<usize> {
        let file = fs::File::open(path).map_err(|e| InstallerError::file_op(path, e))?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file))?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let name = entry.name().to_string();
            io::copy(&mut entry, &mut io::sink()).map_err(|e| InstallerError::Integrity {
                message: format!("entry {} is corrupt: {}", name, e),
            })?;
        }

        debug!(entries = archive.len(), "archive self-test passed");
        Ok(archive.len())
    }

    /// Compare a computed digest against the pinned one, ignoring case.
    pub fn verify_checksum(actual: &str, expected: Option<&str>) -> Result<()> {
        match expected {
            Some(expected) if !expected.trim().eq_ignore_ascii_case(actual) => {
                Err(InstallerError::Integrity {
                    message: format!("sha256 mismatch: expected {}, got {}", expected.trim(), actual),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Lowercase hex SHA-256 of a file.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = fs::File::open(path).map_err(|e| InstallerError::file_op(path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| InstallerError::file_op(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Replace the contents of `dest` with the archive's entries.
///
/// Entries whose names would escape `dest` are skipped. Returns the number of files
/// written.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<usize> {
    if dest.exists() {
        fs::remove_dir_all(dest).map_err(|e| InstallerError::file_op(dest, e))?;
    }
    fs::create_dir_all(dest).map_err(|e| InstallerError::file_op(dest, e))?;

    let file = fs::File::open(archive_path).map_err(|e| InstallerError::file_op(archive_path, e))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))?;

    let mut count = 0usize;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;

        let entry_path = match entry.enclosed_name() {
            Some(p) => p.to_path_buf(),
            None => {
                warn!(name = entry.name(), "skipping archive entry with unsafe path");
                continue;
            }
        };

        let output_path = dest.join(&entry_path);

        if entry.is_dir() {
            fs::create_dir_all(&output_path).map_err(|e| InstallerError::file_op(&output_path, e))?;
        } else {
            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent).map_err(|e| InstallerError::file_op(parent, e))?;
            }
            let mut outfile =
                fs::File::create(&output_path).map_err(|e| InstallerError::file_op(&output_path, e))?;
            io::copy(&mut entry, &mut outfile).map_err(|e| InstallerError::Integrity {
                message: format!("failed to extract {}: {}", entry_path.display(), e),
            })?;
            count += 1;
        }
    }

    debug!(files = count, dest = %dest.display(), "archive extracted");
    Ok(count)
}
