use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::document::LedgerDocument;
use crate::{AppError, AppResult};

pub const STORE_NOT_FOUND_CODE: &str = "STORE/NOT_FOUND";
pub const STORE_LOCKED_CODE: &str = "STORE/LOCKED";

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = OsString::from(path.as_os_str());
    os.push(suffix);
    PathBuf::from(os)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn require_document(path: &Path) -> AppResult<()> {
    if path.is_file() {
        return Ok(());
    }
    Err(
        AppError::new(STORE_NOT_FOUND_CODE, "Ledger document does not exist")
            .with_context("path", path.display().to_string()),
    )
}

pub fn read_document(path: &Path) -> AppResult<LedgerDocument> {
    require_document(path)?;
    let bytes = fs::read(path).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "read_document")
            .with_context("path", path.display().to_string())
    })?;
    LedgerDocument::parse(&bytes).map_err(|err| err.with_context("path", path.display().to_string()))
}

#[cfg(unix)]
fn sync_dir(path: &Path) -> io::Result<()> {
    File::open(path)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Replaces `path` with `bytes` through a synced temp file in the same
/// directory. An existing file's permissions carry over to the
/// replacement. On failure the previous contents are left in place.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> AppResult<()> {
    let parent = parent_dir(path);
    let io_err = move |operation: &'static str| {
        move |err: io::Error| {
            AppError::from(err)
                .with_context("operation", operation)
                .with_context("path", path.display().to_string())
        }
    };

    let mut tmp = NamedTempFile::new_in(parent).map_err(io_err("create_temp"))?;
    tmp.write_all(bytes).map_err(io_err("write_temp"))?;
    if let Ok(existing) = fs::metadata(path) {
        tmp.as_file()
            .set_permissions(existing.permissions())
            .map_err(io_err("copy_permissions"))?;
    }
    tmp.as_file().sync_all().map_err(io_err("sync_temp"))?;
    tmp.persist(path)
        .map_err(|err| io_err("persist_temp")(err.error))?;
    sync_dir(parent).map_err(io_err("sync_parent_dir"))?;

    debug!(
        target: "ledger_tenancy",
        event = "document_written",
        path = %path.display(),
        bytes = bytes.len()
    );
    Ok(())
}

pub fn write_document(path: &Path, document: &LedgerDocument) -> AppResult<()> {
    let mut bytes = document.to_pretty_bytes()?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
}

/// Copies the current document next to itself under a timestamped name
/// and returns the copy's path.
pub fn archive_original(path: &Path) -> AppResult<PathBuf> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            AppError::new("STORE/NO_FILE_NAME", "Document path has no file name")
                .with_context("path", path.display().to_string())
        })?;
    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let parent = parent_dir(path);

    let mut archive = parent.join(format!("{file_name}.pre-tenancy-{stamp}.json"));
    let mut counter = 1;
    while archive.exists() {
        archive = parent.join(format!("{file_name}.pre-tenancy-{stamp}-{counter}.json"));
        counter += 1;
    }

    fs::copy(path, &archive).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "archive_original")
            .with_context("from", path.display().to_string())
            .with_context("to", archive.display().to_string())
    })?;
    File::open(&archive)
        .and_then(|file| file.sync_all())
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "sync_archive")
                .with_context("path", archive.display().to_string())
        })?;

    info!(
        target: "ledger_tenancy",
        event = "document_archived",
        path = %path.display(),
        archive = %archive.display()
    );
    Ok(archive)
}

/// Exclusive advisory lock on `<document>.lock`, held until dropped.
#[derive(Debug)]
pub struct RunLock {
    file: File,
}

impl RunLock {
    pub fn acquire(document: &Path) -> AppResult<Self> {
        require_document(document)?;
        let path = with_suffix(document, ".lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "open_lock")
                    .with_context("path", path.display().to_string())
            })?;

        if let Err(err) = file.try_lock_exclusive() {
            let contended = err.raw_os_error().is_some()
                && err.raw_os_error() == fs2::lock_contended_error().raw_os_error();
            if contended || err.kind() == io::ErrorKind::WouldBlock {
                return Err(AppError::new(
                    STORE_LOCKED_CODE,
                    "Another run holds the lock on this document",
                )
                .with_context("lock", path.display().to_string()));
            }
            return Err(AppError::from(err)
                .with_context("operation", "lock")
                .with_context("path", path.display().to_string()));
        }

        debug!(
            target: "ledger_tenancy",
            event = "lock_acquired",
            lock = %path.display()
        );
        Ok(Self { file })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
