//! Size-rotating log file.
//!
//! The active file lives at the configured path. When a write would push it
//! past `max_size`, the file is renamed to a timestamped backup and a fresh
//! file takes its place. Backups are then pruned and compressed according to
//! the retention settings on a background cleanup thread; writes and later
//! rotations do not wait for it, `close` does.

use crate::backup::{BackupScanner, CleanupResult};
use crate::error::RotateError;
use crate::sink::RotatingSink;
use crate::DEFAULT_MAX_SIZE;
use chrono::{Local, NaiveDateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};

/// Rotating file configuration.
#[derive(Debug, Clone)]
pub struct RotateConfig {
    /// Path of the active log file.
    pub path: PathBuf,
    /// Maximum file size in bytes before rotation.
    pub max_size: u64,
    /// Maximum backup age in days (0 = keep forever).
    pub max_age_days: u32,
    /// Maximum number of backups to keep (0 = keep all).
    pub max_backups: usize,
    /// Gzip rotated backups.
    pub compress: bool,
    /// Name backups with local time instead of UTC.
    pub local_time: bool,
}

impl RotateConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_size: DEFAULT_MAX_SIZE,
            max_age_days: 0,
            max_backups: 0,
            compress: false,
            local_time: false,
        }
    }

    pub fn with_max_size(mut self, size: u64) -> Self {
        self.max_size = size;
        self
    }

    pub fn with_max_age_days(mut self, days: u32) -> Self {
        self.max_age_days = days;
        self
    }

    pub fn with_max_backups(mut self, count: usize) -> Self {
        self.max_backups = count;
        self
    }

    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_local_time(mut self, local_time: bool) -> Self {
        self.local_time = local_time;
        self
    }

    fn validate(&self) -> Result<(), RotateError> {
        if self.path.as_os_str().is_empty() {
            return Err(RotateError::InvalidConfig("path is empty".to_string()));
        }
        if self.path.file_name().is_none() {
            return Err(RotateError::InvalidConfig(format!(
                "path {} has no file name",
                self.path.display()
            )));
        }
        if self.max_size == 0 {
            return Err(RotateError::InvalidConfig(
                "max_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Background thread applying retention and compression.
struct Cleaner {
    /// Capacity one: a pending request covers every rotation before it runs.
    requests: SyncSender<()>,
    handle: JoinHandle<()>,
}

/// A log file that rotates itself by size.
///
/// The file is opened lazily on the first write, appending to an existing
/// file when it has room.
pub struct RotatingFile {
    config: RotateConfig,
    file: Option<File>,
    size: u64,
    cleaner: Option<Cleaner>,
}

impl RotatingFile {
    /// Creates a rotating file. The parent directory is created if missing.
    pub fn new(config: RotateConfig) -> Result<Self, RotateError> {
        config.validate()?;
        if let Some(dir) = config.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }

        Ok(Self {
            config,
            file: None,
            size: 0,
            cleaner: None,
        })
    }

    /// Returns the path of the active file.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Returns the size of the active file, as far as this writer knows.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RotateConfig {
        &self.config
    }

    fn now(&self) -> NaiveDateTime {
        now(self.config.local_time)
    }

    /// Opens the active file for appending, rotating first if `write_len`
    /// more bytes would not fit.
    fn open_existing_or_new(&mut self, write_len: u64) -> Result<(), RotateError> {
        self.request_cleanup()?;

        let meta = match fs::metadata(&self.config.path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return self.open_new(),
            Err(e) => return Err(e.into()),
        };

        // Stricter than the `>` check in `write`: a file left exactly full by
        // an earlier run is rotated rather than reopened.
        if meta.len() + write_len >= self.config.max_size {
            return self.rotate();
        }

        match OpenOptions::new().append(true).open(&self.config.path) {
            Ok(file) => {
                self.file = Some(file);
                self.size = meta.len();
                Ok(())
            }
            // Start over if the existing file can't be reopened.
            Err(_) => self.open_new(),
        }
    }

    /// Moves any existing file aside as a backup and opens an empty one.
    fn open_new(&mut self) -> Result<(), RotateError> {
        let path = self.config.path.clone();
        let mut permissions = None;

        if let Ok(meta) = fs::metadata(&path) {
            permissions = Some(meta.permissions());
            let backup = BackupScanner::next_backup_path(&path, self.now());
            fs::rename(&path, &backup)?;
            tracing::debug!("Rotated {} -> {}", path.display(), backup.display());
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        if let Some(permissions) = permissions {
            fs::set_permissions(&path, permissions)?;
        }

        self.file = Some(file);
        self.size = 0;
        Ok(())
    }

    /// Asks the cleanup thread for a pass, starting it if needed.
    fn request_cleanup(&mut self) -> Result<(), RotateError> {
        if self.config.max_backups == 0 && self.config.max_age_days == 0 && !self.config.compress
        {
            return Ok(());
        }

        if self.cleaner.is_none() {
            let (requests, pending) = mpsc::sync_channel::<()>(1);
            let config = self.config.clone();
            let handle = thread::Builder::new()
                .name("asynclog-cleanup".to_string())
                .spawn(move || {
                    while pending.recv().is_ok() {
                        cleanup(&config);
                    }
                })?;
            self.cleaner = Some(Cleaner { requests, handle });
        }

        if let Some(cleaner) = &self.cleaner {
            match cleaner.requests.try_send(()) {
                Ok(()) | Err(TrySendError::Full(())) => {}
                Err(TrySendError::Disconnected(())) => {
                    tracing::warn!("Log backup cleanup thread has exited");
                    self.cleaner = None;
                }
            }
        }
        Ok(())
    }

    /// Closes the active file and waits for pending cleanup. The next write
    /// reopens the file.
    pub fn close(&mut self) -> Result<(), RotateError> {
        if let Some(Cleaner { requests, handle }) = self.cleaner.take() {
            drop(requests);
            if handle.join().is_err() {
                tracing::warn!("Log backup cleanup thread panicked");
            }
        }
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}

fn now(local_time: bool) -> NaiveDateTime {
    if local_time {
        Local::now().naive_local()
    } else {
        Utc::now().naive_utc()
    }
}

/// Runs retention and compression over the backups, logging failures.
fn cleanup(config: &RotateConfig) -> CleanupResult {
    let max_age = match config.max_age_days {
        0 => None,
        days => Some(chrono::Duration::days(i64::from(days))),
    };
    match BackupScanner::cleanup(
        &config.path,
        config.max_backups,
        max_age,
        config.compress,
        now(config.local_time),
    ) {
        Ok(result) => {
            if result.removed > 0 || result.compressed > 0 {
                tracing::debug!(
                    "Log backup cleanup: {} removed, {} compressed",
                    result.removed,
                    result.compressed
                );
            }
            result
        }
        Err(e) => {
            tracing::warn!("Log backup cleanup failed: {}", e);
            CleanupResult::default()
        }
    }
}

impl RotatingSink for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> Result<(), RotateError> {
        let len = buf.len() as u64;
        if len == 0 {
            return Ok(());
        }
        if len > self.config.max_size {
            return Err(RotateError::WriteTooLarge {
                size: len,
                max: self.config.max_size,
            });
        }

        if self.file.is_none() {
            self.open_existing_or_new(len)?;
        }

        if self.size + len > self.config.max_size {
            self.rotate()?;
        }

        let file = match self.file.as_mut() {
            Some(file) => file,
            None => return Err(RotateError::InvalidConfig("log file not open".to_string())),
        };
        file.write_all(buf)?;
        self.size += len;
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), RotateError> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        self.open_new()?;
        self.request_cleanup()
    }

    fn flush(&mut self) -> Result<(), RotateError> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

impl Drop for RotatingFile {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close {}: {}", self.config.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(dir: &Path) -> RotateConfig {
        RotateConfig::new(dir.join("app.log")).with_max_size(64)
    }

    fn backups(path: &Path) -> Vec<crate::Backup> {
        BackupScanner::list_backups(path).unwrap()
    }

    #[test]
    fn test_write_creates_file() {
        let dir = TempDir::new().unwrap();
        let mut file = RotatingFile::new(test_config(dir.path())).unwrap();

        file.write(b"hello\n").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::read(file.path()).unwrap(), b"hello\n");
        assert_eq!(file.size(), 6);
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let config = RotateConfig::new(dir.path().join("nested/deeper/app.log"));
        let mut file = RotatingFile::new(config).unwrap();

        file.write(b"x").unwrap();
        assert!(dir.path().join("nested/deeper/app.log").exists());
    }

    #[test]
    fn test_empty_write_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut file = RotatingFile::new(test_config(dir.path())).unwrap();

        file.write(b"").unwrap();
        assert!(!file.path().exists());
    }

    #[test]
    fn test_appends_to_existing_file() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        fs::write(&config.path, b"old\n").unwrap();

        let mut file = RotatingFile::new(config).unwrap();
        file.write(b"new\n").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::read(file.path()).unwrap(), b"old\nnew\n");
        assert!(backups(file.path()).is_empty());
    }

    #[test]
    fn test_rotates_full_existing_file_on_open() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        fs::write(&config.path, vec![b'a'; 60]).unwrap();

        let mut file = RotatingFile::new(config).unwrap();
        file.write(b"0123456789\n").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::read(file.path()).unwrap(), b"0123456789\n");
        let backups = backups(file.path());
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read(&backups[0].path).unwrap(), vec![b'a'; 60]);
    }

    #[test]
    fn test_rotates_when_size_exceeded() {
        let dir = TempDir::new().unwrap();
        let mut file = RotatingFile::new(test_config(dir.path())).unwrap();

        let line = [b'x'; 40];
        file.write(&line).unwrap();
        file.write(&line).unwrap();
        file.write(&line).unwrap();
        file.flush().unwrap();

        assert_eq!(file.size(), 40);
        assert_eq!(backups(file.path()).len(), 2);
    }

    #[test]
    fn test_write_exactly_max_size_fits() {
        let dir = TempDir::new().unwrap();
        let mut file = RotatingFile::new(test_config(dir.path())).unwrap();

        file.write(&[b'x'; 32]).unwrap();
        file.write(&[b'y'; 32]).unwrap();

        assert_eq!(file.size(), 64);
        assert!(backups(file.path()).is_empty());
    }

    #[test]
    fn test_write_too_large() {
        let dir = TempDir::new().unwrap();
        let mut file = RotatingFile::new(test_config(dir.path())).unwrap();

        let err = file.write(&[b'x'; 65]).unwrap_err();
        assert!(matches!(err, RotateError::WriteTooLarge { size: 65, max: 64 }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_explicit_rotate() {
        let dir = TempDir::new().unwrap();
        let mut file = RotatingFile::new(test_config(dir.path())).unwrap();

        file.write(b"before\n").unwrap();
        file.rotate().unwrap();
        file.write(b"after\n").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::read(file.path()).unwrap(), b"after\n");
        let backups = backups(file.path());
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read(&backups[0].path).unwrap(), b"before\n");
    }

    #[test]
    fn test_rotate_keeps_max_backups() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path()).with_max_backups(2);
        let mut file = RotatingFile::new(config).unwrap();

        for i in 0..5 {
            file.write(format!("gen {}\n", i).as_bytes()).unwrap();
            file.rotate().unwrap();
        }
        file.close().unwrap();

        let backups = backups(file.path());
        assert_eq!(backups.len(), 2);
        assert_eq!(fs::read(&backups[0].path).unwrap(), b"gen 4\n");
        assert_eq!(fs::read(&backups[1].path).unwrap(), b"gen 3\n");
    }

    #[test]
    fn test_rotate_compresses_backups() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path()).with_compress(true);
        let mut file = RotatingFile::new(config).unwrap();

        file.write(b"compress me\n").unwrap();
        file.rotate().unwrap();
        assert!(file.cleaner.is_some());

        // Writes carry on while the backup is compressed; close waits for it.
        file.write(b"next\n").unwrap();
        file.close().unwrap();
        assert!(file.cleaner.is_none());

        let backups = backups(file.path());
        assert_eq!(backups.len(), 1);
        assert!(backups[0].compressed);
        assert_eq!(fs::read(file.path()).unwrap(), b"next\n");
    }

    #[test]
    fn test_no_cleanup_thread_without_policy() {
        let dir = TempDir::new().unwrap();
        let mut file = RotatingFile::new(test_config(dir.path())).unwrap();

        file.write(b"a\n").unwrap();
        file.rotate().unwrap();
        assert!(file.cleaner.is_none());
    }

    #[test]
    fn test_cleanup_restarts_after_close() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path()).with_max_backups(1);
        let mut file = RotatingFile::new(config).unwrap();

        file.write(b"one\n").unwrap();
        file.rotate().unwrap();
        file.close().unwrap();

        file.write(b"two\n").unwrap();
        file.rotate().unwrap();
        file.close().unwrap();

        let backups = backups(file.path());
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read(&backups[0].path).unwrap(), b"two\n");
    }

    #[test]
    fn test_exactly_full_existing_file_rotates_on_open() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        fs::write(&config.path, vec![b'a'; 60]).unwrap();

        // Reopening rotates once the write would reach the limit...
        let mut file = RotatingFile::new(config).unwrap();
        file.write(b"bbbb").unwrap();
        file.flush().unwrap();
        assert_eq!(fs::read(file.path()).unwrap(), b"bbbb");
        assert_eq!(backups(file.path()).len(), 1);
        drop(file);

        // ...while an open file is filled up to it exactly.
        let mut file =
            RotatingFile::new(RotateConfig::new(dir.path().join("other.log")).with_max_size(64))
                .unwrap();
        file.write(&[b'c'; 60]).unwrap();
        file.write(b"dddd").unwrap();
        assert_eq!(file.size(), 64);
        assert!(backups(file.path()).is_empty());
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            RotatingFile::new(RotateConfig::new("")),
            Err(RotateError::InvalidConfig(_))
        ));

        let dir = TempDir::new().unwrap();
        let config = RotateConfig::new(dir.path().join("app.log")).with_max_size(0);
        assert!(matches!(
            RotatingFile::new(config),
            Err(RotateError::InvalidConfig(_))
        ));
    }
}
