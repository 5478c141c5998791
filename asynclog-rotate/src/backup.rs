//! Backup file management.
//!
//! A rotated log file is renamed to a timestamped backup next to it:
//! - Naming: `<stem>-<YYYY-MM-DDTHH-MM-SS.mmm><ext>`, optionally `.gz`
//! - Retention: backups beyond a count or older than an age are removed
//! - Compression: remaining plain backups can be gzipped in place

use crate::error::RotateError;
use chrono::{Duration, NaiveDateTime};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Timestamp layout embedded in backup file names.
pub const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";

/// Suffix appended to compressed backups.
pub const COMPRESS_SUFFIX: &str = ".gz";

/// Builds the backup file name for a log file with the given stem and extension.
///
/// `ext` includes the leading dot, or is empty.
pub fn backup_filename(stem: &str, ext: &str, timestamp: NaiveDateTime) -> String {
    format!("{}-{}{}", stem, timestamp.format(BACKUP_TIME_FORMAT), ext)
}

/// Parses a backup file name, returning its timestamp and whether it is compressed.
pub fn parse_backup_filename(name: &str, stem: &str, ext: &str) -> Option<(NaiveDateTime, bool)> {
    let rest = name.strip_prefix(stem)?.strip_prefix('-')?;
    let (rest, compressed) = match rest.strip_suffix(COMPRESS_SUFFIX) {
        Some(r) => (r, true),
        None => (rest, false),
    };
    let ts = rest.strip_suffix(ext)?;
    let timestamp = NaiveDateTime::parse_from_str(ts, BACKUP_TIME_FORMAT).ok()?;
    Some((timestamp, compressed))
}

/// Splits a log file name into stem and extension (with its dot).
pub fn split_filename(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (stem, ext)
}

/// A backup of a rotated log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub path: PathBuf,
    pub timestamp: NaiveDateTime,
    pub compressed: bool,
}

impl Backup {
    /// Name of the backup without the compression suffix.
    fn base_name(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match name.strip_suffix(COMPRESS_SUFFIX) {
            Some(base) => base.to_string(),
            None => name,
        }
    }
}

/// Result of a cleanup pass over the backups of one log file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupResult {
    pub removed: usize,
    pub compressed: usize,
}

/// Backup directory scanner.
pub struct BackupScanner;

impl BackupScanner {
    /// Lists the backups of the log file at `path`, newest first.
    pub fn list_backups(path: &Path) -> Result<Vec<Backup>, RotateError> {
        let dir = parent_dir(path);
        let (stem, ext) = split_filename(path);
        let mut backups = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some((timestamp, compressed)) = parse_backup_filename(&name, &stem, &ext) {
                backups.push(Backup {
                    path: entry.path(),
                    timestamp,
                    compressed,
                });
            }
        }

        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(backups)
    }

    /// Returns a backup path for `path` that sorts after every existing backup.
    pub fn next_backup_path(path: &Path, mut timestamp: NaiveDateTime) -> PathBuf {
        let dir = parent_dir(path);
        let (stem, ext) = split_filename(path);

        // Keep names monotonic when rotating faster than the clock resolution.
        if let Some(newest) = Self::list_backups(path).ok().and_then(|b| b.into_iter().next()) {
            if newest.timestamp >= timestamp {
                timestamp = newest.timestamp + Duration::milliseconds(1);
            }
        }

        loop {
            let candidate = dir.join(backup_filename(&stem, &ext, timestamp));
            let compressed = PathBuf::from(format!("{}{}", candidate.display(), COMPRESS_SUFFIX));
            if !candidate.exists() && !compressed.exists() {
                return candidate;
            }
            timestamp += Duration::milliseconds(1);
        }
    }

    /// Applies retention and compression to the backups of `path`.
    ///
    /// `max_backups == 0` keeps any number; `max_age == None` keeps any age.
    /// `now` must be in the same time zone the backup names were written in.
    pub fn cleanup(
        path: &Path,
        max_backups: usize,
        max_age: Option<Duration>,
        compress: bool,
        now: NaiveDateTime,
    ) -> Result<CleanupResult, RotateError> {
        let mut result = CleanupResult::default();
        if max_backups == 0 && max_age.is_none() && !compress {
            return Ok(result);
        }

        let mut remaining = Self::list_backups(path)?;

        if max_backups > 0 && max_backups < remaining.len() {
            // A backup and its compressed twin count once.
            let mut preserved = HashSet::new();
            let mut keep = Vec::new();
            for backup in remaining {
                let base = backup.base_name();
                if preserved.contains(&base) || preserved.len() < max_backups {
                    preserved.insert(base);
                    keep.push(backup);
                } else {
                    remove_backup(&backup, &mut result);
                }
            }
            remaining = keep;
        }

        if let Some(max_age) = max_age {
            let cutoff = now - max_age;
            let mut keep = Vec::new();
            for backup in remaining {
                if backup.timestamp < cutoff {
                    remove_backup(&backup, &mut result);
                } else {
                    keep.push(backup);
                }
            }
            remaining = keep;
        }

        if compress {
            for backup in remaining.iter().filter(|b| !b.compressed) {
                let dst = PathBuf::from(format!("{}{}", backup.path.display(), COMPRESS_SUFFIX));
                match compress_file(&backup.path, &dst) {
                    Ok(()) => result.compressed += 1,
                    Err(e) => {
                        tracing::warn!("Failed to compress {}: {}", backup.path.display(), e)
                    }
                }
            }
        }

        Ok(result)
    }
}

fn remove_backup(backup: &Backup, result: &mut CleanupResult) {
    match fs::remove_file(&backup.path) {
        Ok(()) => {
            tracing::debug!("Removed log backup {}", backup.path.display());
            result.removed += 1;
        }
        Err(e) => tracing::warn!("Failed to remove {}: {}", backup.path.display(), e),
    }
}

/// Gzips `src` into `dst`, then removes `src`.
pub fn compress_file(src: &Path, dst: &Path) -> Result<(), RotateError> {
    let input = File::open(src)?;
    let permissions = input.metadata()?.permissions();

    let output = File::create(dst)?;
    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
    let copied = io::copy(&mut BufReader::new(input), &mut encoder).and_then(|_| {
        let mut writer = encoder.finish()?;
        writer.flush()?;
        writer.get_ref().sync_all()
    });

    if let Err(e) = copied {
        // Leave the plain backup in place.
        let _ = fs::remove_file(dst);
        return Err(e.into());
    }

    fs::set_permissions(dst, permissions)?;
    fs::remove_file(src)?;
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}
