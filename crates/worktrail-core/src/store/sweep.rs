//! Retention sweep for the audit trail.
//!
//! Entries older than the retention window (730 days by default) are
//! hard-deleted in batches. The sweep checks its cancellation flag between
//! batches, so cancelling mid-sweep leaves a valid, partially-cleaned trail
//! — deletion of expired rows is idempotent and the next sweep finishes the
//! job. An advisory file lock keeps two sweeps off the same store.

use crate::error::ErrorCode;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use fs2::FileExt;
use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration as StdDuration, Instant},
};

use super::Store;

/// What one sweep pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Rows hard-deleted across all batches.
    pub deleted: u64,
    /// Batches executed before finishing or being cancelled.
    pub batches: u32,
    /// Whether the cancel flag stopped the sweep before it drained.
    pub cancelled: bool,
}

impl Store {
    /// Delete all entries with `timestamp < now - retention_days`, in
    /// batches of `batch_size`. Checks `cancel` between batches.
    ///
    /// # Errors
    ///
    /// Returns an error if a delete batch or the bookkeeping update fails.
    pub fn sweep_expired(
        &self,
        now: DateTime<Utc>,
        retention_days: u32,
        batch_size: u32,
        cancel: &AtomicBool,
    ) -> Result<SweepOutcome> {
        let cutoff = (now - Duration::days(i64::from(retention_days))).timestamp_micros();
        let batch_size = batch_size.max(1);

        let mut outcome = SweepOutcome {
            deleted: 0,
            batches: 0,
            cancelled: false,
        };

        loop {
            let deleted = self
                .conn
                .execute(
                    "DELETE FROM audit_entries WHERE entry_hash IN (
                         SELECT entry_hash FROM audit_entries
                         WHERE ts_us < ?1
                         ORDER BY ts_us
                         LIMIT ?2
                     )",
                    rusqlite::params![cutoff, batch_size],
                )
                .context("delete expired audit entries")?;

            if deleted == 0 {
                break;
            }
            outcome.deleted += u64::try_from(deleted).unwrap_or(u64::MAX);
            outcome.batches += 1;

            if cancel.load(Ordering::Relaxed) {
                outcome.cancelled = true;
                break;
            }
        }

        self.conn
            .execute(
                "UPDATE store_meta SET last_sweep_at_us = ?1, last_sweep_deleted = ?2 WHERE id = 1",
                rusqlite::params![now.timestamp_micros(), i64::try_from(outcome.deleted).unwrap_or(i64::MAX)],
            )
            .context("record sweep bookkeeping")?;

        tracing::info!(
            deleted = outcome.deleted,
            batches = outcome.batches,
            cancelled = outcome.cancelled,
            "retention sweep finished"
        );
        Ok(outcome)
    }
}

/// Advisory sweep lock errors.
#[derive(Debug)]
pub enum SweepLockError {
    Timeout { path: PathBuf, waited: StdDuration },
    IoError(io::Error),
}

impl From<io::Error> for SweepLockError {
    fn from(err: io::Error) -> Self {
        Self::IoError(err)
    }
}

impl SweepLockError {
    /// Machine-readable code associated with this lock error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::SweepLockContention,
            Self::IoError(_) => ErrorCode::InternalUnexpected,
        }
    }
}

impl std::fmt::Display for SweepLockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { path, waited } => write!(
                f,
                "{}: sweep lock timed out after {:?} at {}",
                self.code().code(),
                waited,
                path.display()
            ),
            Self::IoError(err) => write!(f, "{}: {}", self.code().code(), err),
        }
    }
}

impl std::error::Error for SweepLockError {}

/// Exclusive advisory lock held for the duration of a sweep. Released on
/// drop.
#[derive(Debug)]
pub struct SweepLock {
    _file: File,
}

impl SweepLock {
    /// Acquire the sweep lock at `path`, retrying until `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SweepLockError::Timeout`] if another sweep holds the lock
    /// for the whole timeout, or an IO error if the lock file cannot be
    /// created.
    pub fn acquire(path: &Path, timeout: StdDuration) -> Result<Self, SweepLockError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(path)?;

            if file.try_lock_exclusive().is_ok() {
                return Ok(Self { _file: file });
            }

            if start.elapsed() >= timeout {
                return Err(SweepLockError::Timeout {
                    path: path.to_path_buf(),
                    waited: start.elapsed(),
                });
            }
            thread::sleep(StdDuration::from_millis(25));
        }
    }
}
