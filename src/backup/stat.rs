//! Run-wide counters shared by every worker of one backup.

use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

pub const MEGABYTE_TO_BYTE: u64 = 1_048_576;

/// Atomic counters for one backup run.
///
/// `total_files` is always bumped before a path becomes visible to a writer, so
/// `current_files <= total_files` holds whenever the counters are observed.
#[derive(Debug, Default)]
pub struct BackupStat {
    total_files: AtomicU64,
    current_files: AtomicU64,
    skipped_files: AtomicU64,
    total_bytes: AtomicU64,
}

/// Point-in-time copy of [`BackupStat`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatSnapshot {
    pub total_files: u64,
    pub current_files: u64,
    pub skipped_files: u64,
    pub total_bytes: u64,
}

impl BackupStat {
    pub fn increment_total_file(&self) {
        self.total_files.fetch_add(1, Ordering::SeqCst);
    }

    /// Records one file written into a container with its original size.
    pub fn add_file_size(&self, bytes: u64) {
        self.total_bytes.fetch_add(bytes, Ordering::SeqCst);
        self.current_files.fetch_add(1, Ordering::SeqCst);
    }

    /// Records one discovered file that will never be written.
    pub fn increment_skipped_file(&self) {
        self.skipped_files.fetch_add(1, Ordering::SeqCst);
    }

    pub fn total_files(&self) -> u64 {
        self.total_files.load(Ordering::SeqCst)
    }

    pub fn current_files(&self) -> u64 {
        self.current_files.load(Ordering::SeqCst)
    }

    pub fn skipped_files(&self) -> u64 {
        self.skipped_files.load(Ordering::SeqCst)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> StatSnapshot {
        // current before total keeps the snapshot itself within the invariant
        let current_files = self.current_files();
        let skipped_files = self.skipped_files();
        let total_bytes = self.total_bytes();
        let total_files = self.total_files();
        StatSnapshot {
            total_files,
            current_files,
            skipped_files,
            total_bytes,
        }
    }
}

impl StatSnapshot {
    pub fn total_megabytes(&self) -> u64 {
        self.total_bytes / MEGABYTE_TO_BYTE
    }

    /// Every discovered file is either written or permanently skipped.
    pub fn is_settled(&self) -> bool {
        self.current_files + self.skipped_files >= self.total_files
    }
}

impl Display for StatSnapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} / {} files written, {} skipped, {} MB",
            self.current_files,
            self.total_files,
            self.skipped_files,
            self.total_megabytes()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters_start_at_zero() {
        let stat = BackupStat::default();
        assert_eq!(stat.snapshot(), StatSnapshot::default());
        assert!(stat.snapshot().is_settled());
    }

    #[test]
    fn test_add_file_size_counts_file_and_bytes() {
        let stat = BackupStat::default();
        stat.increment_total_file();
        stat.increment_total_file();
        stat.add_file_size(3 * MEGABYTE_TO_BYTE + 12);

        let snapshot = stat.snapshot();
        assert_eq!(snapshot.total_files, 2);
        assert_eq!(snapshot.current_files, 1);
        assert_eq!(snapshot.total_megabytes(), 3);
        assert!(!snapshot.is_settled());

        stat.increment_skipped_file();
        assert!(stat.snapshot().is_settled());
    }

    #[test]
    fn test_concurrent_updates_keep_invariant() {
        let stat = Arc::new(BackupStat::default());
        let handles = (0..4)
            .map(|_| {
                let stat = stat.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stat.increment_total_file();
                        stat.add_file_size(1);
                        let snapshot = stat.snapshot();
                        assert!(snapshot.current_files <= snapshot.total_files);
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = stat.snapshot();
        assert_eq!(snapshot.total_files, 4000);
        assert_eq!(snapshot.current_files, 4000);
        assert_eq!(snapshot.total_bytes, 4000);
    }

    #[test]
    fn test_display() {
        let snapshot = StatSnapshot {
            total_files: 10,
            current_files: 8,
            skipped_files: 2,
            total_bytes: 2 * MEGABYTE_TO_BYTE,
        };
        assert_eq!(snapshot.to_string(), "8 / 10 files written, 2 skipped, 2 MB");
    }
}
