// Ordinal-indexed record of segment download outcomes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::DownloadError;

const SEGMENT_FILE_EXTENSION: &str = "ts";
const MIN_FILE_NAME_WIDTH: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentOutcome {
    Downloaded { path: PathBuf, bytes: u64 },
    Failed { error: String },
}

/// One write-once slot per segment ordinal.
///
/// Workers only ever touch the slot for the ordinal they own, so the store
/// needs no lock; completing a slot twice is rejected.
#[derive(Debug)]
pub struct SegmentStore {
    slots: Vec<OnceLock<SegmentOutcome>>,
    completed: AtomicUsize,
}

impl SegmentStore {
    pub fn new(total: usize) -> Self {
        Self {
            slots: (0..total).map(|_| OnceLock::new()).collect(),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.completed() == self.len()
    }

    pub fn get(&self, ordinal: usize) -> Option<&SegmentOutcome> {
        self.slots.get(ordinal).and_then(OnceLock::get)
    }

    /// Record the final outcome for `ordinal`.
    pub fn complete(&self, ordinal: usize, outcome: SegmentOutcome) -> Result<(), DownloadError> {
        let slot = self.slots.get(ordinal).ok_or_else(|| {
            DownloadError::internal(format!(
                "segment ordinal {ordinal} out of range for {} segments",
                self.len()
            ))
        })?;
        slot.set(outcome).map_err(|_| {
            DownloadError::internal(format!("segment {ordinal} completed more than once"))
        })?;
        self.completed.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Summarize the run. Slots never completed count as failed.
    pub fn report(&self) -> FetchReport {
        let mut succeeded = 0;
        let mut failed = BTreeMap::new();
        for (ordinal, slot) in self.slots.iter().enumerate() {
            match slot.get() {
                Some(SegmentOutcome::Downloaded { .. }) => succeeded += 1,
                Some(SegmentOutcome::Failed { error }) => {
                    failed.insert(ordinal, error.clone());
                }
                None => {
                    failed.insert(ordinal, "segment was never attempted".to_string());
                }
            }
        }
        FetchReport {
            total: self.len(),
            succeeded,
            failed,
        }
    }
}

/// Final result of fetching every segment of a playlist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub total: usize,
    pub succeeded: usize,
    /// Ordinal -> last error
    pub failed: BTreeMap<usize, String>,
}

impl FetchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.succeeded == self.total
    }

    pub fn failed_ordinals(&self) -> Vec<usize> {
        self.failed.keys().copied().collect()
    }
}

/// File name for a segment: the zero-padded ordinal, wide enough that names
/// sort lexicographically in ordinal order.
pub fn segment_file_name(ordinal: usize, total: usize) -> String {
    let width = digits(total.saturating_sub(1)).max(MIN_FILE_NAME_WIDTH);
    format!("{ordinal:0width$}.{SEGMENT_FILE_EXTENSION}")
}

pub fn segment_path(dir: &Path, ordinal: usize, total: usize) -> PathBuf {
    dir.join(segment_file_name(ordinal, total))
}

fn digits(mut n: usize) -> usize {
    let mut count = 1;
    while n >= 10 {
        n /= 10;
        count += 1;
    }
    count
}
