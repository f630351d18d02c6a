// HLS Segment Pool: a fixed number of workers draining a shared queue of segments.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::DownloadError;
use crate::hls::config::HlsConfig;
use crate::hls::fetcher::SegmentDownloader;
use crate::hls::playlist::SegmentRef;
use crate::hls::retry::{RetryAction, RetryPolicy, retry_with_backoff};
use crate::hls::store::{FetchReport, SegmentOutcome, SegmentStore, segment_path};
use crate::merge::FILE_LIST_NAME;

/// Progress notifications emitted while segments are fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    Started { total: usize },
    SegmentDownloaded { ordinal: usize, bytes: u64 },
    SegmentFailed { ordinal: usize, error: String },
    Finished { succeeded: usize, failed: usize },
}

pub type PoolEventHandler = Arc<dyn Fn(PoolEvent) + Send + Sync>;

pub struct SegmentPool {
    downloader: Arc<dyn SegmentDownloader>,
    policy: RetryPolicy,
    concurrency: usize,
    on_event: Option<PoolEventHandler>,
}

impl SegmentPool {
    pub fn new(downloader: Arc<dyn SegmentDownloader>, config: &HlsConfig) -> Self {
        Self {
            downloader,
            policy: RetryPolicy::from_fetcher_config(&config.fetcher_config),
            concurrency: config.pool_config.download_concurrency.max(1),
            on_event: None,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_event_handler(mut self, handler: PoolEventHandler) -> Self {
        self.on_event = Some(handler);
        self
    }

    /// Fetch every segment into `dir`, one file per ordinal.
    ///
    /// Segment files and the concat list left in `dir` by an earlier run are
    /// removed first, so `dir` only ever holds this run's sequence.
    /// Individual segment failures are recorded in the report rather than
    /// aborting the run; only failing to prepare `dir` is an error.
    pub async fn fetch_all(
        &self,
        segments: &[SegmentRef],
        dir: &Path,
    ) -> Result<FetchReport, DownloadError> {
        tokio::fs::create_dir_all(dir).await?;
        let removed = clear_stale_files(dir).await?;
        if removed > 0 {
            info!(removed, dir = %dir.display(), "Removed files from a previous run");
        }

        let total = segments.len();
        emit(&self.on_event, PoolEvent::Started { total });
        let store = Arc::new(SegmentStore::new(total));
        let queue = Arc::new(Mutex::new(segments.iter().cloned().collect::<VecDeque<_>>()));
        let workers = self.concurrency.min(total);

        info!(total, workers, dir = %dir.display(), "Downloading segments");

        let mut tasks = JoinSet::new();
        for worker_id in 0..workers {
            let worker = Worker {
                id: worker_id,
                downloader: Arc::clone(&self.downloader),
                policy: self.policy.clone(),
                queue: Arc::clone(&queue),
                store: Arc::clone(&store),
                dir: dir.to_path_buf(),
                total,
                on_event: self.on_event.clone(),
            };
            tasks.spawn(worker.run());
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Segment worker terminated abnormally");
            }
        }

        let report = store.report();
        emit(
            &self.on_event,
            PoolEvent::Finished {
                succeeded: report.succeeded,
                failed: report.failed.len(),
            },
        );
        if report.failed.is_empty() {
            info!(total, "All segments downloaded");
        } else {
            warn!(
                failed = report.failed.len(),
                total,
                ordinals = ?report.failed_ordinals(),
                "Some segments failed to download"
            );
        }
        Ok(report)
    }
}

/// Delete `*.ts` files and the concat list from `dir`. Returns how many
/// files were removed.
async fn clear_stale_files(dir: &Path) -> Result<usize, DownloadError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.ends_with(".ts") || name == FILE_LIST_NAME {
            debug!(file = %name, "Removing stale file");
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn emit(handler: &Option<PoolEventHandler>, event: PoolEvent) {
    if let Some(handler) = handler {
        handler(event);
    }
}

struct Worker {
    id: usize,
    downloader: Arc<dyn SegmentDownloader>,
    policy: RetryPolicy,
    queue: Arc<Mutex<VecDeque<SegmentRef>>>,
    store: Arc<SegmentStore>,
    dir: PathBuf,
    total: usize,
    on_event: Option<PoolEventHandler>,
}

impl Worker {
    async fn run(self) {
        debug!(worker = self.id, "Segment worker started");
        while let Some(segment) = self.next_job() {
            let outcome = self.process(&segment).await;
            let event = match &outcome {
                SegmentOutcome::Downloaded { bytes, .. } => {
                    debug!(
                        ordinal = segment.ordinal,
                        bytes,
                        progress = format!("{}/{}", self.store.completed() + 1, self.total),
                        "Downloaded segment"
                    );
                    PoolEvent::SegmentDownloaded {
                        ordinal: segment.ordinal,
                        bytes: *bytes,
                    }
                }
                SegmentOutcome::Failed { error } => {
                    warn!(ordinal = segment.ordinal, url = %segment.url, error = %error, "Failed to download segment");
                    PoolEvent::SegmentFailed {
                        ordinal: segment.ordinal,
                        error: error.clone(),
                    }
                }
            };
            if let Err(e) = self.store.complete(segment.ordinal, outcome) {
                error!(ordinal = segment.ordinal, error = %e, "Failed to record segment outcome");
                continue;
            }
            emit(&self.on_event, event);
        }
        debug!(worker = self.id, "Segment worker finished");
    }

    fn next_job(&self) -> Option<SegmentRef> {
        self.queue.lock().pop_front()
    }

    async fn process(&self, segment: &SegmentRef) -> SegmentOutcome {
        let bytes = match self.download(segment).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return SegmentOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        let path = segment_path(&self.dir, segment.ordinal, self.total);
        if let Err(e) = tokio::fs::write(&path, &bytes).await {
            // Don't leave a truncated file behind for the merge step.
            let _ = tokio::fs::remove_file(&path).await;
            return SegmentOutcome::Failed {
                error: format!("failed to write {}: {e}", path.display()),
            };
        }

        SegmentOutcome::Downloaded {
            path,
            bytes: bytes.len() as u64,
        }
    }

    async fn download(&self, segment: &SegmentRef) -> Result<Bytes, DownloadError> {
        let downloader = &self.downloader;
        retry_with_backoff(&self.policy, |attempt| async move {
            if attempt > 0 {
                debug!(ordinal = segment.ordinal, attempt = attempt + 1, "Retrying segment");
            }
            match downloader.download_segment(segment).await {
                Ok(bytes) => RetryAction::Success(bytes),
                Err(e) if e.is_retryable() => RetryAction::Retry(e),
                Err(e) => RetryAction::Fail(e),
            }
        })
        .await
    }
}
