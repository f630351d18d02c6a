use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use vodgrab_engine::PoolEvent;
use vodgrab_engine::hls::PoolEventHandler;

const BAR_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} segments ({eta}) {msg}";

/// Segment download progress bar. Does nothing when disabled.
pub struct DownloadProgress {
    bar: Option<ProgressBar>,
}

impl DownloadProgress {
    pub fn new(enabled: bool) -> Self {
        let bar = enabled.then(|| {
            let bar = ProgressBar::new(0);
            let style = ProgressStyle::default_bar()
                .template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-");
            bar.set_style(style);
            bar
        });
        Self { bar }
    }

    pub fn disabled() -> Self {
        Self { bar: None }
    }

    /// Handler to install on the segment pool, if the bar is shown.
    pub fn event_handler(&self) -> Option<PoolEventHandler> {
        let bar = self.bar.clone()?;
        let downloaded = Arc::new(AtomicU64::new(0));
        Some(Arc::new(move |event: PoolEvent| match event {
            PoolEvent::Started { total } => {
                bar.set_length(total as u64);
                bar.set_position(0);
            }
            PoolEvent::SegmentDownloaded { bytes, .. } => {
                let total = downloaded.fetch_add(bytes, Ordering::Relaxed) + bytes;
                bar.inc(1);
                bar.set_message(HumanBytes(total).to_string());
            }
            PoolEvent::SegmentFailed { ordinal, error } => {
                bar.inc(1);
                bar.println(format!("Segment {ordinal} failed: {error}"));
            }
            PoolEvent::Finished { succeeded, failed } => {
                bar.set_message(format!(
                    "{} ({succeeded} ok, {failed} failed)",
                    HumanBytes(downloaded.load(Ordering::Relaxed))
                ));
            }
        }))
    }

    pub fn finish(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message(message.to_string());
        }
    }
}
