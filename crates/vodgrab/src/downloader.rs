use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::client::HttpClients;
use crate::error::DownloadError;
use crate::hls::{
    FetchReport, HlsConfig, HttpManifestSource, ManifestSource, PlaylistResolver, PoolEventHandler,
    ResolvedPlaylist, SegmentDownloader, SegmentFetcher, SegmentPool,
};
use crate::merge::{MergeConfig, SegmentMerger};

/// How a pipeline run ended, short of a hard error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every segment was fetched and merged into `output`.
    Completed { output: PathBuf, segments: usize },
    /// Some segments could not be fetched; merging was skipped.
    PartialFailure { report: FetchReport },
}

impl PipelineOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Resolve -> fetch -> merge.
pub struct HlsDownloader {
    resolver: PlaylistResolver,
    pool: SegmentPool,
    merger: SegmentMerger,
    proxy_enabled: bool,
}

impl HlsDownloader {
    /// Build the HTTP clients, fetchers and ffmpeg merger from configuration.
    pub fn new(config: HlsConfig, merge_config: &MergeConfig) -> Result<Self, DownloadError> {
        let clients = HttpClients::new(&config.base)?;
        let proxy_enabled = clients.proxy_enabled();

        let source: Arc<dyn ManifestSource> =
            Arc::new(HttpManifestSource::new(clients.clone(), config.base.timeout));
        let fetcher: Arc<dyn SegmentDownloader> = Arc::new(SegmentFetcher::new(
            clients,
            config.fetcher_config.segment_download_timeout,
        ));

        let resolver = PlaylistResolver::new(source, config.playlist_config.max_playlist_depth);
        let pool = SegmentPool::new(fetcher, &config);
        let merger = SegmentMerger::new(merge_config);

        Ok(Self::from_parts(resolver, pool, merger).with_proxy_enabled(proxy_enabled))
    }

    pub fn from_parts(resolver: PlaylistResolver, pool: SegmentPool, merger: SegmentMerger) -> Self {
        Self {
            resolver,
            pool,
            merger,
            proxy_enabled: false,
        }
    }

    fn with_proxy_enabled(mut self, enabled: bool) -> Self {
        self.proxy_enabled = enabled;
        self
    }

    pub fn with_event_handler(mut self, handler: PoolEventHandler) -> Self {
        self.pool = self.pool.with_event_handler(handler);
        self
    }

    /// Whether manifest and segment requests start out through a proxy.
    pub fn proxy_enabled(&self) -> bool {
        self.proxy_enabled
    }

    pub async fn resolve(&self, url: &str) -> Result<ResolvedPlaylist, DownloadError> {
        self.resolver.resolve(url).await
    }

    /// Run the whole pipeline for `url`, keeping segments in `segment_dir`
    /// and writing the merged container to `output`.
    pub async fn download(
        &self,
        url: &str,
        segment_dir: &Path,
        output: &Path,
    ) -> Result<PipelineOutcome, DownloadError> {
        info!(url, proxy = self.proxy_enabled, "Resolving playlist");
        let playlist = self.resolver.resolve(url).await?;
        if let Some(first) = playlist.segments.first() {
            info!(
                segments = playlist.segments.len(),
                first = %first.url,
                playlist = %playlist.url,
                "Found segments"
            );
        }

        let report = self.pool.fetch_all(&playlist.segments, segment_dir).await?;
        if !report.is_success() {
            warn!(
                failed = report.failed.len(),
                total = report.total,
                "Segment download incomplete, skipping merge"
            );
            return Ok(PipelineOutcome::PartialFailure { report });
        }

        info!(dir = %segment_dir.display(), "All segments downloaded, merging");
        let output = self.merger.merge(segment_dir, output).await?;
        info!(output = %output.display(), "Download complete");

        Ok(PipelineOutcome::Completed {
            output,
            segments: report.total,
        })
    }
}
