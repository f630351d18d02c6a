use std::time::Duration;

use crate::DownloaderConfig;

// --- Top-Level Configuration ---
#[derive(Debug, Clone, Default)]
pub struct HlsConfig {
    /// Base downloader configuration
    pub base: DownloaderConfig,
    pub playlist_config: HlsPlaylistConfig,
    pub fetcher_config: HlsFetcherConfig,
    pub pool_config: HlsPoolConfig,
}

// --- Playlist Configuration ---
#[derive(Debug, Clone)]
pub struct HlsPlaylistConfig {
    /// Master playlists nested deeper than this are rejected
    pub max_playlist_depth: usize,
}

impl Default for HlsPlaylistConfig {
    fn default() -> Self {
        Self {
            max_playlist_depth: 5,
        }
    }
}

// --- Fetcher Configuration ---
#[derive(Debug, Clone)]
pub struct HlsFetcherConfig {
    pub segment_download_timeout: Duration,
    /// Total attempts per segment, including the first one
    pub max_segment_attempts: u32,
    pub segment_retry_delay_base: Duration, // Base for exponential backoff
    pub max_segment_retry_delay: Duration,
}

impl Default for HlsFetcherConfig {
    fn default() -> Self {
        Self {
            segment_download_timeout: Duration::from_secs(10),
            max_segment_attempts: 3,
            segment_retry_delay_base: Duration::from_millis(200),
            max_segment_retry_delay: Duration::from_secs(2),
        }
    }
}

// --- Pool Configuration ---
#[derive(Debug, Clone)]
pub struct HlsPoolConfig {
    pub download_concurrency: usize, // Max concurrent segment downloads
}

impl Default for HlsPoolConfig {
    fn default() -> Self {
        Self {
            download_concurrency: 10,
        }
    }
}

impl HlsConfig {
    pub fn with_base_config(mut self, base: DownloaderConfig) -> Self {
        self.base = base;
        self
    }

    pub fn download_concurrency(mut self, concurrency: usize) -> Self {
        self.pool_config.download_concurrency = concurrency.max(1);
        self
    }

    pub fn segment_attempts(mut self, attempts: u32) -> Self {
        self.fetcher_config.max_segment_attempts = attempts.max(1);
        self
    }

    pub fn segment_timeout(mut self, timeout: Duration) -> Self {
        self.fetcher_config.segment_download_timeout = timeout;
        self
    }

    pub fn playlist_timeout(mut self, timeout: Duration) -> Self {
        self.base.timeout = timeout;
        self
    }
}
