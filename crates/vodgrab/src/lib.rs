//! # vodgrab engine
//!
//! Downloads an HLS video-on-demand asset and reassembles it into a single
//! container.
//!
//! The pipeline has three stages:
//!
//! - manifest resolution: master playlists are followed down to the
//!   highest-bandwidth media playlist ([`hls::PlaylistResolver`]);
//! - segment acquisition: a bounded pool of workers fetches every segment
//!   with retries into an ordinal-indexed store ([`hls::SegmentPool`]);
//! - reassembly: segment files are concatenated in ordinal order by ffmpeg
//!   using stream copy ([`merge::SegmentMerger`]).
//!
//! [`HlsDownloader`] drives all three.

pub mod builder;
pub mod client;
pub mod config;
pub mod downloader;
pub mod error;
pub mod hls;
pub mod merge;
pub mod proxy;

pub use builder::DownloaderConfigBuilder;
pub use client::{FetchRoute, HttpClients, create_client};
pub use config::DownloaderConfig;
pub use downloader::{HlsDownloader, PipelineOutcome};
pub use error::DownloadError;
pub use hls::{
    FetchReport, HlsConfig, PlaylistResolver, PoolEvent, ResolvedPlaylist, SegmentPool, SegmentRef,
    SegmentStore, Variant,
};
pub use merge::{MergeConfig, MergeError, SegmentMerger};
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
