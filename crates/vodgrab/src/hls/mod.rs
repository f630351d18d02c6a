// HLS video-on-demand support: manifest resolution and segment acquisition.

pub mod config;
mod fetcher;
mod manifest;
pub mod playlist;
mod pool;
mod resolver;
pub mod retry;
mod store;

pub use config::{HlsConfig, HlsFetcherConfig, HlsPlaylistConfig, HlsPoolConfig};
pub use fetcher::{SegmentDownloader, SegmentFetcher};
pub use manifest::{HttpManifestSource, ManifestSource};
pub use playlist::{Playlist, SegmentRef, Variant};
pub use pool::{PoolEvent, PoolEventHandler, SegmentPool};
pub use resolver::{PlaylistResolver, ResolvedPlaylist};
pub use store::{FetchReport, SegmentOutcome, SegmentStore, segment_file_name};
