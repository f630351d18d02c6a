// HLS Playlist Resolver: follows master playlists down to a media playlist.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::DownloadError;
use crate::client::FetchRoute;
use crate::hls::manifest::ManifestSource;
use crate::hls::playlist::{Playlist, SegmentRef, parse_playlist, select_variant};

/// Outcome of a resolution run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPlaylist {
    /// URL of the media playlist the segments came from
    pub url: Url,
    pub segments: Vec<SegmentRef>,
}

pub struct PlaylistResolver {
    source: Arc<dyn ManifestSource>,
    max_depth: usize,
}

impl PlaylistResolver {
    pub fn new(source: Arc<dyn ManifestSource>, max_depth: usize) -> Self {
        Self { source, max_depth }
    }

    /// Resolve `url` to the ordered segment list of its best rendition.
    pub async fn resolve(&self, url: &str) -> Result<ResolvedPlaylist, DownloadError> {
        let url = Url::parse(url).map_err(|e| DownloadError::invalid_url(url, e.to_string()))?;
        let route = self.source.default_route();
        self.resolve_at(&url, route, 0).await
    }

    /// Resolve one level, falling back to a direct connection once if the
    /// proxied attempt fails to fetch.
    fn resolve_at<'a>(
        &'a self,
        url: &'a Url,
        route: FetchRoute,
        depth: usize,
    ) -> BoxFuture<'a, Result<ResolvedPlaylist, DownloadError>> {
        async move {
            match self.resolve_once(url, route, depth).await {
                Err(e) if route == FetchRoute::Proxy && e.is_fetch_failure() => {
                    warn!(url = %url, error = %e, "Failed with proxy, retrying without proxy");
                    self.resolve_once(url, FetchRoute::Direct, depth).await
                }
                other => other,
            }
        }
        .boxed()
    }

    async fn resolve_once(
        &self,
        url: &Url,
        route: FetchRoute,
        depth: usize,
    ) -> Result<ResolvedPlaylist, DownloadError> {
        if depth > self.max_depth {
            return Err(DownloadError::playlist(format!(
                "Master playlists nested deeper than {} levels at {url}",
                self.max_depth
            )));
        }

        let content = self.source.fetch_manifest(url, route).await.inspect_err(|e| {
            warn!(url = %url, ?route, error = %e, "Failed to fetch playlist");
        })?;

        match parse_playlist(&content, url)? {
            Playlist::Master(variants) => {
                info!(url = %url, variants = variants.len(), "Found master playlist, selecting best quality stream");
                let best = select_variant(&variants).ok_or_else(|| DownloadError::NoVariantFound {
                    url: url.to_string(),
                })?;
                info!(url = %best.url, bandwidth = best.bandwidth, "Selected stream");
                self.resolve_at(&best.url, route, depth + 1).await
            }
            Playlist::Media(segments) => {
                if segments.is_empty() {
                    warn!(url = %url, "No ts segments found in media playlist");
                    return Err(DownloadError::NoSegmentsFound {
                        url: url.to_string(),
                    });
                }
                info!(url = %url, segments = segments.len(), "Resolved media playlist");
                Ok(ResolvedPlaylist {
                    url: url.clone(),
                    segments,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::StatusCode;
    use std::collections::HashMap;

    /// Serves canned manifests; URLs listed in `proxy_failures` fail when
    /// fetched through the proxy route.
    struct FakeSource {
        manifests: HashMap<String, String>,
        proxy_enabled: bool,
        proxy_failures: Vec<String>,
        calls: Mutex<Vec<(String, FetchRoute)>>,
    }

    impl FakeSource {
        fn new(proxy_enabled: bool) -> Self {
            Self {
                manifests: HashMap::new(),
                proxy_enabled,
                proxy_failures: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with(mut self, url: &str, body: &str) -> Self {
            self.manifests.insert(url.to_string(), body.to_string());
            self
        }

        fn failing_via_proxy(mut self, url: &str) -> Self {
            self.proxy_failures.push(url.to_string());
            self
        }

        fn calls(&self) -> Vec<(String, FetchRoute)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl ManifestSource for FakeSource {
        async fn fetch_manifest(
            &self,
            url: &Url,
            route: FetchRoute,
        ) -> Result<String, DownloadError> {
            self.calls.lock().push((url.to_string(), route));
            if route == FetchRoute::Proxy && self.proxy_failures.contains(&url.to_string()) {
                return Err(DownloadError::http_status(
                    StatusCode::PROXY_AUTHENTICATION_REQUIRED,
                    url.as_str(),
                    "playlist fetch",
                ));
            }
            self.manifests
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| DownloadError::NotFound {
                    resource: url.to_string(),
                })
        }

        fn default_route(&self) -> FetchRoute {
            if self.proxy_enabled {
                FetchRoute::Proxy
            } else {
                FetchRoute::Direct
            }
        }
    }

    const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=500000
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=1200000
high/index.m3u8
";

    const HIGH: &str = "#EXTM3U
#EXTINF:6.0,
seg_000.ts
#EXTINF:6.0,
seg_001.ts
#EXTINF:3.2,
seg_002.ts
#EXT-X-ENDLIST
";

    fn resolver(source: Arc<FakeSource>) -> PlaylistResolver {
        PlaylistResolver::new(source, 5)
    }

    #[tokio::test]
    async fn master_resolves_to_highest_bandwidth_variant() {
        let source = Arc::new(
            FakeSource::new(false)
                .with("http://h/vod/master.m3u8", MASTER)
                .with("http://h/vod/high/index.m3u8", HIGH),
        );
        let resolved = resolver(source.clone())
            .resolve("http://h/vod/master.m3u8")
            .await
            .unwrap();

        assert_eq!(resolved.url.as_str(), "http://h/vod/high/index.m3u8");
        assert_eq!(resolved.segments.len(), 3);
        // Relative segments resolve against the variant, not the master.
        assert_eq!(
            resolved.segments[2].url.as_str(),
            "http://h/vod/high/seg_002.ts"
        );
        assert_eq!(
            source.calls(),
            vec![
                ("http://h/vod/master.m3u8".to_string(), FetchRoute::Direct),
                ("http://h/vod/high/index.m3u8".to_string(), FetchRoute::Direct),
            ]
        );
    }

    #[tokio::test]
    async fn master_without_variants_fails() {
        let source = Arc::new(FakeSource::new(false).with(
            "http://h/master.m3u8",
            "#EXTM3U\n#EXT-X-STREAM-INF:RESOLUTION=1x1\nx.m3u8\n",
        ));
        let err = resolver(source)
            .resolve("http://h/master.m3u8")
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::NoVariantFound { .. }));
    }

    #[tokio::test]
    async fn media_without_segments_fails() {
        let source = Arc::new(
            FakeSource::new(false).with("http://h/index.m3u8", "#EXTM3U\n#EXT-X-ENDLIST\n"),
        );
        let err = resolver(source)
            .resolve("http://h/index.m3u8")
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::NoSegmentsFound { .. }));
    }

    #[tokio::test]
    async fn invalid_url_is_rejected_before_fetching() {
        let source = Arc::new(FakeSource::new(false));
        let err = resolver(source.clone())
            .resolve("not a url")
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::InvalidUrl { .. }));
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn proxy_failure_falls_back_to_direct_once() {
        let source = Arc::new(
            FakeSource::new(true)
                .with("http://h/index.m3u8", HIGH)
                .failing_via_proxy("http://h/index.m3u8"),
        );
        let resolved = resolver(source.clone())
            .resolve("http://h/index.m3u8")
            .await
            .unwrap();
        assert_eq!(resolved.segments.len(), 3);
        assert_eq!(
            source.calls(),
            vec![
                ("http://h/index.m3u8".to_string(), FetchRoute::Proxy),
                ("http://h/index.m3u8".to_string(), FetchRoute::Direct),
            ]
        );
    }

    #[tokio::test]
    async fn fallback_applies_at_variant_depth() {
        let source = Arc::new(
            FakeSource::new(true)
                .with("http://h/vod/master.m3u8", MASTER)
                .with("http://h/vod/high/index.m3u8", HIGH)
                .failing_via_proxy("http://h/vod/high/index.m3u8"),
        );
        let resolved = resolver(source.clone())
            .resolve("http://h/vod/master.m3u8")
            .await
            .unwrap();
        assert_eq!(resolved.url.as_str(), "http://h/vod/high/index.m3u8");
        assert_eq!(
            source.calls(),
            vec![
                ("http://h/vod/master.m3u8".to_string(), FetchRoute::Proxy),
                ("http://h/vod/high/index.m3u8".to_string(), FetchRoute::Proxy),
                ("http://h/vod/high/index.m3u8".to_string(), FetchRoute::Direct),
            ]
        );
    }

    #[tokio::test]
    async fn no_retry_without_proxy() {
        let source = Arc::new(FakeSource::new(false));
        let err = resolver(source.clone())
            .resolve("http://h/missing.m3u8")
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::NotFound { .. }));
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn content_errors_do_not_trigger_fallback() {
        let source = Arc::new(
            FakeSource::new(true).with("http://h/index.m3u8", "#EXTM3U\n#EXT-X-ENDLIST\n"),
        );
        let err = resolver(source.clone())
            .resolve("http://h/index.m3u8")
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::NoSegmentsFound { .. }));
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn self_referencing_master_is_bounded() {
        let looping = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1\nmaster.m3u8\n";
        let source = Arc::new(FakeSource::new(false).with("http://h/master.m3u8", looping));
        let err = PlaylistResolver::new(source.clone(), 2)
            .resolve("http://h/master.m3u8")
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Playlist { .. }));
        assert_eq!(source.calls().len(), 3);
    }

    #[tokio::test]
    async fn resolution_is_idempotent() {
        let source = Arc::new(
            FakeSource::new(false)
                .with("http://h/vod/master.m3u8", MASTER)
                .with("http://h/vod/high/index.m3u8", HIGH),
        );
        let resolver = resolver(source);
        let first = resolver.resolve("http://h/vod/master.m3u8").await.unwrap();
        let second = resolver.resolve("http://h/vod/master.m3u8").await.unwrap();
        assert_eq!(first, second);
    }
}
