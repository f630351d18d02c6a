// HLS manifest fetching over HTTP.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::DownloadError;
use crate::client::{FetchRoute, HttpClients};

#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Fetch the raw manifest text at `url` over the given route.
    async fn fetch_manifest(&self, url: &Url, route: FetchRoute) -> Result<String, DownloadError>;

    /// The route used when nothing has failed yet.
    fn default_route(&self) -> FetchRoute;
}

pub struct HttpManifestSource {
    clients: HttpClients,
    timeout: Duration,
}

impl HttpManifestSource {
    pub fn new(clients: HttpClients, timeout: Duration) -> Self {
        Self { clients, timeout }
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn fetch_manifest(&self, url: &Url, route: FetchRoute) -> Result<String, DownloadError> {
        let mut request = self.clients.get(route).get(url.clone());
        if !self.timeout.is_zero() {
            request = request.timeout(self.timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DownloadError::NotFound {
                resource: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(DownloadError::http_status(
                status,
                url.as_str(),
                "playlist fetch",
            ));
        }

        let body = response.bytes().await?;
        let text = String::from_utf8(body.to_vec()).map_err(|e| {
            DownloadError::playlist(format!("Playlist content is not valid UTF-8: {e}"))
        })?;

        debug!(url = %url, ?route, "M3U8 content:\n{text}");
        Ok(text)
    }

    fn default_route(&self) -> FetchRoute {
        self.clients.default_route()
    }
}
