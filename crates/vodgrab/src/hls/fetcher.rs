// HLS Segment Fetcher: downloads the raw bytes of a single media segment.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::trace;

use crate::DownloadError;
use crate::client::{FetchRoute, HttpClients};
use crate::hls::playlist::SegmentRef;

/// One download attempt for one segment. Retrying is left to the caller.
#[async_trait]
pub trait SegmentDownloader: Send + Sync {
    async fn download_segment(&self, segment: &SegmentRef) -> Result<Bytes, DownloadError>;
}

pub struct SegmentFetcher {
    clients: HttpClients,
    route: FetchRoute,
    timeout: Duration,
}

impl SegmentFetcher {
    /// Segments go over the clients' default route.
    pub fn new(clients: HttpClients, timeout: Duration) -> Self {
        let route = clients.default_route();
        Self {
            clients,
            route,
            timeout,
        }
    }

    async fn read_body(response: reqwest::Response) -> Result<Bytes, DownloadError> {
        let capacity = response.content_length().unwrap_or(0) as usize;
        let mut buffer = BytesMut::with_capacity(capacity);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }
}

#[async_trait]
impl SegmentDownloader for SegmentFetcher {
    async fn download_segment(&self, segment: &SegmentRef) -> Result<Bytes, DownloadError> {
        let mut request = self.clients.get(self.route).get(segment.url.clone());
        if !self.timeout.is_zero() {
            request = request.timeout(self.timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DownloadError::NotFound {
                resource: segment.url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(DownloadError::http_status(
                status,
                segment.url.as_str(),
                "segment download",
            ));
        }

        let bytes = Self::read_body(response).await?;
        trace!(ordinal = segment.ordinal, bytes = bytes.len(), route = ?self.route, "Segment body received");
        Ok(bytes)
    }
}
