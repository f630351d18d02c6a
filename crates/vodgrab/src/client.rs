use std::sync::OnceLock;

use reqwest::Client;
use tracing::{debug, info};

use crate::{DownloadError, DownloaderConfig, proxy::build_proxy_from_config};

/// How a request reaches the origin server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchRoute {
    /// Through the configured proxy, if one is enabled
    Proxy,
    /// Straight to the origin with every proxy disabled
    Direct,
}

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate installed a provider first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &DownloaderConfig, route: FetchRoute) -> Result<Client, DownloadError> {
    install_rustls_provider();

    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    client_builder = match (route, config.active_proxy()) {
        (FetchRoute::Proxy, Some(proxy_config)) => {
            let proxy = build_proxy_from_config(proxy_config)?;
            info!(proxy_url = %proxy_config.url, "Using explicitly configured proxy");
            client_builder.proxy(proxy)
        }
        (FetchRoute::Proxy, None) if config.use_system_proxy => {
            // reqwest picks up system proxy settings unless no_proxy() is called
            debug!("Using system proxy settings");
            client_builder
        }
        _ => {
            debug!("Proxy disabled for client");
            client_builder.no_proxy()
        }
    };

    client_builder.build().map_err(DownloadError::from)
}

/// The pair of clients a run needs: one honoring the proxy settings and one
/// that always connects directly.
#[derive(Debug, Clone)]
pub struct HttpClients {
    proxied: Option<Client>,
    direct: Client,
}

impl HttpClients {
    pub fn new(config: &DownloaderConfig) -> Result<Self, DownloadError> {
        let direct = create_client(config, FetchRoute::Direct)?;
        let proxied = match config.active_proxy() {
            Some(_) => Some(create_client(config, FetchRoute::Proxy)?),
            None if config.use_system_proxy => Some(create_client(config, FetchRoute::Proxy)?),
            None => None,
        };
        Ok(Self { proxied, direct })
    }

    /// Whether requests on the default route go through a proxy.
    pub fn proxy_enabled(&self) -> bool {
        self.proxied.is_some()
    }

    /// The route requests take unless told otherwise.
    pub fn default_route(&self) -> FetchRoute {
        if self.proxy_enabled() {
            FetchRoute::Proxy
        } else {
            FetchRoute::Direct
        }
    }

    pub fn get(&self, route: FetchRoute) -> &Client {
        match (route, &self.proxied) {
            (FetchRoute::Proxy, Some(client)) => client,
            _ => &self.direct,
        }
    }
}
