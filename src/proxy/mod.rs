//! Egress routing through a closed set of proxy providers.
//!
//! All outbound HTTP goes through [`ProxyRouter`]. Each provider gets
//! one `reqwest::Client` built at construction time; an unknown
//! provider name is a configuration error surfaced before any request
//! is made, never a silent fallback to direct egress.

pub mod pacing;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Proxy, StatusCode};
use tracing::{debug, warn};

use crate::error::{EngineError, FetchError};

pub use pacing::{DomainPacer, PacingConfig};

const DEFAULT_USER_AGENT: &str = concat!("newscrawl/", env!("CARGO_PKG_VERSION"));

/// Real browser user agents for impersonate mode.
const IMPERSONATE_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

fn random_user_agent() -> &'static str {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as usize)
        .unwrap_or(0);
    IMPERSONATE_USER_AGENTS[nanos % IMPERSONATE_USER_AGENTS.len()]
}

/// Resolve the user agent from its config value.
/// - None => default newscrawl user agent
/// - "impersonate" => random real browser user agent
/// - other => custom user agent string
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config {
        None => DEFAULT_USER_AGENT.to_string(),
        Some("impersonate") => random_user_agent().to_string(),
        Some(custom) => custom.to_string(),
    }
}

/// The closed set of egress providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderName {
    /// No proxy, plain egress.
    Direct,
    /// Residential proxy pool.
    Residential,
    /// Datacenter gateway proxy.
    Gateway,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Direct => "direct",
            ProviderName::Residential => "residential",
            ProviderName::Gateway => "gateway",
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(ProviderName::Direct),
            "residential" => Ok(ProviderName::Residential),
            "gateway" => Ok(ProviderName::Gateway),
            other => Err(EngineError::Configuration(format!(
                "unknown proxy provider '{other}' (expected direct, residential, or gateway)"
            ))),
        }
    }
}

/// Connection details for one proxy provider.
#[derive(Debug, Clone)]
pub struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// "http" or "socks5".
    pub scheme: String,
}

impl ProxyEndpoint {
    fn proxy_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Router construction parameters.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub active: ProviderName,
    /// Optional provider to retry through when the active provider has
    /// an egress-level failure (auth or network).
    pub fallback: Option<ProviderName>,
    pub residential: Option<ProxyEndpoint>,
    pub gateway: Option<ProxyEndpoint>,
    pub user_agent: String,
    pub request_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            active: ProviderName::Direct,
            fallback: None,
            residential: None,
            gateway: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// A fetched page body plus the status it arrived with.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// Outbound fetch seam. The discovery engine depends on this trait so
/// tests can substitute canned pages for live HTTP.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// Routes outbound requests through the configured provider, paced per
/// destination domain.
#[derive(Debug)]
pub struct ProxyRouter {
    config: RouterConfig,
    clients: HashMap<ProviderName, Client>,
    pacer: Arc<DomainPacer>,
}

impl ProxyRouter {
    /// Build one client per configured provider. Selecting a provider
    /// whose endpoint is missing is rejected here, at construction.
    pub fn new(config: RouterConfig, pacer: Arc<DomainPacer>) -> Result<Self, EngineError> {
        let mut clients = HashMap::new();

        clients.insert(
            ProviderName::Direct,
            Self::build_client(&config, None)
                .map_err(|e| EngineError::Configuration(format!("direct client: {e}")))?,
        );
        if let Some(endpoint) = &config.residential {
            clients.insert(
                ProviderName::Residential,
                Self::build_client(&config, Some(endpoint))
                    .map_err(|e| EngineError::Configuration(format!("residential client: {e}")))?,
            );
        }
        if let Some(endpoint) = &config.gateway {
            clients.insert(
                ProviderName::Gateway,
                Self::build_client(&config, Some(endpoint))
                    .map_err(|e| EngineError::Configuration(format!("gateway client: {e}")))?,
            );
        }

        for provider in std::iter::once(config.active).chain(config.fallback) {
            if !clients.contains_key(&provider) {
                return Err(EngineError::Configuration(format!(
                    "proxy provider '{provider}' selected but has no configured endpoint"
                )));
            }
        }

        Ok(Self {
            config,
            clients,
            pacer,
        })
    }

    fn build_client(
        config: &RouterConfig,
        endpoint: Option<&ProxyEndpoint>,
    ) -> Result<Client, reqwest::Error> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true);

        if let Some(endpoint) = endpoint {
            let mut proxy = Proxy::all(endpoint.proxy_url())?;
            if let (Some(user), Some(pass)) = (&endpoint.username, &endpoint.password) {
                proxy = proxy.basic_auth(user, pass);
            }
            builder = builder.proxy(proxy);
        }

        builder.build()
    }

    pub fn active_provider(&self) -> ProviderName {
        self.config.active
    }

    /// Fetch through a specific provider, bypassing fallback logic.
    pub async fn fetch_with(
        &self,
        provider: ProviderName,
        url: &str,
    ) -> Result<FetchedPage, FetchError> {
        let client = self.clients.get(&provider).ok_or_else(|| {
            FetchError::Network(format!("provider '{provider}' has no configured endpoint"))
        })?;

        let domain = self.pacer.acquire(url).await;

        let response = match client.get(url).send().await {
            Ok(response) => response,
            Err(err) => {
                debug!(provider = %provider, url, error = %err, "fetch failed");
                return Err(FetchError::from_reqwest(err));
            }
        };

        let status = response.status();
        if status == StatusCode::PROXY_AUTHENTICATION_REQUIRED {
            return Err(FetchError::Auth(format!(
                "provider '{provider}' rejected credentials"
            )));
        }

        if let Some(domain) = &domain {
            match status.as_u16() {
                429 | 503 => self.pacer.report_throttled(domain, status.as_u16()).await,
                500..=599 => self.pacer.report_server_error(domain).await,
                200..=299 => self.pacer.report_success(domain).await,
                _ => {}
            }
        }

        if !status.is_success() {
            return Err(FetchError::Remote {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(FetchError::from_reqwest)?;
        Ok(FetchedPage {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Fetcher for ProxyRouter {
    /// Fetch through the active provider; on an egress-level failure
    /// (bad credentials, network trouble) retry once through the
    /// fallback provider if one is configured. Remote HTTP errors are
    /// returned as-is since a different egress path won't change them.
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        match self.fetch_with(self.config.active, url).await {
            Ok(page) => Ok(page),
            Err(err) if err.is_egress_failure() => match self.config.fallback {
                Some(fallback) if fallback != self.config.active => {
                    warn!(
                        active = %self.config.active,
                        fallback = %fallback,
                        url,
                        error = %err,
                        "egress failure, retrying through fallback provider"
                    );
                    self.fetch_with(fallback, url).await
                }
                _ => Err(err),
            },
            Err(err) => Err(err),
        }
    }
}
