//! Configuration management using the prefer crate.

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::proxy::{
    resolve_user_agent, PacingConfig, ProviderName, ProxyEndpoint, RouterConfig,
};

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// User agent config value: None for the default, "impersonate"
    /// for a random browser agent, anything else as a literal string.
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Base delay between requests to the same domain, in milliseconds.
    pub request_delay_ms: u64,
    /// Sources fetched concurrently during discovery.
    pub discovery_concurrency: usize,
    /// Egress proxy configuration.
    pub proxy: ProxyConfig,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("newscrawl");

        Self {
            data_dir,
            database_filename: "newscrawl.db".to_string(),
            user_agent: None,
            request_timeout: 30,
            request_delay_ms: 500,
            discovery_concurrency: 4,
            proxy: ProxyConfig::default(),
        }
    }
}

impl Settings {
    /// Get the full path to the database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir)
    }

    /// Build the egress router configuration. Fails on an unknown
    /// provider name so a typo is caught before any request.
    pub fn router_config(&self) -> Result<RouterConfig, EngineError> {
        let active = ProviderName::from_str(&self.proxy.active)?;
        let fallback = self
            .proxy
            .fallback
            .as_deref()
            .map(ProviderName::from_str)
            .transpose()?;

        Ok(RouterConfig {
            active,
            fallback,
            residential: self.proxy.residential.as_ref().map(EndpointConfig::to_endpoint),
            gateway: self.proxy.gateway.as_ref().map(EndpointConfig::to_endpoint),
            user_agent: resolve_user_agent(self.user_agent.as_deref()),
            request_timeout: Duration::from_secs(self.request_timeout),
        })
    }

    pub fn pacing_config(&self) -> PacingConfig {
        PacingConfig {
            base_delay: Duration::from_millis(self.request_delay_ms),
            ..Default::default()
        }
    }
}

/// Egress proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Active provider name: direct, residential, or gateway.
    #[serde(default = "default_provider")]
    pub active: String,
    /// Provider retried on egress-level failures.
    #[serde(default)]
    pub fallback: Option<String>,
    #[serde(default)]
    pub residential: Option<EndpointConfig>,
    #[serde(default)]
    pub gateway: Option<EndpointConfig>,
}

fn default_provider() -> String {
    "direct".to_string()
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            active: default_provider(),
            fallback: None,
            residential: None,
            gateway: None,
        }
    }
}

/// One proxy endpoint as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// "http" or "socks5".
    #[serde(default = "default_scheme")]
    pub scheme: String,
}

fn default_scheme() -> String {
    "http".to_string()
}

impl EndpointConfig {
    fn to_endpoint(&self) -> ProxyEndpoint {
        ProxyEndpoint {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            scheme: self.scheme.clone(),
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Target directory for data.
    #[serde(default)]
    pub target: Option<String>,
    /// Database filename.
    #[serde(default)]
    pub database: Option<String>,
    /// User agent string.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default)]
    pub request_timeout: Option<u64>,
    /// Delay between requests in milliseconds.
    #[serde(default)]
    pub request_delay_ms: Option<u64>,
    /// Sources fetched concurrently during discovery.
    #[serde(default)]
    pub discovery_concurrency: Option<usize>,
    /// Egress proxy configuration.
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
}

/// Read one proxy endpoint table (`proxy.residential`, `proxy.gateway`)
/// using dot-notation keys. Host and port are required; a table missing
/// either is treated as absent.
fn endpoint_from(config: &prefer::Config, prefix: &str) -> Option<EndpointConfig> {
    let host: String = config.get(&format!("{prefix}.host")).ok()?;
    let port: u64 = config.get(&format!("{prefix}.port")).ok()?;
    let port = u16::try_from(port).ok()?;

    Some(EndpointConfig {
        host,
        port,
        username: config.get(&format!("{prefix}.username")).ok(),
        password: config.get(&format!("{prefix}.password")).ok(),
        scheme: config
            .get(&format!("{prefix}.scheme"))
            .ok()
            .unwrap_or_else(default_scheme),
    })
}

fn proxy_from(config: &prefer::Config) -> Option<ProxyConfig> {
    let active: Option<String> = config.get("proxy.active").ok();
    let fallback: Option<String> = config.get("proxy.fallback").ok();
    let residential = endpoint_from(config, "proxy.residential");
    let gateway = endpoint_from(config, "proxy.gateway");

    if active.is_none() && fallback.is_none() && residential.is_none() && gateway.is_none() {
        return None;
    }
    Some(ProxyConfig {
        active: active.unwrap_or_else(default_provider),
        fallback,
        residential,
        gateway,
    })
}

impl Config {
    /// Load configuration using the prefer crate, which discovers
    /// newscrawl config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("newscrawl").await {
            Ok(pref_config) => {
                // Extract values from the prefer config using dot notation
                let target: Option<String> = pref_config.get("target").ok();
                let database: Option<String> = pref_config.get("database").ok();
                let user_agent: Option<String> = pref_config.get("user_agent").ok();
                let request_timeout: Option<u64> = pref_config.get("request_timeout").ok();
                let request_delay_ms: Option<u64> = pref_config.get("request_delay_ms").ok();
                let discovery_concurrency: Option<u64> =
                    pref_config.get("discovery_concurrency").ok();
                let proxy = proxy_from(&pref_config);

                Config {
                    target,
                    database,
                    user_agent,
                    request_timeout,
                    request_delay_ms,
                    discovery_concurrency: discovery_concurrency.map(|c| c as usize),
                    proxy,
                }
            }
            Err(_) => {
                // No config file found, use defaults
                Self::default()
            }
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref target) = self.target {
            let path = shellexpand::tilde(target);
            settings.data_dir = PathBuf::from(path.as_ref());
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(delay) = self.request_delay_ms {
            settings.request_delay_ms = delay;
        }
        if let Some(concurrency) = self.discovery_concurrency {
            settings.discovery_concurrency = concurrency;
        }
        if let Some(ref proxy) = self.proxy {
            settings.proxy = proxy.clone();
        }
    }
}

/// Load settings from configuration.
pub async fn load_settings() -> Settings {
    let config = Config::load().await;
    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings);
    settings
}
