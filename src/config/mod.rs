use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Complete broker configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    6767
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// Token refresh configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    /// Upper bound on a single provider refresh call (seconds)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// How often the background sweep runs (seconds, 0 disables it)
    #[serde(default)]
    pub sweep_interval_seconds: u64,
    /// Sweep refreshes records expiring within this window (seconds)
    #[serde(default = "default_sweep_lead_seconds")]
    pub sweep_lead_seconds: i64,
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_sweep_lead_seconds() -> i64 {
    300
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            sweep_interval_seconds: 0,
            sweep_lead_seconds: default_sweep_lead_seconds(),
        }
    }
}

/// OAuth clients, one per provider family
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub google: Option<OAuthClientConfig>,
    #[serde(default)]
    pub slack: Option<OAuthClientConfig>,
    #[serde(default)]
    pub confluence: Option<OAuthClientConfig>,
}

/// Credentials of one OAuth application
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthClientConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Overrides the provider's default token endpoint
    #[serde(default)]
    pub token_url: Option<String>,
}

impl OAuthClientConfig {
    /// Both client id and secret are set.
    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

impl BrokerConfig {
    /// Loads `BROKER_CONFIG` (if set) and applies environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("BROKER_CONFIG") {
            Ok(path) => load_config(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlays values from `lookup` (normally the process environment).
    ///
    /// Unparseable numeric values are ignored and the current value kept.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        override_client(&mut self.providers.google, "GOOGLE", &non_empty);
        override_client(&mut self.providers.slack, "SLACK", &non_empty);
        override_client(&mut self.providers.confluence, "CONFLUENCE", &non_empty);

        if let Some(port) = non_empty("PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(secs) = non_empty("BROKER_REFRESH_TIMEOUT_SECONDS").and_then(|v| v.parse().ok()) {
            self.refresh.timeout_seconds = secs;
        }
        if let Some(secs) = non_empty("BROKER_SWEEP_INTERVAL_SECONDS").and_then(|v| v.parse().ok()) {
            self.refresh.sweep_interval_seconds = secs;
        }
    }
}

fn override_client<F>(client: &mut Option<OAuthClientConfig>, prefix: &str, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    let client_id = lookup(&format!("{}_CLIENT_ID", prefix));
    let client_secret = lookup(&format!("{}_CLIENT_SECRET", prefix));
    if client_id.is_none() && client_secret.is_none() {
        return;
    }

    let entry = client.get_or_insert_with(OAuthClientConfig::default);
    if let Some(id) = client_id {
        entry.client_id = id;
    }
    if let Some(secret) = client_secret {
        entry.client_secret = secret;
    }
}

/// Load configuration from TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<BrokerConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: BrokerConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}
