//! Gateway Configuration Module
//!
//! Provides configuration loading for the gateway. A TOML file is the base;
//! environment variables such as `RAYO__DOMAIN__NAME=rayo.example.net`
//! override individual keys. Keys are matched lowercased, so only
//! single-word keys can be overridden this way.

use anyhow::{bail, ensure, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "RAYO";

/// URI prefix of the fallback dial gateway
pub const DEFAULT_GATEWAY_PREFIX: &str = "default";

/// Main gateway configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    #[serde(default)]
    pub domain: DomainConfig,

    #[serde(default)]
    pub settings: Settings,

    /// Outbound dial rewriting, one entry per URI prefix
    #[serde(rename = "dial-gateway", default = "default_dial_gateways")]
    pub dial_gateways: Vec<DialGatewayConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct DomainConfig {
    pub name: String,
}

/// Runtime tuning
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct Settings {
    /// Bus worker threads
    pub message_threads: usize,

    /// Bounded queue capacity; sends beyond it are dropped
    pub queue_capacity: usize,

    /// Unjoined calls without commands for this long are hung up
    pub max_idle_sec: u64,

    /// Conference profile used when joining mixers
    pub mixer_conf_profile: String,
}

/// One `[[dial-gateway]]` entry
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct DialGatewayConfig {
    pub uri_prefix: String,

    #[serde(default)]
    pub dial_prefix: String,

    /// Characters removed from the front of the URI before prefixing
    #[serde(default)]
    pub strip: usize,
}

impl DialGatewayConfig {
    pub fn new(uri_prefix: &str, dial_prefix: &str, strip: usize) -> Self {
        Self {
            uri_prefix: uri_prefix.to_string(),
            dial_prefix: dial_prefix.to_string(),
            strip,
        }
    }
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            name: "localhost".to_string(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            message_threads: 8,
            queue_capacity: 25_000,
            max_idle_sec: 30,
            mixer_conf_profile: "sla".to_string(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            domain: DomainConfig::default(),
            settings: Settings::default(),
            dial_gateways: default_dial_gateways(),
        }
    }
}

fn default_dial_gateways() -> Vec<DialGatewayConfig> {
    vec![
        DialGatewayConfig::new(DEFAULT_GATEWAY_PREFIX, "sofia/gateway/outbound/", 0),
        DialGatewayConfig::new("tel:", "sofia/gateway/outbound/", 4),
        DialGatewayConfig::new("user", "", 0),
        DialGatewayConfig::new("sofia", "", 0),
    ]
}

impl Settings {
    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_sec)
    }
}

impl GatewayConfig {
    /// Load configuration from a file with `RAYO__` environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration with overrides read from `<prefix>__SECTION__KEY`
    pub fn load_with_prefix(path: &Path, env_prefix: &str) -> Result<Self> {
        info!(path = %path.display(), "Loading gateway configuration");

        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(true))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to build configuration from {}", path.display()))?;

        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        debug!(
            domain = %config.domain.name,
            workers = config.settings.message_threads,
            gateways = config.dial_gateways.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parse and validate a TOML document, without environment overrides
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.domain.name.trim().is_empty(), "domain.name must not be empty");
        ensure!(
            self.settings.message_threads > 0,
            "settings.message-threads must be positive"
        );
        ensure!(
            self.settings.queue_capacity > 0,
            "settings.queue-capacity must be positive"
        );

        let mut prefixes = HashSet::new();
        for gateway in &self.dial_gateways {
            if gateway.uri_prefix.is_empty() {
                bail!("dial-gateway uri-prefix must not be empty");
            }
            if !prefixes.insert(gateway.uri_prefix.as_str()) {
                bail!("duplicate dial-gateway uri-prefix '{}'", gateway.uri_prefix);
            }
        }
        Ok(())
    }
}

/// Convenience function: expand `~` and `${VAR}` in the path, then load
pub fn load_config(path: &str) -> Result<GatewayConfig> {
    let expanded = shellexpand::full(path).context("Failed to expand configuration path")?;
    GatewayConfig::load(&PathBuf::from(expanded.as_ref()))
}
