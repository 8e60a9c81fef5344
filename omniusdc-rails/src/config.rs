//! Service configuration.
//!
//! Layers, lowest precedence first: built-in defaults, an optional TOML file
//! named by `OMNIUSDC_CONFIG`, then `OMNIUSDC__SECTION__KEY` environment
//! variables (for example `OMNIUSDC__POLL__MAX_ATTEMPTS=10`).

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use omniusdc_core::{
    AggregatorConfig, AttestationApiConfig, ChainCatalog, ChainRegistry, ConfigError,
    NetworkEnvironment, PollConfig, PollError,
};

pub const CONFIG_PATH_ENV: &str = "OMNIUSDC_CONFIG";
const ENV_PREFIX: &str = "OMNIUSDC";
const ENV_SEPARATOR: &str = "__";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub network: NetworkEnvironment,
    /// Catalog file replacing the built-in chain list for `network`.
    pub chain_catalog: Option<PathBuf>,
    pub aggregator: AggregatorConfig,
    pub poll: PollConfig,
    /// Bounds on the poll parameters a request may override.
    pub poll_limits: PollLimits,
    pub attestation_api: AttestationApiConfig,
    pub server: ServerConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3010,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("server.host {:?} is not an IP", self.host)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Ceilings applied to every poll the rail runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollLimits {
    pub max_attempts: u32,
    pub min_interval_ms: u64,
}

impl Default for PollLimits {
    fn default() -> Self {
        Self {
            max_attempts: 120,
            min_interval_ms: 500,
        }
    }
}

impl PollLimits {
    pub fn check(&self, poll: &PollConfig) -> Result<(), PollError> {
        if poll.max_attempts > self.max_attempts {
            return Err(PollError::InvalidConfig(format!(
                "max_attempts {} exceeds the limit of {}",
                poll.max_attempts, self.max_attempts
            )));
        }
        if poll.interval_ms < self.min_interval_ms {
            return Err(PollError::InvalidConfig(format!(
                "interval_ms {} is below the minimum of {}",
                poll.interval_ms, self.min_interval_ms
            )));
        }
        Ok(())
    }
}

impl ServiceConfig {
    /// Read file and environment layers, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(config::File::from(PathBuf::from(path)));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.aggregator.validate()?;
        self.poll
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.poll_limits.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "poll_limits.max_attempts must be positive".into(),
            ));
        }
        self.poll_limits
            .check(&self.poll)
            .map_err(|e| ConfigError::Invalid(format!("poll defaults: {e}")))?;

        if self.attestation_api.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "attestation_api.request_timeout_ms must be positive".into(),
            ));
        }
        if let Some(url) = &self.attestation_api.base_url {
            if url.trim().is_empty() || !(url.starts_with("http://") || url.starts_with("https://"))
            {
                return Err(ConfigError::Invalid(format!(
                    "attestation_api.base_url {url:?} is not an http(s) URL"
                )));
            }
        }

        self.server.socket_addr()?;
        Ok(())
    }

    /// Chain registry for the configured network or catalog file.
    pub fn build_registry(&self) -> Result<ChainRegistry, ConfigError> {
        let catalog = match &self.chain_catalog {
            Some(path) => {
                let catalog = ChainCatalog::from_file(path)?;
                if catalog.network != self.network {
                    return Err(ConfigError::Invalid(format!(
                        "catalog {} is for {}, service is configured for {}",
                        path.display(),
                        catalog.network,
                        self.network
                    )));
                }
                catalog
            }
            None => ChainCatalog::for_network(self.network),
        };
        ChainRegistry::from_catalog(catalog)
    }
}
