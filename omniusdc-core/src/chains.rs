//! CCTP chain catalog and the immutable registry built from it.
//!
//! A catalog is versioned data: either one of the built-in tables below or a
//! TOML/JSON file loaded through the `config` crate. The registry validates it
//! once at startup and is shared read-only afterwards.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::EvmAddress;
use crate::{CHAIN_CATALOG_VERSION, USDC_DECIMALS};

/// Largest scale accepted for a token contract.
const MAX_DECIMALS: u8 = 36;

// ═══════════════════════════════════════════════════════════════════════════════
// NETWORK ENVIRONMENT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkEnvironment {
    #[default]
    Mainnet,
    Testnet,
}

impl NetworkEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
        }
    }
}

impl fmt::Display for NetworkEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHAIN CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// One CCTP-enabled chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// EVM chain id.
    pub chain_id: u64,
    /// Human-readable name.
    pub name: String,
    /// CCTP message-domain id, unique per network.
    pub domain: u32,
    /// USDC token contract.
    pub usdc_address: EvmAddress,
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Token decimals.
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

fn default_decimals() -> u8 {
    USDC_DECIMALS
}

impl ChainConfig {
    fn builtin(
        chain_id: u64,
        name: &str,
        domain: u32,
        usdc_address: EvmAddress,
        rpc_url: &str,
    ) -> Self {
        Self {
            chain_id,
            name: name.to_string(),
            domain,
            usdc_address,
            rpc_url: rpc_url.to_string(),
            decimals: USDC_DECIMALS,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILT-IN CATALOGS
// ═══════════════════════════════════════════════════════════════════════════════

const ETHEREUM_USDC: EvmAddress =
    EvmAddress::from_static("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
const AVALANCHE_USDC: EvmAddress =
    EvmAddress::from_static("0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E");
const OPTIMISM_USDC: EvmAddress =
    EvmAddress::from_static("0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85");
const ARBITRUM_USDC: EvmAddress =
    EvmAddress::from_static("0xaf88d065e77c8cC2239327C5EDb3A432268e5831");
const BASE_USDC: EvmAddress =
    EvmAddress::from_static("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");
const POLYGON_USDC: EvmAddress =
    EvmAddress::from_static("0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359");

const SEPOLIA_USDC: EvmAddress =
    EvmAddress::from_static("0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238");
const FUJI_USDC: EvmAddress =
    EvmAddress::from_static("0x5425890298aed601595a70AB815c96711a31Bc65");
const OPTIMISM_SEPOLIA_USDC: EvmAddress =
    EvmAddress::from_static("0x5fd84259d66Cd46123540766Be93DFE6D43130D7");
const ARBITRUM_SEPOLIA_USDC: EvmAddress =
    EvmAddress::from_static("0x75faf114eafb1BDbe2F0316DF893fd58CE46AA4d");
const BASE_SEPOLIA_USDC: EvmAddress =
    EvmAddress::from_static("0x036CbD53842c5426634e7929541eC2318f3dCF7e");
const AMOY_USDC: EvmAddress =
    EvmAddress::from_static("0x41E94Eb019C0762f9Bfcf9Fb1E58725BfB0e7582");

/// Versioned list of chains to aggregate over.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCatalog {
    pub version: u32,
    #[serde(default)]
    pub network: NetworkEnvironment,
    pub chains: Vec<ChainConfig>,
}

impl ChainCatalog {
    /// Circle CCTP mainnets with public RPC endpoints.
    pub fn mainnet() -> Self {
        Self {
            version: CHAIN_CATALOG_VERSION,
            network: NetworkEnvironment::Mainnet,
            chains: vec![
                ChainConfig::builtin(1, "Ethereum", 0, ETHEREUM_USDC, "https://eth.llamarpc.com"),
                ChainConfig::builtin(
                    43114,
                    "Avalanche",
                    1,
                    AVALANCHE_USDC,
                    "https://api.avax.network/ext/bc/C/rpc",
                ),
                ChainConfig::builtin(10, "OP Mainnet", 2, OPTIMISM_USDC, "https://mainnet.optimism.io"),
                ChainConfig::builtin(
                    42161,
                    "Arbitrum One",
                    3,
                    ARBITRUM_USDC,
                    "https://arb1.arbitrum.io/rpc",
                ),
                ChainConfig::builtin(8453, "Base", 6, BASE_USDC, "https://mainnet.base.org"),
                ChainConfig::builtin(137, "Polygon PoS", 7, POLYGON_USDC, "https://polygon-rpc.com"),
            ],
        }
    }

    /// Circle CCTP testnets.
    pub fn testnet() -> Self {
        Self {
            version: CHAIN_CATALOG_VERSION,
            network: NetworkEnvironment::Testnet,
            chains: vec![
                ChainConfig::builtin(
                    11155111,
                    "Ethereum Sepolia",
                    0,
                    SEPOLIA_USDC,
                    "https://ethereum-sepolia-rpc.publicnode.com",
                ),
                ChainConfig::builtin(
                    43113,
                    "Avalanche Fuji",
                    1,
                    FUJI_USDC,
                    "https://api.avax-test.network/ext/bc/C/rpc",
                ),
                ChainConfig::builtin(
                    11155420,
                    "OP Sepolia",
                    2,
                    OPTIMISM_SEPOLIA_USDC,
                    "https://sepolia.optimism.io",
                ),
                ChainConfig::builtin(
                    421614,
                    "Arbitrum Sepolia",
                    3,
                    ARBITRUM_SEPOLIA_USDC,
                    "https://sepolia-rollup.arbitrum.io/rpc",
                ),
                ChainConfig::builtin(
                    84532,
                    "Base Sepolia",
                    6,
                    BASE_SEPOLIA_USDC,
                    "https://sepolia.base.org",
                ),
                ChainConfig::builtin(
                    80002,
                    "Polygon Amoy",
                    7,
                    AMOY_USDC,
                    "https://rpc-amoy.polygon.technology",
                ),
            ],
        }
    }

    pub fn for_network(network: NetworkEnvironment) -> Self {
        match network {
            NetworkEnvironment::Mainnet => Self::mainnet(),
            NetworkEnvironment::Testnet => Self::testnet(),
        }
    }

    /// Load a catalog file. Format is picked from the extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Validated, immutable chain list. Order is the catalog order.
#[derive(Clone, Debug)]
pub struct ChainRegistry {
    network: NetworkEnvironment,
    chains: Vec<ChainConfig>,
}

impl ChainRegistry {
    pub fn from_catalog(catalog: ChainCatalog) -> Result<Self, ConfigError> {
        if catalog.version != CHAIN_CATALOG_VERSION {
            return Err(ConfigError::UnsupportedVersion(catalog.version));
        }
        if catalog.chains.is_empty() {
            return Err(ConfigError::NoChains);
        }

        let mut chain_ids = HashSet::new();
        let mut domains = HashSet::new();
        for chain in &catalog.chains {
            if !chain_ids.insert(chain.chain_id) {
                return Err(ConfigError::DuplicateChainId(chain.chain_id));
            }
            if !domains.insert(chain.domain) {
                return Err(ConfigError::DuplicateDomain(chain.domain));
            }
            if chain.decimals > MAX_DECIMALS {
                return Err(ConfigError::InvalidDecimals {
                    chain_id: chain.chain_id,
                    decimals: chain.decimals,
                });
            }
            validate_endpoint(chain)?;
        }

        tracing::debug!(
            network = %catalog.network,
            chains = catalog.chains.len(),
            "chain registry loaded"
        );

        Ok(Self {
            network: catalog.network,
            chains: catalog.chains,
        })
    }

    pub fn network(&self) -> NetworkEnvironment {
        self.network
    }

    pub fn chains(&self) -> &[ChainConfig] {
        &self.chains
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Always false for a constructed registry.
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn get(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    pub fn by_domain(&self, domain: u32) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.domain == domain)
    }

    /// Scale the unified total is expressed in.
    pub fn max_decimals(&self) -> u8 {
        self.chains
            .iter()
            .map(|c| c.decimals)
            .max()
            .unwrap_or(USDC_DECIMALS)
    }
}

fn validate_endpoint(chain: &ChainConfig) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidEndpoint {
        chain_id: chain.chain_id,
        url: chain.rpc_url.clone(),
    };

    let url = reqwest::Url::parse(chain.rpc_url.trim()).map_err(|_| invalid())?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(()),
        _ => Err(invalid()),
    }
}
