//! # omniusdc-core
//!
//! Unified USDC balance aggregation across CCTP chains and attestation
//! tracking against Circle's Iris service.
//!
//! ## Overview
//!
//! Two independent pieces live here:
//!
//! - [`BalanceAggregator`] fans a `balanceOf` read out to every chain in a
//!   [`ChainRegistry`], tolerates per-chain failure and reduces the results to
//!   one [`UnifiedBalance`].
//! - [`AttestationPoller`] drives a CCTP transfer's attestation lookup until
//!   it completes, its attempt budget runs out, or the caller cancels.
//!
//! Network access goes through the [`BalanceReader`] and
//! [`AttestationClient`] traits; time goes through [`Clock`]. Production
//! implementations use `reqwest` and tokio, tests swap in fakes and tokio's
//! paused clock.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use omniusdc_core::{
//!     AggregatorConfig, BalanceAggregator, ChainCatalog, ChainRegistry, JsonRpcBalanceReader,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(ChainRegistry::from_catalog(ChainCatalog::mainnet())?);
//! let reader = Arc::new(JsonRpcBalanceReader::new()?);
//! let aggregator = BalanceAggregator::new(registry, reader, &AggregatorConfig::default());
//!
//! let balance = aggregator
//!     .get_unified_balance("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed")
//!     .await?;
//! println!("{} USDC on {} chains", balance.total_formatted, balance.active_chains);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod amount;
pub mod attestation;
pub mod balance;
pub mod chains;
pub mod clock;
pub mod error;
pub mod fetcher;
pub mod poller;
pub mod rpc;
pub mod types;

pub use aggregator::{AggregatorConfig, BalanceAggregator};
pub use amount::TokenAmount;
pub use attestation::{
    AttestationApiConfig, AttestationClient, AttestationReport, AttestationRequest,
    AttestationResult, AttestationStatus, IrisAttestationClient,
};
pub use balance::{BalanceStatus, UnifiedBalance};
pub use chains::{ChainCatalog, ChainConfig, ChainRegistry, NetworkEnvironment};
pub use clock::{Clock, TokioClock};
pub use error::{
    AttestationError, ConfigError, FetchError, ParseError, PollError, RequestError,
};
pub use fetcher::{BalanceFetcher, BalanceOutcome, ChainBalanceResult};
pub use poller::{AttestationPoller, PollConfig};
pub use rpc::{BalanceReader, JsonRpcBalanceReader};
pub use types::{EvmAddress, TransferId};

/// Wallets are plain EVM accounts.
pub type WalletAddress = EvmAddress;

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Rail identifier reported by the HTTP service.
pub const RAIL_ID: &str = "USDC_UNIFIED";

/// Delay between attestation attempts.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Attestation attempts before giving up with `timeout`.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Budget for a single chain's balance read.
pub const DEFAULT_PER_CALL_TIMEOUT_MS: u64 = 5_000;

/// Overall fan-out deadline as a multiple of the per-call timeout.
pub const DEFAULT_OVERALL_TIMEOUT_FACTOR: u32 = 2;

/// USDC decimals on every supported EVM chain.
pub const USDC_DECIMALS: u8 = 6;

/// Current chain catalog format.
pub const CHAIN_CATALOG_VERSION: u32 = 1;
