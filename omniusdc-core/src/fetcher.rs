//! Single-chain balance fetch with a per-call timeout.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::amount::TokenAmount;
use crate::chains::ChainConfig;
use crate::error::FetchError;
use crate::rpc::BalanceReader;
use crate::types::EvmAddress;

// ═══════════════════════════════════════════════════════════════════════════════
// RESULT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of reading one chain. A zero balance is a success.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BalanceOutcome {
    Ok {
        balance: TokenAmount,
        formatted: String,
    },
    Failed {
        error: FetchError,
    },
}

impl BalanceOutcome {
    pub fn success(balance: TokenAmount) -> Self {
        let formatted = balance.format_units();
        Self::Ok { balance, formatted }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn balance(&self) -> Option<&TokenAmount> {
        match self {
            Self::Ok { balance, .. } => Some(balance),
            Self::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            Self::Ok { .. } => None,
            Self::Failed { error } => Some(error),
        }
    }
}

/// Per-chain entry of a unified balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBalanceResult {
    pub chain_id: u64,
    pub chain_name: String,
    pub domain: u32,
    #[serde(flatten)]
    pub outcome: BalanceOutcome,
    pub completed_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl ChainBalanceResult {
    pub fn new(chain: &ChainConfig, outcome: BalanceOutcome, elapsed: Duration) -> Self {
        Self {
            chain_id: chain.chain_id,
            chain_name: chain.name.clone(),
            domain: chain.domain,
            outcome,
            completed_at: Utc::now(),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn failed(chain: &ChainConfig, error: FetchError, elapsed: Duration) -> Self {
        Self::new(chain, BalanceOutcome::Failed { error }, elapsed)
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn balance(&self) -> Option<&TokenAmount> {
        self.outcome.balance()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FETCHER
// ═══════════════════════════════════════════════════════════════════════════════

/// Reads one chain's USDC balance. Never returns an error; failures are data.
#[derive(Clone)]
pub struct BalanceFetcher {
    reader: Arc<dyn BalanceReader>,
    timeout: Duration,
}

impl BalanceFetcher {
    pub fn new(reader: Arc<dyn BalanceReader>, timeout: Duration) -> Self {
        Self { reader, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn fetch(&self, chain: &ChainConfig, owner: &EvmAddress) -> ChainBalanceResult {
        let started = Instant::now();
        let read = self
            .reader
            .read_balance(&chain.rpc_url, &chain.usdc_address, owner);

        let outcome = match tokio::time::timeout(self.timeout, read).await {
            Ok(Ok(raw)) => BalanceOutcome::success(TokenAmount::new(raw, chain.decimals)),
            Ok(Err(error)) => BalanceOutcome::Failed { error },
            Err(_) => BalanceOutcome::Failed {
                error: FetchError::Timeout(self.timeout.as_millis() as u64),
            },
        };

        let elapsed = started.elapsed();
        match &outcome {
            BalanceOutcome::Ok { formatted, .. } => tracing::debug!(
                chain_id = chain.chain_id,
                balance = %formatted,
                elapsed_ms = elapsed.as_millis() as u64,
                "balance fetched"
            ),
            BalanceOutcome::Failed { error } => tracing::warn!(
                chain_id = chain.chain_id,
                chain = %chain.name,
                kind = error.kind(),
                error = %error,
                "balance fetch failed"
            ),
        }

        ChainBalanceResult::new(chain, outcome, elapsed)
    }
}
