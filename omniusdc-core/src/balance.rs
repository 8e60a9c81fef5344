//! The unified (cross-chain) balance snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::TokenAmount;
use crate::fetcher::ChainBalanceResult;
use crate::types::EvmAddress;

/// Coverage of a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStatus {
    /// Every configured chain answered.
    Complete,
    /// Some chains failed; the total covers the rest.
    Partial,
    /// No chain answered. The total is zero but means "unknown".
    Unavailable,
}

/// One wallet's USDC across every configured chain.
///
/// `total` sums successful entries only, expressed at the largest decimal
/// scale among them and the registry. `chains` holds exactly one entry per configured
/// chain in registry order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedBalance {
    pub address: EvmAddress,
    pub total: TokenAmount,
    pub total_formatted: String,
    pub total_chains: usize,
    pub active_chains: usize,
    pub chains: Vec<ChainBalanceResult>,
    pub updated_at: DateTime<Utc>,
}

impl UnifiedBalance {
    /// Reduce per-chain results (already in registry order).
    ///
    /// `min_decimals` is the scale of the total when no entry is wider.
    pub fn from_results(
        address: EvmAddress,
        min_decimals: u8,
        chains: Vec<ChainBalanceResult>,
    ) -> Self {
        let total = TokenAmount::sum(min_decimals, chains.iter().filter_map(|c| c.balance()));
        let active_chains = chains.iter().filter(|c| c.is_ok()).count();

        Self {
            address,
            total_formatted: total.format_units(),
            total,
            total_chains: chains.len(),
            active_chains,
            chains,
            updated_at: Utc::now(),
        }
    }

    pub fn status(&self) -> BalanceStatus {
        if self.active_chains == self.total_chains {
            BalanceStatus::Complete
        } else if self.active_chains == 0 {
            BalanceStatus::Unavailable
        } else {
            BalanceStatus::Partial
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.total_chains > 0 && self.active_chains == 0
    }

    pub fn failed_chains(&self) -> impl Iterator<Item = &ChainBalanceResult> {
        self.chains.iter().filter(|c| !c.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::ChainConfig;
    use crate::error::FetchError;
    use crate::fetcher::BalanceOutcome;
    use num_bigint::BigUint;
    use std::time::Duration;

    fn chain(chain_id: u64, decimals: u8) -> ChainConfig {
        ChainConfig {
            chain_id,
            name: format!("chain-{chain_id}"),
            domain: chain_id as u32,
            usdc_address: EvmAddress::from_static("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            rpc_url: "http://localhost:8545".into(),
            decimals,
        }
    }

    fn ok(chain_id: u64, raw: u64, decimals: u8) -> ChainBalanceResult {
        ChainBalanceResult::new(
            &chain(chain_id, decimals),
            BalanceOutcome::success(TokenAmount::new(BigUint::from(raw), decimals)),
            Duration::ZERO,
        )
    }

    fn failed(chain_id: u64) -> ChainBalanceResult {
        ChainBalanceResult::failed(
            &chain(chain_id, 6),
            FetchError::Network("connection refused".into()),
            Duration::ZERO,
        )
    }

    fn owner() -> EvmAddress {
        EvmAddress::parse("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap()
    }

    #[test]
    fn test_partial_snapshot() {
        let balance = UnifiedBalance::from_results(
            owner(),
            6,
            vec![ok(1, 500_000_000, 6), failed(2), ok(3, 1_000_000, 6)],
        );

        assert_eq!(balance.total_formatted, "501");
        assert_eq!(balance.total_chains, 3);
        assert_eq!(balance.active_chains, 2);
        assert_eq!(balance.status(), BalanceStatus::Partial);
        assert_eq!(balance.failed_chains().map(|c| c.chain_id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_all_failed_is_unavailable() {
        let balance = UnifiedBalance::from_results(owner(), 6, vec![failed(1), failed(2)]);
        assert!(balance.is_unavailable());
        assert_eq!(balance.status(), BalanceStatus::Unavailable);
        assert!(balance.total.is_zero());
        assert_eq!(balance.chains.len(), 2);
    }

    #[test]
    fn test_mixed_decimals_normalized() {
        let balance = UnifiedBalance::from_results(
            owner(),
            18,
            vec![ok(1, 2_500_000, 6), ok(2, 1_000_000_000_000_000_000, 18)],
        );
        assert_eq!(balance.total.decimals(), 18);
        assert_eq!(balance.total_formatted, "3.5");
        assert_eq!(balance.status(), BalanceStatus::Complete);
    }

    #[test]
    fn test_wider_entry_is_never_dropped_from_total() {
        let balance = UnifiedBalance::from_results(
            owner(),
            6,
            vec![ok(1, 1_000_000_000_000_000_001, 18), ok(2, 250_000, 6)],
        );
        assert_eq!(balance.active_chains, 2);
        assert_eq!(balance.total.decimals(), 18);
        assert_eq!(balance.total_formatted, "1.250000000000000001");
    }

    #[test]
    fn test_serializes_raw_total_as_string() {
        let balance = UnifiedBalance::from_results(owner(), 6, vec![ok(1, 42, 6)]);
        let json = serde_json::to_value(&balance).unwrap();
        assert_eq!(json["total"]["raw"], "42");
        assert_eq!(json["address"], "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
        assert_eq!(json["chains"][0]["status"], "ok");
    }
}
