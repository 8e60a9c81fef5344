//! Fan-out/fan-in balance aggregation across the chain registry.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::balance::UnifiedBalance;
use crate::chains::ChainRegistry;
use crate::error::{ConfigError, FetchError, RequestError};
use crate::fetcher::{BalanceFetcher, ChainBalanceResult};
use crate::rpc::BalanceReader;
use crate::types::EvmAddress;
use crate::{DEFAULT_OVERALL_TIMEOUT_FACTOR, DEFAULT_PER_CALL_TIMEOUT_MS};

/// Ten minutes.
pub const MAX_PER_CALL_TIMEOUT_MS: u64 = 600_000;
pub const MAX_OVERALL_TIMEOUT_FACTOR: u32 = 10;

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Budget for one chain's read.
    #[serde(default = "default_per_call_timeout_ms")]
    pub per_call_timeout_ms: u64,
    /// Whole fan-out deadline as a multiple of the per-call budget.
    #[serde(default = "default_overall_timeout_factor")]
    pub overall_timeout_factor: u32,
}

fn default_per_call_timeout_ms() -> u64 {
    DEFAULT_PER_CALL_TIMEOUT_MS
}

fn default_overall_timeout_factor() -> u32 {
    DEFAULT_OVERALL_TIMEOUT_FACTOR
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            per_call_timeout_ms: default_per_call_timeout_ms(),
            overall_timeout_factor: default_overall_timeout_factor(),
        }
    }
}

impl AggregatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.per_call_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "aggregator.per_call_timeout_ms must be positive".into(),
            ));
        }
        if self.per_call_timeout_ms > MAX_PER_CALL_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "aggregator.per_call_timeout_ms must be at most {MAX_PER_CALL_TIMEOUT_MS}"
            )));
        }
        if !(1..=MAX_OVERALL_TIMEOUT_FACTOR).contains(&self.overall_timeout_factor) {
            return Err(ConfigError::Invalid(format!(
                "aggregator.overall_timeout_factor must be between 1 and {MAX_OVERALL_TIMEOUT_FACTOR}"
            )));
        }
        Ok(())
    }

    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_millis(self.per_call_timeout_ms)
    }

    pub fn overall_timeout(&self) -> Duration {
        self.per_call_timeout().saturating_mul(self.overall_timeout_factor)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AGGREGATOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Queries every registered chain concurrently and reduces the answers.
#[derive(Clone)]
pub struct BalanceAggregator {
    registry: Arc<ChainRegistry>,
    fetcher: BalanceFetcher,
    overall_timeout: Duration,
}

impl BalanceAggregator {
    pub fn new(
        registry: Arc<ChainRegistry>,
        reader: Arc<dyn BalanceReader>,
        config: &AggregatorConfig,
    ) -> Self {
        Self {
            registry,
            fetcher: BalanceFetcher::new(reader, config.per_call_timeout()),
            overall_timeout: config.overall_timeout(),
        }
    }

    /// Override the fan-out deadline.
    pub fn with_overall_timeout(mut self, overall_timeout: Duration) -> Self {
        self.overall_timeout = overall_timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ChainRegistry> {
        &self.registry
    }

    pub fn per_call_timeout(&self) -> Duration {
        self.fetcher.timeout()
    }

    pub fn overall_timeout(&self) -> Duration {
        self.overall_timeout
    }

    /// Validate `address`, aggregate, and fail if no chain answered.
    ///
    /// A malformed address fails before any network call.
    pub async fn get_unified_balance(&self, address: &str) -> Result<UnifiedBalance, RequestError> {
        let owner = EvmAddress::parse(address)?;
        let balance = self.aggregate(&owner).await;

        if balance.is_unavailable() {
            return Err(RequestError::AllChainsFailed {
                total_chains: balance.total_chains,
                snapshot: Box::new(balance),
            });
        }
        Ok(balance)
    }

    /// Always returns one entry per registered chain, in registry order.
    pub async fn aggregate(&self, owner: &EvmAddress) -> UnifiedBalance {
        let chains = self.registry.chains();
        let started = Instant::now();
        // `None` when the deadline is past what `Instant` can represent.
        let deadline = started.checked_add(self.overall_timeout);

        let mut slots: Vec<Option<ChainBalanceResult>> = chains.iter().map(|_| None).collect();
        {
            let fetcher = &self.fetcher;
            let mut pending: FuturesUnordered<_> = chains
                .iter()
                .enumerate()
                .map(|(index, chain)| async move { (index, fetcher.fetch(chain, owner).await) })
                .collect();

            loop {
                let next = match deadline {
                    Some(deadline) => tokio::time::timeout_at(deadline, pending.next()).await,
                    None => Ok(pending.next().await),
                };
                match next {
                    Ok(Some((index, result))) => slots[index] = Some(result),
                    Ok(None) => break,
                    Err(_) => {
                        tracing::warn!(
                            outstanding = pending.len(),
                            deadline_ms = self.overall_timeout.as_millis() as u64,
                            "aggregation deadline reached"
                        );
                        break;
                    }
                }
            }
        }

        let elapsed = started.elapsed();
        let results = slots
            .into_iter()
            .zip(chains)
            .map(|(slot, chain)| {
                slot.unwrap_or_else(|| {
                    ChainBalanceResult::failed(chain, FetchError::DeadlineExceeded, elapsed)
                })
            })
            .collect();

        let balance = UnifiedBalance::from_results(*owner, self.registry.max_decimals(), results);
        tracing::info!(
            address = %owner,
            total = %balance.total_formatted,
            active_chains = balance.active_chains,
            total_chains = balance.total_chains,
            elapsed_ms = elapsed.as_millis() as u64,
            "unified balance aggregated"
        );
        balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::{ChainCatalog, ChainConfig, NetworkEnvironment};
    use crate::CHAIN_CATALOG_VERSION;
    use async_trait::async_trait;
    use num_bigint::BigUint;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted per-endpoint answers with an artificial latency.
    struct ScriptedReader {
        answers: HashMap<String, (Duration, Result<u64, FetchError>)>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BalanceReader for ScriptedReader {
        async fn read_balance(
            &self,
            endpoint: &str,
            _contract: &EvmAddress,
            _owner: &EvmAddress,
        ) -> Result<BigUint, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (delay, answer) = self
                .answers
                .get(endpoint)
                .cloned()
                .unwrap_or((Duration::ZERO, Err(FetchError::Network("unknown".into()))));
            tokio::time::sleep(delay).await;
            answer.map(BigUint::from)
        }
    }

    fn registry(n: u64) -> Arc<ChainRegistry> {
        let chains = (0..n)
            .map(|i| ChainConfig {
                chain_id: 100 + i,
                name: format!("chain-{i}"),
                domain: i as u32,
                usdc_address: EvmAddress::from_static("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
                rpc_url: format!("http://rpc-{i}.test"),
                decimals: 6,
            })
            .collect();
        Arc::new(
            ChainRegistry::from_catalog(ChainCatalog {
                version: CHAIN_CATALOG_VERSION,
                network: NetworkEnvironment::Testnet,
                chains,
            })
            .unwrap(),
        )
    }

    fn reader(answers: Vec<(Duration, Result<u64, FetchError>)>) -> Arc<ScriptedReader> {
        Arc::new(ScriptedReader {
            answers: answers
                .into_iter()
                .enumerate()
                .map(|(i, a)| (format!("http://rpc-{i}.test"), a))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }

    const OWNER: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    #[tokio::test(start_paused = true)]
    async fn test_results_keep_registry_order() {
        let reader = reader(vec![
            (Duration::from_millis(300), Ok(1_000_000)),
            (Duration::from_millis(100), Ok(2_000_000)),
            (Duration::from_millis(200), Ok(3_000_000)),
        ]);
        let aggregator = BalanceAggregator::new(registry(3), reader, &AggregatorConfig::default());

        let balance = aggregator.get_unified_balance(OWNER).await.unwrap();
        let ids: Vec<u64> = balance.chains.iter().map(|c| c.chain_id).collect();
        assert_eq!(ids, vec![100, 101, 102]);
        assert_eq!(balance.total_formatted, "6");
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_address_makes_no_calls() {
        let reader = reader(vec![(Duration::ZERO, Ok(1))]);
        let aggregator =
            BalanceAggregator::new(registry(1), reader.clone(), &AggregatorConfig::default());

        let err = aggregator.get_unified_balance("0xnothex").await.unwrap_err();
        assert!(matches!(err, RequestError::InvalidAddress(_)));
        assert_eq!(reader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_marks_outstanding_chains() {
        let reader = reader(vec![
            (Duration::from_millis(100), Ok(5_000_000)),
            (Duration::from_secs(3), Ok(7_000_000)),
        ]);
        let aggregator = BalanceAggregator::new(registry(2), reader, &AggregatorConfig::default())
            .with_overall_timeout(Duration::from_secs(1));

        let started = Instant::now();
        let owner = EvmAddress::parse(OWNER).unwrap();
        let balance = aggregator.aggregate(&owner).await;

        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert_eq!(balance.active_chains, 1);
        assert_eq!(
            balance.chains[1].outcome.error(),
            Some(&FetchError::DeadlineExceeded)
        );
        assert_eq!(balance.total_formatted, "5");
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failed_surfaces_snapshot() {
        let reader = reader(vec![
            (Duration::ZERO, Err(FetchError::HttpStatus(503))),
            (Duration::ZERO, Err(FetchError::Network("refused".into()))),
        ]);
        let aggregator = BalanceAggregator::new(registry(2), reader, &AggregatorConfig::default());

        match aggregator.get_unified_balance(OWNER).await {
            Err(RequestError::AllChainsFailed {
                total_chains,
                snapshot,
            }) => {
                assert_eq!(total_chains, 2);
                assert_eq!(snapshot.active_chains, 0);
                assert_eq!(snapshot.chains.len(), 2);
            }
            other => panic!("expected AllChainsFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(AggregatorConfig::default().validate().is_ok());
        assert_eq!(
            AggregatorConfig::default().overall_timeout(),
            Duration::from_secs(10)
        );

        let zero_factor = AggregatorConfig {
            overall_timeout_factor: 0,
            ..Default::default()
        };
        assert!(zero_factor.validate().is_err());

        let zero_timeout = AggregatorConfig {
            per_call_timeout_ms: 0,
            ..Default::default()
        };
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn test_oversized_timeouts_rejected_and_saturate() {
        let huge = AggregatorConfig {
            per_call_timeout_ms: u64::MAX,
            overall_timeout_factor: u32::MAX,
        };
        assert!(matches!(huge.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(huge.overall_timeout(), Duration::MAX);

        let factor = AggregatorConfig {
            overall_timeout_factor: MAX_OVERALL_TIMEOUT_FACTOR + 1,
            ..Default::default()
        };
        assert!(factor.validate().is_err());

        let ceiling = AggregatorConfig {
            per_call_timeout_ms: MAX_PER_CALL_TIMEOUT_MS,
            overall_timeout_factor: MAX_OVERALL_TIMEOUT_FACTOR,
        };
        assert!(ceiling.validate().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_deadline_still_collects_every_chain() {
        let reader = reader(vec![
            (Duration::from_millis(100), Ok(1_000_000)),
            (Duration::from_millis(200), Ok(2_000_000)),
        ]);
        let aggregator = BalanceAggregator::new(registry(2), reader, &AggregatorConfig::default())
            .with_overall_timeout(Duration::MAX);

        let owner = EvmAddress::parse(OWNER).unwrap();
        let balance = aggregator.aggregate(&owner).await;
        assert_eq!(balance.active_chains, 2);
        assert_eq!(balance.total_formatted, "3");
    }
}
