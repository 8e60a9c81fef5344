//! End-to-end aggregation over scripted chain readers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use num_bigint::BigUint;
use tokio::time::Instant;

use omniusdc_core::{
    AggregatorConfig, BalanceAggregator, BalanceReader, BalanceStatus, ChainCatalog, ChainConfig,
    ChainRegistry, EvmAddress, FetchError, NetworkEnvironment, RequestError,
    CHAIN_CATALOG_VERSION,
};

const WALLET: &str = "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359";

/// Answers keyed by RPC endpoint, each after a fixed latency.
struct ChainSimulator {
    answers: HashMap<String, (Duration, Result<u64, FetchError>)>,
    calls: AtomicUsize,
}

impl ChainSimulator {
    fn new(answers: Vec<(&str, Duration, Result<u64, FetchError>)>) -> Arc<Self> {
        Arc::new(Self {
            answers: answers
                .into_iter()
                .map(|(endpoint, delay, answer)| (endpoint.to_string(), (delay, answer)))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl BalanceReader for ChainSimulator {
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
            .expect("endpoint not scripted");
        tokio::time::sleep(delay).await;
        answer.map(BigUint::from)
    }
}

fn chain(chain_id: u64, domain: u32) -> ChainConfig {
    ChainConfig {
        chain_id,
        name: format!("chain-{chain_id}"),
        domain,
        usdc_address: EvmAddress::from_static("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
        rpc_url: format!("http://{chain_id}.rpc.test"),
        decimals: 6,
    }
}

fn registry(chains: Vec<ChainConfig>) -> Arc<ChainRegistry> {
    Arc::new(
        ChainRegistry::from_catalog(ChainCatalog {
            version: CHAIN_CATALOG_VERSION,
            network: NetworkEnvironment::Mainnet,
            chains,
        })
        .unwrap(),
    )
}

fn six_chains() -> Vec<ChainConfig> {
    vec![
        chain(1, 0),
        chain(43114, 1),
        chain(10, 2),
        chain(42161, 3),
        chain(8453, 6),
        chain(137, 7),
    ]
}

fn six_chain_simulator(delay: Duration) -> Arc<ChainSimulator> {
    let refused = || Err(FetchError::Network("connection refused".into()));
    ChainSimulator::new(vec![
        ("http://1.rpc.test", delay, Ok(500_000_000)),
        ("http://43114.rpc.test", delay, Ok(0)),
        ("http://10.rpc.test", delay, refused()),
        ("http://42161.rpc.test", delay, Ok(750_750_000)),
        ("http://8453.rpc.test", delay, refused()),
        ("http://137.rpc.test", delay, Ok(250_000_000)),
    ])
}

#[tokio::test(start_paused = true)]
async fn partial_failure_sums_successful_chains() {
    let simulator = six_chain_simulator(Duration::from_millis(50));
    let aggregator = BalanceAggregator::new(
        registry(six_chains()),
        simulator.clone(),
        &AggregatorConfig::default(),
    );

    let balance = aggregator.get_unified_balance(WALLET).await.unwrap();

    assert_eq!(balance.total_formatted, "1500.75");
    assert_eq!(balance.total.raw(), &BigUint::from(1_500_750_000u64));
    assert_eq!(balance.active_chains, 4);
    assert_eq!(balance.total_chains, 6);
    assert_eq!(balance.chains.len(), 6);
    assert_eq!(balance.status(), BalanceStatus::Partial);
    assert_eq!(simulator.calls.load(Ordering::SeqCst), 6);

    let failed: Vec<u64> = balance.failed_chains().map(|c| c.chain_id).collect();
    assert_eq!(failed, vec![10, 8453]);

    let zero = &balance.chains[1];
    assert!(zero.is_ok());
    assert!(zero.balance().unwrap().is_zero());
}

#[tokio::test(start_paused = true)]
async fn every_configured_chain_is_reported_once() {
    let simulator = six_chain_simulator(Duration::ZERO);
    let chains = six_chains();
    let expected: Vec<u64> = chains.iter().map(|c| c.chain_id).collect();
    let aggregator =
        BalanceAggregator::new(registry(chains), simulator, &AggregatorConfig::default());

    let owner = EvmAddress::parse(WALLET).unwrap();
    let balance = aggregator.aggregate(&owner).await;

    let reported: Vec<u64> = balance.chains.iter().map(|c| c.chain_id).collect();
    assert_eq!(reported, expected);
    assert!(balance.active_chains <= balance.total_chains);
}

#[tokio::test(start_paused = true)]
async fn total_does_not_depend_on_configuration_order() {
    let owner = EvmAddress::parse(WALLET).unwrap();

    let forward = BalanceAggregator::new(
        registry(six_chains()),
        six_chain_simulator(Duration::from_millis(10)),
        &AggregatorConfig::default(),
    )
    .aggregate(&owner)
    .await;

    let mut reversed_chains = six_chains();
    reversed_chains.reverse();
    let reversed = BalanceAggregator::new(
        registry(reversed_chains),
        six_chain_simulator(Duration::from_millis(10)),
        &AggregatorConfig::default(),
    )
    .aggregate(&owner)
    .await;

    assert_eq!(forward.total, reversed.total);
    assert_eq!(reversed.chains[0].chain_id, 137);
}

#[tokio::test(start_paused = true)]
async fn all_chains_failing_is_a_request_error_with_snapshot() {
    let down = || Err(FetchError::HttpStatus(503));
    let simulator = ChainSimulator::new(vec![
        ("http://1.rpc.test", Duration::ZERO, down()),
        ("http://10.rpc.test", Duration::ZERO, down()),
        ("http://137.rpc.test", Duration::ZERO, down()),
    ]);
    let aggregator = BalanceAggregator::new(
        registry(vec![chain(1, 0), chain(10, 2), chain(137, 7)]),
        simulator,
        &AggregatorConfig::default(),
    );

    let owner = EvmAddress::parse(WALLET).unwrap();
    let snapshot = aggregator.aggregate(&owner).await;
    assert_eq!(snapshot.active_chains, 0);
    assert_eq!(snapshot.total_chains, 3);
    assert_eq!(snapshot.chains.len(), 3);
    assert!(snapshot.total.is_zero());
    assert_eq!(snapshot.status(), BalanceStatus::Unavailable);

    match aggregator.get_unified_balance(WALLET).await {
        Err(RequestError::AllChainsFailed {
            total_chains,
            snapshot,
        }) => {
            assert_eq!(total_chains, 3);
            assert!(snapshot
                .chains
                .iter()
                .all(|c| c.outcome.error() == Some(&FetchError::HttpStatus(503))));
        }
        other => panic!("expected AllChainsFailed, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn fan_out_runs_chains_concurrently() {
    let simulator = six_chain_simulator(Duration::from_secs(1));
    let aggregator = BalanceAggregator::new(
        registry(six_chains()),
        simulator,
        &AggregatorConfig::default(),
    );

    let started = Instant::now();
    let owner = EvmAddress::parse(WALLET).unwrap();
    aggregator.aggregate(&owner).await;

    assert_eq!(started.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn slow_chain_times_out_without_holding_the_rest() {
    let simulator = ChainSimulator::new(vec![
        ("http://1.rpc.test", Duration::from_millis(100), Ok(1_000_000)),
        ("http://10.rpc.test", Duration::from_secs(120), Ok(9_000_000)),
    ]);
    let config = AggregatorConfig {
        per_call_timeout_ms: 2_000,
        overall_timeout_factor: 2,
    };
    let aggregator =
        BalanceAggregator::new(registry(vec![chain(1, 0), chain(10, 2)]), simulator, &config);

    let started = Instant::now();
    let balance = aggregator.get_unified_balance(WALLET).await.unwrap();

    assert_eq!(started.elapsed(), Duration::from_secs(2));
    assert_eq!(balance.total_formatted, "1");
    assert_eq!(
        balance.chains[1].outcome.error(),
        Some(&FetchError::Timeout(2_000))
    );
}

#[tokio::test(start_paused = true)]
async fn malformed_address_fails_before_network() {
    let simulator = six_chain_simulator(Duration::ZERO);
    let aggregator = BalanceAggregator::new(
        registry(six_chains()),
        simulator.clone(),
        &AggregatorConfig::default(),
    );

    for bad in ["", "0x123", "fB6916095ca1df60bB79Ce92cE3Ea74c37c5d359", "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d35A"] {
        let err = aggregator.get_unified_balance(bad).await.unwrap_err();
        assert!(matches!(err, RequestError::InvalidAddress(_)), "{bad:?}");
    }
    assert_eq!(simulator.calls.load(Ordering::SeqCst), 0);
}
