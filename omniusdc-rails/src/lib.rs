//! omniusdc-rails
//!
//! Axum HTTP rail exposing unified USDC balances and CCTP attestation
//! polling. Stateless apart from the configuration it was started with.

pub mod config;

use std::env;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use omniusdc_core::{
    AttestationPoller, BalanceAggregator, BalanceReader, IrisAttestationClient,
    JsonRpcBalanceReader, NetworkEnvironment, PollConfig, PollError, RequestError, RAIL_ID,
};

use crate::config::{PollLimits, ServiceConfig};

// ═══════════════════════════════════════════════════════════════════════════════
// ENVIRONMENT VARIABLES
// ═══════════════════════════════════════════════════════════════════════════════

const LOG_JSON_ENV: &str = "OMNIUSDC_LOG_JSON";
const DEFAULT_LOG_FILTER: &str = "omniusdc_rails=info,omniusdc_core=info";

// ═══════════════════════════════════════════════════════════════════════════════
// STATE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<BalanceAggregator>,
    pub poller: AttestationPoller,
    /// Applied when a request leaves a poll parameter unset.
    pub poll_defaults: PollConfig,
    /// Checked after request overrides are applied.
    pub poll_limits: PollLimits,
    /// Cancelled on shutdown; in-flight polls hold child tokens.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        aggregator: BalanceAggregator,
        poller: AttestationPoller,
        poll_defaults: PollConfig,
    ) -> Self {
        Self {
            aggregator: Arc::new(aggregator),
            poller,
            poll_defaults,
            poll_limits: PollLimits::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_poll_limits(mut self, poll_limits: PollLimits) -> Self {
        self.poll_limits = poll_limits;
        self
    }

    /// Wire production clients from configuration.
    pub fn from_config(config: &ServiceConfig) -> anyhow::Result<Self> {
        let registry = Arc::new(
            config
                .build_registry()
                .context("failed to build chain registry")?,
        );

        let reader: Arc<dyn BalanceReader> =
            Arc::new(JsonRpcBalanceReader::new().context("failed to build RPC client")?);
        let aggregator = BalanceAggregator::new(registry, reader, &config.aggregator);

        let iris = IrisAttestationClient::new(&config.attestation_api, config.network)
            .context("failed to build attestation client")?;
        tracing::info!(base_url = iris.base_url(), "attestation service configured");

        Ok(Self::new(
            aggregator,
            AttestationPoller::new(Arc::new(iris)),
            config.poll.clone(),
        )
        .with_poll_limits(config.poll_limits.clone()))
    }

    pub fn network(&self) -> NetworkEnvironment {
        self.aggregator.registry().network()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTER
// ═══════════════════════════════════════════════════════════════════════════════

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/health", get(health))
        .route("/rails/usdc/info", get(info))
        .route("/rails/usdc/chains", get(list_chains))
        // Balances
        .route("/rails/usdc/balance/:address", get(get_balance))
        // Attestations
        .route(
            "/rails/usdc/attestation/:domain/:tx_hash",
            get(get_attestation),
        )
        .layer(cors)
        .with_state(state)
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLERS - HEALTH & INFO
// ═══════════════════════════════════════════════════════════════════════════════

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "rail_id": RAIL_ID
    }))
}

async fn info(State(state): State<AppState>) -> impl IntoResponse {
    let aggregator = &state.aggregator;
    Json(serde_json::json!({
        "rail_id": RAIL_ID,
        "network": state.network(),
        "chain_count": aggregator.registry().len(),
        "per_call_timeout_ms": aggregator.per_call_timeout().as_millis() as u64,
        "overall_timeout_ms": aggregator.overall_timeout().as_millis() as u64,
        "poll_defaults": state.poll_defaults,
        "poll_limits": state.poll_limits,
    }))
}

async fn list_chains(State(state): State<AppState>) -> impl IntoResponse {
    // RPC URLs may embed API keys and are not listed.
    let chains: Vec<_> = state
        .aggregator
        .registry()
        .chains()
        .iter()
        .map(|c| {
            serde_json::json!({
                "chain_id": c.chain_id,
                "name": c.name,
                "domain": c.domain,
                "usdc_address": c.usdc_address,
                "decimals": c.decimals,
            })
        })
        .collect();

    Json(serde_json::json!({
        "network": state.network(),
        "count": chains.len(),
        "chains": chains
    }))
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLERS - BALANCE
// ═══════════════════════════════════════════════════════════════════════════════

async fn get_balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let balance = state.aggregator.get_unified_balance(&address).await?;
    Ok(Json(balance))
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLERS - ATTESTATION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct AttestationQuery {
    pub max_attempts: Option<u32>,
    pub interval_ms: Option<u64>,
}

async fn get_attestation(
    State(state): State<AppState>,
    Path((domain, tx_hash)): Path<(u32, String)>,
    Query(query): Query<AttestationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if state.aggregator.registry().by_domain(domain).is_none() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("domain {domain} is not configured"),
            "UNKNOWN_DOMAIN",
        ));
    }

    let mut config = state.poll_defaults.clone();
    if let Some(max_attempts) = query.max_attempts {
        config.max_attempts = max_attempts;
    }
    if let Some(interval_ms) = query.interval_ms {
        config.interval_ms = interval_ms;
    }
    state.poll_limits.check(&config)?;

    let cancel = state.shutdown.child_token();
    let result = state
        .poller
        .poll_attestation(&tx_hash, domain, &config, &cancel)
        .await?;
    Ok(Json(result))
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR HANDLING
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>, code: &str) -> Self {
        Self {
            status,
            message: message.into(),
            code: code.into(),
            details: None,
        }
    }
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        let message = err.to_string();
        match err {
            RequestError::InvalidAddress(_) => {
                Self::new(StatusCode::BAD_REQUEST, message, "INVALID_ADDRESS")
            }
            RequestError::AllChainsFailed { snapshot, .. } => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message,
                code: "ALL_CHAINS_FAILED".into(),
                details: serde_json::to_value(&*snapshot).ok(),
            },
        }
    }
}

impl From<PollError> for ApiError {
    fn from(err: PollError) -> Self {
        let message = err.to_string();
        match err {
            PollError::InvalidTransferId(_) => {
                Self::new(StatusCode::BAD_REQUEST, message, "INVALID_TRANSFER_ID")
            }
            PollError::InvalidConfig(_) => {
                Self::new(StatusCode::BAD_REQUEST, message, "INVALID_POLL_CONFIG")
            }
            PollError::Cancelled { .. } => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, message, "SHUTTING_DOWN")
            }
            PollError::Rejected { .. } => {
                Self::new(StatusCode::BAD_GATEWAY, message, "ATTESTATION_REJECTED")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let mut body = serde_json::json!({
            "error": self.message,
            "error_code": self.code,
        });
        if let Some(details) = self.details {
            body["details"] = details;
        }
        (self.status, Json(body)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN ENTRY POINT
// ═══════════════════════════════════════════════════════════════════════════════

pub mod main_entry {
    use super::*;

    pub async fn run_server() -> anyhow::Result<()> {
        dotenvy::dotenv().ok();
        init_tracing();

        let config = ServiceConfig::load().context("failed to load configuration")?;
        let addr = config.server.socket_addr()?;
        let state = AppState::from_config(&config)?;
        let shutdown = state.shutdown.clone();

        tracing::info!(
            network = %config.network,
            chains = state.aggregator.registry().len(),
            "USDC rail listening on {}",
            addr
        );

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        axum::serve(listener, app_router(state))
            .with_graceful_shutdown(shutdown_signal(shutdown))
            .await?;

        tracing::info!("USDC rail stopped");
        Ok(())
    }

    fn init_tracing() {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
        let json = env::var(LOG_JSON_ENV)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        if json {
            tracing_subscriber::fmt().with_env_filter(filter).json().init();
        } else {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    /// Resolves on ctrl-c or SIGTERM and cancels in-flight polls.
    async fn shutdown_signal(shutdown: CancellationToken) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!("failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }

        tracing::info!("shutdown requested, cancelling in-flight polls");
        shutdown.cancel();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
