//! Error types for balance aggregation and attestation polling.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::balance::UnifiedBalance;

// ═══════════════════════════════════════════════════════════════════════════════
// INPUT PARSING
// ═══════════════════════════════════════════════════════════════════════════════

/// Malformed hex identifiers (addresses, transaction hashes).
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("missing 0x prefix")]
    MissingPrefix,

    #[error("expected {expected} hex characters, found {found}")]
    Length { expected: usize, found: usize },

    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("EIP-55 checksum mismatch")]
    Checksum,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BALANCE FETCHING
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a single chain's balance could not be read.
///
/// These are recorded as data inside [`UnifiedBalance`]; they never fail the
/// whole request on their own.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("RPC endpoint returned HTTP {0}")]
    HttpStatus(u16),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed RPC response: {0}")]
    MalformedResponse(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("aggregation deadline exceeded")]
    DeadlineExceeded,
}

impl FetchError {
    /// Short machine-readable classification.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::HttpStatus(_) => "http_status",
            Self::Rpc { .. } => "rpc",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Timeout(_) => "timeout",
            Self::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Request-level failures of `get_unified_balance`.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid wallet address: {0}")]
    InvalidAddress(#[from] ParseError),

    /// Every configured chain failed. The snapshot still lists each
    /// per-chain failure so callers can render them.
    #[error("all {total_chains} configured chains failed")]
    AllChainsFailed {
        total_chains: usize,
        snapshot: Box<UnifiedBalance>,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// ATTESTATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Transport-level failures talking to the attestation service.
///
/// Distinct from a service-reported "not found", which is a status.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AttestationError {
    #[error("network error: {0}")]
    Network(String),

    #[error("attestation request timed out")]
    Timeout,

    #[error("rate limited by attestation service")]
    RateLimited,

    #[error("attestation service returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("malformed attestation response: {0}")]
    MalformedResponse(String),
}

impl AttestationError {
    /// Whether a later attempt may succeed.
    ///
    /// Client errors other than 404 and 429 mean the request itself is bad.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::HttpStatus { status, .. } => *status >= 500,
            _ => true,
        }
    }
}

impl From<reqwest::Error> for AttestationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Non-timeout exits of the attestation poller.
///
/// Exhausting the attempt budget is not an error; it yields a result with
/// status `timeout`.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("invalid transfer id: {0}")]
    InvalidTransferId(#[from] ParseError),

    #[error("invalid poll configuration: {0}")]
    InvalidConfig(String),

    #[error("polling cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },

    #[error("attestation service rejected attempt {attempt}: {source}")]
    Rejected {
        attempt: u32,
        #[source]
        source: AttestationError,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Startup configuration errors. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no chains configured")]
    NoChains,

    #[error("unsupported chain catalog version {0}")]
    UnsupportedVersion(u32),

    #[error("chain {chain_id}: invalid RPC endpoint {url:?}")]
    InvalidEndpoint { chain_id: u64, url: String },

    #[error("chain {chain_id}: decimals must be at most 36, got {decimals}")]
    InvalidDecimals { chain_id: u64, decimals: u8 },

    #[error("duplicate chain id {0}")]
    DuplicateChainId(u64),

    #[error("duplicate CCTP domain {0}")]
    DuplicateDomain(u32),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}
