//! Circle Iris attestation lookups.
//!
//! One [`AttestationClient::fetch_status`] call is one round trip to the
//! service. Retrying is the poller's job.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chains::NetworkEnvironment;
use crate::error::AttestationError;
use crate::types::TransferId;

pub const IRIS_MAINNET_URL: &str = "https://iris-api.circle.com";
pub const IRIS_SANDBOX_URL: &str = "https://iris-api-sandbox.circle.com";

/// Attestation value Iris reports before signing.
const PENDING_ATTESTATION: &str = "PENDING";

/// Error bodies are truncated to this many bytes.
const MAX_ERROR_BODY: usize = 512;

// ═══════════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// A burn on `source_domain` awaiting its attestation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRequest {
    pub transfer_id: TransferId,
    pub source_domain: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationStatus {
    Pending,
    Complete,
    NotFound,
    Timeout,
}

/// What the service said about a transfer on one call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttestationReport {
    Pending,
    NotFound,
    Complete {
        attestation: String,
        message: String,
        event_nonce: Option<String>,
    },
}

impl AttestationReport {
    pub fn status(&self) -> AttestationStatus {
        match self {
            Self::Pending => AttestationStatus::Pending,
            Self::NotFound => AttestationStatus::NotFound,
            Self::Complete { .. } => AttestationStatus::Complete,
        }
    }
}

/// Final answer of a poll.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationResult {
    pub transfer_id: TransferId,
    pub source_domain: u32,
    pub status: AttestationStatus,
    /// Signed attestation, hex. Present only when complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<String>,
    /// Burn message bytes, hex. Present only when complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_nonce: Option<String>,
    /// Client calls made.
    pub attempts: u32,
    pub elapsed_ms: u64,
}

impl AttestationResult {
    pub fn new(
        request: &AttestationRequest,
        report: AttestationReport,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        let status = report.status();
        let (attestation, message, event_nonce) = match report {
            AttestationReport::Complete {
                attestation,
                message,
                event_nonce,
            } => (Some(attestation), Some(message), event_nonce),
            AttestationReport::Pending | AttestationReport::NotFound => (None, None, None),
        };

        Self {
            transfer_id: request.transfer_id,
            source_domain: request.source_domain,
            status,
            attestation,
            message,
            event_nonce,
            attempts,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    /// Budget exhausted without completion.
    pub fn timed_out(request: &AttestationRequest, attempts: u32, elapsed: Duration) -> Self {
        let mut result = Self::new(request, AttestationReport::Pending, attempts, elapsed);
        result.status = AttestationStatus::Timeout;
        result
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLIENT
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
pub trait AttestationClient: Send + Sync {
    async fn fetch_status(
        &self,
        request: &AttestationRequest,
    ) -> Result<AttestationReport, AttestationError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationApiConfig {
    /// Iris base URL. Defaults to the network's public endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for AttestationApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl AttestationApiConfig {
    pub fn base_url_for(&self, network: NetworkEnvironment) -> &str {
        match (&self.base_url, network) {
            (Some(url), _) => url.as_str(),
            (None, NetworkEnvironment::Mainnet) => IRIS_MAINNET_URL,
            (None, NetworkEnvironment::Testnet) => IRIS_SANDBOX_URL,
        }
    }
}

/// Circle Iris v2 client.
#[derive(Clone, Debug)]
pub struct IrisAttestationClient {
    base_url: String,
    client: reqwest::Client,
}

impl IrisAttestationClient {
    pub fn new(
        config: &AttestationApiConfig,
        network: NetworkEnvironment,
    ) -> Result<Self, AttestationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(concat!("omniusdc/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: config.base_url_for(network).trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn messages_url(&self, source_domain: u32) -> String {
        format!("{}/v2/messages/{}", self.base_url, source_domain)
    }
}

#[async_trait]
impl AttestationClient for IrisAttestationClient {
    async fn fetch_status(
        &self,
        request: &AttestationRequest,
    ) -> Result<AttestationReport, AttestationError> {
        let response = self
            .client
            .get(self.messages_url(request.source_domain))
            .query(&[("transactionHash", request.transfer_id.to_hex())])
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        interpret(status, &body)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESPONSE PARSING
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    messages: Vec<IrisMessage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IrisMessage {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    attestation: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    event_nonce: Option<String>,
}

/// Map one Iris HTTP response onto a report.
pub(crate) fn interpret(status: u16, body: &str) -> Result<AttestationReport, AttestationError> {
    match status {
        404 => return Ok(AttestationReport::NotFound),
        429 => return Err(AttestationError::RateLimited),
        200..=299 => {}
        _ => {
            return Err(AttestationError::HttpStatus {
                status,
                body: truncate(body, MAX_ERROR_BODY),
            })
        }
    }

    let parsed: MessagesResponse = serde_json::from_str(body)
        .map_err(|e| AttestationError::MalformedResponse(e.to_string()))?;

    let Some(first) = parsed.messages.into_iter().next() else {
        return Ok(AttestationReport::NotFound);
    };

    let attestation = match first.attestation {
        Some(a) if !a.is_empty() && !a.eq_ignore_ascii_case(PENDING_ATTESTATION) => a,
        _ => return Ok(AttestationReport::Pending),
    };
    if first.status.as_deref() != Some("complete") {
        return Ok(AttestationReport::Pending);
    }

    let message = first
        .message
        .filter(|m| !m.is_empty() && m != "0x")
        .ok_or_else(|| {
            AttestationError::MalformedResponse("complete message without payload".into())
        })?;

    Ok(AttestationReport::Complete {
        attestation,
        message,
        event_nonce: first.event_nonce,
    })
}

fn truncate(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
