//! Attestation polling state machine.
//!
//! ```text
//!            ┌──────────── pending / not_found / transient error ───────────┐
//!            ▼                                                              │
//!   Idle ──► Polling(attempt) ──── complete ──────────────► Complete        │
//!            │   │  │                                                       │
//!            │   │  └─ attempts == max_attempts ───────────► TimedOut       │
//!            │   └──── non-transient error ────────────────► Rejected       │
//!            ├──────── not_found budget spent ─────────────► NotFound       │
//!            └──────── token cancelled ────────────────────► Cancelled      │
//!                      sleep(interval) ◄────────────────────────────────────┘
//! ```
//!
//! Completion on attempt `k` takes `(k - 1) * interval`. A timeout after
//! `max_attempts` attempts has slept `max_attempts - 1` times.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::attestation::{
    AttestationClient, AttestationReport, AttestationRequest, AttestationResult,
};
use crate::clock::{Clock, TokioClock};
use crate::error::{AttestationError, PollError};
use crate::types::TransferId;
use crate::{DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL_MS};

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Consecutive `not_found` answers tolerated before giving up. `None`
    /// treats `not_found` like `pending`.
    #[serde(default)]
    pub not_found_max_attempts: Option<u32>,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
            not_found_max_attempts: None,
        }
    }
}

impl PollConfig {
    pub fn validate(&self) -> Result<(), PollError> {
        if self.max_attempts == 0 {
            return Err(PollError::InvalidConfig("max_attempts must be positive".into()));
        }
        if self.interval_ms == 0 {
            return Err(PollError::InvalidConfig("interval_ms must be positive".into()));
        }
        if self.not_found_max_attempts == Some(0) {
            return Err(PollError::InvalidConfig(
                "not_found_max_attempts must be positive when set".into(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATE MACHINE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PollState {
    Idle,
    Polling { attempt: u32 },
    Complete,
    TimedOut,
    NotFound,
    Cancelled,
    Rejected,
}

impl PollState {
    fn is_terminal(&self) -> bool {
        !matches!(self, Self::Idle | Self::Polling { .. })
    }
}

/// What the loop does after an observation.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Retry,
    Complete(AttestationReport),
    TimedOut,
    NotFound,
    Rejected(AttestationError),
}

/// Counters and transitions for one poll. Holds no I/O.
#[derive(Debug)]
struct PollSession {
    max_attempts: u32,
    not_found_limit: Option<u32>,
    attempts: u32,
    not_found_streak: u32,
    state: PollState,
}

impl PollSession {
    fn new(config: &PollConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            not_found_limit: config.not_found_max_attempts,
            attempts: 0,
            not_found_streak: 0,
            state: PollState::Idle,
        }
    }

    fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.state = PollState::Polling {
            attempt: self.attempts,
        };
        self.attempts
    }

    fn observe(&mut self, outcome: Result<AttestationReport, AttestationError>) -> Step {
        match outcome {
            Ok(report @ AttestationReport::Complete { .. }) => {
                self.state = PollState::Complete;
                Step::Complete(report)
            }
            Ok(AttestationReport::NotFound) => {
                self.not_found_streak += 1;
                match self.not_found_limit {
                    Some(limit) if self.not_found_streak >= limit => {
                        self.state = PollState::NotFound;
                        Step::NotFound
                    }
                    _ => self.retry_or_time_out(),
                }
            }
            Ok(AttestationReport::Pending) => {
                self.not_found_streak = 0;
                self.retry_or_time_out()
            }
            Err(error) if error.is_transient() => self.retry_or_time_out(),
            Err(error) => {
                self.state = PollState::Rejected;
                Step::Rejected(error)
            }
        }
    }

    fn retry_or_time_out(&mut self) -> Step {
        if self.attempts >= self.max_attempts {
            self.state = PollState::TimedOut;
            Step::TimedOut
        } else {
            Step::Retry
        }
    }

    fn cancel(&mut self) -> PollError {
        self.state = PollState::Cancelled;
        PollError::Cancelled {
            attempts: self.attempts,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// POLLER
// ═══════════════════════════════════════════════════════════════════════════════

/// Drives [`AttestationClient`] calls until a terminal state.
///
/// Independent transfers may be polled concurrently on one poller; each poll
/// keeps its own session.
#[derive(Clone)]
pub struct AttestationPoller {
    client: Arc<dyn AttestationClient>,
    clock: Arc<dyn Clock>,
}

impl AttestationPoller {
    pub fn new(client: Arc<dyn AttestationClient>) -> Self {
        Self::with_clock(client, Arc::new(TokioClock))
    }

    pub fn with_clock(client: Arc<dyn AttestationClient>, clock: Arc<dyn Clock>) -> Self {
        Self { client, clock }
    }

    /// Validate the transfer id, then poll.
    pub async fn poll_attestation(
        &self,
        transfer_id: &str,
        source_domain: u32,
        config: &PollConfig,
        cancel: &CancellationToken,
    ) -> Result<AttestationResult, PollError> {
        let request = AttestationRequest {
            transfer_id: TransferId::parse(transfer_id)?,
            source_domain,
        };
        self.poll_until_complete(&request, config, cancel).await
    }

    /// Exhausting `max_attempts` is `Ok` with status `timeout`.
    pub async fn poll_until_complete(
        &self,
        request: &AttestationRequest,
        config: &PollConfig,
        cancel: &CancellationToken,
    ) -> Result<AttestationResult, PollError> {
        config.validate()?;

        let started = self.clock.now();
        let mut session = PollSession::new(config);

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(request, &mut session));
            }

            let attempt = session.begin_attempt();
            tracing::debug!(
                transfer_id = %request.transfer_id,
                domain = request.source_domain,
                attempt,
                max_attempts = config.max_attempts,
                "polling attestation"
            );

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled(request, &mut session)),
                outcome = self.client.fetch_status(request) => outcome,
            };

            if let Err(error) = &outcome {
                tracing::warn!(
                    transfer_id = %request.transfer_id,
                    attempt,
                    transient = error.is_transient(),
                    error = %error,
                    "attestation request failed"
                );
            }

            let elapsed = self.clock.now().saturating_duration_since(started);
            let step = session.observe(outcome);
            if session.state.is_terminal() {
                tracing::debug!(
                    transfer_id = %request.transfer_id,
                    state = ?session.state,
                    attempts = attempt,
                    "attestation poll finished"
                );
            }

            match step {
                Step::Retry => {}
                Step::Complete(report) => {
                    tracing::info!(
                        transfer_id = %request.transfer_id,
                        attempts = attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "attestation complete"
                    );
                    return Ok(AttestationResult::new(request, report, attempt, elapsed));
                }
                Step::NotFound => {
                    tracing::warn!(
                        transfer_id = %request.transfer_id,
                        attempts = attempt,
                        "transfer not found by attestation service"
                    );
                    return Ok(AttestationResult::new(
                        request,
                        AttestationReport::NotFound,
                        attempt,
                        elapsed,
                    ));
                }
                Step::TimedOut => {
                    tracing::warn!(
                        transfer_id = %request.transfer_id,
                        attempts = attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "attestation polling timed out"
                    );
                    return Ok(AttestationResult::timed_out(request, attempt, elapsed));
                }
                Step::Rejected(source) => {
                    return Err(PollError::Rejected { attempt, source });
                }
            }

            if cancel.is_cancelled() {
                return Err(self.cancelled(request, &mut session));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled(request, &mut session)),
                _ = self.clock.sleep(config.interval()) => {}
            }
        }
    }

    fn cancelled(&self, request: &AttestationRequest, session: &mut PollSession) -> PollError {
        let error = session.cancel();
        tracing::info!(
            transfer_id = %request.transfer_id,
            state = ?session.state,
            attempts = session.attempts,
            "attestation polling cancelled"
        );
        error
    }
}
