//! Dispatch Coordinator
//!
//! Executes a dispatch plan against the registered backends. Every planned
//! invocation produces exactly one `CandidateResponse`, including failures:
//! a timeout, error, or empty result is a first-class outcome fed downstream,
//! never a silently missing data point.
//!
//! # Isolation
//!
//! Invocations are fully isolated from each other. A backend that panics the
//! connection, hangs past its deadline, or returns garbage affects only its
//! own candidate.
//!
//! # Concurrency
//!
//! - Parallel mode runs invocations concurrently, bounded by the configured
//!   worker cap; excess invocations queue for a slot instead of spawning
//!   unbounded work.
//! - Sequential mode runs in plan order and may stop early once a response
//!   already validates above the short-circuit quality threshold. That
//!   short-circuit is the only early-termination path and is disabled for
//!   exhaustive (blend-everything) rounds.
//!
//! A timed-out invocation is abandoned; its eventual late result, if any, is
//! dropped with the future. No retries happen here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};

use crate::analyzer::QueryProfile;
use crate::backend::GenerationBackend;
use crate::config::DispatchConfig;
use crate::selector::{ConcurrencyMode, DispatchPlan};
use crate::validator::{RejectionReason, ResponseValidator};

// ============================================================================
// Candidate Response
// ============================================================================

/// Terminal state of one backend invocation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalState {
    /// The backend returned non-empty text
    Success,

    /// The invocation exceeded the per-call timeout and was abandoned
    Timeout,

    /// The invocation failed with an error
    Error,

    /// The backend returned empty or whitespace-only text
    Empty,
}

impl TerminalState {
    /// Stable string form for summaries and logs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Timeout => "timeout",
            Self::Error => "error",
            Self::Empty => "empty",
        }
    }

    /// Whether this state carries usable text
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One backend's contribution to a round
///
/// Created by the dispatch coordinator, then annotated in place by the
/// response validator. Lives exactly one round.
#[derive(Clone, Debug)]
pub struct CandidateResponse {
    /// The backend that produced (or failed to produce) this response
    pub backend_id: String,

    /// Raw response text; empty for failed invocations
    pub text: String,

    /// Wall-clock processing time for the invocation
    pub elapsed: Duration,

    /// How the invocation terminated
    pub state: TerminalState,

    /// Set by the validator: whether this response is usable
    pub is_valid: bool,

    /// Set by the validator: quality score in [0.0, 1.0]
    pub quality: f64,

    /// Set by the validator: why the response was rejected, if it was
    pub rejection: Option<RejectionReason>,
}

impl CandidateResponse {
    /// A candidate for a received response; empty text maps to `Empty`
    #[must_use]
    pub fn received(backend_id: impl Into<String>, text: String, elapsed: Duration) -> Self {
        let state = if text.trim().is_empty() {
            TerminalState::Empty
        } else {
            TerminalState::Success
        };
        Self {
            backend_id: backend_id.into(),
            text,
            elapsed,
            state,
            is_valid: false,
            quality: 0.0,
            rejection: None,
        }
    }

    /// A candidate for a failed invocation
    #[must_use]
    pub fn failed(backend_id: impl Into<String>, state: TerminalState, elapsed: Duration) -> Self {
        Self {
            backend_id: backend_id.into(),
            text: String::new(),
            elapsed,
            state,
            is_valid: false,
            quality: 0.0,
            rejection: None,
        }
    }

}

// ============================================================================
// Dispatch Coordinator
// ============================================================================

/// The dispatch coordinator
pub struct DispatchCoordinator {
    /// Registered backends by id
    backends: HashMap<String, Arc<dyn GenerationBackend>>,

    /// Tuning
    config: DispatchConfig,
}

impl DispatchCoordinator {
    /// Create a coordinator with the given tuning
    #[must_use]
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            backends: HashMap::new(),
            config,
        }
    }

    /// Register a backend for dispatch
    pub fn register_backend(&mut self, backend: Arc<dyn GenerationBackend>) {
        let id = backend.id().to_string();
        tracing::debug!(backend = %id, "Registered dispatch backend");
        self.backends.insert(id, backend);
    }

    /// Ids of all registered backends, sorted for determinism
    #[must_use]
    pub fn backend_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.backends.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether a backend id is registered
    #[must_use]
    pub fn contains(&self, backend_id: &str) -> bool {
        self.backends.contains_key(backend_id)
    }

    /// Execute a dispatch plan
    ///
    /// Returns one `CandidateResponse` per invoked backend, in plan order.
    /// In sequential mode with short-circuit engaged, backends after the
    /// stopping point are not invoked and produce no candidate.
    pub async fn dispatch(
        &self,
        plan: &DispatchPlan,
        query: &QueryProfile,
        validator: &ResponseValidator,
        exhaustive: bool,
    ) -> Vec<CandidateResponse> {
        match plan.mode {
            ConcurrencyMode::Parallel => self.dispatch_parallel(plan, query).await,
            ConcurrencyMode::Sequential => {
                self.dispatch_sequential(plan, query, validator, exhaustive)
                    .await
            }
        }
    }

    /// Bounded concurrent execution, output restored to plan order
    async fn dispatch_parallel(
        &self,
        plan: &DispatchPlan,
        query: &QueryProfile,
    ) -> Vec<CandidateResponse> {
        let mut indexed: Vec<(usize, CandidateResponse)> =
            stream::iter(plan.backends.iter().enumerate())
                .map(|(idx, backend_id)| {
                    let candidate = self.invoke_one(backend_id, &query.text, plan.call_timeout);
                    async move { (idx, candidate.await) }
                })
                .buffer_unordered(self.config.worker_cap)
                .collect()
                .await;

        // Completion order is nondeterministic; ranking must not depend on
        // which backend happened to finish first.
        indexed.sort_by_key(|(idx, _)| *idx);
        indexed.into_iter().map(|(_, candidate)| candidate).collect()
    }

    /// One-at-a-time execution in plan order with optional short-circuit
    async fn dispatch_sequential(
        &self,
        plan: &DispatchPlan,
        query: &QueryProfile,
        validator: &ResponseValidator,
        exhaustive: bool,
    ) -> Vec<CandidateResponse> {
        let mut candidates = Vec::with_capacity(plan.backends.len());

        for backend_id in &plan.backends {
            let candidate = self
                .invoke_one(backend_id, &query.text, plan.call_timeout)
                .await;

            let mut stop = false;
            if !exhaustive && candidate.state.is_success() {
                // Probe quality on a scratch copy; the real validation pass
                // runs downstream over all candidates.
                let mut probe = candidate.clone();
                validator.validate(&mut probe, query, None);
                if probe.is_valid && probe.quality >= self.config.short_circuit_quality {
                    tracing::debug!(
                        backend = %backend_id,
                        quality = probe.quality,
                        "High-confidence response, short-circuiting sequential dispatch"
                    );
                    stop = true;
                }
            }

            candidates.push(candidate);
            if stop {
                break;
            }
        }

        candidates
    }

    /// Invoke a single backend with full isolation
    ///
    /// Always produces a candidate: unknown backends and every failure mode
    /// map to a terminal state rather than being dropped.
    async fn invoke_one(
        &self,
        backend_id: &str,
        prompt: &str,
        timeout: Duration,
    ) -> CandidateResponse {
        let Some(backend) = self.backends.get(backend_id) else {
            tracing::warn!(backend = %backend_id, "Planned backend not registered for dispatch");
            return CandidateResponse::failed(backend_id, TerminalState::Error, Duration::ZERO);
        };

        let start = Instant::now();
        match tokio::time::timeout(timeout, backend.invoke(prompt, timeout)).await {
            Ok(Ok(generation)) => {
                CandidateResponse::received(backend_id, generation.text, generation.elapsed)
            }
            Ok(Err(error)) => {
                tracing::debug!(backend = %backend_id, %error, "Backend invocation failed");
                CandidateResponse::failed(backend_id, TerminalState::Error, start.elapsed())
            }
            Err(_) => {
                tracing::debug!(
                    backend = %backend_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Backend invocation timed out, abandoning"
                );
                CandidateResponse::failed(backend_id, TerminalState::Timeout, timeout)
            }
        }
    }
}
