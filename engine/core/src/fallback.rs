//! Fallback Manager
//!
//! Produces the degraded answer for rounds where no backend response
//! survived validation. The fallback path never fails and never pretends:
//! the result is labeled with the `"fallback"` sentinel backend id, the
//! `degraded` flag, and text that says plainly that no acceptable answer was
//! obtained.
//!
//! The failure context (which backends were tried and why each one was
//! rejected or failed) rides along on the result for observability; callers
//! are free to ignore it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analyzer::QueryProfile;
use crate::dispatch::CandidateResponse;
use crate::ranker::{ResponseRanker, RoundResult};

/// Sentinel backend id carried by degraded round results
pub const FALLBACK_BACKEND_ID: &str = "fallback";

// ============================================================================
// Failure Context
// ============================================================================

/// One attempted backend and how it fell out of the round
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Backend that was invoked
    pub backend_id: String,

    /// Terminal state or rejection reason, as a stable string
    pub outcome: String,
}

/// Why a round ended up degraded
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FailureContext {
    /// Every backend that executed, with its outcome
    pub attempts: Vec<AttemptRecord>,
}

impl FailureContext {
    /// Build a failure context from a round's candidates
    #[must_use]
    pub fn from_candidates(candidates: &[CandidateResponse]) -> Self {
        let attempts = candidates
            .iter()
            .map(|c| AttemptRecord {
                backend_id: c.backend_id.clone(),
                outcome: match c.rejection {
                    Some(reason) => format!("rejected: {reason}"),
                    None => c.state.as_str().to_string(),
                },
            })
            .collect();
        Self { attempts }
    }

    /// Number of backends that were tried
    #[must_use]
    pub fn attempted_count(&self) -> usize {
        self.attempts.len()
    }
}

// ============================================================================
// Fallback Manager
// ============================================================================

/// The fallback manager
#[derive(Clone, Copy, Debug, Default)]
pub struct FallbackManager;

impl FallbackManager {
    /// Produce the degraded result for a failed round
    ///
    /// Always succeeds. The text is honest about the failure and never
    /// implies a normal answer was obtained.
    #[must_use]
    pub fn fallback(
        &self,
        query: &QueryProfile,
        candidates: &[CandidateResponse],
        round_id: Uuid,
        elapsed: Duration,
    ) -> RoundResult {
        let context = FailureContext::from_candidates(candidates);

        tracing::warn!(
            round_id = %round_id,
            query_type = %query.query_type,
            attempted = context.attempted_count(),
            "No backend produced an acceptable answer, returning fallback"
        );

        let text = if context.attempts.is_empty() {
            "I wasn't able to produce an answer: no response backends could be \
             reached for this request. Please try again."
                .to_string()
        } else {
            format!(
                "I wasn't able to produce a reliable answer to this request. \
                 {} backend{} tried, but none returned a response that passed \
                 quality checks. Please try again, or rephrase the question.",
                context.attempted_count(),
                if context.attempted_count() == 1 {
                    " was"
                } else {
                    "s were"
                }
            )
        };

        RoundResult {
            round_id,
            text,
            backend_id: FALLBACK_BACKEND_ID.to_string(),
            scores: ResponseRanker::build_scores(candidates),
            elapsed,
            degraded: true,
            blend_shares: None,
            failure: Some(context),
        }
    }
}
