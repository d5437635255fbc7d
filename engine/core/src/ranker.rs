//! Response Ranker
//!
//! Orders the valid candidates of a round and selects (or blends) the final
//! answer. Invalid and failed candidates never participate in ranking, but
//! they do appear in the per-backend score summary so callers can see the
//! whole round.
//!
//! Ranking is deterministic given the candidate set: quality descending,
//! then lower latency, then plan order. It does not depend on which backend
//! happened to finish first.
//!
//! Returning `None` (zero valid candidates) is a normal outcome, not an
//! error; it is the explicit trigger for the fallback manager.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatch::{CandidateResponse, TerminalState};
use crate::fallback::FailureContext;
use crate::selector::DispatchPlan;
use crate::validator::RejectionReason;

// ============================================================================
// Round Result
// ============================================================================

/// Per-backend outcome summary carried on every round result
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendScore {
    /// Backend identifier
    pub backend_id: String,

    /// Terminal state of the invocation
    pub state: String,

    /// Whether the response passed validation
    pub valid: bool,

    /// Quality score (0.0 for invalid/failed candidates)
    pub quality: f64,

    /// Invocation wall-clock time in milliseconds
    pub latency_ms: u64,

    /// Rejection reason, when validation rejected the response
    pub rejection: Option<RejectionReason>,
}

/// Share of a blended answer contributed by one backend
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlendShare {
    /// Contributing backend
    pub backend_id: String,

    /// Proportional share of the composite (shares sum to 1.0)
    pub share: f64,
}

/// The final artifact of a round, returned to callers
///
/// Callers distinguish degraded answers by the `degraded` flag or by the
/// sentinel backend id `"fallback"`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundResult {
    /// Unique round identifier
    pub round_id: Uuid,

    /// The selected (or composed, or fallback) answer text
    pub text: String,

    /// Backend that produced the answer, or `"fallback"`
    pub backend_id: String,

    /// Per-backend outcome summary, including failures
    pub scores: Vec<BackendScore>,

    /// Total elapsed time for the round
    pub elapsed: Duration,

    /// Whether this is a degraded (fallback) answer
    pub degraded: bool,

    /// Contribution shares when the blend policy produced the answer
    pub blend_shares: Option<Vec<BlendShare>>,

    /// What went wrong, for degraded rounds
    pub failure: Option<FailureContext>,
}

// ============================================================================
// Rank Policy
// ============================================================================

/// How the final answer is chosen from the valid candidates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RankPolicy {
    /// Return the single top candidate
    #[default]
    PickBest,

    /// Compose the top-N candidates proportionally to their scores
    Blend {
        /// How many top candidates to combine
        top_n: usize,
    },
}

// ============================================================================
// Response Ranker
// ============================================================================

/// The response ranker
#[derive(Clone, Copy, Debug, Default)]
pub struct ResponseRanker;

impl ResponseRanker {
    /// Build the per-backend score summary for a candidate set
    #[must_use]
    pub fn build_scores(candidates: &[CandidateResponse]) -> Vec<BackendScore> {
        candidates
            .iter()
            .map(|c| BackendScore {
                backend_id: c.backend_id.clone(),
                state: c.state.as_str().to_string(),
                valid: c.is_valid,
                quality: c.quality,
                latency_ms: c.elapsed.as_millis() as u64,
                rejection: c.rejection,
            })
            .collect()
    }

    /// Rank a round's candidates and produce the final result
    ///
    /// Returns `None` when no candidate is valid; the caller hands the round
    /// to the fallback manager.
    #[must_use]
    pub fn rank(
        &self,
        round_id: Uuid,
        candidates: &[CandidateResponse],
        plan: &DispatchPlan,
        policy: RankPolicy,
        elapsed: Duration,
    ) -> Option<RoundResult> {
        let mut valid: Vec<&CandidateResponse> = candidates
            .iter()
            .filter(|c| c.is_valid && c.state == TerminalState::Success)
            .collect();

        if valid.is_empty() {
            return None;
        }

        valid.sort_by(|a, b| {
            b.quality
                .partial_cmp(&a.quality)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.elapsed.cmp(&b.elapsed))
                .then_with(|| {
                    plan.rank_of(&a.backend_id)
                        .cmp(&plan.rank_of(&b.backend_id))
                })
        });

        let scores = Self::build_scores(candidates);

        let result = match policy {
            RankPolicy::PickBest => {
                let best = valid[0];
                RoundResult {
                    round_id,
                    text: best.text.clone(),
                    backend_id: best.backend_id.clone(),
                    scores,
                    elapsed,
                    degraded: false,
                    blend_shares: None,
                    failure: None,
                }
            }
            RankPolicy::Blend { top_n } => {
                let contributors: Vec<&CandidateResponse> =
                    valid.into_iter().take(top_n.max(1)).collect();
                let total: f64 = contributors.iter().map(|c| c.quality).sum();

                let shares: Vec<BlendShare> = contributors
                    .iter()
                    .map(|c| BlendShare {
                        backend_id: c.backend_id.clone(),
                        share: if total > 0.0 {
                            c.quality / total
                        } else {
                            1.0 / contributors.len() as f64
                        },
                    })
                    .collect();

                let text = contributors
                    .iter()
                    .map(|c| c.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n");

                RoundResult {
                    round_id,
                    text,
                    backend_id: contributors[0].backend_id.clone(),
                    scores,
                    elapsed,
                    degraded: false,
                    blend_shares: Some(shares),
                    failure: None,
                }
            }
        };

        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::ConcurrencyMode;

    fn plan(backends: &[&str]) -> DispatchPlan {
        DispatchPlan {
            backends: backends.iter().map(|s| s.to_string()).collect(),
            mode: ConcurrencyMode::Parallel,
            call_timeout: Duration::from_secs(5),
            max_backends: 8,
        }
    }

    fn valid_candidate(backend: &str, quality: f64, latency_ms: u64) -> CandidateResponse {
        let mut c = CandidateResponse::received(
            backend,
            format!("answer from {backend}"),
            Duration::from_millis(latency_ms),
        );
        c.is_valid = true;
        c.quality = quality;
        c
    }

    fn failed_candidate(backend: &str, state: TerminalState) -> CandidateResponse {
        CandidateResponse::failed(backend, state, Duration::from_millis(10))
    }

    #[test]
    fn test_pick_best_by_quality() {
        let ranker = ResponseRanker;
        let candidates = vec![
            valid_candidate("a", 0.6, 100),
            valid_candidate("b", 0.9, 300),
            valid_candidate("c", 0.7, 50),
        ];

        let result = ranker
            .rank(
                Uuid::new_v4(),
                &candidates,
                &plan(&["a", "b", "c"]),
                RankPolicy::PickBest,
                Duration::from_millis(400),
            )
            .unwrap();

        assert_eq!(result.backend_id, "b");
        assert!(!result.degraded);
        assert_eq!(result.scores.len(), 3);
    }

    #[test]
    fn test_quality_tie_breaks_by_latency_then_plan_order() {
        let ranker = ResponseRanker;

        // Equal quality: lower latency wins.
        let candidates = vec![valid_candidate("a", 0.8, 500), valid_candidate("b", 0.8, 100)];
        let result = ranker
            .rank(
                Uuid::new_v4(),
                &candidates,
                &plan(&["a", "b"]),
                RankPolicy::PickBest,
                Duration::ZERO,
            )
            .unwrap();
        assert_eq!(result.backend_id, "b");

        // Equal quality and latency: plan order wins.
        let candidates = vec![valid_candidate("x", 0.8, 100), valid_candidate("y", 0.8, 100)];
        let result = ranker
            .rank(
                Uuid::new_v4(),
                &candidates,
                &plan(&["y", "x"]),
                RankPolicy::PickBest,
                Duration::ZERO,
            )
            .unwrap();
        assert_eq!(result.backend_id, "y");
    }

    #[test]
    fn test_invalid_and_failed_excluded() {
        let ranker = ResponseRanker;
        let mut rejected = valid_candidate("r", 0.9, 10);
        rejected.is_valid = false;

        let candidates = vec![
            rejected,
            failed_candidate("t", TerminalState::Timeout),
            valid_candidate("ok", 0.4, 200),
        ];

        let result = ranker
            .rank(
                Uuid::new_v4(),
                &candidates,
                &plan(&["r", "t", "ok"]),
                RankPolicy::PickBest,
                Duration::ZERO,
            )
            .unwrap();

        assert_eq!(result.backend_id, "ok");
        // The summary still covers every candidate.
        assert_eq!(result.scores.len(), 3);
        assert!(result.scores.iter().any(|s| s.state == "timeout"));
    }

    #[test]
    fn test_zero_valid_returns_none() {
        let ranker = ResponseRanker;
        let candidates = vec![
            failed_candidate("a", TerminalState::Error),
            failed_candidate("b", TerminalState::Empty),
        ];

        let result = ranker.rank(
            Uuid::new_v4(),
            &candidates,
            &plan(&["a", "b"]),
            RankPolicy::PickBest,
            Duration::ZERO,
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_blend_records_shares() {
        let ranker = ResponseRanker;
        let candidates = vec![
            valid_candidate("a", 0.6, 100),
            valid_candidate("b", 0.3, 100),
            valid_candidate("c", 0.1, 100),
        ];

        let result = ranker
            .rank(
                Uuid::new_v4(),
                &candidates,
                &plan(&["a", "b", "c"]),
                RankPolicy::Blend { top_n: 2 },
                Duration::ZERO,
            )
            .unwrap();

        let shares = result.blend_shares.unwrap();
        assert_eq!(shares.len(), 2);
        assert_eq!(shares[0].backend_id, "a");
        assert!((shares[0].share - 0.6 / 0.9).abs() < 1e-9);
        assert!((shares.iter().map(|s| s.share).sum::<f64>() - 1.0).abs() < 1e-9);

        // Composite text contains both contributions.
        assert!(result.text.contains("answer from a"));
        assert!(result.text.contains("answer from b"));
        assert!(!result.text.contains("answer from c"));
    }
}
