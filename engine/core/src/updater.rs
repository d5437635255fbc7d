//! Adaptive Weight Updater
//!
//! Folds the outcome of a round back into the capability registry. Invoked
//! once per round after ranking, for every candidate that actually executed
//! (valid or not); candidates that were never dispatched do not exist and
//! therefore never reach this path.
//!
//! Recording is decoupled from the response path: the engine fires the
//! update on a detached task and returns to the caller immediately. The
//! registry's per-key serialization makes concurrent rounds updating the
//! same (backend, query type) pair safe.

use std::sync::Arc;

use crate::analyzer::QueryType;
use crate::dispatch::CandidateResponse;
use crate::registry::CapabilityRegistry;

/// The adaptive weight updater
#[derive(Clone)]
pub struct WeightUpdater {
    registry: Arc<CapabilityRegistry>,
}

impl WeightUpdater {
    /// Create an updater bound to a registry
    #[must_use]
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    /// Record every executed candidate's outcome synchronously
    ///
    /// Invalid and failed candidates count as failures with zero quality so
    /// backend absence is a first-class outcome, not a missing data point.
    pub fn apply(&self, query_type: QueryType, candidates: &[CandidateResponse]) {
        for candidate in candidates {
            let quality = if candidate.is_valid {
                candidate.quality
            } else {
                0.0
            };
            self.registry.record_outcome(
                &candidate.backend_id,
                query_type,
                quality,
                candidate.is_valid,
                candidate.elapsed,
            );
        }

        tracing::trace!(
            query_type = %query_type,
            candidates = candidates.len(),
            "Recorded round outcomes"
        );
    }

    /// Record outcomes on a detached task (fire-and-continue)
    pub fn spawn_apply(&self, query_type: QueryType, candidates: Vec<CandidateResponse>) {
        let updater = self.clone();
        tokio::spawn(async move {
            updater.apply(query_type, &candidates);
        });
    }
}
