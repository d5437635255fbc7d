//! Arbitration Engine
//!
//! The facade that runs a complete round: analyze the query, select
//! backends, dispatch, validate, rank, fold the outcomes back into the
//! registry, and fall back when nothing usable came back.
//!
//! # Failure Surface
//!
//! The only error `process` ever returns is the configuration error of an
//! empty backend set. Per-backend failures become terminal states on their
//! candidates; a round with zero valid candidates degrades into a labeled
//! fallback result. Callers always get a `RoundResult` otherwise.

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::analyzer::QueryAnalyzer;
use crate::backend::GenerationBackend;
use crate::config::EngineConfig;
use crate::dispatch::DispatchCoordinator;
use crate::fallback::FallbackManager;
use crate::ranker::{RankPolicy, ResponseRanker, RoundResult};
use crate::registry::{CapabilityRegistry, CapabilityVector, RegistryError};
use crate::selector::{BackendSelector, SelectError, SelectionOverrides};
use crate::updater::WeightUpdater;
use crate::validator::ResponseValidator;

// ============================================================================
// Engine Errors
// ============================================================================

/// Errors surfaced to the engine's caller
///
/// Everything else degrades into a `RoundResult`.
#[derive(Clone, Debug)]
pub enum EngineError {
    /// No backends are registered; a configuration error, not retried
    NoBackendsAvailable,
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoBackendsAvailable => write!(f, "No backends available"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<SelectError> for EngineError {
    fn from(error: SelectError) -> Self {
        match error {
            SelectError::NoBackendsAvailable => Self::NoBackendsAvailable,
        }
    }
}

// ============================================================================
// Round Preferences
// ============================================================================

/// Optional per-round adjustments supplied by the caller
#[derive(Clone, Debug, Default)]
pub struct RoundPreferences {
    /// Backends guaranteed a slot this round, replacing the configured list
    pub priority_backends: Option<Vec<String>>,

    /// Raise the minimum backend count
    pub min_backends: Option<usize>,

    /// Lower the maximum backend count
    pub max_backends: Option<usize>,

    /// Answer-selection policy; defaults to pick-best
    pub policy: Option<RankPolicy>,

    /// Invoke every planned backend even when an early response already
    /// clears the short-circuit threshold
    pub exhaustive: bool,
}

impl RoundPreferences {
    fn selection_overrides(&self) -> SelectionOverrides {
        SelectionOverrides {
            priority_backends: self.priority_backends.clone(),
            min_backends: self.min_backends,
            max_backends: self.max_backends,
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// The arbitration engine
pub struct Engine {
    registry: Arc<CapabilityRegistry>,
    analyzer: QueryAnalyzer,
    selector: BackendSelector,
    coordinator: DispatchCoordinator,
    validator: ResponseValidator,
    ranker: ResponseRanker,
    fallback: FallbackManager,
    updater: WeightUpdater,
}

impl Engine {
    /// Create an engine from configuration
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let registry = Arc::new(CapabilityRegistry::new(config.registry.clone()));

        Self {
            analyzer: QueryAnalyzer::new(config.analyzer.clone()),
            selector: BackendSelector::new(
                config.selection.clone(),
                config.dispatch.call_timeout(),
            ),
            coordinator: DispatchCoordinator::new(config.dispatch.clone()),
            validator: ResponseValidator::new(config.validation.clone()),
            ranker: ResponseRanker,
            fallback: FallbackManager,
            updater: WeightUpdater::new(registry.clone()),
            registry,
        }
    }

    /// Register a backend together with its static capabilities
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicateBackend` when the id is already
    /// registered.
    pub fn register_backend(
        &mut self,
        backend: Arc<dyn GenerationBackend>,
        capabilities: CapabilityVector,
    ) -> Result<(), RegistryError> {
        self.registry.register(backend.id(), capabilities)?;
        self.coordinator.register_backend(backend);
        Ok(())
    }

    /// The shared capability registry
    ///
    /// Exposed for persistence at process start/stop and for inspection.
    #[must_use]
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Ids of all dispatchable backends, sorted
    #[must_use]
    pub fn backend_ids(&self) -> Vec<String> {
        self.coordinator.backend_ids()
    }

    /// Run one complete round for a query
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NoBackendsAvailable` when no backends are
    /// registered. Every other failure mode degrades into the returned
    /// `RoundResult`.
    pub async fn process(
        &self,
        query_text: &str,
        preferences: Option<RoundPreferences>,
    ) -> Result<RoundResult, EngineError> {
        let round_id = Uuid::new_v4();
        let start = Instant::now();
        let preferences = preferences.unwrap_or_default();

        let profile = self.analyzer.analyze(query_text);
        tracing::debug!(
            round_id = %round_id,
            query_type = %profile.query_type,
            complexity = profile.complexity,
            "Analyzed query"
        );

        let available = self.coordinator.backend_ids();
        let plan = self.selector.select(
            &profile,
            &self.registry,
            &available,
            &preferences.selection_overrides(),
        )?;

        let policy = preferences.policy.unwrap_or_default();
        // Blending needs every planned response; never short-circuit for it.
        let exhaustive = preferences.exhaustive || matches!(policy, RankPolicy::Blend { .. });

        let mut candidates = self
            .coordinator
            .dispatch(&plan, &profile, &self.validator, exhaustive)
            .await;

        self.validator
            .validate_all(&mut candidates, &profile, |id| {
                self.registry.capabilities(id)
            });

        let result = self.ranker.rank(
            round_id,
            &candidates,
            &plan,
            policy,
            start.elapsed(),
        );

        // Outcome recording must not block the response path.
        self.updater
            .spawn_apply(profile.query_type, candidates.clone());

        let result = match result {
            Some(result) => result,
            None => self
                .fallback
                .fallback(&profile, &candidates, round_id, start.elapsed()),
        };

        tracing::info!(
            round_id = %round_id,
            backend = %result.backend_id,
            degraded = result.degraded,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Round complete"
        );

        Ok(result)
    }
}
