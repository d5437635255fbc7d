//! Backend Selector
//!
//! Chooses an ordered subset of backends for a round. Fan-out scales with
//! query complexity, ranking comes from the capability registry's blended
//! weights, and the whole procedure is deterministic: ties in weight resolve
//! by lower historical latency, then by backend id.
//!
//! Selection is the single hard-stop point upstream of dispatch: it fails
//! only when no backends are available at all. Everything downstream
//! degrades instead of failing.

use std::time::Duration;

use crate::analyzer::QueryProfile;
use crate::config::SelectionConfig;
use crate::registry::CapabilityRegistry;

// ============================================================================
// Dispatch Plan
// ============================================================================

/// How the coordinator should run the planned invocations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConcurrencyMode {
    /// Invoke all planned backends concurrently, bounded by the worker cap
    Parallel,

    /// Invoke one at a time in plan order, with optional short-circuit
    Sequential,
}

/// Ordered invocation plan, produced by the selector and consumed by the
/// dispatch coordinator
#[derive(Clone, Debug)]
pub struct DispatchPlan {
    /// Backend ids in invocation/rank order
    pub backends: Vec<String>,

    /// Concurrency mode for this round
    pub mode: ConcurrencyMode,

    /// Timeout applied to every individual invocation
    pub call_timeout: Duration,

    /// Upper bound the plan was built against
    pub max_backends: usize,
}

impl DispatchPlan {
    /// Rank position of a backend within the plan
    #[must_use]
    pub fn rank_of(&self, backend_id: &str) -> Option<usize> {
        self.backends.iter().position(|b| b == backend_id)
    }
}

// ============================================================================
// Selection Errors
// ============================================================================

/// Selector errors
#[derive(Clone, Debug)]
pub enum SelectError {
    /// The available backend set is empty
    NoBackendsAvailable,
}

impl std::fmt::Display for SelectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoBackendsAvailable => write!(f, "No backends available"),
        }
    }
}

impl std::error::Error for SelectError {}

// ============================================================================
// Per-round Overrides
// ============================================================================

/// Caller-supplied adjustments for a single round
#[derive(Clone, Debug, Default)]
pub struct SelectionOverrides {
    /// Replaces the configured priority list when set
    pub priority_backends: Option<Vec<String>>,

    /// Raises the minimum backend count when set
    pub min_backends: Option<usize>,

    /// Lowers the maximum backend count when set
    pub max_backends: Option<usize>,
}

// ============================================================================
// Backend Selector
// ============================================================================

/// The backend selector
#[derive(Clone, Debug)]
pub struct BackendSelector {
    config: SelectionConfig,
    call_timeout: Duration,
}

impl BackendSelector {
    /// Create a selector with the given tuning and per-call timeout
    #[must_use]
    pub fn new(config: SelectionConfig, call_timeout: Duration) -> Self {
        Self {
            config,
            call_timeout,
        }
    }

    /// Build a dispatch plan for a query
    ///
    /// # Errors
    ///
    /// Returns `SelectError::NoBackendsAvailable` when `available` is empty.
    /// This is the only error the selection stage can produce.
    pub fn select(
        &self,
        query: &QueryProfile,
        registry: &CapabilityRegistry,
        available: &[String],
        overrides: &SelectionOverrides,
    ) -> Result<DispatchPlan, SelectError> {
        if available.is_empty() {
            return Err(SelectError::NoBackendsAvailable);
        }

        let hard_cap = overrides
            .max_backends
            .unwrap_or(self.config.max_backends)
            .min(self.config.max_backends)
            .max(1);

        let target = self.target_count(query.complexity, available.len(), overrides, hard_cap);

        // Rank every available backend: weight descending, then lower
        // historical latency, then id. Unknown latency sorts last among ties.
        let mut ranked: Vec<RankedBackend> = available
            .iter()
            .map(|id| RankedBackend {
                id: id.clone(),
                weight: registry.get_weight(id, query.query_type),
                latency_ms: registry
                    .avg_latency_ms(id, query.query_type)
                    .unwrap_or(f64::INFINITY),
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    a.latency_ms
                        .partial_cmp(&b.latency_ms)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.id.cmp(&b.id))
        });

        // Priority backends get slots first, in list order, whenever they are
        // available. Unavailable ones are skipped silently.
        let priority = overrides
            .priority_backends
            .as_deref()
            .unwrap_or(&self.config.priority_backends);

        let mut selected: Vec<String> = Vec::with_capacity(target);
        for id in priority {
            if selected.len() >= hard_cap {
                break;
            }
            if available.contains(id) && !selected.contains(id) {
                selected.push(id.clone());
            }
        }

        // Fill remaining slots by rank.
        for backend in &ranked {
            if selected.len() >= target || selected.len() >= hard_cap {
                break;
            }
            if !selected.contains(&backend.id) {
                selected.push(backend.id.clone());
            }
        }

        let mode = if selected.len() > 1 && query.complexity > self.config.parallel_threshold {
            ConcurrencyMode::Parallel
        } else {
            ConcurrencyMode::Sequential
        };

        tracing::debug!(
            query_type = %query.query_type,
            complexity = query.complexity,
            selected = selected.len(),
            parallel = matches!(mode, ConcurrencyMode::Parallel),
            "Built dispatch plan"
        );

        Ok(DispatchPlan {
            backends: selected,
            mode,
            call_timeout: self.call_timeout,
            max_backends: hard_cap,
        })
    }

    /// Complexity-driven target backend count
    fn target_count(
        &self,
        complexity: f64,
        available: usize,
        overrides: &SelectionOverrides,
        hard_cap: usize,
    ) -> usize {
        let scaled = if complexity >= self.config.high_complexity {
            available
        } else if complexity >= self.config.moderate_complexity {
            self.config.mid_backends
        } else {
            self.config.min_backends
        };

        let floor = overrides.min_backends.unwrap_or(0);
        scaled.max(floor).min(available).min(hard_cap)
    }
}

#[derive(Clone, Debug)]
struct RankedBackend {
    id: String,
    weight: f64,
    latency_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::QueryType;
    use crate::registry::CapabilityVector;

    fn query(query_type: QueryType, complexity: f64) -> QueryProfile {
        QueryProfile {
            text: String::new(),
            query_type,
            complexity,
        }
    }

    fn selector() -> BackendSelector {
        BackendSelector::new(SelectionConfig::default(), Duration::from_secs(5))
    }

    fn registry_with(ids: &[&str]) -> (CapabilityRegistry, Vec<String>) {
        let registry = CapabilityRegistry::default();
        for id in ids {
            registry.register(*id, CapabilityVector::default()).unwrap();
        }
        (registry, ids.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_empty_available_set_fails() {
        let (registry, _) = registry_with(&[]);
        let result = selector().select(
            &query(QueryType::General, 0.5),
            &registry,
            &[],
            &SelectionOverrides::default(),
        );
        assert!(matches!(result, Err(SelectError::NoBackendsAvailable)));
    }

    #[test]
    fn test_count_scales_with_complexity() {
        let (registry, available) = registry_with(&["a", "b", "c", "d", "e", "f"]);
        let sel = selector();
        let overrides = SelectionOverrides::default();

        let low = sel
            .select(&query(QueryType::Factual, 0.1), &registry, &available, &overrides)
            .unwrap();
        assert_eq!(low.backends.len(), 2);

        let mid = sel
            .select(&query(QueryType::Factual, 0.5), &registry, &available, &overrides)
            .unwrap();
        assert_eq!(mid.backends.len(), 4);

        let high = sel
            .select(&query(QueryType::Factual, 0.9), &registry, &available, &overrides)
            .unwrap();
        assert_eq!(high.backends.len(), 6);
    }

    #[test]
    fn test_hard_cap_applies() {
        let ids: Vec<String> = (0..12).map(|i| format!("backend-{i:02}")).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let (registry, available) = registry_with(&id_refs);

        let plan = selector()
            .select(
                &query(QueryType::Reasoning, 1.0),
                &registry,
                &available,
                &SelectionOverrides::default(),
            )
            .unwrap();
        assert_eq!(plan.backends.len(), SelectionConfig::default().max_backends);
    }

    #[test]
    fn test_ranking_prefers_capable_backend() {
        let registry = CapabilityRegistry::default();
        registry
            .register(
                "expert",
                CapabilityVector {
                    technical: 0.95,
                    ..Default::default()
                },
            )
            .unwrap();
        registry
            .register(
                "novice",
                CapabilityVector {
                    technical: 0.1,
                    ..Default::default()
                },
            )
            .unwrap();
        registry.register("middling", CapabilityVector::default()).unwrap();

        let available = vec![
            "novice".to_string(),
            "middling".to_string(),
            "expert".to_string(),
        ];
        let plan = selector()
            .select(
                &query(QueryType::Technical, 0.1),
                &registry,
                &available,
                &SelectionOverrides::default(),
            )
            .unwrap();

        assert_eq!(plan.backends[0], "expert");
        assert!(!plan.backends.contains(&"novice".to_string()));
    }

    #[test]
    fn test_ties_break_by_id() {
        // Identical profiles, no live stats: rank must fall back to id order.
        let (registry, available) = registry_with(&["zeta", "alpha", "mike"]);
        let plan = selector()
            .select(
                &query(QueryType::General, 0.1),
                &registry,
                &available,
                &SelectionOverrides::default(),
            )
            .unwrap();
        assert_eq!(plan.backends, vec!["alpha".to_string(), "mike".to_string()]);
    }

    #[test]
    fn test_ties_break_by_latency_before_id() {
        let (registry, available) = registry_with(&["slow", "fast"]);

        // Equal weights need equal live scores too; give both identical
        // quality/success but different latency.
        for _ in 0..5 {
            registry.record_outcome(
                "slow",
                QueryType::General,
                0.5,
                true,
                Duration::from_millis(2_000),
            );
            registry.record_outcome(
                "fast",
                QueryType::General,
                0.5,
                true,
                Duration::from_millis(50),
            );
        }

        let plan = selector()
            .select(
                &query(QueryType::General, 0.1),
                &registry,
                &available,
                &SelectionOverrides::default(),
            )
            .unwrap();
        assert_eq!(plan.backends[0], "fast");
    }

    #[test]
    fn test_priority_backends_always_included() {
        let (registry, available) = registry_with(&["a", "b", "c", "d"]);

        // "d" would never win a two-slot round on rank alone (all equal,
        // id order), but the priority list guarantees it a slot.
        let overrides = SelectionOverrides {
            priority_backends: Some(vec!["d".to_string()]),
            ..Default::default()
        };
        let plan = selector()
            .select(&query(QueryType::General, 0.1), &registry, &available, &overrides)
            .unwrap();

        assert_eq!(plan.backends[0], "d");
        assert_eq!(plan.backends.len(), 2);
    }

    #[test]
    fn test_unavailable_priority_backend_is_skipped() {
        let (registry, available) = registry_with(&["a", "b"]);

        let overrides = SelectionOverrides {
            priority_backends: Some(vec!["offline".to_string()]),
            ..Default::default()
        };
        let plan = selector()
            .select(&query(QueryType::General, 0.1), &registry, &available, &overrides)
            .unwrap();

        assert!(!plan.backends.contains(&"offline".to_string()));
        assert_eq!(plan.backends.len(), 2);
    }

    #[test]
    fn test_concurrency_mode_thresholds() {
        let (registry, available) = registry_with(&["a", "b", "c", "d", "e"]);
        let sel = selector();
        let overrides = SelectionOverrides::default();

        // Low complexity: sequential even with multiple backends.
        let low = sel
            .select(&query(QueryType::General, 0.1), &registry, &available, &overrides)
            .unwrap();
        assert_eq!(low.mode, ConcurrencyMode::Sequential);

        // Above the threshold with fan-out: parallel.
        let high = sel
            .select(&query(QueryType::General, 0.6), &registry, &available, &overrides)
            .unwrap();
        assert_eq!(high.mode, ConcurrencyMode::Parallel);

        // Single backend is always sequential.
        let (single_reg, single) = registry_with(&["only"]);
        let plan = sel
            .select(&query(QueryType::General, 0.9), &single_reg, &single, &overrides)
            .unwrap();
        assert_eq!(plan.mode, ConcurrencyMode::Sequential);
    }

    #[test]
    fn test_min_override_raises_count() {
        let (registry, available) = registry_with(&["a", "b", "c", "d", "e"]);
        let overrides = SelectionOverrides {
            min_backends: Some(4),
            ..Default::default()
        };
        let plan = selector()
            .select(&query(QueryType::General, 0.05), &registry, &available, &overrides)
            .unwrap();
        assert_eq!(plan.backends.len(), 4);
    }
}
