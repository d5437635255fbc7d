//! Capability Registry
//!
//! The only state shared across concurrent rounds: per-backend static
//! capability vectors plus live performance statistics keyed by
//! (backend, query type).
//!
//! # Concurrency
//!
//! Static profiles sit behind a `parking_lot::RwLock`; live statistics live
//! in a `DashMap` keyed per (backend, query type), so concurrent writers
//! serialize per key (no lost moving-average updates) while readers always
//! see a consistent, possibly slightly stale, snapshot without blocking.
//!
//! # Weight Blending
//!
//! `get_weight` combines the static capability affinity for a query type
//! with the live success/quality statistics for that pair. The live share
//! grows with sample count and is capped, so a handful of early observations
//! cannot crowd out the registered capability profile.
//!
//! # Persistence
//!
//! Live statistics can be saved to and restored from a JSON snapshot
//! (`backend_id -> query_type -> stats`). Unknown fields and unknown query
//! types in a snapshot are tolerated; missing entries simply start at
//! zero-sample defaults.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::analyzer::QueryType;
use crate::config::RegistryConfig;

// ============================================================================
// Capability Vector
// ============================================================================

/// Static capability scores for a backend, fixed at registration
///
/// Every dimension is a score in [0.0, 1.0]. The conservative default is 0.5
/// across the board, which is also what an unregistered backend receives the
/// first time it is observed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityVector {
    /// Programming and systems expertise
    pub technical: f64,

    /// Creative writing quality
    pub creative: f64,

    /// General analytical reasoning
    pub reasoning: f64,

    /// Mathematical reasoning
    pub math: f64,

    /// Handling of long inputs
    pub long_context: f64,

    /// Fidelity to explicit instructions
    pub instruction_following: f64,
}

impl Default for CapabilityVector {
    fn default() -> Self {
        Self {
            technical: 0.5,
            creative: 0.5,
            reasoning: 0.5,
            math: 0.5,
            long_context: 0.5,
            instruction_following: 0.5,
        }
    }
}

impl CapabilityVector {
    /// Clamp every dimension into [0.0, 1.0]
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            technical: self.technical.clamp(0.0, 1.0),
            creative: self.creative.clamp(0.0, 1.0),
            reasoning: self.reasoning.clamp(0.0, 1.0),
            math: self.math.clamp(0.0, 1.0),
            long_context: self.long_context.clamp(0.0, 1.0),
            instruction_following: self.instruction_following.clamp(0.0, 1.0),
        }
    }

    /// Static affinity of this capability vector for a query type (0.0 - 1.0)
    ///
    /// A weighted mix of the dimensions relevant to the query type. Weakly
    /// monotone in every dimension: raising any score never lowers affinity.
    #[must_use]
    pub fn affinity_for(&self, query_type: QueryType) -> f64 {
        match query_type {
            QueryType::Technical => {
                0.6 * self.technical + 0.2 * self.reasoning + 0.2 * self.instruction_following
            }
            QueryType::Reasoning => {
                0.5 * self.reasoning + 0.3 * self.math + 0.2 * self.long_context
            }
            QueryType::Creative => 0.7 * self.creative + 0.3 * self.instruction_following,
            QueryType::Factual => {
                0.5 * self.instruction_following + 0.3 * self.reasoning + 0.2 * self.long_context
            }
            QueryType::General => {
                (self.technical
                    + self.creative
                    + self.reasoning
                    + self.math
                    + self.long_context
                    + self.instruction_following)
                    / 6.0
            }
        }
    }
}

// ============================================================================
// Live Statistics
// ============================================================================

/// Exponentially-smoothed performance statistics for one (backend, query type)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiveStats {
    /// Exponentially-weighted success rate (0.0 - 1.0)
    pub success_rate: f64,

    /// Exponentially-weighted average quality score (0.0 - 1.0)
    pub avg_quality: f64,

    /// Exponentially-weighted average latency in milliseconds
    pub avg_latency_ms: f64,

    /// Number of recorded outcomes (monotonically non-decreasing)
    pub samples: u64,
}

impl Default for LiveStats {
    fn default() -> Self {
        Self {
            success_rate: 0.0,
            avg_quality: 0.0,
            avg_latency_ms: 0.0,
            samples: 0,
        }
    }
}

impl LiveStats {
    /// Fold one outcome into the moving averages
    ///
    /// The first sample seeds the averages directly; later samples move each
    /// average toward the observed value by `alpha`, so the average never
    /// overshoots past a repeated observation.
    fn record(&mut self, quality: f64, success: bool, latency_ms: f64, alpha: f64) {
        let quality = quality.clamp(0.0, 1.0);
        let success_val = if success { 1.0 } else { 0.0 };
        let latency_ms = latency_ms.max(0.0);

        if self.samples == 0 {
            self.success_rate = success_val;
            self.avg_quality = quality;
            self.avg_latency_ms = latency_ms;
        } else {
            self.success_rate = alpha * success_val + (1.0 - alpha) * self.success_rate;
            self.avg_quality = alpha * quality + (1.0 - alpha) * self.avg_quality;
            self.avg_latency_ms = alpha * latency_ms + (1.0 - alpha) * self.avg_latency_ms;
        }

        self.samples += 1;
    }

    /// The live component of a blended weight
    #[must_use]
    pub fn score(&self) -> f64 {
        0.5 * self.success_rate + 0.5 * self.avg_quality
    }
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Capability registry errors
#[derive(Debug)]
pub enum RegistryError {
    /// Backend already registered; use `update_capabilities` to change it
    DuplicateBackend(String),

    /// Backend not registered
    UnknownBackend(String),

    /// Snapshot file could not be read or written
    SnapshotIo {
        /// The path that was attempted
        path: std::path::PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Snapshot contents could not be parsed or serialized
    SnapshotFormat(serde_json::Error),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateBackend(id) => write!(f, "Backend already registered: {id}"),
            Self::UnknownBackend(id) => write!(f, "Backend not registered: {id}"),
            Self::SnapshotIo { path, source } => {
                write!(f, "Snapshot IO error at {}: {source}", path.display())
            }
            Self::SnapshotFormat(e) => write!(f, "Snapshot format error: {e}"),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SnapshotIo { source, .. } => Some(source),
            Self::SnapshotFormat(e) => Some(e),
            _ => None,
        }
    }
}

// ============================================================================
// Persistence Snapshot
// ============================================================================

/// Serialized form of the live-statistics map
///
/// Forward compatible: unknown fields are ignored on load, and query types
/// absent from a backend's map fall back to zero-sample defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// When this snapshot was written
    pub saved_at: chrono::DateTime<chrono::Utc>,

    /// `backend_id -> query_type -> stats`
    pub backends: BTreeMap<String, BTreeMap<String, LiveStats>>,
}

// ============================================================================
// Capability Registry
// ============================================================================

type LiveKey = (String, QueryType);

/// The capability registry
///
/// Injectable, internally synchronized; tests instantiate a fresh registry
/// per case rather than sharing a hidden singleton.
pub struct CapabilityRegistry {
    /// Static capability vectors per backend
    profiles: RwLock<HashMap<String, CapabilityVector>>,

    /// Live statistics per (backend, query type)
    live: DashMap<LiveKey, LiveStats>,

    /// Backends that were auto-defaulted on first observation
    defaulted: RwLock<HashSet<String>>,

    /// Tuning
    config: RegistryConfig,
}

impl CapabilityRegistry {
    /// Create a registry with the given tuning
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
            live: DashMap::new(),
            defaulted: RwLock::new(HashSet::new()),
            config,
        }
    }

    /// Register a backend's static capabilities
    ///
    /// Dimensions are clamped into [0.0, 1.0].
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicateBackend` if the backend is already
    /// registered; re-registration must go through `update_capabilities`.
    pub fn register(
        &self,
        backend_id: impl Into<String>,
        capabilities: CapabilityVector,
    ) -> Result<(), RegistryError> {
        let backend_id = backend_id.into();
        let mut profiles = self.profiles.write();

        if profiles.contains_key(&backend_id) {
            return Err(RegistryError::DuplicateBackend(backend_id));
        }

        tracing::debug!(backend = %backend_id, "Registered backend capabilities");
        profiles.insert(backend_id, capabilities.clamped());
        Ok(())
    }

    /// Explicitly replace a registered backend's static capabilities
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::UnknownBackend` if the backend was never
    /// registered.
    pub fn update_capabilities(
        &self,
        backend_id: &str,
        capabilities: CapabilityVector,
    ) -> Result<(), RegistryError> {
        let mut profiles = self.profiles.write();
        match profiles.get_mut(backend_id) {
            Some(existing) => {
                *existing = capabilities.clamped();
                Ok(())
            }
            None => Err(RegistryError::UnknownBackend(backend_id.to_string())),
        }
    }

    /// Whether a backend is registered
    #[must_use]
    pub fn contains(&self, backend_id: &str) -> bool {
        self.profiles.read().contains_key(backend_id)
    }

    /// All registered backend ids, sorted for determinism
    #[must_use]
    pub fn backend_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.profiles.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Backends that were auto-defaulted because they were observed before
    /// being registered (configuration gaps)
    #[must_use]
    pub fn defaulted_backends(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.defaulted.read().iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Static capability vector for a backend, if registered
    #[must_use]
    pub fn capabilities(&self, backend_id: &str) -> Option<CapabilityVector> {
        self.profiles.read().get(backend_id).copied()
    }

    /// Fetch the profile for a backend, inserting the conservative default
    /// (and logging the configuration gap) the first time an unregistered
    /// backend is observed.
    fn profile_or_default(&self, backend_id: &str) -> CapabilityVector {
        if let Some(profile) = self.profiles.read().get(backend_id) {
            return *profile;
        }

        let mut profiles = self.profiles.write();
        *profiles.entry(backend_id.to_string()).or_insert_with(|| {
            let newly_defaulted = self.defaulted.write().insert(backend_id.to_string());
            if newly_defaulted {
                tracing::warn!(
                    backend = %backend_id,
                    "Backend observed without registration, using conservative default profile"
                );
            }
            CapabilityVector::default()
        })
    }

    /// Blended weight of a backend for a query type
    ///
    /// With zero live samples the weight is the pure static affinity; as the
    /// sample count grows the live success/quality statistics take over, up
    /// to the configured maximum share.
    #[must_use]
    pub fn get_weight(&self, backend_id: &str, query_type: QueryType) -> f64 {
        let static_affinity = self.profile_or_default(backend_id).affinity_for(query_type);

        let key = (backend_id.to_string(), query_type);
        let Some(stats) = self.live.get(&key).map(|s| *s) else {
            return static_affinity;
        };
        if stats.samples == 0 {
            return static_affinity;
        }

        let maturity =
            (stats.samples as f64 / self.config.live_blend_min_samples as f64).min(1.0);
        let live_ratio = self.config.live_blend_max_ratio * maturity;

        (1.0 - live_ratio) * static_affinity + live_ratio * stats.score()
    }

    /// Record the outcome of one backend invocation
    ///
    /// The only mutation path for live statistics. Safe under concurrent
    /// callers: updates serialize per (backend, query type) key.
    pub fn record_outcome(
        &self,
        backend_id: &str,
        query_type: QueryType,
        quality: f64,
        success: bool,
        latency: Duration,
    ) {
        // Observing an unregistered backend here is a configuration gap too.
        let _ = self.profile_or_default(backend_id);

        let alpha = self.config.ema_alpha;
        let latency_ms = latency.as_secs_f64() * 1_000.0;

        let key = (backend_id.to_string(), query_type);
        self.live
            .entry(key)
            .or_default()
            .record(quality, success, latency_ms, alpha);
    }

    /// Live statistics for a (backend, query type) pair, if any outcome has
    /// been recorded
    #[must_use]
    pub fn live_stats(&self, backend_id: &str, query_type: QueryType) -> Option<LiveStats> {
        self.live
            .get(&(backend_id.to_string(), query_type))
            .map(|s| *s)
    }

    /// Average observed latency for a (backend, query type) pair in
    /// milliseconds; `None` before any outcome is recorded
    #[must_use]
    pub fn avg_latency_ms(&self, backend_id: &str, query_type: QueryType) -> Option<f64> {
        self.live_stats(backend_id, query_type)
            .filter(|s| s.samples > 0)
            .map(|s| s.avg_latency_ms)
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Export the live statistics as a snapshot
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut backends: BTreeMap<String, BTreeMap<String, LiveStats>> = BTreeMap::new();

        for entry in self.live.iter() {
            let (backend_id, query_type) = entry.key();
            backends
                .entry(backend_id.clone())
                .or_default()
                .insert(query_type.as_str().to_string(), *entry.value());
        }

        StatsSnapshot {
            saved_at: chrono::Utc::now(),
            backends,
        }
    }

    /// Merge a snapshot into the live-statistics map
    ///
    /// Entries for query types that no longer exist are skipped with a
    /// warning rather than rejected.
    pub fn restore(&self, snapshot: &StatsSnapshot) {
        for (backend_id, per_type) in &snapshot.backends {
            for (type_str, stats) in per_type {
                let Some(query_type) = QueryType::parse(type_str) else {
                    tracing::warn!(
                        backend = %backend_id,
                        query_type = %type_str,
                        "Skipping snapshot entry with unknown query type"
                    );
                    continue;
                };
                self.live
                    .insert((backend_id.clone(), query_type), *stats);
            }
        }
    }

    /// Save the live statistics to a JSON file
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::SnapshotIo` on filesystem errors and
    /// `RegistryError::SnapshotFormat` if serialization fails.
    pub fn save_stats(&self, path: &Path) -> Result<(), RegistryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RegistryError::SnapshotIo {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let json = serde_json::to_string_pretty(&self.snapshot())
            .map_err(RegistryError::SnapshotFormat)?;

        std::fs::write(path, json).map_err(|e| RegistryError::SnapshotIo {
            path: path.to_path_buf(),
            source: e,
        })?;

        tracing::info!(path = %path.display(), "Saved backend statistics snapshot");
        Ok(())
    }

    /// Load live statistics from a JSON file
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::SnapshotIo` if the file cannot be read and
    /// `RegistryError::SnapshotFormat` if it cannot be parsed. A missing
    /// file is not an error; the registry simply starts cold.
    pub fn load_stats(&self, path: &Path) -> Result<(), RegistryError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No statistics snapshot, starting cold");
            return Ok(());
        }

        let json = std::fs::read_to_string(path).map_err(|e| RegistryError::SnapshotIo {
            path: path.to_path_buf(),
            source: e,
        })?;

        let snapshot: StatsSnapshot =
            serde_json::from_str(&json).map_err(RegistryError::SnapshotFormat)?;
        self.restore(&snapshot);

        tracing::info!(
            path = %path.display(),
            backends = snapshot.backends.len(),
            "Restored backend statistics snapshot"
        );
        Ok(())
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
