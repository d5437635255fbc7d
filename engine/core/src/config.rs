//! Engine Configuration
//!
//! Centralized configuration for every tunable in the engine. All heuristic
//! constants (smoothing factors, thresholds, worker caps) live here as named
//! fields with documented defaults rather than inline literals in the
//! components that consume them.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. Environment variables
//! 2. TOML configuration file
//! 3. Default values
//!
//! # XDG Base Directory Compliance
//!
//! The configuration file follows the XDG Base Directory specification:
//! `$XDG_CONFIG_HOME/quorum/quorum.toml` (typically `~/.config/quorum/quorum.toml`).
//! A missing file is not an error; defaults are used.
//!
//! # Example Configuration
//!
//! ```toml
//! [selection]
//! min_backends = 2
//! mid_backends = 4
//! max_backends = 8
//! parallel_threshold = 0.3
//! priority_backends = ["local-mistral"]
//!
//! [dispatch]
//! call_timeout_ms = 5000
//! worker_cap = 4
//! short_circuit_quality = 0.85
//!
//! [registry]
//! ema_alpha = 0.2
//! live_blend_min_samples = 5
//!
//! [[backends]]
//! id = "local-llama"
//! base_url = "http://localhost:11434"
//! model = "llama3.2"
//!
//! [backends.capabilities]
//! technical = 0.7
//! reasoning = 0.6
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::CapabilityVector;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Selection
// =============================================================================

/// Backend Selector tuning
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Backend count for low-complexity queries
    pub min_backends: usize,

    /// Backend count for moderate-complexity queries
    pub mid_backends: usize,

    /// Hard upper bound on backends per round
    pub max_backends: usize,

    /// Complexity at or above which a query counts as moderate
    pub moderate_complexity: f64,

    /// Complexity at or above which a query counts as high (fan out to all)
    pub high_complexity: f64,

    /// Complexity above which multi-backend rounds run in parallel
    pub parallel_threshold: f64,

    /// Backends guaranteed a slot whenever they are available
    pub priority_backends: Vec<String>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_backends: 2,
            mid_backends: 4,
            max_backends: 8,
            moderate_complexity: 0.35,
            high_complexity: 0.7,
            parallel_threshold: 0.3,
            priority_backends: Vec::new(),
        }
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Dispatch Coordinator tuning
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Per-call timeout in milliseconds, enforced uniformly in both modes
    pub call_timeout_ms: u64,

    /// Maximum concurrent invocations in parallel mode
    pub worker_cap: usize,

    /// Sequential mode stops invoking further backends once a response
    /// scores at or above this quality (unless the round is exhaustive)
    pub short_circuit_quality: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 5_000,
            worker_cap: 4,
            short_circuit_quality: 0.85,
        }
    }
}

impl DispatchConfig {
    /// Per-call timeout as a `Duration`
    #[must_use]
    pub fn call_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.call_timeout_ms)
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Response Validator tuning
///
/// The rejection order (empty, repetitive, self-referential, too-short) is
/// fixed; everything else here is tunable.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Fraction of repeated trigrams above which a response is rejected
    pub repetition_threshold: f64,

    /// Maximum tolerated count of disclosed-AI self-reference phrases
    pub self_reference_limit: usize,

    /// Minimum acceptable length (chars) for a zero-complexity query
    pub base_min_length: usize,

    /// Additional minimum length scaled by query complexity
    pub complexity_min_length_span: usize,

    /// Weight of length adequacy in the quality score
    pub length_weight: f64,

    /// Weight of query/response lexical overlap in the quality score
    pub relevance_weight: f64,

    /// Weight of structural coherence in the quality score
    pub structure_weight: f64,

    /// Maximum capability-affinity bonus/penalty applied to a valid score
    pub capability_adjustment: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            repetition_threshold: 0.45,
            self_reference_limit: 2,
            base_min_length: 12,
            complexity_min_length_span: 108,
            length_weight: 0.4,
            relevance_weight: 0.35,
            structure_weight: 0.25,
            capability_adjustment: 0.05,
        }
    }
}

impl ValidationConfig {
    /// Minimum acceptable response length for a query of the given complexity
    #[must_use]
    pub fn min_length_for(&self, complexity: f64) -> usize {
        let span = self.complexity_min_length_span as f64;
        self.base_min_length + (span * complexity.clamp(0.0, 1.0)) as usize
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Capability Registry tuning
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Smoothing factor for the exponential moving averages (0.0 - 1.0).
    /// Higher values weight recent outcomes more heavily.
    pub ema_alpha: f64,

    /// Sample count at which live statistics reach full blend weight
    pub live_blend_min_samples: u64,

    /// Upper bound on the live-statistics share of a blended weight
    pub live_blend_max_ratio: f64,

    /// Where to persist the live-statistics snapshot (CLI driver only)
    pub stats_path: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ema_alpha: 0.2,
            live_blend_min_samples: 5,
            live_blend_max_ratio: 0.7,
            stats_path: None,
        }
    }
}

// =============================================================================
// Analyzer
// =============================================================================

/// Query Analyzer tuning
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Character count at which the length factor saturates
    pub length_saturation_chars: usize,

    /// Cap on any single factor's contribution to the complexity score
    pub factor_cap: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            length_saturation_chars: 1_200,
            factor_cap: 0.35,
        }
    }
}

// =============================================================================
// Backend Entries (CLI driver)
// =============================================================================

/// A generation backend declared in the configuration file
///
/// Consumed by the CLI driver to construct HTTP backends; the engine library
/// itself only ever sees registered `GenerationBackend` trait objects.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendEntry {
    /// Unique backend identifier
    pub id: String,

    /// Base URL of the generation server
    pub base_url: String,

    /// Model name passed through on every request
    pub model: String,

    /// Static capability scores supplied at registration
    #[serde(default)]
    pub capabilities: CapabilityVector,
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Complete engine configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backend Selector tuning
    pub selection: SelectionConfig,

    /// Dispatch Coordinator tuning
    pub dispatch: DispatchConfig,

    /// Response Validator tuning
    pub validation: ValidationConfig,

    /// Capability Registry tuning
    pub registry: RegistryConfig,

    /// Query Analyzer tuning
    pub analyzer: AnalyzerConfig,

    /// Backends to register at startup (CLI driver only)
    pub backends: Vec<BackendEntry>,
}

impl EngineConfig {
    /// Validate cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` when a field is outside its
    /// documented range or the selection bounds are inconsistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.registry.ema_alpha) {
            return Err(ConfigError::ValidationError(format!(
                "registry.ema_alpha must be in [0,1], got {}",
                self.registry.ema_alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.registry.live_blend_max_ratio) {
            return Err(ConfigError::ValidationError(format!(
                "registry.live_blend_max_ratio must be in [0,1], got {}",
                self.registry.live_blend_max_ratio
            )));
        }
        if self.selection.min_backends == 0 {
            return Err(ConfigError::ValidationError(
                "selection.min_backends must be at least 1".to_string(),
            ));
        }
        if self.selection.min_backends > self.selection.max_backends
            || self.selection.mid_backends > self.selection.max_backends
        {
            return Err(ConfigError::ValidationError(format!(
                "selection counts must not exceed max_backends ({})",
                self.selection.max_backends
            )));
        }
        if self.dispatch.worker_cap == 0 {
            return Err(ConfigError::ValidationError(
                "dispatch.worker_cap must be at least 1".to_string(),
            ));
        }
        let weight_sum = self.validation.length_weight
            + self.validation.relevance_weight
            + self.validation.structure_weight;
        if weight_sum <= 0.0 {
            return Err(ConfigError::ValidationError(
                "validation quality weights must sum to a positive value".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Get the default configuration file path
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("quorum").join("quorum.toml"))
}

/// Get the default path for the persisted live-statistics snapshot
#[must_use]
pub fn default_stats_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("quorum").join("backend-stats.json"))
}

/// Load configuration from the default path with environment overrides
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed,
/// or if the resulting configuration fails validation. A missing file is not
/// an error.
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if the resulting configuration fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<EngineConfig, ConfigError> {
    let mut config = EngineConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;
            config = toml::from_str(&toml_content)?;

            tracing::info!(
                path = %config_path.display(),
                backends = config.backends.len(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config);
    config.validate()?;

    Ok(config)
}

/// Apply environment variable overrides (highest priority)
fn apply_env_config(config: &mut EngineConfig) {
    if let Ok(val) = std::env::var("QUORUM_CALL_TIMEOUT_MS") {
        if let Ok(ms) = val.parse() {
            config.dispatch.call_timeout_ms = ms;
        }
    }
    if let Ok(val) = std::env::var("QUORUM_WORKER_CAP") {
        if let Ok(cap) = val.parse() {
            config.dispatch.worker_cap = cap;
        }
    }
    if let Ok(val) = std::env::var("QUORUM_STATS_PATH") {
        config.registry.stats_path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("QUORUM_MAX_BACKENDS") {
        if let Ok(max) = val.parse() {
            config.selection.max_backends = max;
        }
    }
}
