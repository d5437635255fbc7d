//! Quorum Core - Multi-Backend Response Arbitration
//!
//! This crate routes a single natural-language request to several
//! independent generative-text backends, judges the quality of each returned
//! answer, and returns one response (or a clearly labeled fallback) to the
//! caller, while continuously refining which backends are preferred for
//! which kinds of requests.
//!
//! It is pure engine: no UI, no chat bookkeeping, no transport. Surfaces
//! call [`Engine::process`] and render what comes back.
//!
//! # Architecture
//!
//! ```text
//!  request
//!     |
//!     v
//! +----------------+     +------------------+
//! | Query Analyzer |     | Capability       |
//! | (type +        |     | Registry         |<------------------+
//! |  complexity)   |     | (static caps +   |                   |
//! +-------+--------+     |  live EMA stats) |                   |
//!         |              +---------+--------+                   |
//!         v                        |                            |
//! +----------------+              reads                         |
//! | Backend        |<--------------+                            |
//! | Selector       |                                            |
//! +-------+--------+                                            |
//!         | DispatchPlan                                        |
//!         v                                                     |
//! +----------------+    +-----------+    +---------+    +------+------+
//! | Dispatch       |--->| Response  |--->| Response|--->| Adaptive    |
//! | Coordinator    |    | Validator |    | Ranker  |    | Weight      |
//! | (parallel /    |    +-----------+    +----+----+    | Updater     |
//! |  sequential)   |                          |         | (async)     |
//! +----------------+                     none valid     +-------------+
//!                                             |
//!                                             v
//!                                     +---------------+
//!                                     | Fallback      |
//!                                     | Manager       |
//!                                     +---------------+
//! ```
//!
//! # Key Types
//!
//! - [`Engine`]: the facade running a complete round
//! - [`RoundResult`]: the final artifact returned to callers
//! - [`CapabilityRegistry`]: the only state shared across rounds
//! - [`GenerationBackend`]: the uniform backend invocation contract
//!
//! # Quick Start
//!
//! ```ignore
//! use quorum_core::{CapabilityVector, Engine, EngineConfig, HttpBackend};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut engine = Engine::new(EngineConfig::default());
//!     engine.register_backend(
//!         Arc::new(HttpBackend::new("local", "http://localhost:11434", "llama3.2")),
//!         CapabilityVector { technical: 0.7, ..Default::default() },
//!     )?;
//!
//!     let result = engine.process("Why does my async server deadlock?", None).await?;
//!     println!("[{}] {}", result.backend_id, result.text);
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`analyzer`]: query-type classification and complexity scoring
//! - [`registry`]: capability profiles, live statistics, persistence
//! - [`selector`]: complexity-scaled, deterministic backend selection
//! - [`dispatch`]: isolated invocation with timeouts and bounded fan-out
//! - [`validator`]: rejection checks and quality scoring
//! - [`ranker`]: pick-best and blend answer policies
//! - [`updater`]: fire-and-continue outcome recording
//! - [`fallback`]: the labeled degraded answer
//! - [`backend`]: the backend contract and HTTP adapter
//! - [`config`]: every tunable, with TOML loading
//! - [`engine`]: the facade tying it together
//!
//! # Failure Surface
//!
//! The only error a caller ever sees is [`EngineError::NoBackendsAvailable`]
//! (a configuration error). Everything else degrades into a `RoundResult`;
//! degraded answers carry the `"fallback"` sentinel backend id.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod analyzer;
pub mod backend;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod fallback;
pub mod ranker;
pub mod registry;
pub mod selector;
pub mod updater;
pub mod validator;

// Re-exports for convenience
pub use analyzer::{QueryAnalyzer, QueryProfile, QueryType};
pub use backend::{Generation, GenerationBackend, HttpBackend};
pub use config::{
    default_config_path, default_stats_path, load_config, load_config_from_path, ConfigError,
    EngineConfig,
};
pub use dispatch::{CandidateResponse, DispatchCoordinator, TerminalState};
pub use engine::{Engine, EngineError, RoundPreferences};
pub use fallback::{FailureContext, FallbackManager, FALLBACK_BACKEND_ID};
pub use ranker::{BackendScore, BlendShare, RankPolicy, ResponseRanker, RoundResult};
pub use registry::{
    CapabilityRegistry, CapabilityVector, LiveStats, RegistryError, StatsSnapshot,
};
pub use selector::{
    BackendSelector, ConcurrencyMode, DispatchPlan, SelectError, SelectionOverrides,
};
pub use updater::WeightUpdater;
pub use validator::{RejectionReason, ResponseValidator};
