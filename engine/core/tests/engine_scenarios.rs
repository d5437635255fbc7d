//! End-to-end scenario tests for the arbitration engine
//!
//! These tests drive complete rounds through the public `Engine` facade with
//! scripted in-process backends. Scenarios cover:
//! - Failure isolation (a raising backend never poisons a round)
//! - Timeout handling and exclusion from ranking
//! - Total-round failure degrading into the labeled fallback
//! - Priority backend preferences, including unavailable entries
//! - Complexity-driven fan-out differences
//! - Blend policy share accounting

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use quorum_core::{
    CapabilityVector, Engine, EngineConfig, EngineError, Generation, GenerationBackend,
    QueryType, RankPolicy, RoundPreferences, FALLBACK_BACKEND_ID,
};

// =============================================================================
// Scripted Backend Infrastructure
// =============================================================================

/// What a scripted backend does when invoked
#[derive(Clone)]
enum Script {
    /// Return this text after a tiny delay
    Reply(String),
    /// Always fail with an error
    Raise,
    /// Sleep far past any reasonable timeout
    Hang,
    /// Return whitespace-only text
    Empty,
}

/// In-process backend driven by a script, counting its invocations
struct ScriptedBackend {
    id: String,
    script: Script,
    invocations: AtomicUsize,
}

impl ScriptedBackend {
    fn shared(id: &str, script: Script) -> Arc<ScriptedBackend> {
        Arc::new(Self {
            id: id.to_string(),
            script,
            invocations: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, _prompt: &str, _timeout: Duration) -> anyhow::Result<Generation> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Reply(text) => {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(Generation {
                    text: text.clone(),
                    elapsed: Duration::from_millis(5),
                })
            }
            Script::Raise => anyhow::bail!("scripted backend failure"),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Generation {
                    text: "far too late".to_string(),
                    elapsed: Duration::from_secs(30),
                })
            }
            Script::Empty => Ok(Generation {
                text: "   \n".to_string(),
                elapsed: Duration::from_millis(1),
            }),
        }
    }
}

/// A factual answer long enough to clear validation for simple queries
fn factual_answer() -> String {
    "Paris is the capital of France. It has held that role for most of the \
     country's history and remains its political center."
        .to_string()
}

/// A technical answer long enough to clear validation for complex queries
fn technical_answer(detail: &str) -> String {
    format!(
        "The deadlock happens because both workers hold one lock while waiting \
         for the other, so neither can make progress. {detail}\n\n\
         - Acquire locks in a fixed global order\n\
         - Or replace the second lock with a message channel\n\n\
         In short, break the circular wait and the system cannot deadlock."
    )
}

/// Test config with short timeouts so failure scenarios run fast
fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.dispatch.call_timeout_ms = 100;
    config
}

/// The complex technical query used by the fan-out scenarios
const COMPLEX_QUERY: &str =
    "Explain step by step why this async server code deadlocks under load: first \
     the scheduler thread takes the connection lock, then a worker thread blocks \
     on the same mutex while the kernel socket buffer fills. Compare a lock-free \
     queue versus a channel-based design, analyze the tradeoffs, and justify \
     which one you would implement.";

// =============================================================================
// Scenario: failure isolation
// =============================================================================

#[tokio::test]
async fn raising_backend_does_not_poison_the_round() {
    let mut engine = Engine::new(fast_config());
    engine
        .register_backend(
            ScriptedBackend::shared("volatile", Script::Raise),
            CapabilityVector {
                technical: 0.9,
                ..Default::default()
            },
        )
        .unwrap();
    engine
        .register_backend(
            ScriptedBackend::shared("steady", Script::Reply(technical_answer("Both threads stall."))),
            CapabilityVector::default(),
        )
        .unwrap();

    let result = engine.process(COMPLEX_QUERY, None).await.unwrap();

    assert!(!result.degraded);
    assert_eq!(result.backend_id, "steady");

    let volatile_score = result
        .scores
        .iter()
        .find(|s| s.backend_id == "volatile")
        .expect("failed backend must still appear in the summary");
    assert_eq!(volatile_score.state, "error");
    assert!(!volatile_score.valid);
}

// =============================================================================
// Scenario: simple factual query with a timing-out backend
// =============================================================================

#[tokio::test]
async fn factual_query_with_timeout_picks_a_responder() {
    let mut engine = Engine::new(fast_config());

    // Five registered backends; the flaky one is priority-listed so it is
    // guaranteed a slot in the small factual-query plan.
    let flaky = ScriptedBackend::shared("flaky", Script::Hang);
    engine
        .register_backend(flaky.clone(), CapabilityVector::default())
        .unwrap();
    for id in ["alpha", "bravo", "charlie", "delta"] {
        engine
            .register_backend(
                ScriptedBackend::shared(id, Script::Reply(factual_answer())),
                CapabilityVector::default(),
            )
            .unwrap();
    }

    let preferences = RoundPreferences {
        priority_backends: Some(vec!["flaky".to_string()]),
        ..Default::default()
    };
    let result = engine
        .process("What is the capital of France?", Some(preferences))
        .await
        .unwrap();

    // Low complexity keeps the plan small.
    assert!(result.scores.len() <= 3, "plan too large: {:?}", result.scores);

    let flaky_score = result
        .scores
        .iter()
        .find(|s| s.backend_id == "flaky")
        .expect("timed-out backend must appear in the summary");
    assert_eq!(flaky_score.state, "timeout");
    assert!(!flaky_score.valid);

    // The answer came from one of the healthy responders.
    assert!(!result.degraded);
    assert_ne!(result.backend_id, "flaky");
    assert_ne!(result.backend_id, FALLBACK_BACKEND_ID);
}

// =============================================================================
// Scenario: every backend returns empty text
// =============================================================================

#[tokio::test]
async fn all_empty_responses_degrade_to_fallback() {
    let mut engine = Engine::new(fast_config());
    for id in ["mute-a", "mute-b", "mute-c"] {
        engine
            .register_backend(
                ScriptedBackend::shared(id, Script::Empty),
                CapabilityVector::default(),
            )
            .unwrap();
    }

    let result = engine.process(COMPLEX_QUERY, None).await.unwrap();

    assert_eq!(result.backend_id, FALLBACK_BACKEND_ID);
    assert!(result.degraded);
    assert!(result.text.contains("wasn't able"));

    let failure = result.failure.expect("degraded result carries its context");
    assert!(!failure.attempts.is_empty());
    assert!(failure
        .attempts
        .iter()
        .all(|a| a.outcome == "rejected: empty" || a.outcome == "empty"));
}

// =============================================================================
// Scenario: unavailable priority backend
// =============================================================================

#[tokio::test]
async fn unavailable_priority_backend_is_not_an_error() {
    let mut engine = Engine::new(fast_config());
    engine
        .register_backend(
            ScriptedBackend::shared("present", Script::Reply(factual_answer())),
            CapabilityVector::default(),
        )
        .unwrap();

    let preferences = RoundPreferences {
        priority_backends: Some(vec!["decommissioned".to_string()]),
        ..Default::default()
    };
    let result = engine
        .process("What is the capital of France?", Some(preferences))
        .await
        .unwrap();

    assert!(!result.degraded);
    assert_eq!(result.backend_id, "present");
    assert!(result.scores.iter().all(|s| s.backend_id != "decommissioned"));
}

// =============================================================================
// Scenario: complexity-driven fan-out
// =============================================================================

#[tokio::test]
async fn complex_queries_fan_out_wider_than_simple_ones() {
    let mut engine = Engine::new(fast_config());
    for id in ["a", "b", "c", "d", "e"] {
        engine
            .register_backend(
                ScriptedBackend::shared(id, Script::Reply(technical_answer("See the trace."))),
                CapabilityVector::default(),
            )
            .unwrap();
    }

    let simple = engine
        .process("What is the capital of France?", None)
        .await
        .unwrap();
    let complex = engine.process(COMPLEX_QUERY, None).await.unwrap();

    assert!(
        complex.scores.len() > simple.scores.len(),
        "complex round invoked {} backends, simple round {}",
        complex.scores.len(),
        simple.scores.len()
    );
    assert_eq!(complex.scores.len(), 5);
}

#[tokio::test]
async fn technical_capability_drives_weight_separation() {
    let engine = Engine::new(EngineConfig::default());
    let registry = engine.registry();

    registry
        .register(
            "specialist",
            CapabilityVector {
                technical: 0.95,
                ..Default::default()
            },
        )
        .unwrap();
    registry
        .register(
            "generalist",
            CapabilityVector {
                technical: 0.2,
                ..Default::default()
            },
        )
        .unwrap();

    // Identical (zero-sample) live statistics: the static gap must show.
    let specialist = registry.get_weight("specialist", QueryType::Technical);
    let generalist = registry.get_weight("generalist", QueryType::Technical);
    assert!(
        specialist - generalist > 0.3,
        "expected a material gap, got {specialist} vs {generalist}"
    );
}

// =============================================================================
// Scenario: blend policy
// =============================================================================

#[tokio::test]
async fn blend_policy_records_contribution_shares() {
    let mut engine = Engine::new(fast_config());
    engine
        .register_backend(
            ScriptedBackend::shared(
                "first",
                Script::Reply(technical_answer("The wait graph forms a cycle.")),
            ),
            CapabilityVector::default(),
        )
        .unwrap();
    engine
        .register_backend(
            ScriptedBackend::shared(
                "second",
                Script::Reply(technical_answer("Lock ordering removes the cycle.")),
            ),
            CapabilityVector::default(),
        )
        .unwrap();

    let preferences = RoundPreferences {
        policy: Some(RankPolicy::Blend { top_n: 2 }),
        ..Default::default()
    };
    let result = engine.process(COMPLEX_QUERY, Some(preferences)).await.unwrap();

    assert!(!result.degraded);
    let shares = result.blend_shares.expect("blend must record shares");
    assert_eq!(shares.len(), 2);
    let total: f64 = shares.iter().map(|s| s.share).sum();
    assert!((total - 1.0).abs() < 1e-9);

    // Both contributions appear in the composite text.
    assert!(result.text.contains("wait graph"));
    assert!(result.text.contains("Lock ordering"));
}

// =============================================================================
// Scenario: empty configuration
// =============================================================================

#[tokio::test]
async fn no_backends_is_the_only_surfaced_error() {
    let engine = Engine::new(EngineConfig::default());
    let result = engine.process("anything at all", None).await;
    assert!(matches!(result, Err(EngineError::NoBackendsAvailable)));
}

// =============================================================================
// Scenario: outcomes feed future selection
// =============================================================================

#[tokio::test]
async fn repeated_rounds_shift_backend_weights() {
    let mut engine = Engine::new(fast_config());
    engine
        .register_backend(
            ScriptedBackend::shared("reliable", Script::Reply(factual_answer())),
            CapabilityVector::default(),
        )
        .unwrap();
    engine
        .register_backend(
            ScriptedBackend::shared("hopeless", Script::Raise),
            CapabilityVector::default(),
        )
        .unwrap();

    for _ in 0..6 {
        let _ = engine
            .process("What is the capital of France?", None)
            .await
            .unwrap();
    }

    // Updates are fire-and-continue; let the last batch land.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let registry = engine.registry();
    let reliable = registry.get_weight("reliable", QueryType::Factual);
    let hopeless = registry.get_weight("hopeless", QueryType::Factual);
    assert!(
        reliable > hopeless,
        "adaptive weights should favor the responding backend: {reliable} vs {hopeless}"
    );
}
