//! Generation Backend Traits
//!
//! The single fixed invocation shape every backend adapter must satisfy:
//! prompt in, text plus elapsed time out, or an error. Provider-specific
//! response shapes (chat arrays, nested choices, tool frames) are
//! normalized inside the adapter; nothing duck-typed ever crosses this
//! boundary into the engine.

use std::time::Duration;

use async_trait::async_trait;

/// A completed generation from a backend
#[derive(Clone, Debug)]
pub struct Generation {
    /// The generated text
    pub text: String,

    /// Backend-side processing time
    pub elapsed: Duration,
}

/// Generation backend contract
///
/// Implement this trait to add support for a new provider. Implementations
/// must be cheap to share (`Arc<dyn GenerationBackend>`) and safe to invoke
/// concurrently.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Stable backend identifier, matching its registry entry
    fn id(&self) -> &str;

    /// Generate a response for the prompt
    ///
    /// `timeout` is a hint for backends that manage their own connection
    /// deadlines; the dispatch coordinator enforces the real per-call
    /// timeout regardless.
    ///
    /// # Errors
    ///
    /// Any failure to produce text (connection refused, server error,
    /// malformed payload). The coordinator records it against this backend
    /// and never lets it affect the rest of the round.
    async fn invoke(&self, prompt: &str, timeout: Duration) -> anyhow::Result<Generation>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool {
        true
    }
}
