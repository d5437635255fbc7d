//! HTTP Generation Backend
//!
//! Adapter for local generation servers that speak the plain generate
//! dialect:
//!
//! - `POST /api/generate` with `{model, prompt, stream: false}` returns
//!   `{"response": "..."}`
//! - `GET /api/tags` lists models and doubles as the health probe
//!
//! One adapter instance maps to one (server, model) pair and carries its own
//! backend id, so several entries can share a server under different ids.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::traits::{Generation, GenerationBackend};

/// HTTP generation backend client
#[derive(Clone)]
pub struct HttpBackend {
    /// Backend identifier used in plans and the registry
    id: String,
    /// Base URL of the generation server
    base_url: String,
    /// Model name sent with every request
    model: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpBackend {
    /// Create a new HTTP backend
    ///
    /// The client-level timeout is a backstop; the real per-call deadline is
    /// enforced by the dispatch coordinator.
    #[must_use]
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Get the generate endpoint URL
    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    /// Get the tags endpoint URL
    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url)
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, prompt: &str, timeout: Duration) -> anyhow::Result<Generation> {
        let start = Instant::now();

        let json_request = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .http_client
            .post(self.generate_url())
            .timeout(timeout)
            .json(&json_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Backend {} returned {status}: {body}", self.id);
        }

        let data: serde_json::Value = response.json().await?;
        let text = data
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or("")
            .to_string();

        Ok(Generation {
            text,
            elapsed: start.elapsed(),
        })
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(self.tags_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_backend_creation() {
        let backend = HttpBackend::new("local", "http://localhost:11434", "llama3.2");
        assert_eq!(backend.id(), "local");
        assert_eq!(backend.generate_url(), "http://localhost:11434/api/generate");
        assert_eq!(backend.tags_url(), "http://localhost:11434/api/tags");
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let backend = HttpBackend::new("local", "http://localhost:11434/", "llama3.2");
        assert_eq!(backend.generate_url(), "http://localhost:11434/api/generate");
    }
}
