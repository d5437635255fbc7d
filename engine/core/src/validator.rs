//! Response Validator
//!
//! Inspects each candidate response for structural and quality defects and
//! assigns a quality score. Rejection checks run in a fixed order with
//! first-match-wins semantics:
//!
//! 1. empty or whitespace-only text
//! 2. text dominated by repeated trigrams
//! 3. disclosed-AI self-reference beyond the allowed density
//! 4. text shorter than the complexity-adaptive minimum length
//!
//! A response that clears all checks receives a weighted quality score
//! (length adequacy, lexical relevance, structural coherence) plus a small
//! bounded adjustment for how well the backend's static capabilities match
//! the query type. The adjustment applies only to valid responses, so it can
//! never turn a rejected response into a valid one.
//!
//! The exact thresholds and weights are configuration, not invariants; only
//! the check order is fixed.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::analyzer::QueryProfile;
use crate::config::ValidationConfig;
use crate::dispatch::{CandidateResponse, TerminalState};
use crate::registry::CapabilityVector;

// ============================================================================
// Rejection Reasons
// ============================================================================

/// Why a response was rejected
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionReason {
    /// Empty or whitespace-only text
    Empty,

    /// Dominated by repeated n-grams
    Repetitive,

    /// Too much disclosed-AI self-reference
    SelfReferential,

    /// Shorter than the complexity-adaptive minimum
    TooShort,
}

impl RejectionReason {
    /// Stable string form for summaries and logs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Repetitive => "repetitive",
            Self::SelfReferential => "self-referential",
            Self::TooShort => "too-short",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Wordlists
// ============================================================================

/// Phrases counted as disclosed-AI self-reference
const SELF_REFERENCE_PATTERNS: &[&str] = &[
    "as an ai",
    "as a language model",
    "as an artificial intelligence",
    "i am an ai",
    "i'm an ai",
    "i am a language model",
    "my training data",
    "i do not have personal",
    "i cannot browse",
];

/// Markers of a concluding statement, checked in the final paragraph
const CONCLUSION_MARKERS: &[&str] = &[
    "in short",
    "in summary",
    "to summarize",
    "in conclusion",
    "overall",
    "therefore",
];

/// Common English stopwords excluded from relevance overlap
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "to", "of", "in", "on",
    "at", "by", "for", "with", "and", "or", "but", "not", "no", "it", "its", "this", "that",
    "these", "those", "i", "you", "he", "she", "we", "they", "me", "my", "your", "do", "does",
    "did", "can", "could", "will", "would", "should", "what", "when", "where", "who", "how",
    "why", "which", "there", "here", "from", "as", "if", "so", "than", "then", "about", "into",
    "please",
];

// ============================================================================
// Response Validator
// ============================================================================

/// The response validator
#[derive(Clone, Debug, Default)]
pub struct ResponseValidator {
    config: ValidationConfig,
}

impl ResponseValidator {
    /// Create a validator with the given tuning
    #[must_use]
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a candidate in place
    ///
    /// Failed invocations (timeout/error) stay invalid with zero quality;
    /// their terminal state already explains them. `capabilities`, when
    /// given, contributes the bounded affinity adjustment.
    pub fn validate(
        &self,
        candidate: &mut CandidateResponse,
        query: &QueryProfile,
        capabilities: Option<&CapabilityVector>,
    ) {
        candidate.is_valid = false;
        candidate.quality = 0.0;
        candidate.rejection = None;

        match candidate.state {
            TerminalState::Timeout | TerminalState::Error => return,
            TerminalState::Empty => {
                candidate.rejection = Some(RejectionReason::Empty);
                return;
            }
            TerminalState::Success => {}
        }

        if let Some(reason) = self.rejection_for(&candidate.text, query) {
            tracing::debug!(
                backend = %candidate.backend_id,
                reason = %reason,
                "Rejected candidate response"
            );
            candidate.rejection = Some(reason);
            return;
        }

        let mut quality = self.quality_score(&candidate.text, query);

        if let Some(caps) = capabilities {
            // Bounded bonus/penalty for capability/query-type fit. Applied
            // only after the response has already passed every check.
            let affinity = caps.affinity_for(query.query_type);
            let adjustment = (affinity - 0.5) * 2.0 * self.config.capability_adjustment;
            quality += adjustment;
        }

        candidate.is_valid = true;
        candidate.quality = quality.clamp(0.0, 1.0);
    }

    /// Validate a whole round of candidates in place
    ///
    /// `capabilities_of` resolves a backend id to its static capability
    /// vector (typically a registry lookup).
    pub fn validate_all<F>(
        &self,
        candidates: &mut [CandidateResponse],
        query: &QueryProfile,
        capabilities_of: F,
    ) where
        F: Fn(&str) -> Option<CapabilityVector>,
    {
        for candidate in candidates {
            let caps = capabilities_of(&candidate.backend_id);
            self.validate(candidate, query, caps.as_ref());
        }
    }

    /// First failing rejection check, in fixed order
    fn rejection_for(&self, text: &str, query: &QueryProfile) -> Option<RejectionReason> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Some(RejectionReason::Empty);
        }

        if trigram_repetition(trimmed) > self.config.repetition_threshold {
            return Some(RejectionReason::Repetitive);
        }

        let lowered = trimmed.to_lowercase();
        let self_refs: usize = SELF_REFERENCE_PATTERNS
            .iter()
            .map(|p| lowered.matches(p).count())
            .sum();
        if self_refs > self.config.self_reference_limit {
            return Some(RejectionReason::SelfReferential);
        }

        if trimmed.chars().count() < self.config.min_length_for(query.complexity) {
            return Some(RejectionReason::TooShort);
        }

        None
    }

    /// Weighted quality score for a response that passed all checks
    fn quality_score(&self, text: &str, query: &QueryProfile) -> f64 {
        let adequacy = self.length_adequacy(text, query.complexity);
        let relevance = relevance_overlap(&query.text, text);
        let structure = self.structure_score(text, query.complexity);

        let weight_sum = self.config.length_weight
            + self.config.relevance_weight
            + self.config.structure_weight;

        (self.config.length_weight * adequacy
            + self.config.relevance_weight * relevance
            + self.config.structure_weight * structure)
            / weight_sum
    }

    /// Length adequacy relative to the complexity-adaptive expectation
    ///
    /// Saturates at the expected length; heavily padded answers taper off
    /// instead of scoring ever higher.
    fn length_adequacy(&self, text: &str, complexity: f64) -> f64 {
        let expected = (self.config.min_length_for(complexity) * 3) as f64;
        let ratio = text.chars().count() as f64 / expected;

        if ratio <= 1.0 {
            ratio
        } else if ratio <= 5.0 {
            1.0
        } else {
            (1.0 - (ratio - 5.0) * 0.05).max(0.6)
        }
    }

    /// Structural coherence: paragraph breaks, enumerations, and (for longer
    /// answers) a concluding statement
    fn structure_score(&self, text: &str, complexity: f64) -> f64 {
        let mut score: f64 = 0.4;

        if text.contains("\n\n") {
            score += 0.25;
        }

        let has_enumeration = text.lines().any(|line| {
            let line = line.trim_start();
            line.starts_with("- ")
                || line.starts_with("* ")
                || line
                    .split_once('.')
                    .is_some_and(|(head, _)| !head.is_empty() && head.chars().all(|c| c.is_ascii_digit()))
        });
        if has_enumeration {
            score += 0.2;
        }

        // Longer answers are expected to close with something.
        let long_threshold = self.config.min_length_for(complexity) * 4;
        if text.chars().count() >= long_threshold {
            let last_paragraph = text
                .rsplit("\n\n")
                .next()
                .unwrap_or(text)
                .to_lowercase();
            if CONCLUSION_MARKERS.iter().any(|m| last_paragraph.contains(m)) {
                score += 0.15;
            }
        }

        score.min(1.0)
    }
}

/// Fraction of repeated trigrams in the text
///
/// 0.0 for texts too short to form more than a handful of trigrams.
fn trigram_repetition(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < 6 {
        return 0.0;
    }

    let total = words.len() - 2;
    let unique: HashSet<[&str; 3]> = words.windows(3).map(|w| [w[0], w[1], w[2]]).collect();

    1.0 - unique.len() as f64 / total as f64
}

/// Lexical overlap between query and response over non-stopword terms
fn relevance_overlap(query: &str, response: &str) -> f64 {
    let content_terms: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric())
                .to_string()
        })
        .filter(|t| t.len() > 1 && !STOPWORDS.contains(&t.as_str()))
        .collect();

    if content_terms.is_empty() {
        // Nothing meaningful to match against; stay neutral.
        return 0.5;
    }

    let response_terms: HashSet<String> = response
        .to_lowercase()
        .split_whitespace()
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric())
                .to_string()
        })
        .collect();

    let hits = content_terms
        .iter()
        .filter(|t| response_terms.contains(*t))
        .count();

    hits as f64 / content_terms.len() as f64
}
