//! Query Analyzer
//!
//! Classifies an incoming request into a query type and derives a continuous
//! complexity score. The analyzer is pure: no I/O, no backend calls, and the
//! same text always produces the same profile. Work is bounded by a single
//! tokenization pass plus a fixed number of small phrase scans.
//!
//! # Classification
//!
//! Keyword-based, first-match-wins by category priority when hit counts tie:
//! technical > reasoning > creative > factual > general. Ties never resolve
//! randomly; reproducible routing depends on it.
//!
//! # Complexity
//!
//! A weighted sum of four capped factors, clipped to [0, 1]:
//! - text length (saturating)
//! - technical/domain vocabulary density
//! - multi-step or comparison phrasing
//! - explicit reasoning cues ("why", "explain", ...)
//!
//! No single factor can push the score to an extreme on its own; each
//! contributes at most `AnalyzerConfig::factor_cap`.

use serde::{Deserialize, Serialize};

use crate::config::AnalyzerConfig;

// ============================================================================
// Query Type
// ============================================================================

/// Classification of query types for backend selection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Programming, systems, and domain-technical questions
    Technical,

    /// Analytical and multi-step reasoning questions
    Reasoning,

    /// Creative and generative writing requests
    Creative,

    /// Lookup-style factual questions
    Factual,

    /// Everything else
    General,
}

impl Default for QueryType {
    fn default() -> Self {
        Self::General
    }
}

impl QueryType {
    /// All query types, in classification priority order
    pub const ALL: [Self; 5] = [
        Self::Technical,
        Self::Reasoning,
        Self::Creative,
        Self::Factual,
        Self::General,
    ];

    /// Tie-break priority (higher wins on equal keyword counts)
    #[must_use]
    pub fn priority(&self) -> u8 {
        match self {
            Self::Technical => 50,
            Self::Reasoning => 40,
            Self::Creative => 30,
            Self::Factual => 20,
            Self::General => 10,
        }
    }

    /// Stable string form, matching the persistence schema
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Technical => "technical",
            Self::Reasoning => "reasoning",
            Self::Creative => "creative",
            Self::Factual => "factual",
            Self::General => "general",
        }
    }

    /// Parse the stable string form; unknown strings map to `None`
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "technical" => Some(Self::Technical),
            "reasoning" => Some(Self::Reasoning),
            "creative" => Some(Self::Creative),
            "factual" => Some(Self::Factual),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Query Profile
// ============================================================================

/// Per-request analysis result, discarded when the round completes
#[derive(Clone, Debug)]
pub struct QueryProfile {
    /// The raw request text
    pub text: String,

    /// Derived query type
    pub query_type: QueryType,

    /// Complexity score in [0.0, 1.0]
    pub complexity: f64,
}

impl QueryProfile {
    /// Word count of the raw text
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

// ============================================================================
// Keyword Sets
// ============================================================================

/// Single-word markers per category. Matched against lowercased,
/// punctuation-trimmed tokens.
const TECHNICAL_KEYWORDS: &[&str] = &[
    "code",
    "function",
    "implement",
    "compile",
    "debug",
    "bug",
    "api",
    "algorithm",
    "database",
    "server",
    "thread",
    "async",
    "protocol",
    "kernel",
    "regex",
    "stacktrace",
    "dependency",
    "refactor",
];

const REASONING_KEYWORDS: &[&str] = &[
    "why",
    "analyze",
    "analyse",
    "reason",
    "evaluate",
    "implications",
    "tradeoffs",
    "derive",
    "prove",
    "justify",
    "conclude",
];

const CREATIVE_KEYWORDS: &[&str] = &[
    "story",
    "poem",
    "write",
    "imagine",
    "creative",
    "brainstorm",
    "lyrics",
    "fictional",
    "character",
    "plot",
];

const FACTUAL_KEYWORDS: &[&str] = &[
    "what", "when", "where", "who", "define", "definition", "capital", "population", "date",
    "year", "list",
];

/// Multi-word phrases that signal multi-step or comparison requests
const MULTI_STEP_PHRASES: &[&str] = &[
    "step by step",
    "first",
    "then",
    "finally",
    "compare",
    "contrast",
    "versus",
    " vs ",
    "pros and cons",
    "difference between",
];

/// Explicit reasoning cues for the complexity score
const REASONING_CUES: &[&str] = &["why", "explain", "analyze", "analyse", "compare", "justify"];

// ============================================================================
// Query Analyzer
// ============================================================================

/// The query analyzer
#[derive(Clone, Debug, Default)]
pub struct QueryAnalyzer {
    config: AnalyzerConfig,
}

impl QueryAnalyzer {
    /// Create an analyzer with the given tuning
    #[must_use]
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Analyze a request into a query profile
    ///
    /// Deterministic: identical text always yields an identical profile.
    #[must_use]
    pub fn analyze(&self, text: &str) -> QueryProfile {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|t| !t.is_empty())
            .collect();

        let query_type = classify(&tokens);
        let complexity = self.complexity(&lowered, &tokens);

        QueryProfile {
            text: text.to_string(),
            query_type,
            complexity,
        }
    }

    /// Weighted, capped complexity score
    fn complexity(&self, lowered: &str, tokens: &[&str]) -> f64 {
        let cap = self.config.factor_cap;

        // Length factor: saturates at the configured character count
        let length_raw =
            (lowered.chars().count() as f64 / self.config.length_saturation_chars as f64).min(1.0);

        // Technical vocabulary density: saturates at 4 distinct hits
        let tech_hits = count_token_hits(tokens, TECHNICAL_KEYWORDS);
        let tech_raw = (tech_hits as f64 / 4.0).min(1.0);

        // Multi-step / comparison phrasing: saturates at 3 phrase hits
        let step_hits = MULTI_STEP_PHRASES
            .iter()
            .filter(|p| lowered.contains(*p))
            .count();
        let step_raw = (step_hits as f64 / 3.0).min(1.0);

        // Reasoning cues: saturates at 3 hits
        let cue_hits = count_token_hits(tokens, REASONING_CUES);
        let cue_raw = (cue_hits as f64 / 3.0).min(1.0);

        let score = length_raw * cap + tech_raw * cap + step_raw * cap + cue_raw * cap;
        score.clamp(0.0, 1.0)
    }
}

/// Classify tokens into a query type
///
/// Counts keyword hits per category; the highest count wins, with ties
/// resolved by category priority. Zero hits everywhere yields `General`.
fn classify(tokens: &[&str]) -> QueryType {
    let counts = [
        (QueryType::Technical, count_token_hits(tokens, TECHNICAL_KEYWORDS)),
        (QueryType::Reasoning, count_token_hits(tokens, REASONING_KEYWORDS)),
        (QueryType::Creative, count_token_hits(tokens, CREATIVE_KEYWORDS)),
        (QueryType::Factual, count_token_hits(tokens, FACTUAL_KEYWORDS)),
    ];

    let mut best = QueryType::General;
    let mut best_count = 0usize;

    // Iteration order is priority order, and only a strictly greater count
    // replaces the current best, so equal counts keep the higher priority.
    for (query_type, count) in counts {
        if count > best_count {
            best = query_type;
            best_count = count;
        }
    }

    best
}

/// Count tokens that appear in a keyword set
fn count_token_hits(tokens: &[&str], keywords: &[&str]) -> usize {
    tokens.iter().filter(|t| keywords.contains(t)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> QueryAnalyzer {
        QueryAnalyzer::default()
    }

    #[test]
    fn test_classification_by_category() {
        let a = analyzer();

        assert_eq!(
            a.analyze("Write a function to parse this regex").query_type,
            QueryType::Technical
        );
        assert_eq!(
            a.analyze("Evaluate the implications of this policy and justify your conclusion")
                .query_type,
            QueryType::Reasoning
        );
        assert_eq!(
            a.analyze("Tell me a story about a lighthouse keeper").query_type,
            QueryType::Creative
        );
        assert_eq!(
            a.analyze("What is the capital of Portugal").query_type,
            QueryType::Factual
        );
        assert_eq!(a.analyze("Good morning!").query_type, QueryType::General);
    }

    #[test]
    fn test_tie_breaks_by_priority() {
        // "code" (technical) and "story" (creative): one hit each.
        // Technical outranks creative on ties.
        let profile = analyzer().analyze("turn this story into code");
        assert_eq!(profile.query_type, QueryType::Technical);
    }

    #[test]
    fn test_analyze_is_deterministic() {
        let a = analyzer();
        let text = "Explain step by step why this async code deadlocks";
        let first = a.analyze(text);
        let second = a.analyze(text);
        assert_eq!(first.query_type, second.query_type);
        assert!((first.complexity - second.complexity).abs() < f64::EPSILON);
    }

    #[test]
    fn test_complexity_bounds() {
        let a = analyzer();

        let trivial = a.analyze("hi");
        assert!(trivial.complexity >= 0.0 && trivial.complexity <= 1.0);
        assert!(trivial.complexity < 0.1);

        let long_text = "explain why and compare step by step the tradeoffs ".repeat(60);
        let heavy = a.analyze(&long_text);
        assert!(heavy.complexity <= 1.0);
        assert!(heavy.complexity > trivial.complexity);
    }

    #[test]
    fn test_no_single_factor_dominates() {
        let a = analyzer();

        // Length alone: a long but vocabulary-empty text stays capped.
        let padded = "lorem ipsum dolor sit amet ".repeat(100);
        let profile = a.analyze(&padded);
        assert!(profile.complexity <= a.config.factor_cap + f64::EPSILON);

        // Reasoning cues alone are likewise capped.
        let cues = a.analyze("why why why why why");
        assert!(cues.complexity <= 2.0 * a.config.factor_cap + f64::EPSILON);
    }

    #[test]
    fn test_technical_complexity_exceeds_factual() {
        let a = analyzer();
        let technical = a.analyze(
            "Explain step by step why this async server code deadlocks when the \
             thread pool is exhausted, and compare mutex versus channel designs",
        );
        let factual = a.analyze("What is the capital of France?");
        assert!(technical.complexity > factual.complexity);
    }

    #[test]
    fn test_query_type_round_trip() {
        for qt in QueryType::ALL {
            assert_eq!(QueryType::parse(qt.as_str()), Some(qt));
        }
        assert_eq!(QueryType::parse("unknown"), None);
    }
}
