// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model-to-tier classification and prompt task analysis.
//!
//! Both are pure keyword and pattern rules. No network, no state.

use serde::Serialize;
use strum::Display;
use tiergate_config::model::RoutingConfig;
use tiergate_core::Tier;

/// Maps a requested model identifier to the tier that serves it.
#[derive(Debug, Clone)]
pub struct TierClassifier {
    primary: Vec<String>,
    secondary: Vec<String>,
    last_resort: Vec<String>,
}

impl TierClassifier {
    pub fn new(config: &RoutingConfig) -> Self {
        Self {
            primary: config.primary.models.clone(),
            secondary: config.secondary.models.clone(),
            last_resort: config.last_resort.models.clone(),
        }
    }

    /// An exact entry in any tier beats a `*` prefix entry, so a model listed
    /// under Primary stays there even if another tier's wildcard covers it.
    /// Within each pass LastResort is checked first, then Secondary, then
    /// Primary. Anything unmatched lands on Primary.
    pub fn classify(&self, model: &str) -> Tier {
        let tiers = [
            (Tier::LastResort, &self.last_resort),
            (Tier::Secondary, &self.secondary),
            (Tier::Primary, &self.primary),
        ];
        tiers
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|p| p == model))
            .or_else(|| {
                tiers
                    .iter()
                    .find(|(_, patterns)| patterns.iter().any(|p| pattern_matches(p, model)))
            })
            .map_or(Tier::Primary, |(tier, _)| *tier)
    }
}

/// Exact match, or prefix match when the pattern ends in `*`.
pub fn pattern_matches(pattern: &str, model: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => model.starts_with(prefix),
        None => pattern == model,
    }
}

/// Dominant kind of work a prompt asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Coding,
    Analysis,
    Creative,
    Complex,
    General,
}

const CODING_KEYWORDS: &[&str] = &[
    "code", "function", "debug", "fix", "implement", "script", "python",
    "javascript", "typescript", "bash", "rust", "go", "class", "algorithm",
    "api", "refactor", "test", "unittest",
];

const ANALYSIS_KEYWORDS: &[&str] = &[
    "analyze", "explain", "review", "compare", "evaluate", "architecture",
    "design", "plan", "strategy",
];

const CREATIVE_KEYWORDS: &[&str] = &[
    "write", "draft", "creative", "story", "blog", "essay", "poem", "content",
    "generate",
];

const COMPLEX_KEYWORDS: &[&str] = &[
    "complex", "advanced", "difficult", "sophisticated", "enterprise",
    "production", "optimize",
];

/// Prompts longer than this many words count as complex.
const LONG_PROMPT_WORDS: usize = 500;

/// Keyword hit counts per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskScores {
    pub coding: usize,
    pub analysis: usize,
    pub creative: usize,
    pub complex: usize,
}

/// Result of [`analyze_task`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskAnalysis {
    pub task_type: TaskType,
    pub scores: TaskScores,
    pub word_count: usize,
    pub is_complex: bool,
    /// Coding prompts suit the local coder model best.
    pub prefers_local: bool,
}

fn hits(keywords: &[&str], lower: &str) -> usize {
    keywords.iter().filter(|k| lower.contains(*k)).count()
}

/// Scores the prompt against each keyword list (substring match on the
/// lowercased text). Ties go to the earlier category.
pub fn analyze_task(prompt: &str) -> TaskAnalysis {
    let lower = prompt.to_lowercase();
    let scores = TaskScores {
        coding: hits(CODING_KEYWORDS, &lower),
        analysis: hits(ANALYSIS_KEYWORDS, &lower),
        creative: hits(CREATIVE_KEYWORDS, &lower),
        complex: hits(COMPLEX_KEYWORDS, &lower),
    };

    let ranked = [
        (TaskType::Coding, scores.coding),
        (TaskType::Analysis, scores.analysis),
        (TaskType::Creative, scores.creative),
        (TaskType::Complex, scores.complex),
    ];
    let task_type = ranked
        .iter()
        .fold((TaskType::General, 0), |best, &(kind, score)| {
            if score > best.1 { (kind, score) } else { best }
        })
        .0;

    let word_count = tiergate_core::prompt::word_count(prompt);
    TaskAnalysis {
        task_type,
        scores,
        word_count,
        is_complex: scores.complex > 0 || word_count > LONG_PROMPT_WORDS,
        prefers_local: scores.coding > 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn classifier() -> TierClassifier {
        TierClassifier::new(&RoutingConfig::default())
    }

    #[test]
    fn default_model_goes_primary() {
        assert_eq!(classifier().classify("claude-sonnet-4-6"), Tier::Primary);
        assert_eq!(classifier().classify(""), Tier::Primary);
    }

    #[test]
    fn gemini_models_go_secondary() {
        let c = classifier();
        assert_eq!(c.classify("gemini-2.5-flash"), Tier::Secondary);
        assert_eq!(c.classify("gemini-proxy"), Tier::Secondary);
        assert_eq!(c.classify("gemini-9-ultra"), Tier::Secondary);
    }

    #[test]
    fn claude_account_models_go_last_resort() {
        let c = classifier();
        assert_eq!(c.classify("claude-opus"), Tier::LastResort);
        assert_eq!(c.classify("claude-real"), Tier::LastResort);
        assert_eq!(c.classify("claude-opus-4-6"), Tier::LastResort);
        // Exact match only without a wildcard.
        assert_eq!(c.classify("claude-opus-4-6-fast"), Tier::Primary);
    }

    #[test]
    fn last_resort_wins_overlaps() {
        let mut config = RoutingConfig::default();
        config.secondary.models = vec!["shared-*".into()];
        config.last_resort.models = vec!["shared-model".into()];
        let c = TierClassifier::new(&config);
        assert_eq!(c.classify("shared-model"), Tier::LastResort);
        assert_eq!(c.classify("shared-other"), Tier::Secondary);
    }

    #[test]
    fn exact_primary_entry_beats_secondary_wildcard() {
        let mut config = RoutingConfig::default();
        config.primary.models = vec!["gemini-local".into()];
        let c = TierClassifier::new(&config);
        assert_eq!(c.classify("gemini-local"), Tier::Primary);
        assert_eq!(c.classify("gemini-local-2"), Tier::Secondary);
    }

    #[test]
    fn wildcard_is_prefix_only() {
        assert!(pattern_matches("gemini-*", "gemini-"));
        assert!(!pattern_matches("gemini-*", "my-gemini-x"));
        assert!(pattern_matches("*", "anything"));
        assert!(!pattern_matches("gemini", "gemini-2.5-pro"));
    }

    #[test]
    fn coding_prompt_dominates() {
        let analysis = analyze_task("Please debug this Python function and fix the test");
        assert_eq!(analysis.task_type, TaskType::Coding);
        assert!(analysis.prefers_local);
        assert!(!analysis.is_complex);
        assert_eq!(analysis.task_type.to_string(), "coding");
    }

    #[test]
    fn plain_prompt_is_general() {
        let analysis = analyze_task("hello there");
        assert_eq!(analysis.task_type, TaskType::General);
        assert_eq!(analysis.scores, TaskScores::default());
        assert_eq!(analysis.word_count, 2);
    }

    #[test]
    fn tie_goes_to_earlier_category() {
        // One analysis hit ("explain"), one creative hit ("poem").
        let analysis = analyze_task("explain the poem");
        assert_eq!(analysis.scores.analysis, 1);
        assert_eq!(analysis.scores.creative, 1);
        assert_eq!(analysis.task_type, TaskType::Analysis);
    }

    #[test]
    fn long_or_flagged_prompts_are_complex() {
        assert!(analyze_task("an enterprise rollout").is_complex);
        let long = "word ".repeat(501);
        let analysis = analyze_task(&long);
        assert!(analysis.is_complex);
        assert_eq!(analysis.word_count, 501);
    }

    proptest! {
        #[test]
        fn classification_is_idempotent(model in "[a-z0-9.*-]{0,24}") {
            let c = classifier();
            prop_assert_eq!(c.classify(&model), c.classify(&model));
        }

        #[test]
        fn gemini_prefix_always_secondary(suffix in "[a-z0-9.-]{0,16}") {
            let model = format!("gemini-{suffix}");
            prop_assert_eq!(classifier().classify(&model), Tier::Secondary);
        }
    }
}
