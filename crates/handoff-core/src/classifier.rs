//! Escalation decision.
//!
//! Checks run in a fixed order and the first hit wins:
//! keyword table, emotional patterns, then the confidence threshold.

use anyhow::{Context, Result};
use handoff_schema::EscalationReason;
use regex::{Regex, RegexBuilder};

use crate::config::{default_emotional_patterns, default_keywords, KeywordRule};

/// Compiled keyword and pattern tables for one tenant.
#[derive(Debug, Clone)]
pub struct ClassifierRules {
    keywords: Vec<(String, EscalationReason)>,
    emotional: Vec<Regex>,
}

impl ClassifierRules {
    pub fn compile(keywords: &[KeywordRule], patterns: &[String]) -> Result<Self> {
        let keywords = keywords
            .iter()
            .filter(|k| !k.keyword.trim().is_empty())
            .map(|k| (k.keyword.trim().to_lowercase(), k.reason))
            .collect();

        let emotional = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .with_context(|| format!("invalid emotional pattern: {p}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            keywords,
            emotional,
        })
    }

    pub fn system_default() -> Result<Self> {
        Self::compile(&default_keywords(), &default_emotional_patterns())
    }

    fn keyword_match(&self, lowered: &str) -> Option<EscalationReason> {
        self.keywords
            .iter()
            .find(|(keyword, _)| lowered.contains(keyword.as_str()))
            .map(|(_, reason)| *reason)
    }

    fn is_emotional(&self, lowered: &str) -> bool {
        self.emotional.iter().any(|re| re.is_match(lowered))
    }
}

/// Decide whether `message` must go to a human.
pub fn classify(
    message: &str,
    confidence: f64,
    rules: &ClassifierRules,
    confidence_threshold: f64,
) -> Option<EscalationReason> {
    let lowered = message.to_lowercase();

    if let Some(reason) = rules.keyword_match(&lowered) {
        return Some(reason);
    }
    if rules.is_emotional(&lowered) {
        return Some(EscalationReason::EmotionalDistress);
    }
    if confidence < confidence_threshold {
        return Some(EscalationReason::LowConfidence);
    }
    None
}
