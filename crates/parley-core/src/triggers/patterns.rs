//! Compiled trigger patterns.

use std::collections::HashMap;

use regex::Regex;
use strum::IntoEnumIterator;
use tracing::warn;

use crate::config::TriggerConfig;
use crate::error::ParleyError;
use crate::types::InsightCategory;

/// A configured pattern and its compiled form.
#[derive(Debug, Clone)]
pub struct TriggerPattern {
    source: String,
    regex: Regex,
}

impl TriggerPattern {
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Unanchored search, so `refund` matches `I need a refund`.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Trigger patterns per category, compiled once at load.
///
/// Order within a category follows the configuration. Patterns that fail to
/// compile are left out and kept as [`ParleyError::Pattern`] failures.
#[derive(Debug, Default)]
pub struct TriggerPatterns {
    by_category: HashMap<InsightCategory, Vec<TriggerPattern>>,
    failures: Vec<ParleyError>,
}

impl TriggerPatterns {
    pub fn compile(config: &TriggerConfig) -> Self {
        let mut patterns = Self::default();

        for category in InsightCategory::iter().filter(|c| c.is_triggerable()) {
            let mut compiled = Vec::new();
            for source in config.patterns_for(category) {
                match Regex::new(source) {
                    Ok(regex) => compiled.push(TriggerPattern {
                        source: source.clone(),
                        regex,
                    }),
                    Err(e) => {
                        warn!(category = %category, pattern = %source, error = %e, "Skipping trigger pattern");
                        patterns
                            .failures
                            .push(ParleyError::pattern(source.clone(), e.to_string()));
                    }
                }
            }
            if !compiled.is_empty() {
                patterns.by_category.insert(category, compiled);
            }
        }

        patterns
    }

    /// Patterns for a category, in configured order.
    pub fn for_category(&self, category: InsightCategory) -> &[TriggerPattern] {
        self.by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Patterns that were skipped because they failed to compile.
    pub fn failures(&self) -> &[ParleyError] {
        &self.failures
    }

    /// Total number of usable patterns.
    pub fn len(&self) -> usize {
        self.by_category.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_pattern_is_skipped_and_recorded() {
        let config = TriggerConfig {
            question_match: vec!["refund".into(), "(unclosed".into(), "cancel".into()],
            ..Default::default()
        };

        let patterns = TriggerPatterns::compile(&config);
        let compiled: Vec<&str> = patterns
            .for_category(InsightCategory::Question)
            .iter()
            .map(TriggerPattern::as_str)
            .collect();
        assert_eq!(compiled, vec!["refund", "cancel"]);
        assert_eq!(patterns.failures().len(), 1);
        assert!(matches!(
            &patterns.failures()[0],
            ParleyError::Pattern { pattern, .. } if pattern == "(unclosed"
        ));
    }

    #[test]
    fn test_empty_config_compiles_nothing() {
        let patterns = TriggerPatterns::compile(&TriggerConfig::default());
        assert!(patterns.is_empty());
        assert!(patterns.failures().is_empty());
        assert!(patterns.for_category(InsightCategory::Entity).is_empty());
    }

    #[test]
    fn test_categories_use_their_own_lists() {
        let config = TriggerConfig {
            follow_up_match: vec!["call".into()],
            topic_match: vec!["pricing".into()],
            ..Default::default()
        };

        let patterns = TriggerPatterns::compile(&config);
        assert!(patterns.for_category(InsightCategory::Question).is_empty());
        assert_eq!(patterns.for_category(InsightCategory::FollowUp).len(), 1);
        assert_eq!(patterns.for_category(InsightCategory::Topic)[0].as_str(), "pricing");
        assert_eq!(patterns.len(), 2);
    }
}
