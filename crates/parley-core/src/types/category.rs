//! Insight categories.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Category of an inbound insight event.
///
/// The `Display` form is the label used in trigger descriptors
/// (`"FollowUp - call me back tomorrow"`).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum InsightCategory {
    Message,
    Question,
    FollowUp,
    ActionItem,
    Topic,
    Tracker,
    Entity,
}

impl InsightCategory {
    /// Whether events of this category are tested against trigger patterns.
    pub fn is_triggerable(&self) -> bool {
        !matches!(self, Self::Message)
    }

    /// Whether this category is correlated against the graph store.
    pub fn is_correlated(&self) -> bool {
        matches!(self, Self::Topic | Self::Tracker | Self::Entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_display_matches_descriptor_labels() {
        assert_eq!(InsightCategory::Question.to_string(), "Question");
        assert_eq!(InsightCategory::FollowUp.to_string(), "FollowUp");
        assert_eq!(InsightCategory::ActionItem.to_string(), "ActionItem");
        assert_eq!(InsightCategory::from_str("Tracker").unwrap(), InsightCategory::Tracker);
    }

    #[test]
    fn test_category_partitions() {
        let triggerable = InsightCategory::iter().filter(|c| c.is_triggerable()).count();
        let correlated = InsightCategory::iter().filter(|c| c.is_correlated()).count();
        assert_eq!(triggerable, 6);
        assert_eq!(correlated, 3);
    }
}
