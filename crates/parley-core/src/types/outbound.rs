//! Outbound message envelopes.
//!
//! Correlation and statistics results are published as `user_defined`
//! messages. The inner `metadata.type` names the producing plugin and the
//! payload's own `type` names the insight category
//! (`historical_topic`, `statistical_entity`, ...).

use serde::{Deserialize, Serialize};

use super::category::InsightCategory;
use crate::cache::ResolvedMessage;

/// Envelope type of every outbound message.
pub const USER_DEFINED: &str = "user_defined";

/// Plugin that produced an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundKind {
    Historical,
    Statistical,
}

impl OutboundKind {
    fn prefix(&self) -> &'static str {
        match self {
            Self::Historical => "historical",
            Self::Statistical => "statistical",
        }
    }

    /// Category-specific payload type, e.g. `historical_tracker`.
    pub fn payload_type(&self, category: InsightCategory) -> String {
        format!("{}_{}", self.prefix(), category.as_ref().to_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "type")]
    pub kind: OutboundKind,
}

/// One correlated insight and the messages behind it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelatedInsight {
    pub correlation: String,
    pub messages: Vec<ResolvedMessage>,
}

impl CorrelatedInsight {
    pub fn new(correlation: impl Into<String>, messages: Vec<ResolvedMessage>) -> Self {
        Self {
            correlation: correlation.into(),
            messages,
        }
    }
}

/// Cross-conversation correlation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalData {
    #[serde(rename = "type")]
    pub data_type: String,
    pub correlation: String,
    pub current: Vec<CorrelatedInsight>,
    pub previous: Vec<CorrelatedInsight>,
}

/// Published when a topic, tracker or entity was seen in other conversations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub metadata: Metadata,
    pub historical: HistoricalData,
}

impl HistoricalMessage {
    pub fn new(category: InsightCategory, correlation: impl Into<String>) -> Self {
        Self {
            message_type: USER_DEFINED.to_string(),
            metadata: Metadata {
                kind: OutboundKind::Historical,
            },
            historical: HistoricalData {
                data_type: OutboundKind::Historical.payload_type(category),
                correlation: correlation.into(),
                current: Vec::new(),
                previous: Vec::new(),
            },
        }
    }
}

/// Occurrence counts over the seven trailing windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStats {
    pub last30_mins: u64,
    pub last_hour: u64,
    pub last4_hours: u64,
    pub last_day: u64,
    pub last2_days: u64,
    pub last_week: u64,
    pub last_month: u64,
}

/// Window statistics payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticalData {
    #[serde(rename = "type")]
    pub data_type: String,
    pub insights: Vec<CorrelatedInsight>,
    pub stats: WindowStats,
}

/// Published once per topic, tracker or entity match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticalMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub metadata: Metadata,
    pub statistical: StatisticalData,
}

impl StatisticalMessage {
    pub fn new(
        category: InsightCategory,
        insights: Vec<CorrelatedInsight>,
        stats: WindowStats,
    ) -> Self {
        Self {
            message_type: USER_DEFINED.to_string(),
            metadata: Metadata {
                kind: OutboundKind::Statistical,
            },
            statistical: StatisticalData {
                data_type: OutboundKind::Statistical.payload_type(category),
                insights,
                stats,
            },
        }
    }
}
