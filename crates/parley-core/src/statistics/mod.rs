//! Trailing-window statistics.
//!
//! Every topic, tracker or entity match is counted in other conversations
//! over seven independent windows ending now. Each window reads the clock
//! on its own; small drift between them is accepted.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Months, Utc};
use futures::future::try_join_all;
use strum::{Display, EnumIter, IntoEnumIterator};
use tracing::debug;

use crate::error::ParleyResult;
use crate::lifecycle::Conversation;
use crate::traits::{
    with_deadline, GraphStoreConfig, IdentityKey, InsightGraphStore, WindowCountQuery,
    DEFAULT_QUERY_TIMEOUT_MS,
};
use crate::types::{
    CorrelatedInsight, EntityBatch, MessageRef, StatisticalMessage, TopicBatch, TrackerBatch,
    WindowStats,
};

/// The seven trailing windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum StatWindow {
    #[strum(serialize = "last30Mins")]
    Last30Mins,
    #[strum(serialize = "lastHour")]
    LastHour,
    #[strum(serialize = "last4Hours")]
    Last4Hours,
    #[strum(serialize = "lastDay")]
    LastDay,
    #[strum(serialize = "last2Days")]
    Last2Days,
    #[strum(serialize = "lastWeek")]
    LastWeek,
    #[strum(serialize = "lastMonth")]
    LastMonth,
}

impl StatWindow {
    /// Start of the window ending at `now`.
    ///
    /// The month window is one calendar month back.
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let span = match self {
            Self::Last30Mins => chrono::Duration::minutes(30),
            Self::LastHour => chrono::Duration::hours(1),
            Self::Last4Hours => chrono::Duration::hours(4),
            Self::LastDay => chrono::Duration::days(1),
            Self::Last2Days => chrono::Duration::days(2),
            Self::LastWeek => chrono::Duration::days(7),
            Self::LastMonth => {
                return now
                    .checked_sub_months(Months::new(1))
                    .unwrap_or(now - chrono::Duration::days(30))
            }
        };
        now - span
    }
}

impl WindowStats {
    pub fn set(&mut self, window: StatWindow, count: u64) {
        match window {
            StatWindow::Last30Mins => self.last30_mins = count,
            StatWindow::LastHour => self.last_hour = count,
            StatWindow::Last4Hours => self.last4_hours = count,
            StatWindow::LastDay => self.last_day = count,
            StatWindow::Last2Days => self.last2_days = count,
            StatWindow::LastWeek => self.last_week = count,
            StatWindow::LastMonth => self.last_month = count,
        }
    }

    pub fn get(&self, window: StatWindow) -> u64 {
        match window {
            StatWindow::Last30Mins => self.last30_mins,
            StatWindow::LastHour => self.last_hour,
            StatWindow::Last4Hours => self.last4_hours,
            StatWindow::LastDay => self.last_day,
            StatWindow::Last2Days => self.last2_days,
            StatWindow::LastWeek => self.last_week,
            StatWindow::LastMonth => self.last_month,
        }
    }
}

/// Counts prior matches per window and shapes statistics messages.
#[derive(Clone)]
pub struct StatisticalAggregator {
    store: Arc<dyn InsightGraphStore>,
    query_timeout: Duration,
}

impl StatisticalAggregator {
    pub fn new(store: Arc<dyn InsightGraphStore>) -> Self {
        Self {
            store,
            query_timeout: Duration::from_millis(DEFAULT_QUERY_TIMEOUT_MS),
        }
    }

    pub fn from_config(store: Arc<dyn InsightGraphStore>, config: &GraphStoreConfig) -> Self {
        Self::new(store).with_query_timeout(config.query_timeout())
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    async fn count(
        &self,
        conversation_id: &str,
        identity: &IdentityKey,
        window: StatWindow,
    ) -> ParleyResult<(StatWindow, u64)> {
        let query = WindowCountQuery {
            conversation_id: conversation_id.to_string(),
            identity: identity.clone(),
            since: window.since(Utc::now()),
        };
        let count =
            with_deadline("count_matches", self.query_timeout, self.store.count_matches(&query))
                .await?;
        Ok((window, count))
    }

    /// All seven counts for one identity. Any failing window fails the whole
    /// set.
    pub async fn window_stats(
        &self,
        conversation_id: &str,
        identity: &IdentityKey,
    ) -> ParleyResult<WindowStats> {
        let counts = try_join_all(
            StatWindow::iter().map(|window| self.count(conversation_id, identity, window)),
        )
        .await?;

        let mut stats = WindowStats::default();
        for (window, count) in counts {
            stats.set(window, count);
        }
        debug!(
            conversation_id = %conversation_id,
            correlation = %identity.correlation(),
            ?stats,
            "Window statistics"
        );
        Ok(stats)
    }

    /// One message per topic.
    pub async fn topic_stats(
        &self,
        conversation: &Conversation,
        batch: &TopicBatch,
    ) -> ParleyResult<Vec<StatisticalMessage>> {
        let mut messages = Vec::with_capacity(batch.topics.len());
        for topic in &batch.topics {
            let identity = IdentityKey::topic(&topic.phrases);
            let stats = self.window_stats(conversation.id(), &identity).await?;
            let insight = CorrelatedInsight::new(
                identity.correlation(),
                conversation.cache().resolve_all(&topic.message_references),
            );
            messages.push(StatisticalMessage::new(
                identity.category(),
                vec![insight],
                stats,
            ));
        }
        Ok(messages)
    }

    /// One message per tracker, with an insight per tracker match.
    pub async fn tracker_stats(
        &self,
        conversation: &Conversation,
        batch: &TrackerBatch,
    ) -> ParleyResult<Vec<StatisticalMessage>> {
        let mut messages = Vec::with_capacity(batch.trackers.len());
        for tracker in &batch.trackers {
            let identity = IdentityKey::tracker(&tracker.name);
            let stats = self.window_stats(conversation.id(), &identity).await?;
            let insights = tracker
                .matches
                .iter()
                .map(|m| {
                    let refs: Vec<MessageRef> = m
                        .message_refs
                        .iter()
                        .chain(m.insight_refs.iter())
                        .cloned()
                        .collect();
                    CorrelatedInsight::new(
                        m.value.to_lowercase(),
                        conversation.cache().resolve_all(&refs),
                    )
                })
                .collect();
            messages.push(StatisticalMessage::new(identity.category(), insights, stats));
        }
        Ok(messages)
    }

    /// One message per entity match.
    pub async fn entity_stats(
        &self,
        conversation: &Conversation,
        batch: &EntityBatch,
    ) -> ParleyResult<Vec<StatisticalMessage>> {
        let mut messages = Vec::new();
        for entity in &batch.entities {
            for entity_match in &entity.matches {
                let identity = IdentityKey::entity(
                    &entity.category,
                    &entity.entity_type,
                    &entity.sub_type,
                    &entity_match.detected_value,
                );
                let stats = self.window_stats(conversation.id(), &identity).await?;
                let insight = CorrelatedInsight::new(
                    entity_match.detected_value.to_lowercase(),
                    conversation.cache().resolve_all(&entity_match.message_refs),
                );
                messages.push(StatisticalMessage::new(
                    identity.category(),
                    vec![insight],
                    stats,
                ));
            }
        }
        Ok(messages)
    }
}
