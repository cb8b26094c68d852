//! Trigger patterns and aggregation.

mod aggregator;
mod patterns;

pub use aggregator::TriggerAggregator;
pub use patterns::{TriggerPattern, TriggerPatterns};
