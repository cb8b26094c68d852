//! parley-graph-stores - Insight graph store implementations for parley.
//!
//! # Supported Backends
//!
//! - **Memory** (feature: `memory`, default) - In-process store, used for
//!   tests and single-node setups
//! - **Neo4j** (feature: `neo4j`) - Neo4j over Bolt
//! - **Memgraph** (feature: `memgraph`) - Memgraph (Bolt-compatible)

mod factory;

#[cfg(feature = "memory")]
mod memory;

#[cfg(any(feature = "neo4j", feature = "memgraph"))]
mod bolt;

pub use factory::GraphStoreFactory;

#[cfg(feature = "memory")]
pub use memory::{InMemoryInsightGraph, RecordedMatch};

#[cfg(any(feature = "neo4j", feature = "memgraph"))]
pub use bolt::BoltInsightGraph;

// Re-export core types
pub use parley_core::traits::{
    GraphStoreConfig, GraphStoreProvider, IdentityKey, InsightGraphStore, MatchSource,
};
