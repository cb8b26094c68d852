//! Core traits for parley.

pub mod graph_store;
pub mod publisher;

pub use graph_store::*;
pub use publisher::*;
