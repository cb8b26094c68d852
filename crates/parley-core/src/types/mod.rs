//! Core types for parley.

mod category;
mod event;
mod insight;
mod outbound;

pub use category::*;
pub use event::*;
pub use insight::*;
pub use outbound::*;
