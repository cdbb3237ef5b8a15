//! Pull-based stream contract and combinators.
//!
//! This module provides the minimal async iteration abstraction the rest of
//! the crate is built on, plus the small family of combinators the query and
//! responder layers compose with.

pub mod combinators;
pub mod constructors;
pub mod core;
pub mod sink;

// Re-export core types
pub use core::{Stream, StreamExt};

// Re-export constructors
pub use constructors::{from_futures_stream, from_iter, FuturesAdapter, Iter};

// Re-export combinators
pub use combinators::{Delay, Map, Select};

// Re-export sinks
pub use sink::{drain, drain_all};
