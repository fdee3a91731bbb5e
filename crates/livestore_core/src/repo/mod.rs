//! Repository layer: the consumer-facing contract and its implementation.
//!
//! # Responsibility
//! - Define the generic query/save/delete contract consumed by callers.
//! - Turn each call into a deferred operation executed on the worker.
//!
//! # Invariants
//! - Callers never obtain a handle or a live collection.
//! - Failures travel through the same completion or stream as results.

pub mod completion;
pub mod error;
pub mod repository;
