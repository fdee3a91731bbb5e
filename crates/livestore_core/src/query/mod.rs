//! Query expressions and their compilation.
//!
//! # Responsibility
//! - Model filters and orderings as a small typed expression tree.
//! - Compile them into parameterised SQLite statements per collection.
//!
//! # Invariants
//! - Compilation never touches the store and never runs on the worker.
//! - Malformed queries are rejected before anything is scheduled.

pub mod compile;
pub mod predicate;
