//! Entity model contracts.
//!
//! # Responsibility
//! - Define what a storable record must provide to the repository.
//!
//! # Invariants
//! - Every stored record is identified by a stable identity key.
//! - The repository interprets no field other than the identity key and the
//!   fields referenced by a query.

pub mod entity;
