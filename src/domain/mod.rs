//! Domain types for flash markets.
//!
//! Pure data and invariants; no I/O and no async.

pub mod error;
pub mod id;
pub mod market;
pub mod position;
pub mod proof;
pub mod quote;
pub mod resolution;
