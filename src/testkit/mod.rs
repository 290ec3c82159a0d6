//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`venue`] - Scripted [`LeverageVenue`](crate::port::outbound::venue::LeverageVenue)
//! - [`feed`] - Scripted [`ProviderFeed`](crate::port::outbound::feed::ProviderFeed)
//! - [`verifier`] - Fixed-verdict [`ProofVerifier`](crate::port::outbound::verifier::ProofVerifier)
//!   and stub proofs
//! - [`prover`] - Real Groth16 proofs from a deterministic key setup
//! - [`domain`] - Builders for market specs
//! - [`config`] - Canonical fast configurations

pub mod config;
pub mod domain;
pub mod feed;
pub mod prover;
pub mod venue;
pub mod verifier;
