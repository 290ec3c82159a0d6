//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! Ports are the seams to external collaborators the engine calls out to.
//! Adapters implement them; tests replace them with scripted doubles from
//! the `testkit` module.
//!
//! # Available Ports
//!
//! - [`outbound::venue::LeverageVenue`] - External leverage-producing operation
//! - [`outbound::feed::ProviderFeed`] - Odds/outcome data provider
//! - [`outbound::verifier::ProofVerifier`] - Settlement proof verification

pub mod outbound;
