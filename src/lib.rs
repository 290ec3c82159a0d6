//! Flashsettle - settlement engine for ultra-short leveraged prediction
//! markets.
//!
//! Markets live from five seconds to four hours. The engine prices trades
//! on a time-decaying curve, composes leverage across external venues under
//! a hard ceiling, and resolves each market from a Groth16 settlement proof
//! or, failing that, a quorum of independent data providers.
//!
//! # Modules
//!
//! - [`domain`] - Markets, positions, quotes, proofs and resolution types
//! - [`port`] - Traits for external venues, provider feeds and proof verification
//! - [`application`] - Pricing curve, leverage composer, provider aggregator,
//!   proof resolver and the market lifecycle controller
//! - [`adapter`] - Groth16 verifier, status file writer and CLI definitions
//! - [`infrastructure`] - Configuration loading and logging setup
//! - [`error`] - Error types for the crate
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use flashsettle::adapter::groth16::Groth16Verifier;
//! use flashsettle::application::lifecycle::{Collaborators, MarketController};
//! use flashsettle::domain::market::MarketSpec;
//! use flashsettle::infrastructure::config::settings::Config;
//!
//! # async fn demo() -> flashsettle::error::Result<()> {
//! let config = Config::default();
//! let verifier = Arc::new(Groth16Verifier::from_config(&config.resolution)?);
//! let controller = MarketController::start(&config, Collaborators::new(verifier));
//! let outcomes = vec!["up".into(), "down".into()];
//! let spec = MarketSpec::new("btc-up-30s", outcomes, Duration::from_secs(30));
//! controller.create_market(spec).await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
