//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all engine settings.
//! Every field has a default, so an empty file is a valid configuration.
//!
//! # Example
//!
//! ```no_run
//! use flashsettle::infrastructure::config::settings::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.logging.init();
//!     Ok(())
//! }
//! ```

use std::path::Path;

use serde::Deserialize;

use super::engine::EngineConfig;
use super::leverage::LeverageConfig;
use super::logging::LoggingConfig;
use super::market::MarketConfig;
use super::pricing::PricingConfig;
use super::provider::ProviderConfig;
use super::resolution::ResolutionConfig;
use crate::error::{ConfigError, Result};

/// Main engine configuration.
///
/// Load from a TOML file using [`Config::load`] or parse directly with
/// [`Config::parse_toml`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Market creation bounds.
    #[serde(default)]
    pub market: MarketConfig,

    /// Pricing curve parameters.
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Leverage tiers and chain composition.
    #[serde(default)]
    pub leverage: LeverageConfig,

    /// Provider quorum, spread and circuit breaker settings.
    #[serde(default)]
    pub providers: ProviderConfig,

    /// Proof deadline grace, late penalty and verifier key.
    #[serde(default)]
    pub resolution: ResolutionConfig,

    /// Work queue and status file.
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Config {
    /// Parse configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    #[allow(clippy::result_large_err)]
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The TOML content is malformed
    /// - Validation fails
    #[allow(clippy::result_large_err)]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Validate configuration values.
    ///
    /// Checks that every section is within acceptable ranges.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        self.market.validate()?;
        self.pricing.validate()?;
        self.leverage.validate()?;
        self.providers.validate()?;
        self.resolution.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}
