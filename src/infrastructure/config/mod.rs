//! Infrastructure configuration modules.

pub mod engine;
pub mod leverage;
pub mod logging;
pub mod market;
pub mod pricing;
pub mod provider;
pub mod resolution;
pub mod settings;
