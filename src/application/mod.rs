//! Application services.
//!
//! These services orchestrate domain logic and call out through the
//! outbound ports.

pub mod leverage;
pub mod lifecycle;
pub mod pricing;
pub mod provider;
pub mod resolution;
