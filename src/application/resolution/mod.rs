//! Market resolution.

pub mod resolver;

pub use resolver::{ProofResolver, ResolutionContext};
