//! Leverage chain composition.

pub mod composer;

pub use composer::{ChainComposer, ChainRequest};
