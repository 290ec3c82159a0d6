//! Infrastructure: configuration and process wiring.

pub mod config;
