//! Outbound ports (driven side): interfaces implemented by outbound adapters.

pub mod feed;
pub mod venue;
pub mod verifier;
