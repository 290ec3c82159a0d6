//! Pricing curve (AMM).

pub mod curve;
pub mod normal;
pub mod solver;

pub use curve::{PricingCurve, TradeQuote};
