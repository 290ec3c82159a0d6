//! Provider aggregation and circuit breaking.

pub mod aggregator;
pub mod breaker;

pub use aggregator::{Aggregate, ProviderAggregator, ProviderBoard, ProviderStatus};
pub use breaker::{BreakerState, CircuitBreaker};
