//! Market lifecycle: creation, trading, resolution and archive.

pub mod controller;
pub mod hierarchy;
pub mod queue;
pub mod request;

pub use controller::{Collaborators, CounterSnapshot, EngineStatus, MarketController};
pub use hierarchy::HierarchyIndex;
pub use queue::{WorkItem, WorkQueue};
pub use request::{QuantumReceipt, QuantumRequest, TradeReceipt, TradeRequest};
