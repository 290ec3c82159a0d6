//! Caller requests and the receipts returned for them.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::application::pricing::TradeQuote;
use crate::domain::id::{MarketId, RequestId, StakerId};
use crate::domain::position::{Position, QuantumPosition};

/// Directional leveraged trade on one outcome.
#[derive(Debug, Clone)]
pub struct TradeRequest {
    /// Caller-chosen id; a repeated id returns the stored receipt.
    pub request_id: RequestId,
    pub market_id: MarketId,
    pub staker: StakerId,
    pub outcome_index: usize,
    pub stake: Decimal,
    pub leverage: f64,
}

impl TradeRequest {
    pub fn new(
        request_id: impl Into<RequestId>,
        market_id: impl Into<MarketId>,
        staker: impl Into<StakerId>,
        outcome_index: usize,
        stake: Decimal,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            market_id: market_id.into(),
            staker: staker.into(),
            outcome_index,
            stake,
            leverage: 1.0,
        }
    }

    #[must_use]
    pub fn with_leverage(mut self, leverage: f64) -> Self {
        self.leverage = leverage;
        self
    }
}

/// Accepted trade.
#[derive(Debug, Clone, Serialize)]
pub struct TradeReceipt {
    pub request_id: RequestId,
    pub position: Position,
    pub quote: TradeQuote,
}

/// Stake spread over every outcome of a market.
#[derive(Debug, Clone)]
pub struct QuantumRequest {
    pub request_id: RequestId,
    pub market_id: MarketId,
    pub staker: StakerId,
    pub stake: Decimal,
    pub leverage: f64,
}

impl QuantumRequest {
    pub fn new(
        request_id: impl Into<RequestId>,
        market_id: impl Into<MarketId>,
        staker: impl Into<StakerId>,
        stake: Decimal,
        leverage: f64,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            market_id: market_id.into(),
            staker: staker.into(),
            stake,
            leverage,
        }
    }
}

/// Opened quantum position.
#[derive(Debug, Clone, Serialize)]
pub struct QuantumReceipt {
    pub request_id: RequestId,
    pub position: QuantumPosition,
}
