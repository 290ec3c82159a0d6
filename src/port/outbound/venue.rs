//! Leverage venue port.
//!
//! A venue performs one kind of leverage-producing operation (a borrow, a
//! liquidation bonus, a stake boost) and answers with a multiplier.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::id::{MarketId, RequestId};
use crate::domain::position::ChainStepKind;
use crate::error::ExternalError;

/// Parameters of one step call.
///
/// `request_id` is stable across retries so venues can deduplicate.
#[derive(Debug, Clone)]
pub struct StepRequest {
    pub market_id: MarketId,
    pub request_id: RequestId,
    pub kind: ChainStepKind,
    pub base_stake: Decimal,
    /// Leverage composed by earlier steps.
    pub leverage_so_far: f64,
}

/// External leverage-producing operation.
#[async_trait]
pub trait LeverageVenue: Send + Sync {
    /// Venue name, recorded on each chain step.
    fn name(&self) -> &str;

    /// Kind of step this venue serves.
    fn kind(&self) -> ChainStepKind;

    /// Perform the step and return its multiplier.
    ///
    /// Must be idempotent for a given `request_id`.
    async fn multiplier(&self, request: &StepRequest) -> Result<f64, ExternalError>;
}
