//! Provider feed port.

use async_trait::async_trait;

use crate::domain::id::{MarketId, ProviderId};
use crate::domain::quote::ProviderQuote;
use crate::error::ExternalError;

/// Independent odds/outcome source.
#[async_trait]
pub trait ProviderFeed: Send + Sync {
    fn provider(&self) -> &ProviderId;

    /// Fetch the provider's current view of a market.
    async fn fetch(
        &self,
        market_id: &MarketId,
        outcome_count: usize,
    ) -> Result<ProviderQuote, ExternalError>;
}
