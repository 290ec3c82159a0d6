//! Bounded work queue feeding the controller.

use tokio::sync::mpsc;

use crate::domain::id::MarketId;
use crate::domain::proof::SettlementProof;
use crate::domain::quote::ProviderQuote;
use crate::error::{Error, Result};

/// Work delivered to the controller's worker task.
#[derive(Debug, Clone)]
pub enum WorkItem {
    /// A proof from the proof service.
    Proof(SettlementProof),
    /// A pushed provider quote.
    Quote(ProviderQuote),
    /// A market's trading deadline elapsed.
    Expired(MarketId),
}

impl WorkItem {
    #[must_use]
    pub const fn market_id(&self) -> &MarketId {
        match self {
            Self::Proof(proof) => &proof.market_id,
            Self::Quote(quote) => &quote.market_id,
            Self::Expired(id) => id,
        }
    }
}

/// Sending half of the work queue.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    tx: mpsc::Sender<WorkItem>,
}

impl WorkQueue {
    /// Create a queue holding at most `capacity` pending items.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<WorkItem>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue without waiting.
    ///
    /// # Errors
    ///
    /// [`Error::QueueFull`] when the queue is at capacity,
    /// [`Error::QueueClosed`] when the worker has stopped.
    pub fn try_submit(&self, item: WorkItem) -> Result<()> {
        self.tx.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::QueueFull,
            mpsc::error::TrySendError::Closed(_) => Error::QueueClosed,
        })
    }

    /// Enqueue, waiting for capacity.
    ///
    /// # Errors
    ///
    /// [`Error::QueueClosed`] when the worker has stopped.
    pub async fn submit(&self, item: WorkItem) -> Result<()> {
        self.tx.send(item).await.map_err(|_| Error::QueueClosed)
    }

    /// Free slots remaining.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }
}
