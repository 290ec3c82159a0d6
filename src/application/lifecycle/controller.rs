//! Market lifecycle controller.
//!
//! Each market lives in its own slot behind a `tokio::sync::Mutex`, so
//! trades, position openings and resolution on one market are serialized
//! while different markets proceed in parallel. Proofs, pushed quotes and
//! deadline expiries arrive through the bounded [`WorkQueue`] and are
//! handled by a single worker task.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::hierarchy::HierarchyIndex;
use super::queue::{WorkItem, WorkQueue};
use super::request::{QuantumReceipt, QuantumRequest, TradeReceipt, TradeRequest};
use crate::application::leverage::{ChainComposer, ChainRequest};
use crate::application::pricing::PricingCurve;
use crate::application::provider::{ProviderAggregator, ProviderBoard, ProviderStatus};
use crate::application::resolution::{ProofResolver, ResolutionContext};
use crate::domain::id::{MarketId, RequestId};
use crate::domain::market::{Market, MarketLimits, MarketSpec, MarketState};
use crate::domain::position::{Entry, Holding, Position, QuantumPosition};
use crate::domain::proof::SettlementProof;
use crate::domain::quote::ProviderQuote;
use crate::domain::resolution::{Resolution, ResolutionRecord, SettlementRecord};
use crate::error::{MarketError, Result};
use crate::infrastructure::config::settings::Config;
use crate::port::outbound::feed::ProviderFeed;
use crate::port::outbound::venue::LeverageVenue;
use crate::port::outbound::verifier::ProofVerifier;

/// External collaborators the controller talks to.
pub struct Collaborators {
    pub verifier: Arc<dyn ProofVerifier>,
    pub feeds: Vec<Arc<dyn ProviderFeed>>,
    pub venues: Vec<Arc<dyn LeverageVenue>>,
    /// Fixed seed for quantum collapse; entropy when unset.
    pub collapse_seed: Option<u64>,
}

impl Collaborators {
    pub fn new(verifier: Arc<dyn ProofVerifier>) -> Self {
        Self {
            verifier,
            feeds: Vec::new(),
            venues: Vec::new(),
            collapse_seed: None,
        }
    }

    #[must_use]
    pub fn with_feeds(mut self, feeds: Vec<Arc<dyn ProviderFeed>>) -> Self {
        self.feeds = feeds;
        self
    }

    #[must_use]
    pub fn with_venues(mut self, venues: Vec<Arc<dyn LeverageVenue>>) -> Self {
        self.venues = venues;
        self
    }

    #[must_use]
    pub const fn with_collapse_seed(mut self, seed: u64) -> Self {
        self.collapse_seed = Some(seed);
        self
    }
}

/// Everything held for one market.
struct MarketBook {
    market: Market,
    holdings: Vec<Holding>,
    trades: HashMap<RequestId, TradeReceipt>,
    quantum: HashMap<RequestId, QuantumReceipt>,
    settlement: Option<SettlementRecord>,
}

struct MarketSlot {
    book: Mutex<MarketBook>,
    /// Mirror of the market state, readable without the book lock.
    state: parking_lot::Mutex<MarketState>,
    deadline: DateTime<Utc>,
    proof: watch::Sender<Option<SettlementProof>>,
    resolution: OnceCell<ResolutionRecord>,
}

impl MarketSlot {
    fn transition(
        &self,
        book: &mut MarketBook,
        next: MarketState,
    ) -> std::result::Result<(), MarketError> {
        let previous = book.market.transition(next)?;
        *self.state.lock() = next;
        info!(
            market_id = %book.market.id(),
            from = %previous,
            to = %next,
            "Market state changed"
        );
        Ok(())
    }
}

/// Engine activity counters.
#[derive(Debug, Default)]
struct Counters {
    trades_accepted: AtomicU64,
    trades_rejected: AtomicU64,
    quantum_opened: AtomicU64,
    proofs_received: AtomicU64,
    quotes_received: AtomicU64,
    resolved_verified: AtomicU64,
    resolved_consensus: AtomicU64,
    disputed: AtomicU64,
    archived: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CounterSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CounterSnapshot {
            trades_accepted: load(&self.trades_accepted),
            trades_rejected: load(&self.trades_rejected),
            quantum_opened: load(&self.quantum_opened),
            proofs_received: load(&self.proofs_received),
            quotes_received: load(&self.quotes_received),
            resolved_verified: load(&self.resolved_verified),
            resolved_consensus: load(&self.resolved_consensus),
            disputed: load(&self.disputed),
            archived: load(&self.archived),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub trades_accepted: u64,
    pub trades_rejected: u64,
    pub quantum_opened: u64,
    pub proofs_received: u64,
    pub quotes_received: u64,
    pub resolved_verified: u64,
    pub resolved_consensus: u64,
    pub disputed: u64,
    pub archived: u64,
}

/// Engine status for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Market count per lifecycle state.
    pub markets: BTreeMap<&'static str, usize>,
    pub providers: Vec<ProviderStatus>,
    pub counters: CounterSnapshot,
    pub queue_capacity: usize,
}

struct Inner {
    markets: DashMap<MarketId, Arc<MarketSlot>>,
    hierarchy: HierarchyIndex,
    limits: MarketLimits,
    tau_constant: f64,
    curve: PricingCurve,
    composer: ChainComposer,
    venues: Vec<Arc<dyn LeverageVenue>>,
    aggregator: Arc<ProviderAggregator>,
    resolver: ProofResolver,
    queue: WorkQueue,
    rng: parking_lot::Mutex<StdRng>,
    counters: Counters,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

/// Drives markets from creation to archive.
#[derive(Clone)]
pub struct MarketController {
    inner: Arc<Inner>,
}

impl MarketController {
    /// Build the controller and spawn its worker task.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(config: &Config, collaborators: Collaborators) -> Self {
        let board = Arc::new(ProviderBoard::new());
        let aggregator = Arc::new(ProviderAggregator::new(
            config.providers.clone(),
            board,
            collaborators.feeds,
        ));
        let resolver = ProofResolver::new(
            config.resolution.clone(),
            collaborators.verifier,
            Arc::clone(&aggregator),
        );
        let rng = match collaborators.collapse_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (queue, rx) = WorkQueue::bounded(config.engine.work_queue_capacity);

        let inner = Arc::new(Inner {
            markets: DashMap::new(),
            hierarchy: HierarchyIndex::new(),
            limits: config.market.limits(),
            tau_constant: config.pricing.tau_constant,
            curve: PricingCurve::new(config.pricing.clone()),
            composer: ChainComposer::new(config.leverage.clone()),
            venues: collaborators.venues,
            aggregator,
            resolver,
            queue,
            rng: parking_lot::Mutex::new(rng),
            counters: Counters::default(),
            worker: parking_lot::Mutex::new(None),
        });

        let handle = tokio::spawn(run_worker(Arc::clone(&inner), rx));
        *inner.worker.lock() = Some(handle);
        info!(
            queue_capacity = config.engine.work_queue_capacity,
            venues = inner.venues.len(),
            "Market controller started"
        );
        Self { inner }
    }

    /// Stop the worker task. Queued items are dropped.
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.worker.lock().take() {
            handle.abort();
            info!("Market controller stopped");
        }
    }

    #[must_use]
    pub fn aggregator(&self) -> &Arc<ProviderAggregator> {
        &self.inner.aggregator
    }

    /// Open a market and start trading immediately.
    ///
    /// Creating a market that already exists with the same parameters
    /// returns the existing market.
    ///
    /// # Errors
    ///
    /// [`MarketError::Domain`] for an invalid spec,
    /// [`MarketError::DuplicateMarket`] when the id is taken by a market
    /// with different parameters.
    pub async fn create_market(&self, spec: MarketSpec) -> Result<Market> {
        let id = spec.id.clone();
        let created = match self.inner.markets.entry(id.clone()) {
            MapEntry::Occupied(existing) => Err((Arc::clone(existing.get()), spec)),
            MapEntry::Vacant(vacant) => {
                let ceiling = self.inner.composer.tier_ceiling(spec.duration);
                let mut market = Market::try_new(
                    spec,
                    &self.inner.limits,
                    Utc::now(),
                    self.inner.tau_constant,
                    ceiling,
                )
                .map_err(|e| MarketError::from(e).at(&id))?;
                market
                    .transition(MarketState::Trading)
                    .map_err(|e| e.at(&id))?;
                let (proof, _) = watch::channel(None);
                vacant.insert(Arc::new(MarketSlot {
                    state: parking_lot::Mutex::new(market.state()),
                    deadline: market.deadline(),
                    proof,
                    resolution: OnceCell::new(),
                    book: Mutex::new(MarketBook {
                        market: market.clone(),
                        holdings: Vec::new(),
                        trades: HashMap::new(),
                        quantum: HashMap::new(),
                        settlement: None,
                    }),
                }));
                Ok(market)
            }
        };

        let market = match created {
            Ok(market) => market,
            Err((existing, spec)) => {
                let book = existing.book.lock().await;
                if book.market.matches_spec(&spec) {
                    debug!(market_id = %id, "Market already exists, returning it");
                    return Ok(book.market.clone());
                }
                return Err(MarketError::DuplicateMarket.at(&id));
            }
        };

        if let Some(parent) = market.parent() {
            self.inner.hierarchy.insert(parent.clone(), id.clone());
        }
        spawn_expiry(self.inner.queue.clone(), id.clone(), market.deadline());
        info!(
            market_id = %id,
            outcomes = market.outcome_count(),
            duration_ms = market.duration().as_millis() as u64,
            tau = market.tau(),
            leverage_ceiling = market.leverage_ceiling(),
            "Market opened for trading"
        );
        Ok(market)
    }

    /// Price and book a directional trade with its leverage chain.
    ///
    /// A repeated request id returns the stored receipt.
    ///
    /// # Errors
    ///
    /// [`Error::Trade`](crate::error::Error::Trade) carrying the market and request ids, for an
    /// unknown or closed market, a leverage request outside the tier, or a
    /// pricing failure. A rejected trade leaves the market unchanged.
    pub async fn submit_trade(&self, request: TradeRequest) -> Result<TradeReceipt> {
        let result = self.book_trade(&request).await;
        if let Err(e) = &result {
            bump(&self.inner.counters.trades_rejected);
            warn!(
                market_id = %request.market_id,
                request_id = %request.request_id,
                error = %e,
                "Trade rejected"
            );
        }
        result.map_err(|e| e.on_request(&request.market_id, &request.request_id))
    }

    async fn book_trade(
        &self,
        request: &TradeRequest,
    ) -> std::result::Result<TradeReceipt, MarketError> {
        let slot = self.slot(&request.market_id)?;
        let mut book = slot.book.lock().await;
        if let Some(receipt) = book.trades.get(&request.request_id) {
            debug!(request_id = %request.request_id, "Duplicate trade request, returning receipt");
            return Ok(receipt.clone());
        }

        let now = Utc::now();
        ensure_trading(&book.market, now)?;
        let duration = book.market.duration();
        self.inner.composer.check_target(request.leverage, duration)?;

        let quote = self
            .inner
            .curve
            .quote(&book.market, request.outcome_index, request.stake, now)?;
        let chain = self
            .inner
            .composer
            .compose(
                &ChainRequest {
                    market_id: request.market_id.clone(),
                    request_id: request.request_id.clone(),
                    base_stake: request.stake,
                    target_leverage: request.leverage,
                    market_duration: duration,
                    tau: quote.tau,
                },
                &self.inner.venues,
            )
            .await?;

        let position = Position::try_new(
            request.market_id.clone(),
            request.staker.clone(),
            request.stake,
            chain,
            Entry {
                outcome_index: quote.outcome_index,
                probability: quote.entry_probability,
                fill_price: quote.fill_price,
                shares: quote.shares,
                at: now,
            },
        )?;

        book.market
            .record_fill(quote.outcome_index, quote.probabilities.clone(), request.stake);
        book.holdings.push(Holding::Directional(position.clone()));
        let receipt = TradeReceipt {
            request_id: request.request_id.clone(),
            position,
            quote,
        };
        book.trades.insert(request.request_id.clone(), receipt.clone());
        bump(&self.inner.counters.trades_accepted);

        info!(
            market_id = %request.market_id,
            request_id = %request.request_id,
            outcome_index = receipt.quote.outcome_index,
            stake = %request.stake,
            fill_price = receipt.quote.fill_price,
            price_impact = receipt.quote.price_impact,
            effective_leverage = receipt.position.effective_leverage(),
            "Trade booked"
        );
        Ok(receipt)
    }

    /// Open a quantum position over the market's current probabilities.
    ///
    /// # Errors
    ///
    /// [`Error::Trade`](crate::error::Error::Trade) for an unknown or closed
    /// market, leverage outside the tier, or a non-positive stake.
    pub async fn open_quantum(&self, request: QuantumRequest) -> Result<QuantumReceipt> {
        let result = self.book_quantum(&request).await;
        if let Err(e) = &result {
            bump(&self.inner.counters.trades_rejected);
            warn!(
                market_id = %request.market_id,
                request_id = %request.request_id,
                error = %e,
                "Quantum position rejected"
            );
        }
        result.map_err(|e| e.on_request(&request.market_id, &request.request_id))
    }

    async fn book_quantum(
        &self,
        request: &QuantumRequest,
    ) -> std::result::Result<QuantumReceipt, MarketError> {
        let slot = self.slot(&request.market_id)?;
        let mut book = slot.book.lock().await;
        if let Some(receipt) = book.quantum.get(&request.request_id) {
            return Ok(receipt.clone());
        }

        let now = Utc::now();
        ensure_trading(&book.market, now)?;
        self.inner
            .composer
            .check_target(request.leverage, book.market.duration())?;

        let position = QuantumPosition::try_new(
            request.market_id.clone(),
            request.staker.clone(),
            request.stake,
            request.leverage,
            book.market.probabilities(),
            now,
        )?;

        let shares: Vec<Decimal> = position
            .states()
            .iter()
            .map(|s| Decimal::from_f64(s.probability).unwrap_or(Decimal::ZERO) * request.stake)
            .collect();
        for (index, share) in shares.into_iter().enumerate() {
            book.market.record_stake(index, share);
        }
        book.holdings.push(Holding::Quantum(position.clone()));
        let receipt = QuantumReceipt {
            request_id: request.request_id.clone(),
            position,
        };
        book.quantum.insert(request.request_id.clone(), receipt.clone());
        bump(&self.inner.counters.quantum_opened);

        info!(
            market_id = %request.market_id,
            request_id = %request.request_id,
            stake = %request.stake,
            leverage = request.leverage,
            "Quantum position opened"
        );
        Ok(receipt)
    }

    /// Queue a settlement proof for its market.
    ///
    /// The proof is stamped with the engine's receipt time, replacing
    /// whatever `received_at` the submitter set. Lateness and the grace
    /// cutoff are judged from that stamp.
    ///
    /// # Errors
    ///
    /// [`Error::QueueFull`](crate::error::Error::QueueFull) or
    /// [`Error::QueueClosed`](crate::error::Error::QueueClosed).
    pub fn submit_proof(&self, mut proof: SettlementProof) -> Result<()> {
        proof.received_at = Utc::now();
        self.inner.queue.try_submit(WorkItem::Proof(proof))
    }

    /// Queue a pushed provider quote.
    ///
    /// # Errors
    ///
    /// [`Error::QueueFull`](crate::error::Error::QueueFull) or
    /// [`Error::QueueClosed`](crate::error::Error::QueueClosed).
    pub fn submit_quote(&self, quote: ProviderQuote) -> Result<()> {
        self.inner.queue.try_submit(WorkItem::Quote(quote))
    }

    /// Resolve a market whose deadline has passed, or return its stored
    /// resolution.
    ///
    /// Waits for a proof until the deadline plus grace period.
    ///
    /// # Errors
    ///
    /// [`MarketError::UnknownMarket`], or
    /// [`MarketError::DeadlineNotReached`] while still trading.
    pub async fn finalize(&self, market_id: &MarketId) -> Result<ResolutionRecord> {
        let slot = self.slot(market_id).map_err(|e| e.at(market_id))?;
        resolve_slot(&self.inner, &slot)
            .await
            .map_err(|e| e.at(market_id))
    }

    /// Archive a settled market and return its settlement record.
    ///
    /// Positions move into the record and the market's receipts and
    /// resolver state are dropped. Repeated calls return the same record.
    ///
    /// # Errors
    ///
    /// [`MarketError::NotSettled`] before resolution.
    pub async fn archive(&self, market_id: &MarketId) -> Result<SettlementRecord> {
        let slot = self.slot(market_id).map_err(|e| e.at(market_id))?;
        let mut book = slot.book.lock().await;
        if let Some(record) = &book.settlement {
            return Ok(record.clone());
        }
        let state = book.market.state();
        let resolution = match (state, slot.resolution.get()) {
            (MarketState::Resolved | MarketState::Disputed, Some(resolution)) => resolution.clone(),
            _ => return Err(MarketError::NotSettled { state }.at(market_id)),
        };
        slot.transition(&mut book, MarketState::Archived)
            .map_err(|e| e.at(market_id))?;

        let payout_factor = match &resolution.resolution {
            Resolution::Disputed { .. } => Decimal::ZERO,
            other => Decimal::ONE - Decimal::from_f64(other.penalty()).unwrap_or(Decimal::ZERO),
        };
        let mut positions = Vec::new();
        let mut quantum_positions = Vec::new();
        for holding in std::mem::take(&mut book.holdings) {
            match holding {
                Holding::Directional(p) => positions.push(p),
                Holding::Quantum(q) => quantum_positions.push(q),
            }
        }
        book.trades = HashMap::new();
        book.quantum = HashMap::new();
        let record = SettlementRecord {
            market: book.market.clone(),
            resolution,
            positions,
            quantum_positions,
            payout_factor,
            archived_at: Utc::now(),
        };
        book.settlement = Some(record.clone());
        drop(book);

        self.inner.aggregator.forget(market_id);
        self.inner.resolver.release(market_id);
        bump(&self.inner.counters.archived);
        info!(market_id = %market_id, payout_factor = %record.payout_factor, "Market archived");
        Ok(record)
    }

    /// Evict an archived market once its payouts are done, returning its
    /// settlement record.
    ///
    /// # Errors
    ///
    /// [`MarketError::UnknownMarket`], or [`MarketError::NotSettled`]
    /// before archive.
    pub async fn release(&self, market_id: &MarketId) -> Result<SettlementRecord> {
        let slot = self.slot(market_id).map_err(|e| e.at(market_id))?;
        let book = slot.book.lock().await;
        let Some(record) = book.settlement.clone() else {
            let state = book.market.state();
            return Err(MarketError::NotSettled { state }.at(market_id));
        };
        if let Some(parent) = book.market.parent() {
            self.inner.hierarchy.remove(parent, market_id);
        }
        drop(book);

        self.inner.markets.remove(market_id);
        info!(market_id = %market_id, "Market released");
        Ok(record)
    }

    /// Current snapshot of a market.
    ///
    /// # Errors
    ///
    /// [`MarketError::UnknownMarket`].
    pub async fn market(&self, market_id: &MarketId) -> Result<Market> {
        let slot = self.slot(market_id).map_err(|e| e.at(market_id))?;
        let book = slot.book.lock().await;
        Ok(book.market.clone())
    }

    /// Every position held on a market. Empty once archived; the
    /// settlement record carries them from then on.
    ///
    /// # Errors
    ///
    /// [`MarketError::UnknownMarket`].
    pub async fn holdings(&self, market_id: &MarketId) -> Result<Vec<Holding>> {
        let slot = self.slot(market_id).map_err(|e| e.at(market_id))?;
        let book = slot.book.lock().await;
        Ok(book.holdings.clone())
    }

    /// Stored resolution of a market, if resolved.
    #[must_use]
    pub fn resolution(&self, market_id: &MarketId) -> Option<ResolutionRecord> {
        self.inner
            .markets
            .get(market_id)
            .and_then(|slot| slot.resolution.get().cloned())
    }

    /// Lifecycle state without taking the market lock.
    #[must_use]
    pub fn state(&self, market_id: &MarketId) -> Option<MarketState> {
        self.inner.markets.get(market_id).map(|slot| *slot.state.lock())
    }

    /// Markets created with `parent` as their parent.
    #[must_use]
    pub fn children_of(&self, parent: &MarketId) -> Vec<MarketId> {
        self.inner.hierarchy.children_of(parent)
    }

    #[must_use]
    pub fn status(&self) -> EngineStatus {
        let mut markets: BTreeMap<&'static str, usize> =
            MarketState::ALL.iter().map(|s| (s.as_str(), 0)).collect();
        for slot in self.inner.markets.iter() {
            let state = *slot.state.lock();
            *markets.entry(state.as_str()).or_default() += 1;
        }
        EngineStatus {
            markets,
            providers: self.inner.aggregator.board().statuses(),
            counters: self.inner.counters.snapshot(),
            queue_capacity: self.inner.queue.capacity(),
        }
    }

    fn slot(&self, market_id: &MarketId) -> std::result::Result<Arc<MarketSlot>, MarketError> {
        self.inner
            .markets
            .get(market_id)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or(MarketError::UnknownMarket)
    }
}

fn ensure_trading(market: &Market, now: DateTime<Utc>) -> std::result::Result<(), MarketError> {
    if market.state() != MarketState::Trading {
        return Err(MarketError::NotTrading { state: market.state() });
    }
    if now >= market.deadline() {
        return Err(MarketError::TradingClosed {
            deadline: market.deadline(),
        });
    }
    Ok(())
}

fn until(instant: DateTime<Utc>) -> Duration {
    (instant - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

fn spawn_expiry(queue: WorkQueue, market_id: MarketId, deadline: DateTime<Utc>) {
    tokio::spawn(async move {
        tokio::time::sleep(until(deadline)).await;
        if let Err(e) = queue.submit(WorkItem::Expired(market_id.clone())).await {
            debug!(market_id = %market_id, error = %e, "Expiry dropped");
        }
    });
}

async fn run_worker(inner: Arc<Inner>, mut rx: mpsc::Receiver<WorkItem>) {
    debug!("Work queue worker starting");
    while let Some(item) = rx.recv().await {
        match item {
            WorkItem::Proof(proof) => deliver_proof(&inner, proof),
            WorkItem::Quote(quote) => {
                bump(&inner.counters.quotes_received);
                let provider = quote.provider.clone();
                if let Err(e) = inner.aggregator.ingest(quote) {
                    warn!(provider = %provider, error = %e, "Dropped malformed quote");
                }
            }
            WorkItem::Expired(market_id) => {
                let Some(slot) = inner.markets.get(&market_id).map(|s| Arc::clone(s.value())) else {
                    continue;
                };
                let inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    if let Err(e) = resolve_slot(&inner, &slot).await {
                        error!(
                            market_id = %market_id,
                            error = %e,
                            "Resolution after expiry failed"
                        );
                    }
                });
            }
        }
    }
    debug!("Work queue closed, worker exiting");
}

fn deliver_proof(inner: &Inner, proof: SettlementProof) {
    bump(&inner.counters.proofs_received);
    let market_id = proof.market_id.clone();
    let Some(slot) = inner.markets.get(&market_id).map(|s| Arc::clone(s.value())) else {
        warn!(market_id = %market_id, "Proof for unknown market dropped");
        return;
    };
    if slot.resolution.initialized() {
        debug!(market_id = %market_id, "Proof for resolved market ignored");
        return;
    }
    let accepted = slot.proof.send_if_modified(|current| {
        if current.is_none() {
            *current = Some(proof);
            true
        } else {
            false
        }
    });
    if accepted {
        info!(market_id = %market_id, "Proof received");
    } else {
        debug!(market_id = %market_id, "Market already holds a proof, ignoring");
    }
}

/// Lock, resolve and settle a market. Safe to call repeatedly and
/// concurrently; only the first call resolves.
async fn resolve_slot(
    inner: &Inner,
    slot: &MarketSlot,
) -> std::result::Result<ResolutionRecord, MarketError> {
    if let Some(record) = slot.resolution.get() {
        return Ok(record.clone());
    }
    let ctx = lock_for_resolution(slot).await?;
    let record = slot
        .resolution
        .get_or_init(|| run_resolution(inner, slot, ctx))
        .await
        .clone();
    apply_resolution(inner, slot, &record).await;
    Ok(record)
}

async fn lock_for_resolution(
    slot: &MarketSlot,
) -> std::result::Result<ResolutionContext, MarketError> {
    let mut book = slot.book.lock().await;
    match book.market.state() {
        MarketState::Created | MarketState::Trading => {
            if Utc::now() < slot.deadline {
                return Err(MarketError::DeadlineNotReached {
                    deadline: slot.deadline,
                });
            }
            if book.market.state() == MarketState::Created {
                slot.transition(&mut book, MarketState::Trading)?;
            }
            slot.transition(&mut book, MarketState::Locked)?;
            slot.transition(&mut book, MarketState::AwaitingResolution)?;
        }
        MarketState::Locked => slot.transition(&mut book, MarketState::AwaitingResolution)?,
        MarketState::AwaitingResolution
        | MarketState::Resolved
        | MarketState::Disputed
        | MarketState::Archived => {}
    }
    Ok(ResolutionContext {
        market_id: book.market.id().clone(),
        outcome_count: book.market.outcome_count(),
        market_duration: book.market.duration(),
        locked_probabilities: book.market.probabilities().to_vec(),
    })
}

async fn run_resolution(
    inner: &Inner,
    slot: &MarketSlot,
    ctx: ResolutionContext,
) -> ResolutionRecord {
    let grace = inner.resolver.config().grace_period();
    let wait = until(slot.deadline) + grace;
    let mut rx = slot.proof.subscribe();
    let proof = match timeout(wait, rx.wait_for(Option::is_some)).await {
        Ok(Ok(proof)) => proof.clone(),
        Ok(Err(_)) | Err(_) => None,
    };
    inner.resolver.resolve(&ctx, proof, slot.deadline).await
}

async fn apply_resolution(inner: &Inner, slot: &MarketSlot, record: &ResolutionRecord) {
    let mut book = slot.book.lock().await;
    if book.market.state() != MarketState::AwaitingResolution {
        return;
    }
    let next = if record.resolution.is_disputed() {
        MarketState::Disputed
    } else {
        MarketState::Resolved
    };
    if let Err(e) = slot.transition(&mut book, next) {
        error!(market_id = %record.market_id, error = %e, "Could not record resolution");
        return;
    }

    let winner = record.resolution.winning_outcome();
    let mut rng = inner.rng.lock();
    for holding in &mut book.holdings {
        match holding {
            Holding::Directional(position) => {
                position.settle(winner);
            }
            Holding::Quantum(position) => {
                if winner.is_some() {
                    position.collapse(&mut *rng);
                }
                position.settle(winner);
            }
        }
    }
    drop(rng);

    match &record.resolution {
        Resolution::Verified { .. } => bump(&inner.counters.resolved_verified),
        Resolution::ConsensusResolved { .. } => bump(&inner.counters.resolved_consensus),
        Resolution::Disputed { .. } => bump(&inner.counters.disputed),
    }
    info!(
        market_id = %record.market_id,
        outcome = ?record.outcome(),
        positions = book.holdings.len(),
        "Positions settled"
    );
}
