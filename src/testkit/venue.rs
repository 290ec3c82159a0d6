//! Scripted leverage venue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::position::ChainStepKind;
use crate::error::ExternalError;
use crate::port::outbound::venue::{LeverageVenue, StepRequest};

/// A venue answering from a pre-loaded script.
///
/// Each call pops the next scripted result. Once the script is exhausted
/// every call returns the fallback.
pub struct ScriptedVenue {
    name: String,
    kind: ChainStepKind,
    results: Mutex<VecDeque<Result<f64, ExternalError>>>,
    fallback: Result<f64, ExternalError>,
    delay: Duration,
    calls: AtomicU32,
}

impl ScriptedVenue {
    /// Venue with an empty script that fails once exhausted.
    pub fn new(kind: ChainStepKind) -> Self {
        Self {
            name: format!("scripted-{kind}"),
            kind,
            results: Mutex::new(VecDeque::new()),
            fallback: Err(ExternalError::Unavailable("script exhausted".into())),
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    /// Venue that always answers `multiplier`.
    pub fn always(kind: ChainStepKind, multiplier: f64) -> Self {
        let mut venue = Self::new(kind);
        venue.fallback = Ok(multiplier);
        venue
    }

    pub fn with_results(self, results: Vec<Result<f64, ExternalError>>) -> Self {
        *self.results.lock() = results.into();
        self
    }

    /// Sleep before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LeverageVenue for ScriptedVenue {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ChainStepKind {
        self.kind
    }

    async fn multiplier(&self, _request: &StepRequest) -> Result<f64, ExternalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.results.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}
