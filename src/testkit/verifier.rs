//! Fixed-verdict proof verifier and stub proofs.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};

use crate::domain::id::MarketId;
use crate::domain::proof::{odds_bps, PublicInputs, SettlementProof};
use crate::error::ExternalError;
use crate::port::outbound::verifier::ProofVerifier;

/// Verifier that accepts or rejects everything and counts calls.
pub struct StaticVerifier {
    accept: bool,
    calls: AtomicU32,
}

impl StaticVerifier {
    pub fn accepting() -> Self {
        Self {
            accept: true,
            calls: AtomicU32::new(0),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            accept: false,
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProofVerifier for StaticVerifier {
    fn verify(&self, _proof: &[u8], _inputs: &PublicInputs) -> Result<(), ExternalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.accept {
            Ok(())
        } else {
            Err(ExternalError::Rejected("static verifier".into()))
        }
    }
}

/// Proof with placeholder bytes and well-formed inputs.
///
/// `odds` is the locked probability of `outcome_index`. Bytes differ per
/// market, outcome and receipt time so fingerprints do not collide.
pub fn stub_proof(
    market_id: &MarketId,
    outcome_index: u32,
    odds: f64,
    settled_at: DateTime<Utc>,
    received_at: DateTime<Utc>,
) -> SettlementProof {
    let inputs =
        PublicInputs::for_market(market_id, outcome_index, settled_at.timestamp(), odds_bps(odds));
    let bytes =
        format!("{market_id}:{outcome_index}:{}", received_at.timestamp_millis()).into_bytes();
    SettlementProof::new(market_id.clone(), bytes, inputs, received_at)
}
