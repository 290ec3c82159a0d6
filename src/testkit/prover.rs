//! Real Groth16 proofs for tests.

use ark_std::rand::rngs::StdRng;
use ark_std::rand::SeedableRng;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::adapter::groth16::{Groth16Verifier, SettlementProver};
use crate::domain::id::MarketId;
use crate::domain::proof::{odds_bps, PublicInputs, SettlementProof};

/// Prover and matching verifier from one deterministic setup.
pub struct TestProver {
    prover: SettlementProver,
    rng: Mutex<StdRng>,
}

impl TestProver {
    pub fn new(seed: u64) -> Self {
        Self {
            prover: SettlementProver::development(seed).expect("development key setup"),
            rng: Mutex::new(StdRng::seed_from_u64(seed.wrapping_add(1))),
        }
    }

    pub fn verifier(&self) -> Groth16Verifier {
        Groth16Verifier::new(self.prover.verifying_key())
    }

    /// Valid proof for `outcome_index` with odds taken from `odds`.
    pub fn proof(
        &self,
        market_id: &MarketId,
        outcome_index: u32,
        odds: f64,
        settled_at: DateTime<Utc>,
        received_at: DateTime<Utc>,
    ) -> SettlementProof {
        let settled_at = settled_at.timestamp();
        let inputs = PublicInputs::for_market(market_id, outcome_index, settled_at, odds_bps(odds));
        let bytes = self
            .prover
            .prove(&inputs, &mut *self.rng.lock())
            .expect("settlement proof");
        SettlementProof::new(market_id.clone(), bytes, inputs, received_at)
    }
}
