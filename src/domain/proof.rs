//! Settlement proofs and their public inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::id::MarketId;

/// Convert a probability to whole basis points.
#[must_use]
pub fn odds_bps(probability: f64) -> u32 {
    // Clamped to [0, 10_000] so the cast cannot truncate.
    (probability.clamp(0.0, 1.0) * 10_000.0).round() as u32
}

/// Public inputs a settlement proof is verified against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicInputs {
    pub market_commitment: u128,
    pub outcome_index: u32,
    /// Unix seconds at which the outcome was observed.
    pub settled_at: i64,
    /// Implied odds of the winning outcome at lock, in basis points.
    pub odds_bps: u32,
}

impl PublicInputs {
    #[must_use]
    pub fn for_market(
        market_id: &MarketId,
        outcome_index: u32,
        settled_at: i64,
        odds_bps: u32,
    ) -> Self {
        Self {
            market_commitment: market_id.commitment(),
            outcome_index,
            settled_at,
            odds_bps,
        }
    }
}

/// Serialized proof plus declared inputs, as delivered by the proof service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementProof {
    pub market_id: MarketId,
    /// Compressed Groth16 proof bytes.
    #[serde(with = "hex_bytes")]
    pub bytes: Vec<u8>,
    pub inputs: PublicInputs,
    /// When the engine received the proof. Set on submission.
    pub received_at: DateTime<Utc>,
}

impl SettlementProof {
    pub fn new(
        market_id: MarketId,
        bytes: Vec<u8>,
        inputs: PublicInputs,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            market_id,
            bytes,
            inputs,
            received_at,
        }
    }

    /// Hex SHA-256 over the proof bytes and declared inputs.
    ///
    /// Receipt time is excluded, so a resubmission has the same fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hasher.update(self.inputs.market_commitment.to_le_bytes());
        hasher.update(self.inputs.outcome_index.to_le_bytes());
        hasher.update(self.inputs.settled_at.to_le_bytes());
        hasher.update(self.inputs.odds_bps.to_le_bytes());
        hex::encode(hasher.finalize())
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
