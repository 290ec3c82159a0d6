//! Key setup and proof generation.

use ark_bls12_381::Bls12_381;
use ark_groth16::{Groth16, ProvingKey, VerifyingKey};
use ark_serialize::CanonicalSerialize;
use ark_std::rand::rngs::StdRng;
use ark_std::rand::{CryptoRng, RngCore, SeedableRng};
use tracing::info;

use super::circuit::SettlementCircuit;
use crate::domain::proof::PublicInputs;
use crate::error::{Error, Result};

/// Holds a proving key and produces compressed settlement proofs.
pub struct SettlementProver {
    proving_key: ProvingKey<Bls12_381>,
}

impl SettlementProver {
    /// Deterministic key setup from `seed`.
    ///
    /// The same seed always yields the same key pair, so a verifier built
    /// with [`Groth16Verifier::development`](super::Groth16Verifier::development)
    /// accepts proofs from this prover.
    ///
    /// # Errors
    ///
    /// [`Error::Verifier`] if parameter generation fails.
    pub fn development(seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let proving_key = Groth16::<Bls12_381>::generate_random_parameters_with_reduction(
            SettlementCircuit::blank(),
            &mut rng,
        )
        .map_err(|e| Error::Verifier(e.to_string()))?;
        info!(seed, "Generated development settlement keys");
        Ok(Self { proving_key })
    }

    #[must_use]
    pub fn verifying_key(&self) -> &VerifyingKey<Bls12_381> {
        &self.proving_key.vk
    }

    /// Compressed verifying key as lowercase hex.
    ///
    /// # Errors
    ///
    /// [`Error::Verifier`] if serialization fails.
    pub fn verifying_key_hex(&self) -> Result<String> {
        let mut bytes = Vec::new();
        self.verifying_key()
            .serialize_compressed(&mut bytes)
            .map_err(|e| Error::Verifier(e.to_string()))?;
        Ok(hex::encode(bytes))
    }

    /// Prove `inputs` and return the compressed proof bytes.
    ///
    /// # Errors
    ///
    /// [`Error::Verifier`] if proving or serialization fails.
    pub fn prove<R: RngCore + CryptoRng>(
        &self,
        inputs: &PublicInputs,
        rng: &mut R,
    ) -> Result<Vec<u8>> {
        let proof = Groth16::<Bls12_381>::create_random_proof_with_reduction(
            SettlementCircuit::new(*inputs),
            &self.proving_key,
            rng,
        )
        .map_err(|e| Error::Verifier(e.to_string()))?;
        let mut bytes = Vec::new();
        proof
            .serialize_compressed(&mut bytes)
            .map_err(|e| Error::Verifier(e.to_string()))?;
        Ok(bytes)
    }
}
