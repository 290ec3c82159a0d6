//! Groth16 verifier over BLS12-381.

use std::fs;
use std::path::Path;

use ark_bls12_381::Bls12_381;
use ark_groth16::{prepare_verifying_key, Groth16, PreparedVerifyingKey, Proof, VerifyingKey};
use ark_serialize::CanonicalDeserialize;
use tracing::{debug, info};

use super::circuit::field_inputs;
use super::prover::SettlementProver;
use crate::domain::proof::PublicInputs;
use crate::error::{Error, ExternalError, Result};
use crate::infrastructure::config::resolution::ResolutionConfig;
use crate::port::outbound::verifier::ProofVerifier;

/// Verifies settlement proofs against a prepared verifying key.
pub struct Groth16Verifier {
    key: PreparedVerifyingKey<Bls12_381>,
}

impl Groth16Verifier {
    #[must_use]
    pub fn new(vk: &VerifyingKey<Bls12_381>) -> Self {
        Self {
            key: prepare_verifying_key(vk),
        }
    }

    /// Verifier matching [`SettlementProver::development`] for `seed`.
    ///
    /// # Errors
    ///
    /// [`Error::Verifier`] if key setup fails.
    pub fn development(seed: u64) -> Result<Self> {
        let prover = SettlementProver::development(seed)?;
        Ok(Self::new(prover.verifying_key()))
    }

    /// Decode a hex compressed verifying key.
    ///
    /// # Errors
    ///
    /// [`Error::Verifier`] for invalid hex or an undecodable key.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| Error::Verifier(format!("verifying key hex: {e}")))?;
        let vk = VerifyingKey::<Bls12_381>::deserialize_compressed(bytes.as_slice())
            .map_err(|e| Error::Verifier(format!("verifying key: {e}")))?;
        Ok(Self::new(&vk))
    }

    /// Read a hex verifying key from `path`.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the file cannot be read, otherwise as [`Self::from_hex`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let encoded = fs::read_to_string(path)?;
        let verifier = Self::from_hex(&encoded)?;
        info!(path = %path.display(), "Loaded settlement verifying key");
        Ok(verifier)
    }

    /// Key file when configured, development setup otherwise.
    ///
    /// # Errors
    ///
    /// As [`Self::from_file`] or [`Self::development`].
    pub fn from_config(config: &ResolutionConfig) -> Result<Self> {
        match &config.verifying_key_path {
            Some(path) => Self::from_file(path),
            None => Self::development(config.development_seed),
        }
    }
}

impl ProofVerifier for Groth16Verifier {
    fn verify(
        &self,
        proof: &[u8],
        inputs: &PublicInputs,
    ) -> std::result::Result<(), ExternalError> {
        let proof = Proof::<Bls12_381>::deserialize_compressed(proof)
            .map_err(|e| ExternalError::Malformed(format!("proof: {e}")))?;
        let public_inputs = field_inputs(inputs);
        let valid = Groth16::<Bls12_381>::verify_proof(&self.key, &proof, &public_inputs)
            .map_err(|e| ExternalError::Rejected(e.to_string()))?;
        debug!(valid, outcome_index = inputs.outcome_index, "Groth16 verification finished");
        if valid {
            Ok(())
        } else {
            Err(ExternalError::Rejected("pairing check failed".into()))
        }
    }
}
