//! Proof verifier port.

use crate::domain::proof::PublicInputs;
use crate::error::ExternalError;

/// Cryptographic check of a serialized settlement proof.
///
/// Verification is CPU-bound and synchronous; callers move it off the
/// async runtime.
pub trait ProofVerifier: Send + Sync {
    /// `Ok(())` only if `proof` is valid for `inputs`.
    ///
    /// # Errors
    ///
    /// [`ExternalError::Malformed`] for bytes that do not decode,
    /// [`ExternalError::Rejected`] for a proof that does not verify.
    fn verify(&self, proof: &[u8], inputs: &PublicInputs) -> Result<(), ExternalError>;
}
