//! Groth16 settlement proofs over BLS12-381.

pub mod circuit;
pub mod prover;
pub mod verifier;

pub use circuit::SettlementCircuit;
pub use prover::SettlementProver;
pub use verifier::Groth16Verifier;
