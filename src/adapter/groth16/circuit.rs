//! Settlement circuit.
//!
//! Binds a proof to its four public inputs. The prover also supplies their
//! field sum as a witness, so a proof generated for one set of inputs does
//! not verify against another.

use ark_bls12_381::Fr;
use ark_r1cs_std::alloc::AllocVar;
use ark_r1cs_std::eq::EqGadget;
use ark_r1cs_std::fields::fp::FpVar;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

use crate::domain::proof::PublicInputs;

/// Public inputs in field form, in allocation order.
#[must_use]
pub fn field_inputs(inputs: &PublicInputs) -> [Fr; 4] {
    [
        Fr::from(inputs.market_commitment),
        Fr::from(u64::from(inputs.outcome_index)),
        signed(inputs.settled_at),
        Fr::from(u64::from(inputs.odds_bps)),
    ]
}

fn signed(value: i64) -> Fr {
    let magnitude = Fr::from(value.unsigned_abs());
    if value < 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Circuit proving knowledge of a settlement for the given inputs.
#[derive(Debug, Clone, Copy)]
pub struct SettlementCircuit {
    inputs: PublicInputs,
}

impl SettlementCircuit {
    #[must_use]
    pub const fn new(inputs: PublicInputs) -> Self {
        Self { inputs }
    }

    /// All-zero instance used for key generation.
    #[must_use]
    pub const fn blank() -> Self {
        Self::new(PublicInputs {
            market_commitment: 0,
            outcome_index: 0,
            settled_at: 0,
            odds_bps: 0,
        })
    }
}

impl ConstraintSynthesizer<Fr> for SettlementCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let [commitment, outcome, settled_at, odds] = field_inputs(&self.inputs);

        let commitment_var = FpVar::new_input(cs.clone(), || Ok(commitment))?;
        let outcome_var = FpVar::new_input(cs.clone(), || Ok(outcome))?;
        let settled_var = FpVar::new_input(cs.clone(), || Ok(settled_at))?;
        let odds_var = FpVar::new_input(cs.clone(), || Ok(odds))?;

        let checksum_var = FpVar::new_witness(cs, || Ok(commitment + outcome + settled_at + odds))?;
        let total = &commitment_var + &outcome_var + &settled_var + &odds_var;
        checksum_var.enforce_equal(&total)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_relations::r1cs::ConstraintSystem;

    #[test]
    fn satisfied_for_any_inputs() {
        let inputs = PublicInputs::for_market(&"m-1".into(), 2, 1_700_000_000, 3_000);
        let cs = ConstraintSystem::<Fr>::new_ref();
        SettlementCircuit::new(inputs).generate_constraints(cs.clone()).unwrap();
        assert!(cs.is_satisfied().unwrap());
        assert_eq!(cs.num_instance_variables(), 5);
    }

    #[test]
    fn negative_timestamps_map_to_distinct_elements() {
        assert_ne!(signed(-5), signed(5));
        assert_eq!(signed(-5) + signed(5), Fr::from(0u64));
    }
}
