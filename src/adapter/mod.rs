//! Implementations of ports and process-edge inputs and outputs.

pub mod cli;
pub mod groth16;
pub mod status;
