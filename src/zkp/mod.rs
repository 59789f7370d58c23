// src/zkp/mod.rs
pub mod circuit_inputs;
pub mod proof_verification;
pub mod prover;

pub use circuit_inputs::{CircuitInputs, NumericFormat};
pub use proof_verification::RegistrationVerifier;
pub use prover::{HttpProver, Prover};
