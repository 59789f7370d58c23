// src/zkp/proof_verification.rs
//! # Registration Proof Verification
//!
//! Local Groth16 check of a registration proof over BN254 before it is
//! submitted. The verifying key is produced by the circuit's trusted setup
//! and loaded from disk; it is never regenerated here.
//!
//! ## Encoding
//! - Verifying key and proof: arkworks compressed canonical serialization
//! - Public signals: field elements in canonical form (below the modulus)

use std::path::Path;

use ark_bn254::{Bn254, Fr};
use ark_ff::PrimeField;
use ark_groth16::{Groth16, Proof, VerifyingKey};
use ark_serialize::CanonicalDeserialize;
use ark_snark::SNARK;
use log::debug;
use num_bigint::BigUint;

use crate::error::{PassportError, Result};
use crate::models::identity::RegistrationProof;

fn invalid(e: impl std::fmt::Display) -> PassportError {
    PassportError::InvalidProof(e.to_string())
}

/// Maps public signals into the scalar field.
///
/// # Errors
/// `InvalidProof` for a signal at or above the field modulus; reducing it
/// silently would verify a different statement.
pub fn signals_to_field(signals: &[BigUint]) -> Result<Vec<Fr>> {
    let modulus: BigUint = Fr::MODULUS.into();
    signals
        .iter()
        .enumerate()
        .map(|(i, s)| {
            if s >= &modulus {
                return Err(invalid(format!("public signal {} is not a field element", i)));
            }
            Ok(Fr::from_be_bytes_mod_order(&s.to_bytes_be()))
        })
        .collect()
}

/// Verifying key for one registration circuit.
#[derive(Clone)]
pub struct RegistrationVerifier {
    vk: VerifyingKey<Bn254>,
}

impl RegistrationVerifier {
    /// # Errors
    /// `InvalidProof` if the key does not deserialize.
    pub fn from_bytes(vk_bytes: &[u8]) -> Result<Self> {
        let vk = VerifyingKey::<Bn254>::deserialize_compressed(vk_bytes)
            .map_err(|e| invalid(format!("verifying key: {}", e)))?;
        Ok(Self { vk })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| invalid(format!("verifying key {}: {}", path.display(), e)))?;
        Self::from_bytes(&bytes)
    }

    /// Verifies `proof` against its own public signals.
    ///
    /// # Returns
    /// `Ok(false)` for a well-formed proof that does not verify.
    ///
    /// # Errors
    /// `InvalidProof` for undecodable proof bytes or out-of-range signals.
    pub fn verify(&self, proof: &RegistrationProof) -> Result<bool> {
        let decoded = Proof::<Bn254>::deserialize_compressed(&proof.proof[..])
            .map_err(|e| invalid(format!("proof: {}", e)))?;
        let inputs = signals_to_field(&proof.public_signals)?;
        let valid = Groth16::<Bn254>::verify(&self.vk, &inputs, &decoded).map_err(invalid)?;
        debug!("groth16 verification over {} signals: {}", inputs.len(), valid);
        Ok(valid)
    }
}
