// src/models/identity.rs
//! Identity derived from a registered document.
//!
//! The derived fields are projections of fixed indices of the registration
//! circuit's public signals. The indices and the circuit output order are
//! one contract, versioned by [`PUBLIC_SIGNALS_VERSION`].

use num_bigint::BigUint;
use serde::de::Error as _;
use serde::{Deserialize, Serialize};

use super::document::Document;
use crate::error::{PassportError, Result};
use crate::utils::serialization::{self, base64_bytes, decimal_biguints};

pub const PUBLIC_SIGNALS_VERSION: u32 = 1;

pub const IDENTITY_KEY_INDEX: usize = 0;
pub const PASSPORT_HASH_INDEX: usize = 1;
pub const DG1_COMMITMENT_INDEX: usize = 2;
pub const PUBLIC_KEY_INDEX: usize = 3;
pub const CERTIFICATES_ROOT_INDEX: usize = 4;
pub const PUBLIC_SIGNAL_COUNT: usize = 5;

/// Proof bytes and public signals as produced by the prover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationProof {
    #[serde(with = "base64_bytes")]
    pub proof: Vec<u8>,
    #[serde(with = "decimal_biguints")]
    pub public_signals: Vec<BigUint>,
}

impl RegistrationProof {
    pub fn signal(&self, index: usize) -> Option<&BigUint> {
        self.public_signals.get(index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    document: Document,
    proof: RegistrationProof,
}

#[derive(Serialize, Deserialize)]
struct IdentityBlob {
    version: u32,
    document: Document,
    proof: RegistrationProof,
}

impl Identity {
    /// Binds a document to its registration proof.
    ///
    /// # Errors
    /// `InvalidProof` if the proof carries fewer public signals than the
    /// contract requires.
    pub fn new(document: Document, proof: RegistrationProof) -> Result<Self> {
        if proof.public_signals.len() < PUBLIC_SIGNAL_COUNT {
            return Err(PassportError::InvalidProof(format!(
                "{} public signals, expected {}",
                proof.public_signals.len(),
                PUBLIC_SIGNAL_COUNT
            )));
        }
        Ok(Self { document, proof })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn proof(&self) -> &RegistrationProof {
        &self.proof
    }

    fn signal(&self, index: usize) -> &BigUint {
        // length checked in `new`
        &self.proof.public_signals[index]
    }

    /// Passport key the identity is registered under.
    pub fn identity_key(&self) -> &BigUint {
        self.signal(IDENTITY_KEY_INDEX)
    }

    pub fn passport_hash(&self) -> &BigUint {
        self.signal(PASSPORT_HASH_INDEX)
    }

    pub fn dg1_commitment(&self) -> &BigUint {
        self.signal(DG1_COMMITMENT_INDEX)
    }

    /// Hash of the identity public key.
    pub fn public_key(&self) -> &BigUint {
        self.signal(PUBLIC_KEY_INDEX)
    }

    pub fn certificates_root(&self) -> &BigUint {
        self.signal(CERTIFICATES_ROOT_INDEX)
    }

    /// Versioned JSON blob for persistence.
    pub fn serialize(&self) -> Result<String> {
        let blob = IdentityBlob {
            version: PUBLIC_SIGNALS_VERSION,
            document: self.document.clone(),
            proof: self.proof.clone(),
        };
        Ok(serialization::serialize(&blob)?)
    }

    /// # Errors
    /// `Serialization` for malformed JSON or an unknown version,
    /// `InvalidProof` for a truncated signal array.
    pub fn deserialize(data: &str) -> Result<Self> {
        let blob: IdentityBlob = serialization::deserialize(data)?;
        if blob.version != PUBLIC_SIGNALS_VERSION {
            return Err(PassportError::Serialization(serde_json::Error::custom(
                format!("unsupported identity version {}", blob.version),
            )));
        }
        Self::new(blob.document, blob.proof)
    }
}

/// Big-endian 32-byte form of a field element, for `bytes32` ABI slots.
pub fn to_bytes32(value: &BigUint) -> Option<[u8; 32]> {
    let bytes = value.to_bytes_be();
    if bytes.len() > 32 {
        return None;
    }
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    Some(out)
}
