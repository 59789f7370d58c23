// src/dispatcher/mod.rs
//! Algorithm dispatcher.
//!
//! Maps a certificate's key algorithm, curve, signature hash and key size to
//! the canonical dispatcher name, e.g. `RSA_SHA256_2048` or
//! `ECDSA_SECP256R1_SHA256_512`. The name selects a circuit and its keccak-256
//! hash is the on-chain certificate data type.

use std::fmt;

use log::debug;
use serde::Serialize;

use crate::certificate::oids::{self, ObjectId};
use crate::certificate::{Certificate, CurveParameters, KeyAlgorithm, PublicKey};
use crate::error::{PassportError, Result};
use crate::utils::crypto::{hash_data, HashAlgorithm};

/// Signature scheme family of a certificate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum KeyFamily {
    Rsa,
    Ecdsa,
}

impl KeyFamily {
    pub fn label(self) -> &'static str {
        match self {
            KeyFamily::Rsa => "RSA",
            KeyFamily::Ecdsa => "ECDSA",
        }
    }
}

impl fmt::Display for KeyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of classifying a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dispatcher {
    pub family: KeyFamily,
    pub curve: Option<&'static str>,
    pub hash: Option<HashAlgorithm>,
    /// Modulus bits for RSA, `X || Y` bits for ECDSA.
    pub bits: usize,
    pub name: String,
}

impl Dispatcher {
    pub fn new(
        family: KeyFamily,
        curve: Option<&'static str>,
        hash: Option<HashAlgorithm>,
        bits: usize,
    ) -> Self {
        let mut parts = vec![family.label().to_string()];
        if let Some(c) = curve {
            parts.push(c.to_string());
        }
        if let Some(h) = hash {
            parts.push(h.label().to_string());
        }
        parts.push(bits.to_string());
        Dispatcher {
            family,
            curve,
            hash,
            bits,
            name: parts.join("_"),
        }
    }

    /// On-chain certificate data type: `keccak256(name)`.
    pub fn data_type(&self) -> [u8; 32] {
        hash_data(self.name.as_bytes())
    }
}

impl fmt::Display for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Classifies a certificate's public key.
///
/// # Errors
/// `UnsupportedKeyAlgorithm` for RSASSA-PSS, EC keys without a known named
/// curve, compressed EC points and every other key algorithm.
pub fn classify(certificate: &Certificate) -> Result<Dispatcher> {
    let hash = signature_hash(certificate.signature_algorithm())?;
    let dispatcher = match (certificate.key_algorithm(), certificate.public_key()) {
        (KeyAlgorithm::Rsa, PublicKey::Rsa { .. }) => {
            let bits = certificate.public_key().key_material().len() * 8;
            Dispatcher::new(KeyFamily::Rsa, None, hash, bits)
        }
        (KeyAlgorithm::Ec(CurveParameters::Named(curve)), PublicKey::Ec { point }) => {
            let curve = oids::curve_name(curve).ok_or_else(|| {
                PassportError::UnsupportedKeyAlgorithm(format!("EC curve {}", curve))
            })?;
            if point.first() != Some(&0x04) || point.len() < 3 || point.len() % 2 == 0 {
                return Err(PassportError::UnsupportedKeyAlgorithm(
                    "EC point is not in uncompressed form".to_string(),
                ));
            }
            Dispatcher::new(KeyFamily::Ecdsa, Some(curve), hash, (point.len() - 1) * 8)
        }
        (KeyAlgorithm::Ec(CurveParameters::Explicit), _) => {
            return Err(PassportError::UnsupportedKeyAlgorithm(
                "EC key with explicit curve parameters".to_string(),
            ))
        }
        (KeyAlgorithm::Ec(CurveParameters::Implicit), _) => {
            return Err(PassportError::UnsupportedKeyAlgorithm(
                "EC key with implicit curve parameters".to_string(),
            ))
        }
        (KeyAlgorithm::RsaPss, _) => {
            return Err(PassportError::UnsupportedKeyAlgorithm("RSASSA-PSS".to_string()))
        }
        (KeyAlgorithm::Other(oid), _) => {
            return Err(PassportError::UnsupportedKeyAlgorithm(oid.to_string()))
        }
        (alg, _) => {
            return Err(PassportError::UnsupportedKeyAlgorithm(format!(
                "{:?} key could not be decoded",
                alg
            )))
        }
    };
    debug!("classified certificate as {}", dispatcher);
    Ok(dispatcher)
}

/// Hash half of the signature algorithm. Unknown OIDs yield no label, PSS
/// signatures are refused.
fn signature_hash(oid: &ObjectId) -> Result<Option<HashAlgorithm>> {
    if oid.is(oids::RSASSA_PSS) {
        return Err(PassportError::UnsupportedKeyAlgorithm(
            "RSASSA-PSS signature".to_string(),
        ));
    }
    Ok(oids::signature_hash(oid))
}
