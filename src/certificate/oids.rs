// src/certificate/oids.rs
//! Object identifiers (DER content bytes) used by X.509 and ICAO 9303.

use std::fmt;

use crate::utils::crypto::HashAlgorithm;

// Public key algorithms
pub const RSA_ENCRYPTION: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01];
pub const RSASSA_PSS: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0A];
pub const EC_PUBLIC_KEY: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x02, 0x01];

// Signature algorithms
pub const SHA1_WITH_RSA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x05];
pub const SHA256_WITH_RSA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0B];
pub const SHA384_WITH_RSA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0C];
pub const SHA512_WITH_RSA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0D];
pub const SHA224_WITH_RSA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0E];
pub const ECDSA_WITH_SHA1: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x04, 0x01];
pub const ECDSA_WITH_SHA224: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x04, 0x03, 0x01];
pub const ECDSA_WITH_SHA256: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x04, 0x03, 0x02];
pub const ECDSA_WITH_SHA384: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x04, 0x03, 0x03];
pub const ECDSA_WITH_SHA512: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x04, 0x03, 0x04];

// Digest algorithms
pub const SHA1: &[u8] = &[0x2B, 0x0E, 0x03, 0x02, 0x1A];
pub const SHA256: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];
pub const SHA384: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02];
pub const SHA512: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03];
pub const SHA224: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x04];

// Named curves
pub const SECP224R1: &[u8] = &[0x2B, 0x81, 0x04, 0x00, 0x21];
pub const SECP256R1: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07];
pub const SECP384R1: &[u8] = &[0x2B, 0x81, 0x04, 0x00, 0x22];
pub const SECP521R1: &[u8] = &[0x2B, 0x81, 0x04, 0x00, 0x23];
pub const BRAINPOOL_P224R1: &[u8] = &[0x2B, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x05];
pub const BRAINPOOL_P256R1: &[u8] = &[0x2B, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x07];
pub const BRAINPOOL_P320R1: &[u8] = &[0x2B, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x09];
pub const BRAINPOOL_P384R1: &[u8] = &[0x2B, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x0B];
pub const BRAINPOOL_P512R1: &[u8] = &[0x2B, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x0D];

// CMS / ICAO
pub const SIGNED_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x02];
pub const LDS_SECURITY_OBJECT: &[u8] = &[0x67, 0x81, 0x08, 0x01, 0x01, 0x01];
pub const CONTENT_TYPE: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x03];
pub const MESSAGE_DIGEST: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x04];

// Name attributes
pub const COMMON_NAME: &[u8] = &[0x55, 0x04, 0x03];
pub const SURNAME: &[u8] = &[0x55, 0x04, 0x04];
pub const COUNTRY_NAME: &[u8] = &[0x55, 0x04, 0x06];
pub const GIVEN_NAME: &[u8] = &[0x55, 0x04, 0x2A];

// Extensions
pub const SUBJECT_KEY_IDENTIFIER: &[u8] = &[0x55, 0x1D, 0x0E];
pub const AUTHORITY_KEY_IDENTIFIER: &[u8] = &[0x55, 0x1D, 0x23];

/// An object identifier kept in its DER content form.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ObjectId(pub Vec<u8>);

impl ObjectId {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is(&self, oid: &[u8]) -> bool {
        self.0 == oid
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut arcs: Vec<u64> = Vec::new();
        let mut acc: u64 = 0;
        for b in &self.0 {
            acc = (acc << 7) | u64::from(b & 0x7F);
            if b & 0x80 == 0 {
                if arcs.is_empty() {
                    let first = (acc / 40).min(2);
                    arcs.push(first);
                    arcs.push(acc - first * 40);
                } else {
                    arcs.push(acc);
                }
                acc = 0;
            }
        }
        let dotted: Vec<String> = arcs.iter().map(u64::to_string).collect();
        write!(f, "{}", dotted.join("."))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self)
    }
}

/// Digest algorithm identified by a bare digest OID (LDS, SignerInfo).
pub fn digest_algorithm(oid: &ObjectId) -> Option<HashAlgorithm> {
    match oid.as_bytes() {
        SHA1 => Some(HashAlgorithm::Sha1),
        SHA224 => Some(HashAlgorithm::Sha224),
        SHA256 => Some(HashAlgorithm::Sha256),
        SHA384 => Some(HashAlgorithm::Sha384),
        SHA512 => Some(HashAlgorithm::Sha512),
        _ => None,
    }
}

/// Digest half of a combined signature algorithm OID.
pub fn signature_hash(oid: &ObjectId) -> Option<HashAlgorithm> {
    match oid.as_bytes() {
        SHA1_WITH_RSA | ECDSA_WITH_SHA1 => Some(HashAlgorithm::Sha1),
        SHA224_WITH_RSA | ECDSA_WITH_SHA224 => Some(HashAlgorithm::Sha224),
        SHA256_WITH_RSA | ECDSA_WITH_SHA256 => Some(HashAlgorithm::Sha256),
        SHA384_WITH_RSA | ECDSA_WITH_SHA384 => Some(HashAlgorithm::Sha384),
        SHA512_WITH_RSA | ECDSA_WITH_SHA512 => Some(HashAlgorithm::Sha512),
        _ => None,
    }
}

/// Name used in dispatcher strings for a named curve.
pub fn curve_name(oid: &ObjectId) -> Option<&'static str> {
    match oid.as_bytes() {
        SECP224R1 => Some("SECP224R1"),
        SECP256R1 => Some("SECP256R1"),
        SECP384R1 => Some("SECP384R1"),
        SECP521R1 => Some("SECP521R1"),
        BRAINPOOL_P224R1 => Some("BRAINPOOLP224R1"),
        BRAINPOOL_P256R1 => Some("BRAINPOOLP256R1"),
        BRAINPOOL_P320R1 => Some("BRAINPOOLP320R1"),
        BRAINPOOL_P384R1 => Some("BRAINPOOLP384R1"),
        BRAINPOOL_P512R1 => Some("BRAINPOOLP512R1"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotted_display() {
        assert_eq!(ObjectId(RSA_ENCRYPTION.to_vec()).to_string(), "1.2.840.113549.1.1.1");
        assert_eq!(ObjectId(SECP384R1.to_vec()).to_string(), "1.3.132.0.34");
        assert_eq!(ObjectId(LDS_SECURITY_OBJECT.to_vec()).to_string(), "2.23.136.1.1.1");
        assert_eq!(ObjectId(SHA256.to_vec()).to_string(), "2.16.840.1.101.3.4.2.1");
    }

    #[test]
    fn test_signature_hash_lookup() {
        assert_eq!(
            signature_hash(&ObjectId(SHA256_WITH_RSA.to_vec())),
            Some(HashAlgorithm::Sha256)
        );
        assert_eq!(
            signature_hash(&ObjectId(ECDSA_WITH_SHA384.to_vec())),
            Some(HashAlgorithm::Sha384)
        );
        assert_eq!(signature_hash(&ObjectId(RSASSA_PSS.to_vec())), None);
    }
}
