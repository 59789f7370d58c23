// src/utils/crypto.rs
//! Hash functions shared by the trust tree, the dispatcher and SOD checks.
//!
//! Keccak-256 is used for everything that must match the EVM contracts
//! bit-for-bit (tree nodes, certificate keys, data type tags). The SHA family
//! is only used to re-check data-group hashes recorded in a document's SOD.

use ethers::utils::keccak256;
use ring::digest;

/// Computes a Keccak-256 hash of the input data (Ethereum-compatible).
///
/// # Arguments
/// * `data` - Binary data to hash
///
/// # Returns
/// Fixed-size 32-byte array, identical to Solidity's `keccak256(data)`.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    keccak256(data)
}

/// Hashes an ordered pair of nodes, smaller value first.
///
/// Matches the commutative pair hashing used by on-chain Merkle proof
/// verifiers, so a proof needs no direction bits.
pub fn hash_sorted_pair(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(lo);
    buf[32..].copy_from_slice(hi);
    keccak256(buf)
}

/// Digest algorithms that appear in ICAO 9303 security objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum HashAlgorithm {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Label used in dispatcher names.
    pub fn label(self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "SHA1",
            HashAlgorithm::Sha224 => "SHA224",
            HashAlgorithm::Sha256 => "SHA256",
            HashAlgorithm::Sha384 => "SHA384",
            HashAlgorithm::Sha512 => "SHA512",
        }
    }

    /// Compression block size in bytes, which drives circuit input padding.
    pub fn block_size(self) -> usize {
        match self {
            HashAlgorithm::Sha1 | HashAlgorithm::Sha224 | HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha384 | HashAlgorithm::Sha512 => 128,
        }
    }

    pub fn output_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha224 => 28,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    /// Width of the big-endian message length field appended by SHA padding.
    pub fn length_field_size(self) -> usize {
        match self {
            HashAlgorithm::Sha384 | HashAlgorithm::Sha512 => 16,
            _ => 8,
        }
    }

    /// Computes the digest, or `None` when no backend implements the algorithm.
    ///
    /// `ring` has no SHA-224; documents hashed with it can still be parsed and
    /// classified but their data-group hashes cannot be re-checked locally.
    pub fn digest(self, data: &[u8]) -> Option<Vec<u8>> {
        let algorithm = match self {
            HashAlgorithm::Sha1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
            HashAlgorithm::Sha224 => return None,
            HashAlgorithm::Sha256 => &digest::SHA256,
            HashAlgorithm::Sha384 => &digest::SHA384,
            HashAlgorithm::Sha512 => &digest::SHA512,
        };
        Some(digest::digest(algorithm, data).as_ref().to_vec())
    }
}
