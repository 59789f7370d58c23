// src/blockchain/abi.rs
//! Calldata for the registration and SMT contracts.
//!
//! Field order and types are part of the wire contract with the deployed
//! contracts; the signatures below are hashed into selectors verbatim.

use ethers::abi::{self, ParamType, Token};
use ethers::types::U256;
use ethers::utils::id;
use num_bigint::BigUint;

use crate::error::{PassportError, Result};

pub const REGISTER_CERTIFICATE: &str =
    "registerCertificate((bytes32,bytes,uint256,uint256),(bytes,bytes),bytes32[])";
pub const REGISTER_IDENTITY: &str =
    "registerIdentity(bytes32,uint256,uint256,(bytes32,bytes,bytes,bytes32),bytes)";
pub const GET_PROOF: &str = "getProof(bytes32)";
pub const GET_PASSPORT_INFO: &str = "getPassportInfo(bytes32)";

/// Sparse Merkle tree proof returned by `getProof`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtProof {
    pub root: [u8; 32],
    /// In the order the contract returns them.
    pub siblings: Vec<[u8; 32]>,
    pub existence: bool,
}

impl SmtProof {
    /// Siblings zero-padded to the circuit's fixed depth.
    pub fn padded_siblings(&self, depth: usize) -> Vec<[u8; 32]> {
        let mut out = self.siblings.clone();
        out.resize(depth.max(out.len()), [0u8; 32]);
        out
    }
}

/// Binding of a passport key on the state keeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassportInfo {
    pub active_identity: [u8; 32],
    pub identity_reissue_counter: u64,
}

impl PassportInfo {
    pub fn is_bound(&self) -> bool {
        self.active_identity != [0u8; 32]
    }
}

/// Arguments of `registerCertificate`.
#[derive(Debug, Clone)]
pub struct CertificateRegistration {
    pub data_type: [u8; 32],
    /// TBS bytes of the document signer certificate.
    pub signed_attributes: Vec<u8>,
    pub key_offset: usize,
    pub expiration_offset: usize,
    /// Issuer's signature over the TBS bytes.
    pub signature: Vec<u8>,
    /// Key material of the issuing CSCA.
    pub public_key: Vec<u8>,
    pub trust_tree_siblings: Vec<[u8; 32]>,
}

/// Arguments of `registerIdentity`.
#[derive(Debug, Clone)]
pub struct IdentityRegistration {
    pub certificates_root: [u8; 32],
    pub identity_key: BigUint,
    pub dg_commit: BigUint,
    pub data_type: [u8; 32],
    /// Signature the circuit verified.
    pub signature: Vec<u8>,
    /// Key material of the certificate that verifies `signature`.
    pub public_key: Vec<u8>,
    pub passport_hash: [u8; 32],
    pub proof: Vec<u8>,
}

fn call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut data = id(signature).to_vec();
    data.extend(abi::encode(tokens));
    data
}

fn bytes32(value: &[u8; 32]) -> Token {
    Token::FixedBytes(value.to_vec())
}

fn uint(value: &BigUint, field: &str) -> Result<Token> {
    let bytes = value.to_bytes_be();
    if bytes.len() > 32 {
        return Err(PassportError::RegistrationSubmissionFailed(format!(
            "{} does not fit in uint256",
            field
        )));
    }
    Ok(Token::Uint(U256::from_big_endian(&bytes)))
}

pub fn encode_register_certificate(reg: &CertificateRegistration) -> Vec<u8> {
    call(
        REGISTER_CERTIFICATE,
        &[
            Token::Tuple(vec![
                bytes32(&reg.data_type),
                Token::Bytes(reg.signed_attributes.clone()),
                Token::Uint(U256::from(reg.key_offset)),
                Token::Uint(U256::from(reg.expiration_offset)),
            ]),
            Token::Tuple(vec![
                Token::Bytes(reg.signature.clone()),
                Token::Bytes(reg.public_key.clone()),
            ]),
            Token::Array(reg.trust_tree_siblings.iter().map(bytes32).collect()),
        ],
    )
}

pub fn encode_register_identity(reg: &IdentityRegistration) -> Result<Vec<u8>> {
    Ok(call(
        REGISTER_IDENTITY,
        &[
            bytes32(&reg.certificates_root),
            uint(&reg.identity_key, "identityKey")?,
            uint(&reg.dg_commit, "dgCommit")?,
            Token::Tuple(vec![
                bytes32(&reg.data_type),
                Token::Bytes(reg.signature.clone()),
                Token::Bytes(reg.public_key.clone()),
                bytes32(&reg.passport_hash),
            ]),
            Token::Bytes(reg.proof.clone()),
        ],
    ))
}

pub fn encode_get_proof(key: &[u8; 32]) -> Vec<u8> {
    call(GET_PROOF, &[bytes32(key)])
}

pub fn encode_get_passport_info(passport_key: &[u8; 32]) -> Vec<u8> {
    call(GET_PASSPORT_INFO, &[bytes32(passport_key)])
}

fn to_bytes32(token: Token) -> Option<[u8; 32]> {
    match token {
        Token::FixedBytes(b) if b.len() == 32 => {
            let mut out = [0u8; 32];
            out.copy_from_slice(&b);
            Some(out)
        }
        _ => None,
    }
}

fn malformed(call: &str) -> PassportError {
    PassportError::ProofFetchFailed(format!("unexpected {} return data", call))
}

pub fn decode_get_proof(data: &[u8]) -> Result<SmtProof> {
    let returns = abi::decode(
        &[ParamType::Tuple(vec![
            ParamType::FixedBytes(32),
            ParamType::Array(Box::new(ParamType::FixedBytes(32))),
            ParamType::Bool,
        ])],
        data,
    )
    .map_err(|e| PassportError::ProofFetchFailed(format!("getProof: {}", e)))?;

    let fields = match returns.into_iter().next() {
        Some(Token::Tuple(fields)) => fields,
        _ => return Err(malformed("getProof")),
    };
    let mut fields = fields.into_iter();
    let root = fields.next().and_then(to_bytes32).ok_or_else(|| malformed("getProof"))?;
    let siblings = match fields.next() {
        Some(Token::Array(items)) => items
            .into_iter()
            .map(to_bytes32)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| malformed("getProof"))?,
        _ => return Err(malformed("getProof")),
    };
    let existence = match fields.next() {
        Some(Token::Bool(b)) => b,
        _ => return Err(malformed("getProof")),
    };
    Ok(SmtProof {
        root,
        siblings,
        existence,
    })
}

pub fn decode_get_passport_info(data: &[u8]) -> Result<PassportInfo> {
    let returns = abi::decode(&[ParamType::FixedBytes(32), ParamType::Uint(64)], data)
        .map_err(|e| PassportError::ProofFetchFailed(format!("getPassportInfo: {}", e)))?;
    let mut fields = returns.into_iter();
    let active_identity = fields
        .next()
        .and_then(to_bytes32)
        .ok_or_else(|| malformed("getPassportInfo"))?;
    let identity_reissue_counter = match fields.next() {
        Some(Token::Uint(n)) if n <= U256::from(u64::MAX) => n.as_u64(),
        _ => return Err(malformed("getPassportInfo")),
    };
    Ok(PassportInfo {
        active_identity,
        identity_reissue_counter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::utils::hex;

    #[test]
    fn test_selectors() {
        let data = encode_get_proof(&[0u8; 32]);
        let digest = crate::utils::crypto::hash_data(GET_PROOF.as_bytes());
        assert_eq!(hex::encode(&data[..4]), hex::encode(&digest[..4]));
        assert_eq!(data.len(), 4 + 32);
    }

    #[test]
    fn test_decode_get_proof() {
        let encoded = abi::encode(&[Token::Tuple(vec![
            Token::FixedBytes(vec![7u8; 32]),
            Token::Array(vec![
                Token::FixedBytes(vec![1u8; 32]),
                Token::FixedBytes(vec![2u8; 32]),
            ]),
            Token::Bool(true),
        ])]);
        let proof = decode_get_proof(&encoded).unwrap();
        assert_eq!(proof.root, [7u8; 32]);
        assert_eq!(proof.siblings, vec![[1u8; 32], [2u8; 32]]);
        assert!(proof.existence);

        let padded = proof.padded_siblings(4);
        assert_eq!(padded.len(), 4);
        assert_eq!(&padded[..2], &proof.siblings[..]);
        assert_eq!(padded[3], [0u8; 32]);
    }

    #[test]
    fn test_decode_garbage_is_fetch_failure() {
        let err = decode_get_proof(&[1, 2, 3]).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_passport_info() {
        let encoded = abi::encode(&[Token::FixedBytes(vec![0u8; 32]), Token::Uint(U256::from(3u8))]);
        let info = decode_get_passport_info(&encoded).unwrap();
        assert!(!info.is_bound());
        assert_eq!(info.identity_reissue_counter, 3);
    }

    #[test]
    fn test_register_identity_rejects_oversized_numbers() {
        let reg = IdentityRegistration {
            certificates_root: [0u8; 32],
            identity_key: BigUint::from(1u8) << 256,
            dg_commit: BigUint::from(1u8),
            data_type: [0u8; 32],
            signature: vec![],
            public_key: vec![],
            passport_hash: [0u8; 32],
            proof: vec![],
        };
        assert!(encode_register_identity(&reg).is_err());
    }

    #[test]
    fn test_register_certificate_layout() {
        let reg = CertificateRegistration {
            data_type: [9u8; 32],
            signed_attributes: vec![1, 2, 3],
            key_offset: 10,
            expiration_offset: 20,
            signature: vec![4],
            public_key: vec![5],
            trust_tree_siblings: vec![[6u8; 32]],
        };
        let data = encode_register_certificate(&reg);
        assert_eq!(&data[..4], &id(REGISTER_CERTIFICATE)[..]);
        let decoded = abi::decode(
            &[
                ParamType::Tuple(vec![
                    ParamType::FixedBytes(32),
                    ParamType::Bytes,
                    ParamType::Uint(256),
                    ParamType::Uint(256),
                ]),
                ParamType::Tuple(vec![ParamType::Bytes, ParamType::Bytes]),
                ParamType::Array(Box::new(ParamType::FixedBytes(32))),
            ],
            &data[4..],
        )
        .unwrap();
        match &decoded[0] {
            Token::Tuple(f) => {
                assert_eq!(f[2], Token::Uint(U256::from(10u8)));
                assert_eq!(f[3], Token::Uint(U256::from(20u8)));
            }
            other => panic!("unexpected token {:?}", other),
        }
    }
}
