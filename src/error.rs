// src/error.rs
//! Error taxonomy for document verification and identity registration.
//!
//! Decoding failures carry the field path and the byte offset where decoding
//! stopped so malformed real-world documents can be diagnosed. The `reason`
//! strings describe the structural problem only and never embed document bytes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All failures surfaced by the verification core.
#[derive(Debug, Error)]
pub enum PassportError {
    #[error("malformed certificate: {field} at offset {offset}: {reason}")]
    MalformedCertificate {
        field: String,
        offset: usize,
        reason: String,
    },

    #[error("malformed security object: {field} at offset {offset}: {reason}")]
    MalformedSod {
        field: String,
        offset: usize,
        reason: String,
    },

    #[error("malformed document: {field} at offset {offset}: {reason}")]
    MalformedDocument {
        field: String,
        offset: usize,
        reason: String,
    },

    #[error("unsupported key algorithm: {0}")]
    UnsupportedKeyAlgorithm(String),

    #[error("no circuit registered for {document} documents with {family} keys")]
    UnsupportedCircuit { document: String, family: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("untrusted issuer: {0}")]
    UntrustedIssuer(String),

    #[error("trust tree root 0x{actual} does not match published root 0x{expected}")]
    StaleTrustTree { expected: String, actual: String },

    #[error("failed to fetch proof: {0}")]
    ProofFetchFailed(String),

    #[error("proof generation failed: {0}")]
    ProofGenerationFailed(String),

    #[error("registration submission failed: {0}")]
    RegistrationSubmissionFailed(String),

    #[error("passport is already registered with another identity key")]
    IdentityAlreadyRegisteredWithAnotherKey,

    #[error("a registration attempt is already in progress")]
    RegistrationInProgress,

    #[error("registration cancelled")]
    Cancelled,

    #[error("invalid proof: {0}")]
    InvalidProof(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Cloneable projection of [`PassportError`] used in observable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    MalformedCertificate,
    MalformedSod,
    MalformedDocument,
    UnsupportedKeyAlgorithm,
    UnsupportedCircuit,
    NotFound,
    UntrustedIssuer,
    StaleTrustTree,
    ProofFetchFailed,
    ProofGenerationFailed,
    RegistrationSubmissionFailed,
    IdentityAlreadyRegisteredWithAnotherKey,
    RegistrationInProgress,
    Cancelled,
    InvalidProof,
    Serialization,
}

impl PassportError {
    pub fn certificate(field: impl Into<String>, offset: usize, reason: impl Into<String>) -> Self {
        PassportError::MalformedCertificate {
            field: field.into(),
            offset,
            reason: reason.into(),
        }
    }

    pub fn sod(field: impl Into<String>, offset: usize, reason: impl Into<String>) -> Self {
        PassportError::MalformedSod {
            field: field.into(),
            offset,
            reason: reason.into(),
        }
    }

    pub fn document(field: impl Into<String>, offset: usize, reason: impl Into<String>) -> Self {
        PassportError::MalformedDocument {
            field: field.into(),
            offset,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PassportError::MalformedCertificate { .. } => ErrorKind::MalformedCertificate,
            PassportError::MalformedSod { .. } => ErrorKind::MalformedSod,
            PassportError::MalformedDocument { .. } => ErrorKind::MalformedDocument,
            PassportError::UnsupportedKeyAlgorithm(_) => ErrorKind::UnsupportedKeyAlgorithm,
            PassportError::UnsupportedCircuit { .. } => ErrorKind::UnsupportedCircuit,
            PassportError::NotFound(_) => ErrorKind::NotFound,
            PassportError::UntrustedIssuer(_) => ErrorKind::UntrustedIssuer,
            PassportError::StaleTrustTree { .. } => ErrorKind::StaleTrustTree,
            PassportError::ProofFetchFailed(_) => ErrorKind::ProofFetchFailed,
            PassportError::ProofGenerationFailed(_) => ErrorKind::ProofGenerationFailed,
            PassportError::RegistrationSubmissionFailed(_) => {
                ErrorKind::RegistrationSubmissionFailed
            }
            PassportError::IdentityAlreadyRegisteredWithAnotherKey => {
                ErrorKind::IdentityAlreadyRegisteredWithAnotherKey
            }
            PassportError::RegistrationInProgress => ErrorKind::RegistrationInProgress,
            PassportError::Cancelled => ErrorKind::Cancelled,
            PassportError::InvalidProof(_) => ErrorKind::InvalidProof,
            PassportError::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Transient network failures that the caller may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ProofFetchFailed | ErrorKind::RegistrationSubmissionFailed
        )
    }
}

pub type Result<T> = std::result::Result<T, PassportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoding_errors_carry_field_and_offset() {
        let err = PassportError::certificate("tbs.validity", 42, "unexpected tag 0x04");
        let msg = err.to_string();
        assert!(msg.contains("tbs.validity"));
        assert!(msg.contains("42"));
        assert_eq!(err.kind(), ErrorKind::MalformedCertificate);
    }

    #[test]
    fn test_only_network_failures_are_retryable() {
        assert!(PassportError::ProofFetchFailed("timeout".into()).is_retryable());
        assert!(PassportError::RegistrationSubmissionFailed("502".into()).is_retryable());
        assert!(!PassportError::UntrustedIssuer("x".into()).is_retryable());
        assert!(!PassportError::IdentityAlreadyRegisteredWithAnotherKey.is_retryable());
    }
}
