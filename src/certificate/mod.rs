// src/certificate/mod.rs
//! Certificate model: X.509 certificates and the document security object.

pub mod asn1;
pub mod oids;
pub mod sod;
pub mod x509;

pub use sod::{DataGroupHash, SecurityObject};
pub use x509::{Certificate, CurveParameters, KeyAlgorithm, PublicKey};

use crate::error::Result;

/// Parses a DER encoded X.509 certificate.
pub fn parse(bytes: &[u8]) -> Result<Certificate> {
    Certificate::parse(bytes)
}

/// Parses EF.SOD.
pub fn parse_sod(bytes: &[u8]) -> Result<SecurityObject> {
    SecurityObject::parse(bytes)
}
