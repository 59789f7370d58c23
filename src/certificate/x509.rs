// src/certificate/x509.rs
//! X.509 certificate model.
//!
//! Parses the fields the registration flow needs and records two byte offsets
//! inside the to-be-signed (TBS) region: where the public key material starts
//! and where the `notAfter` time starts. Contracts and circuits re-derive these
//! from the TBS bytes independently, so they are computed from standard field
//! order only:
//!
//! ```text
//! TBSCertificate ::= SEQUENCE {
//!     version [0] EXPLICIT, serialNumber, signature, issuer,
//!     validity SEQUENCE { notBefore, notAfter },
//!     subject, subjectPublicKeyInfo, [1], [2], extensions [3] EXPLICIT }
//! ```
//!
//! Offsets are relative to the first byte of the TBS SEQUENCE header.

use log::debug;

use super::asn1::{self, DerError, DerReader, Tlv};
use super::oids::{self, ObjectId};
use crate::error::{PassportError, Result};
use crate::utils::crypto::hash_data;

/// Parameters of an EC public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurveParameters {
    Named(ObjectId),
    /// Inline `ECParameters`; not matched against known curves.
    Explicit,
    /// `implicitlyCA` (NULL).
    Implicit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa,
    RsaPss,
    Ec(CurveParameters),
    Other(ObjectId),
}

/// Decoded subject public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Rsa {
        /// INTEGER content as encoded, including a sign byte if present.
        modulus: Vec<u8>,
        exponent: Vec<u8>,
    },
    Ec {
        /// SEC1 point encoding, `04 || X || Y` when uncompressed.
        point: Vec<u8>,
    },
    Unparsed(Vec<u8>),
}

impl PublicKey {
    /// Significant key bytes: the modulus without its sign byte, or the EC
    /// coordinates without the point-format prefix.
    pub fn key_material(&self) -> &[u8] {
        match self {
            PublicKey::Rsa { modulus, .. } => asn1::strip_integer_padding(modulus),
            PublicKey::Ec { point } => match point.split_first() {
                Some((0x04, coords)) => coords,
                _ => point,
            },
            PublicKey::Unparsed(raw) => raw,
        }
    }
}

/// A parsed, immutable X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    raw: Vec<u8>,
    tbs: Vec<u8>,
    serial: Vec<u8>,
    issuer: Vec<u8>,
    subject: Vec<u8>,
    not_before: String,
    not_after: String,
    key_algorithm: KeyAlgorithm,
    public_key: PublicKey,
    signature_algorithm: ObjectId,
    signature: Vec<u8>,
    public_key_offset: usize,
    expiration_offset: usize,
    subject_key_id: Option<Vec<u8>>,
    authority_key_id: Option<Vec<u8>>,
}

fn malformed(field: &str) -> impl Fn(DerError) -> PassportError + '_ {
    move |e| PassportError::certificate(field, e.offset, e.reason)
}

impl Certificate {
    /// Parses a DER encoded certificate.
    ///
    /// # Errors
    /// `MalformedCertificate` naming the field and byte offset where decoding
    /// failed. Trailing bytes after the certificate are rejected too.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut top = DerReader::new(bytes);
        let cert = top.expect(asn1::TAG_SEQUENCE).map_err(malformed("certificate"))?;
        if !top.is_empty() {
            return Err(PassportError::certificate(
                "certificate",
                cert.end,
                "trailing bytes after certificate",
            ));
        }
        let mut outer = cert.children();
        let tbs = outer.expect(asn1::TAG_SEQUENCE).map_err(malformed("tbsCertificate"))?;
        let sig_alg = outer
            .expect(asn1::TAG_SEQUENCE)
            .map_err(malformed("signatureAlgorithm"))?;
        let signature_algorithm = read_algorithm_oid(&sig_alg).map_err(malformed("signatureAlgorithm"))?;
        let sig_value = outer.read().map_err(malformed("signatureValue"))?;
        let (_, signature) = sig_value
            .bit_string_payload()
            .map_err(malformed("signatureValue"))?;

        let mut fields = tbs.children();
        fields
            .read_optional(asn1::context(0))
            .map_err(malformed("tbs.version"))?;
        let serial = fields.expect(asn1::TAG_INTEGER).map_err(malformed("tbs.serialNumber"))?;
        fields.expect(asn1::TAG_SEQUENCE).map_err(malformed("tbs.signature"))?;
        let issuer = fields.expect(asn1::TAG_SEQUENCE).map_err(malformed("tbs.issuer"))?;
        let validity = fields.expect(asn1::TAG_SEQUENCE).map_err(malformed("tbs.validity"))?;
        let subject = fields.expect(asn1::TAG_SEQUENCE).map_err(malformed("tbs.subject"))?;
        let spki = fields
            .expect(asn1::TAG_SEQUENCE)
            .map_err(malformed("tbs.subjectPublicKeyInfo"))?;

        let mut times = validity.children();
        let not_before = read_time(&mut times).map_err(malformed("tbs.validity.notBefore"))?;
        let not_after_tlv = times.read().map_err(malformed("tbs.validity.notAfter"))?;
        let not_after = time_string(&not_after_tlv).map_err(malformed("tbs.validity.notAfter"))?;

        let (key_algorithm, public_key, key_start) =
            read_public_key(&spki).map_err(malformed("tbs.subjectPublicKeyInfo"))?;

        let mut subject_key_id = None;
        let mut authority_key_id = None;
        while !fields.is_empty() {
            let field = fields.read().map_err(malformed("tbs.extensions"))?;
            if field.tag == asn1::context(3) {
                let ids = read_key_identifiers(&field).map_err(malformed("tbs.extensions"))?;
                subject_key_id = ids.0;
                authority_key_id = ids.1;
            }
        }

        let public_key_offset = key_start - tbs.start;
        let expiration_offset = not_after_tlv.content_start - tbs.start;
        debug!(
            "parsed certificate: tbs {} bytes, key offset {}, expiration offset {}",
            tbs.raw().len(),
            public_key_offset,
            expiration_offset
        );

        Ok(Certificate {
            raw: cert.raw().to_vec(),
            tbs: tbs.raw().to_vec(),
            serial: serial.content().to_vec(),
            issuer: issuer.raw().to_vec(),
            subject: subject.raw().to_vec(),
            not_before,
            not_after,
            key_algorithm,
            public_key,
            signature_algorithm,
            signature: signature.to_vec(),
            public_key_offset,
            expiration_offset,
            subject_key_id,
            authority_key_id,
        })
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// The signed region, header included.
    pub fn tbs(&self) -> &[u8] {
        &self.tbs
    }

    pub fn serial(&self) -> &[u8] {
        &self.serial
    }

    /// DER encoded issuer Name.
    pub fn issuer(&self) -> &[u8] {
        &self.issuer
    }

    /// DER encoded subject Name.
    pub fn subject(&self) -> &[u8] {
        &self.subject
    }

    pub fn not_before(&self) -> &str {
        &self.not_before
    }

    pub fn not_after(&self) -> &str {
        &self.not_after
    }

    pub fn key_algorithm(&self) -> &KeyAlgorithm {
        &self.key_algorithm
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn signature_algorithm(&self) -> &ObjectId {
        &self.signature_algorithm
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Offset inside [`Certificate::tbs`] of the first significant key byte.
    pub fn public_key_offset(&self) -> usize {
        self.public_key_offset
    }

    /// Offset inside [`Certificate::tbs`] of the `notAfter` time characters.
    pub fn expiration_offset(&self) -> usize {
        self.expiration_offset
    }

    pub fn subject_key_id(&self) -> Option<&[u8]> {
        self.subject_key_id.as_deref()
    }

    pub fn authority_key_id(&self) -> Option<&[u8]> {
        self.authority_key_id.as_deref()
    }

    /// Stable identifier derived from the key material only, so it does not
    /// depend on how or in which order certificates were serialized.
    pub fn key_id(&self) -> [u8; 32] {
        hash_data(self.public_key.key_material())
    }

    /// `notAfter` as UTC, if the time string is well formed.
    pub fn expires_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        parse_asn1_time(&self.not_after)
    }
}

fn read_algorithm_oid(alg: &Tlv<'_>) -> std::result::Result<ObjectId, DerError> {
    let oid = alg.children().expect(asn1::TAG_OID)?;
    Ok(ObjectId(oid.content().to_vec()))
}

fn time_string(tlv: &Tlv<'_>) -> std::result::Result<String, DerError> {
    match tlv.tag {
        asn1::TAG_UTC_TIME | asn1::TAG_GENERALIZED_TIME => tlv.as_string(),
        other => Err(DerError::new(
            tlv.start,
            format!("expected a time value, found tag 0x{:02x}", other),
        )),
    }
}

fn read_time(reader: &mut DerReader<'_>) -> std::result::Result<String, DerError> {
    let tlv = reader.read()?;
    time_string(&tlv)
}

/// Returns the algorithm, the decoded key and the absolute offset of the
/// first significant key byte.
fn read_public_key(
    spki: &Tlv<'_>,
) -> std::result::Result<(KeyAlgorithm, PublicKey, usize), DerError> {
    let mut parts = spki.children();
    let alg = parts.expect(asn1::TAG_SEQUENCE)?;
    let key_bits = parts.read()?;
    let (payload_start, payload) = key_bits.bit_string_payload()?;

    let mut alg_parts = alg.children();
    let oid = ObjectId(alg_parts.expect(asn1::TAG_OID)?.content().to_vec());

    if oid.is(oids::RSA_ENCRYPTION) {
        let mut key = key_bits.bit_string_children()?;
        let rsa = key.expect(asn1::TAG_SEQUENCE)?;
        let mut ints = rsa.children();
        let modulus = ints.expect(asn1::TAG_INTEGER)?;
        let exponent = ints.expect(asn1::TAG_INTEGER)?;
        let padding = modulus.len() - asn1::strip_integer_padding(modulus.content()).len();
        return Ok((
            KeyAlgorithm::Rsa,
            PublicKey::Rsa {
                modulus: modulus.content().to_vec(),
                exponent: exponent.content().to_vec(),
            },
            modulus.content_start + padding,
        ));
    }

    if oid.is(oids::EC_PUBLIC_KEY) {
        let params = match alg_parts.read() {
            Ok(p) if p.tag == asn1::TAG_OID => CurveParameters::Named(ObjectId(p.content().to_vec())),
            Ok(p) if p.tag == asn1::TAG_NULL => CurveParameters::Implicit,
            Ok(_) => CurveParameters::Explicit,
            Err(e) => return Err(e),
        };
        let prefix = usize::from(payload.first() == Some(&0x04));
        return Ok((
            KeyAlgorithm::Ec(params),
            PublicKey::Ec {
                point: payload.to_vec(),
            },
            payload_start + prefix,
        ));
    }

    let algorithm = if oid.is(oids::RSASSA_PSS) {
        KeyAlgorithm::RsaPss
    } else {
        KeyAlgorithm::Other(oid)
    };
    Ok((algorithm, PublicKey::Unparsed(payload.to_vec()), payload_start))
}

/// Subject and authority key identifiers from the `[3]` extensions block.
fn read_key_identifiers(
    block: &Tlv<'_>,
) -> std::result::Result<(Option<Vec<u8>>, Option<Vec<u8>>), DerError> {
    let mut subject = None;
    let mut authority = None;
    let extensions = block.children().expect(asn1::TAG_SEQUENCE)?;
    let mut list = extensions.children();
    while !list.is_empty() {
        let ext = list.expect(asn1::TAG_SEQUENCE)?;
        let mut parts = ext.children();
        let oid = ObjectId(parts.expect(asn1::TAG_OID)?.content().to_vec());
        parts.read_optional(asn1::TAG_BOOLEAN)?;
        let value = parts.expect(asn1::TAG_OCTET_STRING)?;
        if oid.is(oids::SUBJECT_KEY_IDENTIFIER) {
            let id = value.children().expect(asn1::TAG_OCTET_STRING)?;
            subject = Some(id.content().to_vec());
        } else if oid.is(oids::AUTHORITY_KEY_IDENTIFIER) {
            let aki = value.children().expect(asn1::TAG_SEQUENCE)?;
            // keyIdentifier [0] IMPLICIT OCTET STRING, primitive
            if let Some(id) = aki.children().read_optional(0x80)? {
                authority = Some(id.content().to_vec());
            }
        }
    }
    Ok((subject, authority))
}

/// Parses UTCTime (`YYMMDDHHMMSSZ`) or GeneralizedTime (`YYYYMMDDHHMMSSZ`).
pub fn parse_asn1_time(value: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    use chrono::{NaiveDateTime, TimeZone, Utc};
    let trimmed = value.strip_suffix('Z')?;
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let full = match trimmed.len() {
        12 => {
            // RFC 5280: YY >= 50 is 19YY
            let yy: u32 = trimmed[..2].parse().ok()?;
            let century = if yy >= 50 { "19" } else { "20" };
            format!("{}{}", century, trimmed)
        }
        14 => trimmed.to_string(),
        _ => return None,
    };
    let naive = NaiveDateTime::parse_from_str(&full, "%Y%m%d%H%M%S").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}
