// src/certificate/sod.rs
//! Document Security Object (EF.SOD).
//!
//! A CMS `SignedData` whose encapsulated content is an `LDSSecurityObject`
//! listing one hash per data group. The signer's certificate (the document
//! signer, DS) is carried in the `certificates` field and is itself signed by a
//! country signing CA from the trust tree.

use log::debug;

use super::asn1::{self, DerError, DerReader, Tlv};
use super::oids::{self, ObjectId};
use super::x509::Certificate;
use crate::error::{PassportError, Result};
use crate::utils::crypto::HashAlgorithm;

/// ICAO application tag wrapping EF.SOD.
const SOD_WRAPPER_TAG: u32 = 0x77;

/// One `DataGroupHash` entry of the LDS security object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataGroupHash {
    pub number: u8,
    pub hash: Vec<u8>,
    /// Offset of the hash value inside the encapsulated content.
    pub offset: usize,
}

/// A parsed security object.
#[derive(Debug, Clone)]
pub struct SecurityObject {
    hash_algorithm: HashAlgorithm,
    encapsulated_content: Vec<u8>,
    data_group_hashes: Vec<DataGroupHash>,
    signer_digest_algorithm: HashAlgorithm,
    signed_attributes: Vec<u8>,
    message_digest_offset: usize,
    message_digest: Vec<u8>,
    signature_algorithm: ObjectId,
    signature: Vec<u8>,
    certificate: Certificate,
}

fn malformed(field: &str) -> impl Fn(DerError) -> PassportError + '_ {
    move |e| PassportError::sod(field, e.offset, e.reason)
}

impl SecurityObject {
    /// Parses EF.SOD, with or without the `0x77` application wrapper.
    ///
    /// # Errors
    /// `MalformedSod` when the CMS structure cannot be decoded, the content
    /// is not an LDS security object, or its hash algorithm is unknown.
    /// Errors from the embedded certificate keep their own kind.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut top = DerReader::new(bytes);
        let mut outer = top.read().map_err(malformed("sod"))?;
        if outer.tag == SOD_WRAPPER_TAG {
            outer = outer
                .children()
                .expect(asn1::TAG_SEQUENCE)
                .map_err(malformed("contentInfo"))?;
        }
        outer
            .expect_tag(asn1::TAG_SEQUENCE)
            .map_err(malformed("contentInfo"))?;

        let mut content_info = outer.children();
        let content_type = content_info
            .expect(asn1::TAG_OID)
            .map_err(malformed("contentInfo.contentType"))?;
        if content_type.content() != oids::SIGNED_DATA {
            return Err(PassportError::sod(
                "contentInfo.contentType",
                content_type.start,
                "content is not signedData",
            ));
        }
        let explicit = content_info
            .expect(asn1::context(0))
            .map_err(malformed("contentInfo.content"))?;
        let signed_data = explicit
            .children()
            .expect(asn1::TAG_SEQUENCE)
            .map_err(malformed("signedData"))?;

        let mut sd = signed_data.children();
        sd.expect(asn1::TAG_INTEGER)
            .map_err(malformed("signedData.version"))?;
        sd.expect(asn1::TAG_SET)
            .map_err(malformed("signedData.digestAlgorithms"))?;
        let encap = sd
            .expect(asn1::TAG_SEQUENCE)
            .map_err(malformed("signedData.encapContentInfo"))?;
        let certificates = sd
            .read_optional(asn1::context(0))
            .map_err(malformed("signedData.certificates"))?;
        sd.read_optional(asn1::context(1))
            .map_err(malformed("signedData.crls"))?;
        let signer_infos = sd
            .expect(asn1::TAG_SET)
            .map_err(malformed("signedData.signerInfos"))?;

        let econtent = read_encapsulated_content(&encap)?;
        let (hash_algorithm, data_group_hashes) = read_lds_object(&econtent)?;

        let certificate_tlv = certificates
            .ok_or_else(|| {
                PassportError::sod(
                    "signedData.certificates",
                    encap.end,
                    "no document signer certificate",
                )
            })?
            .children()
            .expect(asn1::TAG_SEQUENCE)
            .map_err(malformed("signedData.certificates"))?;
        let certificate = Certificate::parse(certificate_tlv.raw())?;

        let signer = read_signer_info(&signer_infos)?;

        debug!(
            "parsed SOD: {} data group hashes ({}), signed attributes {} bytes",
            data_group_hashes.len(),
            hash_algorithm.label(),
            signer.signed_attributes.len()
        );

        Ok(SecurityObject {
            hash_algorithm,
            encapsulated_content: econtent.raw().to_vec(),
            data_group_hashes,
            signer_digest_algorithm: signer.digest_algorithm,
            signed_attributes: signer.signed_attributes,
            message_digest_offset: signer.message_digest_offset,
            message_digest: signer.message_digest,
            signature_algorithm: signer.signature_algorithm,
            signature: signer.signature,
            certificate,
        })
    }

    /// Hash algorithm of the data group hashes.
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    /// DER bytes of the `LDSSecurityObject`, which `messageDigest` covers.
    pub fn encapsulated_content(&self) -> &[u8] {
        &self.encapsulated_content
    }

    pub fn data_group_hashes(&self) -> &[DataGroupHash] {
        &self.data_group_hashes
    }

    pub fn data_group_hash(&self, number: u8) -> Option<&DataGroupHash> {
        self.data_group_hashes.iter().find(|h| h.number == number)
    }

    pub fn signer_digest_algorithm(&self) -> HashAlgorithm {
        self.signer_digest_algorithm
    }

    /// Signed attributes re-tagged as a SET (`0x31`), the exact bytes the
    /// document signer signed.
    pub fn signed_attributes(&self) -> &[u8] {
        &self.signed_attributes
    }

    /// Offset of the `messageDigest` value inside [`Self::signed_attributes`].
    pub fn message_digest_offset(&self) -> usize {
        self.message_digest_offset
    }

    pub fn signature_algorithm(&self) -> &ObjectId {
        &self.signature_algorithm
    }

    /// Document signer's signature over the signed attributes.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// The document signer certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Key of the signing certificate in the certificates SMT.
    pub fn certificate_index(&self) -> [u8; 32] {
        self.certificate.key_id()
    }

    /// Signature that the issuing CA placed on the signing certificate.
    pub fn issuer_signature(&self) -> &[u8] {
        self.certificate.signature()
    }

    /// TBS bytes of the signing certificate, covered by [`Self::issuer_signature`].
    pub fn signing_certificate_tbs(&self) -> &[u8] {
        self.certificate.tbs()
    }

    /// Recomputes the hash of a data group and compares it with the SOD entry.
    ///
    /// # Errors
    /// `MalformedDocument` when the entry is missing or differs;
    /// `UnsupportedKeyAlgorithm` when no local digest backend exists.
    pub fn verify_data_group(&self, number: u8, contents: &[u8]) -> Result<()> {
        let field = format!("dg{}", number);
        let entry = self
            .data_group_hash(number)
            .ok_or_else(|| PassportError::document(&field, 0, "no hash recorded in the SOD"))?;
        let actual = self.hash_algorithm.digest(contents).ok_or_else(|| {
            PassportError::UnsupportedKeyAlgorithm(self.hash_algorithm.label().to_string())
        })?;
        if actual != entry.hash {
            return Err(PassportError::document(
                &field,
                entry.offset,
                "hash does not match the SOD",
            ));
        }
        Ok(())
    }

    /// Checks `messageDigest` against the encapsulated content.
    pub fn verify_message_digest(&self) -> Result<()> {
        let actual = self
            .signer_digest_algorithm
            .digest(&self.encapsulated_content)
            .ok_or_else(|| {
                PassportError::UnsupportedKeyAlgorithm(
                    self.signer_digest_algorithm.label().to_string(),
                )
            })?;
        if actual != self.message_digest {
            return Err(PassportError::sod(
                "signerInfo.signedAttrs.messageDigest",
                self.message_digest_offset,
                "digest does not match the encapsulated content",
            ));
        }
        Ok(())
    }
}

fn read_encapsulated_content<'a>(encap: &Tlv<'a>) -> Result<Tlv<'a>> {
    let mut parts = encap.children();
    let content_type = parts
        .expect(asn1::TAG_OID)
        .map_err(malformed("encapContentInfo.eContentType"))?;
    if content_type.content() != oids::LDS_SECURITY_OBJECT {
        return Err(PassportError::sod(
            "encapContentInfo.eContentType",
            content_type.start,
            "content is not an LDS security object",
        ));
    }
    let explicit = parts
        .expect(asn1::context(0))
        .map_err(malformed("encapContentInfo.eContent"))?;
    let octets = explicit
        .children()
        .expect(asn1::TAG_OCTET_STRING)
        .map_err(malformed("encapContentInfo.eContent"))?;
    octets
        .children()
        .expect(asn1::TAG_SEQUENCE)
        .map_err(malformed("ldsSecurityObject"))
}

fn read_lds_object(lds: &Tlv<'_>) -> Result<(HashAlgorithm, Vec<DataGroupHash>)> {
    let mut parts = lds.children();
    parts
        .expect(asn1::TAG_INTEGER)
        .map_err(malformed("ldsSecurityObject.version"))?;
    let alg = parts
        .expect(asn1::TAG_SEQUENCE)
        .map_err(malformed("ldsSecurityObject.hashAlgorithm"))?;
    let oid_tlv = alg
        .children()
        .expect(asn1::TAG_OID)
        .map_err(malformed("ldsSecurityObject.hashAlgorithm"))?;
    let hash_algorithm = oids::digest_algorithm(&ObjectId(oid_tlv.content().to_vec()))
        .ok_or_else(|| {
            PassportError::sod(
                "ldsSecurityObject.hashAlgorithm",
                oid_tlv.start,
                "unrecognized hash algorithm",
            )
        })?;

    let values = parts
        .expect(asn1::TAG_SEQUENCE)
        .map_err(malformed("ldsSecurityObject.dataGroupHashValues"))?;
    let mut hashes = Vec::new();
    let mut list = values.children();
    while !list.is_empty() {
        let entry = list
            .expect(asn1::TAG_SEQUENCE)
            .map_err(malformed("dataGroupHash"))?;
        let mut fields = entry.children();
        let number = fields
            .read()
            .and_then(|n| n.as_small_uint())
            .map_err(malformed("dataGroupHash.dataGroupNumber"))?;
        let value = fields
            .expect(asn1::TAG_OCTET_STRING)
            .map_err(malformed("dataGroupHash.dataGroupHashValue"))?;
        let number = u8::try_from(number).map_err(|_| {
            PassportError::sod("dataGroupHash.dataGroupNumber", entry.start, "out of range")
        })?;
        if value.len() != hash_algorithm.output_len() {
            return Err(PassportError::sod(
                "dataGroupHash.dataGroupHashValue",
                value.start,
                format!(
                    "{} byte hash for {}",
                    value.len(),
                    hash_algorithm.label()
                ),
            ));
        }
        hashes.push(DataGroupHash {
            number,
            hash: value.content().to_vec(),
            offset: value.content_start - lds.start,
        });
    }
    Ok((hash_algorithm, hashes))
}

struct SignerInfo {
    digest_algorithm: HashAlgorithm,
    signed_attributes: Vec<u8>,
    message_digest_offset: usize,
    message_digest: Vec<u8>,
    signature_algorithm: ObjectId,
    signature: Vec<u8>,
}

fn read_signer_info(set: &Tlv<'_>) -> Result<SignerInfo> {
    let info = set
        .children()
        .expect(asn1::TAG_SEQUENCE)
        .map_err(malformed("signerInfo"))?;
    let mut parts = info.children();
    parts
        .expect(asn1::TAG_INTEGER)
        .map_err(malformed("signerInfo.version"))?;
    // issuerAndSerialNumber or [0] subjectKeyIdentifier
    parts.read().map_err(malformed("signerInfo.sid"))?;
    let digest_alg = parts
        .expect(asn1::TAG_SEQUENCE)
        .map_err(malformed("signerInfo.digestAlgorithm"))?;
    let digest_oid = digest_alg
        .children()
        .expect(asn1::TAG_OID)
        .map_err(malformed("signerInfo.digestAlgorithm"))?;
    let digest_algorithm = oids::digest_algorithm(&ObjectId(digest_oid.content().to_vec()))
        .ok_or_else(|| {
            PassportError::sod(
                "signerInfo.digestAlgorithm",
                digest_oid.start,
                "unrecognized digest algorithm",
            )
        })?;

    let attrs = parts
        .expect(asn1::context(0))
        .map_err(malformed("signerInfo.signedAttrs"))?;
    let (message_digest_tlv, message_digest) = find_message_digest(&attrs)?;

    let sig_alg = parts
        .expect(asn1::TAG_SEQUENCE)
        .map_err(malformed("signerInfo.signatureAlgorithm"))?;
    let sig_oid = sig_alg
        .children()
        .expect(asn1::TAG_OID)
        .map_err(malformed("signerInfo.signatureAlgorithm"))?;
    let signature = parts
        .expect(asn1::TAG_OCTET_STRING)
        .map_err(malformed("signerInfo.signature"))?;

    // The signature covers the attributes encoded as SET OF, not [0].
    let mut signed_attributes = attrs.raw().to_vec();
    signed_attributes[0] = asn1::TAG_SET as u8;

    Ok(SignerInfo {
        digest_algorithm,
        signed_attributes,
        message_digest_offset: message_digest_tlv - attrs.start,
        message_digest,
        signature_algorithm: ObjectId(sig_oid.content().to_vec()),
        signature: signature.content().to_vec(),
    })
}

/// Absolute offset and value of the `messageDigest` attribute.
fn find_message_digest(attrs: &Tlv<'_>) -> Result<(usize, Vec<u8>)> {
    let mut list = attrs.children();
    while !list.is_empty() {
        let attr = list
            .expect(asn1::TAG_SEQUENCE)
            .map_err(malformed("signerInfo.signedAttrs"))?;
        let mut parts = attr.children();
        let oid = parts
            .expect(asn1::TAG_OID)
            .map_err(malformed("signerInfo.signedAttrs.attrType"))?;
        if oid.content() != oids::MESSAGE_DIGEST {
            continue;
        }
        let values = parts
            .expect(asn1::TAG_SET)
            .map_err(malformed("signerInfo.signedAttrs.messageDigest"))?;
        let digest = values
            .children()
            .expect(asn1::TAG_OCTET_STRING)
            .map_err(malformed("signerInfo.signedAttrs.messageDigest"))?;
        return Ok((digest.content_start, digest.content().to_vec()));
    }
    Err(PassportError::sod(
        "signerInfo.signedAttrs",
        attrs.start,
        "no messageDigest attribute",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{self, CertSpec, SodSpec};

    fn sample() -> (SodSpec, Vec<u8>) {
        let spec = SodSpec::new(CertSpec::rsa(256, true), HashAlgorithm::Sha256);
        let der = test_fixtures::sod(&spec);
        (spec, der)
    }

    #[test]
    fn test_parse_sod_with_wrapper() {
        let (spec, der) = sample();
        assert_eq!(der[0], 0x77);
        let sod = SecurityObject::parse(&der).unwrap();
        assert_eq!(sod.hash_algorithm(), HashAlgorithm::Sha256);
        assert_eq!(sod.data_group_hashes().len(), 2);
        assert_eq!(sod.signed_attributes()[0], 0x31);
        assert_eq!(sod.signature(), &spec.signature[..]);
        assert_eq!(
            sod.certificate().raw(),
            &test_fixtures::certificate(&spec.signer)[..]
        );
    }

    #[test]
    fn test_data_group_offsets_and_verification() {
        let (spec, der) = sample();
        let sod = SecurityObject::parse(&der).unwrap();
        let dg1 = sod.data_group_hash(1).unwrap();
        let content = sod.encapsulated_content();
        assert_eq!(&content[dg1.offset..dg1.offset + 32], &dg1.hash[..]);

        sod.verify_data_group(1, &spec.dg1).unwrap();
        let mut tampered = spec.dg1.clone();
        tampered[10] ^= 1;
        let err = sod.verify_data_group(1, &tampered).unwrap_err();
        assert!(matches!(err, PassportError::MalformedDocument { .. }));
        assert!(matches!(
            sod.verify_data_group(3, &spec.dg1),
            Err(PassportError::MalformedDocument { .. })
        ));
    }

    #[test]
    fn test_message_digest_offset() {
        let (_, der) = sample();
        let sod = SecurityObject::parse(&der).unwrap();
        let off = sod.message_digest_offset();
        let expected = HashAlgorithm::Sha256
            .digest(sod.encapsulated_content())
            .unwrap();
        assert_eq!(&sod.signed_attributes()[off..off + 32], &expected[..]);
        sod.verify_message_digest().unwrap();
    }

    #[test]
    fn test_unknown_hash_algorithm_is_malformed_sod() {
        let mut spec = SodSpec::new(CertSpec::rsa(256, true), HashAlgorithm::Sha256);
        spec.hash_oid_override = Some(vec![0x2A, 0x03, 0x04]);
        let err = SecurityObject::parse(&test_fixtures::sod(&spec)).unwrap_err();
        match err {
            PassportError::MalformedSod { field, .. } => {
                assert_eq!(field, "ldsSecurityObject.hashAlgorithm")
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_truncated_sod_is_malformed() {
        let (_, der) = sample();
        let err = SecurityObject::parse(&der[..der.len() - 5]).unwrap_err();
        assert!(matches!(err, PassportError::MalformedSod { .. }));
    }

    #[test]
    fn test_certificate_index_is_key_id() {
        let (_, der) = sample();
        let sod = SecurityObject::parse(&der).unwrap();
        assert_eq!(sod.certificate_index(), sod.certificate().key_id());
        assert_eq!(sod.signing_certificate_tbs(), sod.certificate().tbs());
    }
}
