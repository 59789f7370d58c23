// src/zkp/circuit_inputs/dg1.rs
//! Compact identity record for ID cards whose holder data lives in the
//! subject of a signed certificate rather than in an MRZ.
//!
//! Layout of the 108-byte buffer:
//!
//! | offset | len | field |
//! |---|---|---|
//! | 0 | 2 | subject country code |
//! | 2 | 13 | notBefore (UTCTime) |
//! | 15 | 13 | notAfter (UTCTime) |
//! | 28 | 26 | surname: length byte + 25 bytes |
//! | 54 | 26 | given name: length byte + 25 bytes |
//! | 80 | 26 | common name: length byte + 25 bytes |
//! | 106 | 2 | zero |

use crate::certificate::asn1::{self, DerError, DerReader, Tlv};
use crate::certificate::oids;
use crate::error::{PassportError, Result};

pub const DG1_LEN: usize = 108;
pub const COUNTRY_OFFSET: usize = 0;
pub const NOT_BEFORE_OFFSET: usize = 2;
pub const NOT_AFTER_OFFSET: usize = 15;
pub const SURNAME_OFFSET: usize = 28;
pub const GIVEN_NAME_OFFSET: usize = 54;
pub const COMMON_NAME_OFFSET: usize = 80;

const TIME_LEN: usize = 13;
const NAME_MAX: usize = 25;

fn malformed(field: &str) -> impl Fn(DerError) -> PassportError + '_ {
    move |e| PassportError::document(field, e.offset, e.reason)
}

/// Builds the identity record from certificate TBS bytes.
///
/// # Errors
/// `MalformedDocument` if any length prefix points outside `tbs`, a time is
/// not a 13-character UTCTime, or the subject has no two-letter country.
pub fn extract_dg1(tbs: &[u8]) -> Result<[u8; DG1_LEN]> {
    let tbs_seq = DerReader::new(tbs)
        .expect(asn1::TAG_SEQUENCE)
        .map_err(malformed("dg1.tbs"))?;
    let mut fields = tbs_seq.children();
    fields
        .read_optional(asn1::context(0))
        .map_err(malformed("dg1.version"))?;
    fields
        .expect(asn1::TAG_INTEGER)
        .map_err(malformed("dg1.serialNumber"))?;
    fields
        .expect(asn1::TAG_SEQUENCE)
        .map_err(malformed("dg1.signature"))?;
    fields
        .expect(asn1::TAG_SEQUENCE)
        .map_err(malformed("dg1.issuer"))?;
    let validity = fields
        .expect(asn1::TAG_SEQUENCE)
        .map_err(malformed("dg1.validity"))?;
    let subject = fields
        .expect(asn1::TAG_SEQUENCE)
        .map_err(malformed("dg1.subject"))?;

    let mut out = [0u8; DG1_LEN];

    let mut times = validity.children();
    for (offset, field) in [
        (NOT_BEFORE_OFFSET, "dg1.notBefore"),
        (NOT_AFTER_OFFSET, "dg1.notAfter"),
    ] {
        let time = times
            .expect(asn1::TAG_UTC_TIME)
            .map_err(malformed(field))?;
        if time.len() != TIME_LEN {
            return Err(PassportError::document(
                field,
                time.start,
                format!("{} byte time, expected {}", time.len(), TIME_LEN),
            ));
        }
        out[offset..offset + TIME_LEN].copy_from_slice(time.content());
    }

    let mut country = None;
    let mut rdns = subject.children();
    while !rdns.is_empty() {
        let rdn = rdns.expect(asn1::TAG_SET).map_err(malformed("dg1.subject"))?;
        let mut atvs = rdn.children();
        while !atvs.is_empty() {
            let atv = atvs
                .expect(asn1::TAG_SEQUENCE)
                .map_err(malformed("dg1.subject"))?;
            let (oid, value) = read_attribute(&atv).map_err(malformed("dg1.subject"))?;
            match oid.content() {
                oids::COUNTRY_NAME => country = Some(value),
                oids::SURNAME => write_name(&mut out, SURNAME_OFFSET, value.content()),
                oids::GIVEN_NAME => write_name(&mut out, GIVEN_NAME_OFFSET, value.content()),
                oids::COMMON_NAME => write_name(&mut out, COMMON_NAME_OFFSET, value.content()),
                _ => {}
            }
        }
    }

    let country = country.ok_or_else(|| {
        PassportError::document("dg1.country", subject.start, "subject has no country")
    })?;
    if country.len() != 2 {
        return Err(PassportError::document(
            "dg1.country",
            country.start,
            "country code is not two characters",
        ));
    }
    out[COUNTRY_OFFSET..COUNTRY_OFFSET + 2].copy_from_slice(country.content());
    Ok(out)
}

fn read_attribute<'a>(atv: &Tlv<'a>) -> std::result::Result<(Tlv<'a>, Tlv<'a>), DerError> {
    let mut parts = atv.children();
    let oid = parts.expect(asn1::TAG_OID)?;
    let value = parts.read()?;
    Ok((oid, value))
}

fn write_name(out: &mut [u8; DG1_LEN], offset: usize, value: &[u8]) {
    let len = value.len().min(NAME_MAX);
    out[offset] = len as u8;
    out[offset + 1..offset + 1 + len].copy_from_slice(&value[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{self, CertSpec};

    fn id_card_tbs() -> Vec<u8> {
        let mut spec = CertSpec::rsa(256, true);
        spec.country = "UA".into();
        spec.surname = Some("SHEVCHENKO".into());
        spec.given_name = Some("TARAS HRYHOROVYCH OF KYRYLIVKA".into());
        spec.subject_cn = "TARAS SHEVCHENKO".into();
        test_fixtures::tbs(&spec)
    }

    #[test]
    fn test_extracts_fixed_layout() {
        let dg1 = extract_dg1(&id_card_tbs()).unwrap();
        assert_eq!(&dg1[0..2], b"UA");
        assert_eq!(&dg1[2..15], b"200101000000Z");
        assert_eq!(&dg1[15..28], b"491231235959Z");
        assert_eq!(dg1[SURNAME_OFFSET], 10);
        assert_eq!(&dg1[SURNAME_OFFSET + 1..SURNAME_OFFSET + 11], b"SHEVCHENKO");
        assert_eq!(dg1[SURNAME_OFFSET + 11], 0);
        // truncated to 25 bytes
        assert_eq!(dg1[GIVEN_NAME_OFFSET], 25);
        assert_eq!(
            &dg1[GIVEN_NAME_OFFSET + 1..GIVEN_NAME_OFFSET + 26],
            b"TARAS HRYHOROVYCH OF KYRY"
        );
        assert_eq!(dg1[COMMON_NAME_OFFSET], 16);
        assert_eq!(&dg1[106..], &[0, 0]);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let tbs = id_card_tbs();
        assert_eq!(extract_dg1(&tbs).unwrap(), extract_dg1(&tbs).unwrap());
    }

    #[test]
    fn test_truncated_input_is_malformed_document() {
        let tbs = id_card_tbs();
        for cut in 0..tbs.len() {
            match extract_dg1(&tbs[..cut]) {
                Err(PassportError::MalformedDocument { .. }) => {}
                other => panic!("cut at {} gave {:?}", cut, other.map(|_| ())),
            }
        }
    }

    #[test]
    fn test_lying_length_prefix_is_caught() {
        let mut tbs = id_card_tbs();
        // turn the validity length into a two-byte long form past its parent
        let pos = tbs
            .windows(2)
            .position(|w| w == [0x30, 0x1E])
            .unwrap();
        tbs[pos + 1] = 0x82;
        assert!(matches!(
            extract_dg1(&tbs),
            Err(PassportError::MalformedDocument { .. })
        ));
    }
}
