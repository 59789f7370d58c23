// src/test_fixtures.rs
//! Synthetic DER certificates, security objects and documents for unit tests.
//!
//! Keys and signatures are deterministic byte patterns, not real key pairs:
//! nothing in the core verifies an RSA or ECDSA signature, it only moves the
//! bytes into circuit inputs.

use crate::certificate::oids;
use crate::models::document::{Document, DocumentKind};
use crate::utils::crypto::HashAlgorithm;

/// Specimen TD3 machine readable zone.
pub const TD3_MRZ: &str = concat!(
    "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<",
    "L898902C36UTO7408122F1204159ZE184226B<<<<<10"
);

/// Specimen TD1 machine readable zone.
pub const TD1_MRZ: &str = concat!(
    "I<UTOD231458907<<<<<<<<<<<<<<<",
    "7408122F1204159UTO<<<<<<<<<<<6",
    "ERIKSSON<<ANNA<MARIA<<<<<<<<<<"
);

#[derive(Debug, Clone)]
pub enum FixtureKey {
    Rsa { modulus_len: usize },
    RsaPss { modulus_len: usize },
    Ec {
        /// `None` encodes explicit curve parameters.
        curve: Option<&'static [u8]>,
        coordinate_len: usize,
        compressed: bool,
    },
}

#[derive(Debug, Clone)]
pub struct CertSpec {
    pub key: FixtureKey,
    pub pad_modulus: bool,
    pub signature_oid: &'static [u8],
    pub seed: u8,
    pub country: String,
    pub issuer_cn: String,
    pub subject_cn: String,
    pub surname: Option<String>,
    pub given_name: Option<String>,
    pub not_before: String,
    pub not_after: String,
    pub signature: Vec<u8>,
    pub subject_key_id: Option<Vec<u8>>,
    pub authority_key_id: Option<Vec<u8>>,
}

impl CertSpec {
    fn base(key: FixtureKey, signature_oid: &'static [u8]) -> Self {
        CertSpec {
            key,
            pad_modulus: true,
            signature_oid,
            seed: 1,
            country: "UT".to_string(),
            issuer_cn: "Utopia CSCA".to_string(),
            subject_cn: "Utopia CSCA".to_string(),
            surname: None,
            given_name: None,
            not_before: "200101000000Z".to_string(),
            not_after: "491231235959Z".to_string(),
            signature: (0..256u32).map(|i| (i * 7 + 3) as u8).collect(),
            subject_key_id: None,
            authority_key_id: None,
        }
    }

    /// RSA key with a modulus of `modulus_len` significant bytes.
    pub fn rsa(modulus_len: usize, pad_modulus: bool) -> Self {
        let mut spec = Self::base(FixtureKey::Rsa { modulus_len }, oids::SHA256_WITH_RSA);
        spec.pad_modulus = pad_modulus;
        spec
    }

    pub fn rsa_pss(modulus_len: usize) -> Self {
        Self::base(FixtureKey::RsaPss { modulus_len }, oids::RSASSA_PSS)
    }

    /// EC key over a named curve with uncompressed coordinates.
    pub fn ec(curve: &'static [u8], coordinate_len: usize) -> Self {
        let mut spec = Self::base(
            FixtureKey::Ec {
                curve: Some(curve),
                coordinate_len,
                compressed: false,
            },
            oids::ECDSA_WITH_SHA256,
        );
        spec.signature = (0..72u32).map(|i| (i * 5 + 1) as u8).collect();
        spec
    }

    pub fn with_seed(mut self, seed: u8) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_names(mut self, issuer_cn: &str, subject_cn: &str) -> Self {
        self.issuer_cn = issuer_cn.to_string();
        self.subject_cn = subject_cn.to_string();
        self
    }

    /// Significant modulus bytes or `X || Y`, as the certificate will expose them.
    pub fn key_material(&self) -> Vec<u8> {
        match &self.key {
            FixtureKey::Rsa { modulus_len } | FixtureKey::RsaPss { modulus_len } => {
                let mut m = pattern(*modulus_len, self.seed);
                m[0] |= 0x80;
                if let Some(last) = m.last_mut() {
                    *last |= 1;
                }
                m
            }
            FixtureKey::Ec { coordinate_len, .. } => pattern(coordinate_len * 2, self.seed),
        }
    }
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed.wrapping_mul(17)).wrapping_add(1))
        .collect()
}

/// Encodes one TLV with a single-byte tag.
pub fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes: Vec<u8> = len
            .to_be_bytes()
            .iter()
            .copied()
            .skip_while(|b| *b == 0)
            .collect();
        out.push(0x80 | bytes.len() as u8);
        out.extend(bytes);
    }
    out.extend_from_slice(content);
    out
}

fn cons(tag: u8, parts: &[Vec<u8>]) -> Vec<u8> {
    tlv(tag, &parts.concat())
}

pub fn seq(parts: &[Vec<u8>]) -> Vec<u8> {
    cons(0x30, parts)
}

fn set(parts: &[Vec<u8>]) -> Vec<u8> {
    cons(0x31, parts)
}

fn oid(bytes: &[u8]) -> Vec<u8> {
    tlv(0x06, bytes)
}

pub fn integer(bytes: &[u8]) -> Vec<u8> {
    tlv(0x02, bytes)
}

fn bit_string(payload: &[u8]) -> Vec<u8> {
    let mut content = vec![0u8];
    content.extend_from_slice(payload);
    tlv(0x03, &content)
}

fn attribute(attr: &[u8], tag: u8, value: &str) -> Vec<u8> {
    set(&[seq(&[oid(attr), tlv(tag, value.as_bytes())])])
}

fn name(country: &str, cn: &str, surname: Option<&str>, given: Option<&str>) -> Vec<u8> {
    let mut rdns = vec![attribute(oids::COUNTRY_NAME, 0x13, country)];
    if let Some(s) = surname {
        rdns.push(attribute(oids::SURNAME, 0x0C, s));
    }
    if let Some(g) = given {
        rdns.push(attribute(oids::GIVEN_NAME, 0x0C, g));
    }
    rdns.push(attribute(oids::COMMON_NAME, 0x0C, cn));
    seq(&rdns)
}

fn public_key_info(spec: &CertSpec) -> Vec<u8> {
    let material = spec.key_material();
    match &spec.key {
        FixtureKey::Rsa { .. } | FixtureKey::RsaPss { .. } => {
            let alg = match spec.key {
                FixtureKey::RsaPss { .. } => seq(&[oid(oids::RSASSA_PSS)]),
                _ => seq(&[oid(oids::RSA_ENCRYPTION), tlv(0x05, &[])]),
            };
            let mut modulus = Vec::new();
            if spec.pad_modulus {
                modulus.push(0);
            }
            modulus.extend(&material);
            let key = seq(&[integer(&modulus), integer(&[0x01, 0x00, 0x01])]);
            seq(&[alg, bit_string(&key)])
        }
        FixtureKey::Ec {
            curve, compressed, ..
        } => {
            let params = match curve {
                Some(c) => oid(c),
                None => seq(&[integer(&[1]), seq(&[oid(&[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x01, 0x01])])]),
            };
            let alg = seq(&[oid(oids::EC_PUBLIC_KEY), params]);
            let point = if *compressed {
                let half = material.len() / 2;
                let mut p = vec![0x02];
                p.extend(&material[..half]);
                p
            } else {
                let mut p = vec![0x04];
                p.extend(&material);
                p
            };
            seq(&[alg, bit_string(&point)])
        }
    }
}

fn extensions(spec: &CertSpec) -> Option<Vec<u8>> {
    let mut list = Vec::new();
    if let Some(ski) = &spec.subject_key_id {
        list.push(seq(&[
            oid(oids::SUBJECT_KEY_IDENTIFIER),
            tlv(0x04, &tlv(0x04, ski)),
        ]));
    }
    if let Some(aki) = &spec.authority_key_id {
        list.push(seq(&[
            oid(oids::AUTHORITY_KEY_IDENTIFIER),
            tlv(0x04, &seq(&[tlv(0x80, aki)])),
        ]));
    }
    if list.is_empty() {
        None
    } else {
        Some(cons(0xA3, &[seq(&list)]))
    }
}

/// DER encoded TBSCertificate.
pub fn tbs(spec: &CertSpec) -> Vec<u8> {
    let mut parts = vec![
        cons(0xA0, &[integer(&[2])]),
        integer(&[0x10, spec.seed]),
        seq(&[oid(spec.signature_oid)]),
        name(&spec.country, &spec.issuer_cn, None, None),
        seq(&[
            tlv(0x17, spec.not_before.as_bytes()),
            tlv(0x17, spec.not_after.as_bytes()),
        ]),
        name(
            &spec.country,
            &spec.subject_cn,
            spec.surname.as_deref(),
            spec.given_name.as_deref(),
        ),
        public_key_info(spec),
    ];
    if let Some(ext) = extensions(spec) {
        parts.push(ext);
    }
    seq(&parts)
}

/// DER encoded certificate.
pub fn certificate(spec: &CertSpec) -> Vec<u8> {
    seq(&[
        tbs(spec),
        seq(&[oid(spec.signature_oid)]),
        bit_string(&spec.signature),
    ])
}

pub fn hash_oid(hash: HashAlgorithm) -> &'static [u8] {
    match hash {
        HashAlgorithm::Sha1 => oids::SHA1,
        HashAlgorithm::Sha224 => oids::SHA224,
        HashAlgorithm::Sha256 => oids::SHA256,
        HashAlgorithm::Sha384 => oids::SHA384,
        HashAlgorithm::Sha512 => oids::SHA512,
    }
}

#[derive(Debug, Clone)]
pub struct SodSpec {
    pub signer: CertSpec,
    pub hash: HashAlgorithm,
    pub dg1: Vec<u8>,
    pub dg15: Vec<u8>,
    pub signature: Vec<u8>,
    pub hash_oid_override: Option<Vec<u8>>,
}

impl SodSpec {
    pub fn new(signer: CertSpec, hash: HashAlgorithm) -> Self {
        SodSpec {
            signer,
            hash,
            dg1: dg1_file(TD3_MRZ),
            dg15: tlv(0x6F, &[0x30, 0x03, 0x02, 0x01, 0x05]),
            signature: (0..256u32).map(|i| (i * 13 + 11) as u8).collect(),
            hash_oid_override: None,
        }
    }
}

/// EF.DG1 wrapping an MRZ string.
pub fn dg1_file(mrz: &str) -> Vec<u8> {
    let mut inner = vec![0x5F, 0x1F];
    inner.extend(&tlv(0x00, mrz.as_bytes())[1..]);
    tlv(0x61, &inner)
}

fn digest(hash: HashAlgorithm, data: &[u8]) -> Vec<u8> {
    hash.digest(data).unwrap_or_else(|| vec![0; hash.output_len()])
}

pub fn lds_object(spec: &SodSpec) -> Vec<u8> {
    let hash_oid = spec
        .hash_oid_override
        .clone()
        .unwrap_or_else(|| hash_oid(spec.hash).to_vec());
    seq(&[
        integer(&[0]),
        seq(&[oid(&hash_oid)]),
        seq(&[
            seq(&[integer(&[1]), tlv(0x04, &digest(spec.hash, &spec.dg1))]),
            seq(&[integer(&[15]), tlv(0x04, &digest(spec.hash, &spec.dg15))]),
        ]),
    ])
}

/// EF.SOD with the ICAO application wrapper.
pub fn sod(spec: &SodSpec) -> Vec<u8> {
    let lds = lds_object(spec);
    let hash_alg = seq(&[oid(hash_oid(spec.hash))]);
    let signed_attrs = cons(
        0xA0,
        &[
            seq(&[oid(oids::CONTENT_TYPE), set(&[oid(oids::LDS_SECURITY_OBJECT)])]),
            seq(&[
                oid(oids::MESSAGE_DIGEST),
                set(&[tlv(0x04, &digest(spec.hash, &lds))]),
            ]),
        ],
    );
    let signer_info = seq(&[
        integer(&[1]),
        seq(&[
            name(&spec.signer.country, &spec.signer.issuer_cn, None, None),
            integer(&[0x10, spec.signer.seed]),
        ]),
        hash_alg.clone(),
        signed_attrs,
        seq(&[oid(spec.signer.signature_oid)]),
        tlv(0x04, &spec.signature),
    ]);
    let signed_data = seq(&[
        integer(&[3]),
        set(&[hash_alg]),
        seq(&[
            oid(oids::LDS_SECURITY_OBJECT),
            cons(0xA0, &[tlv(0x04, &lds)]),
        ]),
        cons(0xA0, &[certificate(&spec.signer)]),
        set(&[signer_info]),
    ]);
    let content_info = seq(&[oid(oids::SIGNED_DATA), cons(0xA0, &[signed_data])]);
    tlv(0x77, &content_info)
}

/// Document signer issued by the CSCA described by `csca`.
pub fn document_signer(csca: &CertSpec) -> CertSpec {
    let mut ds = CertSpec::rsa(256, true).with_seed(csca.seed.wrapping_add(100));
    ds.issuer_cn = csca.subject_cn.clone();
    ds.subject_cn = "Utopia Document Signer".to_string();
    ds.country = csca.country.clone();
    ds.surname = Some("ERIKSSON".to_string());
    ds.given_name = Some("ANNA MARIA".to_string());
    ds
}

/// A passport whose SOD is signed by `spec.signer`.
pub fn passport(spec: &SodSpec) -> Document {
    Document::from_raw(
        DocumentKind::Passport,
        spec.dg1.clone(),
        sod(spec),
        None,
        Some(spec.dg15.clone()),
        None,
    )
    .unwrap()
}

/// An ID card built from the TD1 specimen.
pub fn id_card(signer: CertSpec) -> (SodSpec, Document) {
    let mut spec = SodSpec::new(signer, HashAlgorithm::Sha256);
    spec.dg1 = dg1_file(TD1_MRZ);
    let doc = Document::from_raw(
        DocumentKind::Eid,
        spec.dg1.clone(),
        sod(&spec),
        None,
        Some(spec.dg15.clone()),
        None,
    )
    .unwrap();
    (spec, doc)
}
