// src/models/document.rs
//! Scanned identity documents.
//!
//! A document is built once per scan session from the raw data groups read
//! over NFC and never mutated afterwards. Person details are decoded from the
//! MRZ for display only; circuits consume the raw data groups.

use serde::{Deserialize, Serialize};

use crate::certificate::asn1::{DerError, DerReader};
use crate::certificate::SecurityObject;
use crate::error::{PassportError, Result};
use crate::utils::serialization::{base64_bytes, base64_bytes_opt};

/// EF.DG1 template tag and the MRZ element inside it.
const DG1_TAG: u32 = 0x61;
const MRZ_TAG: u32 = 0x5F1F;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Passport,
    Eid,
}

/// Holder data decoded from the MRZ. Dates are `YYMMDD` as printed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonDetails {
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub birth_date: String,
    pub expiry_date: String,
    pub document_number: String,
    pub nationality: String,
    pub issuing_state: String,
}

/// Fields shared by every document kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentCommon {
    pub document_code: String,
    pub person: PersonDetails,
    #[serde(with = "base64_bytes")]
    pub dg1: Vec<u8>,
    #[serde(with = "base64_bytes_opt", default)]
    pub dg11: Option<Vec<u8>>,
    #[serde(with = "base64_bytes_opt", default)]
    pub dg15: Option<Vec<u8>>,
    #[serde(with = "base64_bytes")]
    pub sod: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Document {
    EPassport {
        common: DocumentCommon,
        /// Active Authentication signature over the challenge, if AA ran.
        #[serde(with = "base64_bytes_opt", default)]
        aa_signature: Option<Vec<u8>>,
    },
    Eid {
        common: DocumentCommon,
    },
}

impl Document {
    /// Builds a document from raw data groups.
    ///
    /// # Errors
    /// `MalformedDocument` if DG1 holds no readable MRZ; `MalformedSod` or
    /// `MalformedCertificate` if the SOD does not decode.
    pub fn from_raw(
        kind: DocumentKind,
        dg1: Vec<u8>,
        sod: Vec<u8>,
        dg11: Option<Vec<u8>>,
        dg15: Option<Vec<u8>>,
        aa_signature: Option<Vec<u8>>,
    ) -> Result<Self> {
        let mrz = read_mrz(&dg1)?;
        let (document_code, person) = parse_mrz(&mrz)?;
        SecurityObject::parse(&sod)?;

        let common = DocumentCommon {
            document_code,
            person,
            dg1,
            dg11,
            dg15,
            sod,
        };
        Ok(match kind {
            DocumentKind::Passport => Document::EPassport {
                common,
                aa_signature,
            },
            DocumentKind::Eid => Document::Eid { common },
        })
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            Document::EPassport { .. } => DocumentKind::Passport,
            Document::Eid { .. } => DocumentKind::Eid,
        }
    }

    pub fn common(&self) -> &DocumentCommon {
        match self {
            Document::EPassport { common, .. } | Document::Eid { common } => common,
        }
    }

    pub fn person(&self) -> &PersonDetails {
        &self.common().person
    }

    pub fn dg1(&self) -> &[u8] {
        &self.common().dg1
    }

    pub fn dg15(&self) -> Option<&[u8]> {
        self.common().dg15.as_deref()
    }

    pub fn aa_signature(&self) -> Option<&[u8]> {
        match self {
            Document::EPassport { aa_signature, .. } => aa_signature.as_deref(),
            Document::Eid { .. } => None,
        }
    }

    /// Decodes the SOD. Bytes were validated at construction.
    pub fn security_object(&self) -> Result<SecurityObject> {
        SecurityObject::parse(&self.common().sod)
    }

    /// Checks DG1, DG15 when present, and the signed LDS digest against `sod`.
    pub fn verify_against(&self, sod: &SecurityObject) -> Result<()> {
        sod.verify_data_group(1, self.dg1())?;
        if let Some(dg15) = self.dg15() {
            sod.verify_data_group(15, dg15)?;
        }
        sod.verify_message_digest()
    }

    /// JSON transport form with base64 byte buffers.
    pub fn to_transport(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_transport(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }
}

fn mrz_error(e: DerError) -> PassportError {
    PassportError::document("dg1", e.offset, e.reason)
}

/// Extracts the MRZ characters from the EF.DG1 template.
pub fn read_mrz(dg1: &[u8]) -> Result<String> {
    let template = DerReader::new(dg1).expect(DG1_TAG).map_err(mrz_error)?;
    let mrz = template.children().expect(MRZ_TAG).map_err(mrz_error)?;
    if !mrz.content().is_ascii() {
        return Err(PassportError::document(
            "dg1.mrz",
            mrz.content_start,
            "MRZ is not ASCII",
        ));
    }
    Ok(String::from_utf8_lossy(mrz.content()).into_owned())
}

fn field(mrz: &str, range: std::ops::Range<usize>) -> String {
    mrz[range].trim_end_matches('<').replace('<', " ")
}

fn names(raw: &str) -> (String, String) {
    let mut parts = raw.splitn(2, "<<");
    let last = parts.next().unwrap_or_default().replace('<', " ");
    let first = parts
        .next()
        .unwrap_or_default()
        .trim_end_matches('<')
        .replace('<', " ");
    (first.trim().to_string(), last.trim().to_string())
}

/// Decodes TD1 (3x30), TD2 (2x36) and TD3 (2x44) machine readable zones.
pub fn parse_mrz(mrz: &str) -> Result<(String, PersonDetails)> {
    if !mrz.is_ascii() {
        return Err(PassportError::document("dg1.mrz", 0, "MRZ is not ASCII"));
    }
    let code = |mrz: &str| mrz[0..2].trim_end_matches('<').to_string();
    match mrz.len() {
        88 => {
            let (first_name, last_name) = names(&mrz[5..44]);
            Ok((
                code(mrz),
                PersonDetails {
                    first_name,
                    last_name,
                    issuing_state: field(mrz, 2..5),
                    document_number: field(mrz, 44..53),
                    nationality: field(mrz, 54..57),
                    birth_date: field(mrz, 57..63),
                    gender: field(mrz, 64..65),
                    expiry_date: field(mrz, 65..71),
                },
            ))
        }
        72 => {
            let (first_name, last_name) = names(&mrz[5..36]);
            Ok((
                code(mrz),
                PersonDetails {
                    first_name,
                    last_name,
                    issuing_state: field(mrz, 2..5),
                    document_number: field(mrz, 36..45),
                    nationality: field(mrz, 46..49),
                    birth_date: field(mrz, 49..55),
                    gender: field(mrz, 56..57),
                    expiry_date: field(mrz, 57..63),
                },
            ))
        }
        90 => {
            let (first_name, last_name) = names(&mrz[60..90]);
            Ok((
                code(mrz),
                PersonDetails {
                    first_name,
                    last_name,
                    issuing_state: field(mrz, 2..5),
                    document_number: field(mrz, 5..14),
                    birth_date: field(mrz, 30..36),
                    gender: field(mrz, 37..38),
                    expiry_date: field(mrz, 38..44),
                    nationality: field(mrz, 45..48),
                },
            ))
        }
        other => Err(PassportError::document(
            "dg1.mrz",
            0,
            format!("unsupported MRZ length {}", other),
        )),
    }
}
