// src/zkp/circuit_inputs/builders.rs
//! Variant table of circuit input builders.
//!
//! Each entry is keyed by document kind and key family. Supporting a new
//! circuit means adding an entry; existing builders are never branched on
//! type or name.

use std::collections::HashMap;

use num_bigint::BigUint;
use once_cell::sync::Lazy;

use super::bigint::{barrett_constant, chunk, chunk_bytes, LimbLayout, BARRETT_K};
use super::dg1::extract_dg1;
use super::sha_padding::sha_pad;
use super::CircuitInputs;
use crate::blockchain::SmtProof;
use crate::certificate::asn1::{self, DerReader};
use crate::certificate::oids;
use crate::certificate::{Certificate, PublicKey, SecurityObject};
use crate::dispatcher::{Dispatcher, KeyFamily};
use crate::error::{PassportError, Result};
use crate::models::document::{Document, DocumentKind};
use crate::utils::crypto::HashAlgorithm;

const DG1_MAX_BYTES: usize = 256;
const DG15_MAX_BYTES: usize = 512;
const ENCAPSULATED_CONTENT_MAX_BYTES: usize = 1536;
const SIGNED_ATTRIBUTES_MAX_BYTES: usize = 256;
const TBS_MAX_BYTES: usize = 1536;

/// Everything a builder may read. Borrowed for the duration of one build.
pub struct BuildContext<'a> {
    pub document: &'a Document,
    pub sod: &'a SecurityObject,
    /// Certificate whose key verifies the signature the circuit checks.
    pub key_certificate: &'a Certificate,
    pub dispatcher: &'a Dispatcher,
    pub sk_identity: &'a BigUint,
    pub smt_proof: &'a SmtProof,
    pub smt_depth: usize,
    pub limb_bits: usize,
}

pub type BuildFn = fn(&BuildContext<'_>) -> Result<CircuitInputs>;

pub struct CircuitVariant {
    pub circuit_prefix: &'static str,
    pub build: BuildFn,
}

impl CircuitVariant {
    /// Circuit identifier, e.g. `registerIdentity_RSA_SHA256_2048`.
    pub fn circuit_name(&self, dispatcher: &Dispatcher) -> String {
        format!("{}_{}", self.circuit_prefix, dispatcher.name)
    }
}

static VARIANTS: Lazy<HashMap<(DocumentKind, KeyFamily), CircuitVariant>> = Lazy::new(|| {
    let mut table = HashMap::new();
    table.insert(
        (DocumentKind::Passport, KeyFamily::Rsa),
        CircuitVariant {
            circuit_prefix: "registerIdentity",
            build: build_passport_rsa,
        },
    );
    table.insert(
        (DocumentKind::Passport, KeyFamily::Ecdsa),
        CircuitVariant {
            circuit_prefix: "registerIdentity",
            build: build_passport_ecdsa,
        },
    );
    table.insert(
        (DocumentKind::Eid, KeyFamily::Rsa),
        CircuitVariant {
            circuit_prefix: "registerIdentityEid",
            build: build_eid_rsa,
        },
    );
    table
});

/// Looks up the builder for a document kind and key family.
///
/// # Errors
/// `UnsupportedCircuit` when no entry exists.
pub fn select_variant(kind: DocumentKind, family: KeyFamily) -> Result<&'static CircuitVariant> {
    VARIANTS
        .get(&(kind, family))
        .ok_or_else(|| PassportError::UnsupportedCircuit {
            document: format!("{:?}", kind),
            family: family.to_string(),
        })
}

/// The certificate whose key the circuit verifies against: the document
/// signer for passports (it signs the SOD), the issuer for ID cards (it signs
/// the certificate holding the identity record).
pub fn key_certificate<'a>(
    kind: DocumentKind,
    sod: &'a SecurityObject,
    issuer: &'a Certificate,
) -> &'a Certificate {
    match kind {
        DocumentKind::Passport => sod.certificate(),
        DocumentKind::Eid => issuer,
    }
}

fn smt_inputs(inputs: CircuitInputs, ctx: &BuildContext<'_>) -> CircuitInputs {
    let branches = ctx
        .smt_proof
        .padded_siblings(ctx.smt_depth)
        .iter()
        .map(|s| BigUint::from_bytes_be(s))
        .collect();
    inputs
        .scalar("skIdentity", ctx.sk_identity.clone())
        .scalar("slaveMerkleRoot", BigUint::from_bytes_be(&ctx.smt_proof.root))
        .array("slaveMerkleInclusionBranches", branches)
}

fn padded(field: &str, data: &[u8], hash: HashAlgorithm, max_bytes: usize) -> Result<Vec<u8>> {
    Ok(sha_pad(field, data, hash, max_bytes / hash.block_size())?.bytes)
}

fn rsa_modulus(certificate: &Certificate) -> Result<&[u8]> {
    match certificate.public_key() {
        PublicKey::Rsa { .. } => Ok(certificate.public_key().key_material()),
        _ => Err(PassportError::UnsupportedKeyAlgorithm(
            "expected an RSA key".to_string(),
        )),
    }
}

/// Modulus, signature and Barrett constant limbs for an RSA check.
fn rsa_inputs(
    inputs: CircuitInputs,
    ctx: &BuildContext<'_>,
    signature: &[u8],
) -> Result<CircuitInputs> {
    let bits = ctx.dispatcher.bits;
    let layout = LimbLayout::covering(bits, ctx.limb_bits)?;
    let modulus_bytes = rsa_modulus(ctx.key_certificate)?;
    let modulus = BigUint::from_bytes_be(modulus_bytes);
    let barrett = barrett_constant(&modulus, bits, BARRETT_K)?;
    let barrett_layout = LimbLayout::covering(bits + BARRETT_K + 1, ctx.limb_bits)?;
    Ok(inputs
        .array("pubkey", chunk(&modulus, layout)?)
        .array("signature", chunk_bytes(signature, layout)?)
        .array("barrettReduction", chunk(&barrett, barrett_layout)?))
}

/// Data group, encapsulated content and signed attribute inputs shared by
/// passport circuits.
fn passport_inputs(ctx: &BuildContext<'_>) -> Result<CircuitInputs> {
    let sod = ctx.sod;
    let dg_hash = sod.hash_algorithm();
    let signature_hash = ctx.dispatcher.hash.unwrap_or(sod.signer_digest_algorithm());
    let dg1_shift = sod
        .data_group_hash(1)
        .map(|h| h.offset)
        .ok_or_else(|| PassportError::document("dg1", 0, "no hash recorded in the SOD"))?;

    let mut inputs = CircuitInputs::new()
        .bytes("dg1", &padded("dg1", ctx.document.dg1(), dg_hash, DG1_MAX_BYTES)?)
        .bytes(
            "encapsulatedContent",
            &padded(
                "encapsulatedContent",
                sod.encapsulated_content(),
                sod.signer_digest_algorithm(),
                ENCAPSULATED_CONTENT_MAX_BYTES,
            )?,
        )
        .bytes(
            "signedAttributes",
            &padded(
                "signedAttributes",
                sod.signed_attributes(),
                signature_hash,
                SIGNED_ATTRIBUTES_MAX_BYTES,
            )?,
        )
        .scalar("dg1Shift", dg1_shift as u64)
        .scalar("ecShift", sod.message_digest_offset() as u64);
    if let Some(dg15) = ctx.document.dg15() {
        inputs = inputs.bytes("dg15", &padded("dg15", dg15, dg_hash, DG15_MAX_BYTES)?);
    }
    Ok(inputs)
}

fn build_passport_rsa(ctx: &BuildContext<'_>) -> Result<CircuitInputs> {
    let inputs = passport_inputs(ctx)?;
    let inputs = rsa_inputs(inputs, ctx, ctx.sod.signature())?;
    Ok(smt_inputs(inputs, ctx))
}

/// `ECDSA-Sig-Value ::= SEQUENCE { r INTEGER, s INTEGER }`
fn ecdsa_signature(signature: &[u8]) -> Result<(BigUint, BigUint)> {
    let malformed =
        |e: asn1::DerError| PassportError::sod("signerInfo.signature", e.offset, e.reason);
    let seq = DerReader::new(signature)
        .expect(asn1::TAG_SEQUENCE)
        .map_err(malformed)?;
    let mut parts = seq.children();
    let r = parts.expect(asn1::TAG_INTEGER).map_err(malformed)?;
    let s = parts.expect(asn1::TAG_INTEGER).map_err(malformed)?;
    Ok((
        BigUint::from_bytes_be(r.content()),
        BigUint::from_bytes_be(s.content()),
    ))
}

fn build_passport_ecdsa(ctx: &BuildContext<'_>) -> Result<CircuitInputs> {
    let inputs = passport_inputs(ctx)?;
    let point = ctx.key_certificate.public_key().key_material();
    let half = point.len() / 2;
    let layout = LimbLayout::covering(ctx.dispatcher.bits / 2, ctx.limb_bits)?;

    let mut pubkey = chunk_bytes(&point[..half], layout)?;
    pubkey.extend(chunk_bytes(&point[half..], layout)?);
    let (r, s) = ecdsa_signature(ctx.sod.signature())?;
    let mut signature = chunk(&r, layout)?;
    signature.extend(chunk(&s, layout)?);

    let inputs = inputs.array("pubkey", pubkey).array("signature", signature);
    Ok(smt_inputs(inputs, ctx))
}

fn build_eid_rsa(ctx: &BuildContext<'_>) -> Result<CircuitInputs> {
    let holder = ctx.sod.certificate();
    let tbs_hash =
        oids::signature_hash(holder.signature_algorithm()).unwrap_or(HashAlgorithm::Sha256);
    let inputs = CircuitInputs::new()
        .bytes("dg1", &extract_dg1(holder.tbs())?)
        .bytes("tbs", &padded("tbs", holder.tbs(), tbs_hash, TBS_MAX_BYTES)?);
    let inputs = rsa_inputs(inputs, ctx, holder.signature())?;
    Ok(smt_inputs(inputs, ctx))
}
