// src/trust/tree.rs
//! Merkle tree over trusted country signing CA certificates.
//!
//! Leaves are `keccak256(key material)` sorted ascending, so the root depends
//! only on the set of keys. Interior nodes hash their children as a sorted
//! pair; an unpaired node moves up a level unchanged. Inclusion proofs list
//! siblings from the leaf level up and need no direction bits.

use std::sync::{Arc, RwLock};

use ethers::utils::hex;
use log::{debug, info, warn};
use serde::Serialize;

use crate::certificate::Certificate;
use crate::error::{PassportError, Result};
use crate::utils::crypto::hash_sorted_pair;

/// A versioned set of trusted root certificates, as delivered by the master
/// list collaborator with its signature envelope already removed.
#[derive(Debug, Clone)]
pub struct TrustAnchors {
    pub version: String,
    pub certificates: Vec<Certificate>,
}

impl TrustAnchors {
    /// Parses DER certificates, skipping the ones that fail to decode.
    pub fn from_der(version: impl Into<String>, blobs: &[Vec<u8>]) -> Self {
        let mut certificates = Vec::with_capacity(blobs.len());
        for (i, blob) in blobs.iter().enumerate() {
            match Certificate::parse(blob) {
                Ok(cert) => certificates.push(cert),
                Err(e) => warn!("skipping trust anchor #{}: {}", i, e),
            }
        }
        TrustAnchors {
            version: version.into(),
            certificates,
        }
    }
}

/// Proof that a leaf is part of a [`TrustTree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InclusionProof {
    #[serde(serialize_with = "hex_bytes32")]
    pub leaf: [u8; 32],
    /// Ordered from the leaf level to just below the root.
    #[serde(serialize_with = "hex_bytes32_vec")]
    pub siblings: Vec<[u8; 32]>,
}

impl InclusionProof {
    /// Folds the leaf with every sibling.
    pub fn compute_root(&self) -> [u8; 32] {
        self.siblings
            .iter()
            .fold(self.leaf, |node, sibling| hash_sorted_pair(&node, sibling))
    }

    pub fn verify(&self, root: &[u8; 32]) -> bool {
        &self.compute_root() == root
    }
}

#[derive(Debug, Clone)]
pub struct TrustTree {
    version: String,
    certificates: Vec<Certificate>,
    /// `levels[0]` are the sorted leaves, the last level holds the root.
    levels: Vec<Vec<[u8; 32]>>,
}

impl TrustTree {
    /// Builds the tree. Duplicate keys collapse into one leaf.
    pub fn build(anchors: &TrustAnchors) -> Self {
        let mut entries: Vec<([u8; 32], &Certificate)> = anchors
            .certificates
            .iter()
            .map(|c| (c.key_id(), c))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.dedup_by(|a, b| a.0 == b.0);

        let leaves: Vec<[u8; 32]> = entries.iter().map(|(k, _)| *k).collect();
        let certificates = entries.into_iter().map(|(_, c)| c.clone()).collect();

        let mut levels = Vec::new();
        if !leaves.is_empty() {
            levels.push(leaves);
            while let Some(level) = levels.last().filter(|l| l.len() > 1) {
                let next = level
                    .chunks(2)
                    .map(|pair| match pair {
                        [a, b] => hash_sorted_pair(a, b),
                        _ => pair[0],
                    })
                    .collect();
                levels.push(next);
            }
        }

        let tree = TrustTree {
            version: anchors.version.clone(),
            certificates,
            levels,
        };
        info!(
            "built trust tree version {} with {} leaves, root {}",
            tree.version,
            tree.len(),
            tree.root().map(hex::encode).unwrap_or_else(|| "none".into())
        );
        tree
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Root hash; `None` for an empty tree.
    pub fn root(&self) -> Option<[u8; 32]> {
        self.levels.last().and_then(|l| l.first()).copied()
    }

    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    /// Proves that `certificate`'s key is a leaf.
    ///
    /// # Errors
    /// `NotFound` when the key is not in the tree.
    pub fn prove_inclusion(&self, certificate: &Certificate) -> Result<InclusionProof> {
        let leaf = certificate.key_id();
        let mut index = self
            .levels
            .first()
            .and_then(|leaves| leaves.binary_search(&leaf).ok())
            .ok_or_else(|| {
                PassportError::NotFound(format!("certificate 0x{} in trust tree", hex::encode(leaf)))
            })?;

        let mut siblings = Vec::new();
        for level in &self.levels[..self.levels.len() - 1] {
            if let Some(sibling) = level.get(index ^ 1) {
                siblings.push(*sibling);
            }
            index /= 2;
        }
        debug!("inclusion proof with {} siblings", siblings.len());
        Ok(InclusionProof { leaf, siblings })
    }

    /// Finds the certificate that issued `certificate`.
    ///
    /// Candidates must have a subject equal to the certificate's issuer name.
    /// When both sides carry key identifiers, a matching identifier wins;
    /// a candidate whose identifier disagrees is skipped.
    pub fn find_issuer(&self, certificate: &Certificate) -> Option<&Certificate> {
        let aki = certificate.authority_key_id();
        let mut fallback = None;
        for candidate in self
            .certificates
            .iter()
            .filter(|c| c.subject() == certificate.issuer())
        {
            match (aki, candidate.subject_key_id()) {
                (Some(a), Some(s)) if a == s => return Some(candidate),
                (Some(_), Some(_)) => continue,
                _ => {
                    if fallback.is_none() {
                        fallback = Some(candidate);
                    }
                }
            }
        }
        fallback
    }
}

/// Owned, versioned trust tree shared by the orchestrator and the HTTP surface.
#[derive(Debug)]
pub struct TrustStore {
    current: RwLock<Arc<TrustTree>>,
}

impl TrustStore {
    pub fn new(anchors: &TrustAnchors) -> Self {
        TrustStore {
            current: RwLock::new(Arc::new(TrustTree::build(anchors))),
        }
    }

    /// Snapshot of the current tree.
    pub fn tree(&self) -> Arc<TrustTree> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Rebuilds the tree if `anchors` carries a different version.
    /// Returns whether a rebuild happened.
    pub fn update(&self, anchors: &TrustAnchors) -> bool {
        if self.tree().version() == anchors.version {
            debug!("trust anchors version {} unchanged", anchors.version);
            return false;
        }
        let rebuilt = Arc::new(TrustTree::build(anchors));
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = rebuilt;
        true
    }
}

fn hex_bytes32<S: serde::Serializer>(value: &[u8; 32], s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&format!("0x{}", hex::encode(value)))
}

fn hex_bytes32_vec<S: serde::Serializer>(
    values: &[[u8; 32]],
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.collect_seq(values.iter().map(|v| format!("0x{}", hex::encode(v))))
}
