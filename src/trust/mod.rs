// src/trust/mod.rs
//! Trusted root certificates and the Merkle tree built over them.

pub mod tree;

pub use tree::{InclusionProof, TrustAnchors, TrustStore, TrustTree};
