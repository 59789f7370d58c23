// src/models/mod.rs
pub mod document;
pub mod identity;

pub use document::{Document, DocumentCommon, DocumentKind, PersonDetails};
pub use identity::{Identity, RegistrationProof};
