// src/lib.rs
//! # Passport Identity
//!
//! Verification core for electronic passports and ID cards: certificate and
//! security object parsing, algorithm dispatch, the trusted-root Merkle tree,
//! circuit input construction and the registration flow that turns a
//! verified document into a zero-knowledge identity on the ledger.

pub mod blockchain;
pub mod certificate;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod services;
pub mod trust;
pub mod utils;
pub mod zkp;

#[cfg(test)]
mod test_fixtures;

pub use error::{ErrorKind, PassportError, Result};
