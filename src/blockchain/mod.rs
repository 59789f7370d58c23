// src/blockchain/mod.rs
//! Ledger reads, calldata encoding and relayed writes.

pub mod abi;
pub mod ledger_client;
pub mod relayer;

pub use abi::{PassportInfo, SmtProof};
pub use ledger_client::{Ledger, LedgerClient};
pub use relayer::{RelayerClient, TransactionSubmitter};
