// src/blockchain/ledger_client.rs
//! Read access to the registration contracts.
//!
//! Both reads are plain `eth_call`s. The client does no consistency checking
//! beyond bounding the SMT sibling count by the tree depth; failures surface as
//! `ProofFetchFailed` and retries belong to the caller.

use std::future::Future;
use std::sync::Arc;

use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, TransactionRequest};
use ethers::utils::hex;
use log::debug;

use super::abi::{self, PassportInfo, SmtProof};
use crate::error::{PassportError, Result};

/// Fixed depth of the certificates SMT.
pub const DEFAULT_SMT_DEPTH: usize = 80;

/// The two ledger reads the registration flow needs.
pub trait Ledger: Send + Sync {
    /// `getProof(key)` on an SMT contract.
    fn get_proof(
        &self,
        contract: Address,
        key: [u8; 32],
    ) -> impl Future<Output = Result<SmtProof>> + Send;

    /// `getPassportInfo(passportKey)` on the state keeper.
    fn get_passport_info(
        &self,
        contract: Address,
        passport_key: [u8; 32],
    ) -> impl Future<Output = Result<PassportInfo>> + Send;
}

/// Rejects proofs with more siblings than the tree can have.
pub fn check_depth(proof: &SmtProof, depth: usize) -> Result<()> {
    if proof.siblings.len() > depth {
        return Err(PassportError::ProofFetchFailed(format!(
            "{} siblings exceed SMT depth {}",
            proof.siblings.len(),
            depth
        )));
    }
    Ok(())
}

/// JSON-RPC ledger client.
#[derive(Clone)]
pub struct LedgerClient {
    provider: Arc<Provider<Http>>,
    smt_depth: usize,
}

impl LedgerClient {
    /// Creates a client for `rpc_url`.
    ///
    /// # Errors
    /// `ProofFetchFailed` if the URL cannot be parsed.
    pub fn new(rpc_url: &str, smt_depth: usize) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| PassportError::ProofFetchFailed(format!("invalid RPC url: {}", e)))?;
        Ok(Self {
            provider: Arc::new(provider),
            smt_depth,
        })
    }

    pub fn smt_depth(&self) -> usize {
        self.smt_depth
    }

    async fn call(&self, contract: Address, data: Vec<u8>) -> Result<Vec<u8>> {
        let tx = TransactionRequest::new().to(contract).data(data);
        let output = self
            .provider
            .call(&tx.into(), None)
            .await
            .map_err(|e| PassportError::ProofFetchFailed(e.to_string()))?;
        Ok(output.to_vec())
    }
}

impl Ledger for LedgerClient {
    async fn get_proof(&self, contract: Address, key: [u8; 32]) -> Result<SmtProof> {
        debug!("getProof 0x{} on {:?}", hex::encode(key), contract);
        let output = self.call(contract, abi::encode_get_proof(&key)).await?;
        let proof = abi::decode_get_proof(&output)?;
        check_depth(&proof, self.smt_depth)?;
        Ok(proof)
    }

    async fn get_passport_info(
        &self,
        contract: Address,
        passport_key: [u8; 32],
    ) -> Result<PassportInfo> {
        debug!("getPassportInfo 0x{} on {:?}", hex::encode(passport_key), contract);
        let output = self
            .call(contract, abi::encode_get_passport_info(&passport_key))
            .await?;
        abi::decode_get_passport_info(&output)
    }
}
