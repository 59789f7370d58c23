// src/blockchain/relayer.rs
//! Transaction submission through the registration relayer.
//!
//! The relayer pays gas and forwards `tx_data` to `destination`. Submission is
//! fire-and-forget: the returned identifier can be polled elsewhere.

use std::future::Future;

use ethers::types::Address;
use ethers::utils::hex;
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{PassportError, Result};

/// The single write path to the ledger.
pub trait TransactionSubmitter: Send + Sync {
    /// Sends calldata to `destination`, returning the relayer's transaction id.
    fn submit(
        &self,
        destination: Address,
        tx_data: Vec<u8>,
    ) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Serialize)]
struct RelayerRequest {
    data: RelayerRequestData,
}

#[derive(Serialize)]
struct RelayerRequestData {
    attributes: RelayerAttributes,
}

#[derive(Serialize)]
struct RelayerAttributes {
    tx_data: String,
    destination: String,
}

#[derive(Deserialize)]
struct RelayerResponse {
    data: RelayerResponseData,
}

#[derive(Deserialize)]
struct RelayerResponseData {
    id: String,
    #[serde(default)]
    attributes: Option<RelayerTx>,
}

#[derive(Deserialize)]
struct RelayerTx {
    tx_hash: String,
}

/// HTTP client for the relayer's JSON:API endpoint.
#[derive(Debug, Clone)]
pub struct RelayerClient {
    client: reqwest::Client,
    url: String,
}

impl RelayerClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl TransactionSubmitter for RelayerClient {
    async fn submit(&self, destination: Address, tx_data: Vec<u8>) -> Result<String> {
        let body = RelayerRequest {
            data: RelayerRequestData {
                attributes: RelayerAttributes {
                    tx_data: format!("0x{}", hex::encode(&tx_data)),
                    destination: format!("0x{}", hex::encode(destination.as_bytes())),
                },
            },
        };
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PassportError::RegistrationSubmissionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PassportError::RegistrationSubmissionFailed(format!(
                "relayer returned {}: {}",
                status, text
            )));
        }

        let parsed: RelayerResponse = response
            .json()
            .await
            .map_err(|e| PassportError::RegistrationSubmissionFailed(e.to_string()))?;
        let id = match parsed.data.attributes {
            Some(tx) => tx.tx_hash,
            None => parsed.data.id,
        };
        info!("relayer accepted {} bytes of calldata as {}", tx_data.len(), id);
        Ok(id)
    }
}
