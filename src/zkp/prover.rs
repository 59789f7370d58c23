// src/zkp/prover.rs
//! Proof generation through a remote witness/proving service.
//!
//! Proving is expensive and runs out of process. The service takes the
//! rendered circuit inputs and answers with the proof bytes and the public
//! signals. Download progress is reported while the response streams in.

use std::future::Future;
use std::time::Duration;

use log::{debug, info};
use serde::Serialize;

use super::circuit_inputs::{CircuitInputs, NumericFormat};
use crate::error::{PassportError, Result};
use crate::models::identity::RegistrationProof;

/// Progress callback: bytes received so far, total if the server announced it.
pub type ProgressFn<'a> = dyn Fn(u64, Option<u64>) + Send + Sync + 'a;

/// Produces a proof for a named circuit. Inputs are consumed.
pub trait Prover: Send + Sync {
    fn prove(
        &self,
        circuit: &str,
        inputs: CircuitInputs,
        progress: &ProgressFn<'_>,
    ) -> impl Future<Output = Result<RegistrationProof>> + Send;
}

#[derive(Serialize)]
struct ProveRequest<'a> {
    circuit: &'a str,
    inputs: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct HttpProver {
    client: reqwest::Client,
    base_url: String,
    format: NumericFormat,
}

impl HttpProver {
    pub fn new(base_url: impl Into<String>, format: NumericFormat) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| PassportError::ProofGenerationFailed(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            format,
        })
    }
}

fn failed(e: impl std::fmt::Display) -> PassportError {
    PassportError::ProofGenerationFailed(e.to_string())
}

impl Prover for HttpProver {
    async fn prove(
        &self,
        circuit: &str,
        inputs: CircuitInputs,
        progress: &ProgressFn<'_>,
    ) -> Result<RegistrationProof> {
        let body = ProveRequest {
            circuit,
            inputs: inputs.to_json(self.format),
        };
        info!("requesting proof for {} ({} inputs)", circuit, inputs.len());
        drop(inputs);

        let mut response = self
            .client
            .post(format!("{}/prove", self.base_url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .map_err(failed)?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("prover returned {}", status)));
        }

        let total = response.content_length();
        let mut received = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(failed)? {
            received.extend_from_slice(&chunk);
            progress(received.len() as u64, total);
        }
        debug!("received {} bytes of proof response", received.len());

        serde_json::from_slice(&received).map_err(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{mock, Matcher};
    use num_bigint::BigUint;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[tokio::test]
    async fn test_prove_posts_inputs_and_reports_progress() {
        let body = json!({
            "proof": base64::encode([7u8; 64]),
            "public_signals": ["1", "2", "3", "4", "5"]
        })
        .to_string();
        let _m = mock("POST", "/prover-ok/prove")
            .match_body(Matcher::PartialJson(json!({
                "circuit": "registerIdentity_RSA_SHA256_2048",
                "inputs": {"skIdentity": "0x2a"}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.clone())
            .create();

        let prover =
            HttpProver::new(format!("{}/prover-ok", mockito::server_url()), NumericFormat::Hex)
                .unwrap();
        let seen = AtomicU64::new(0);
        let inputs = CircuitInputs::new().scalar("skIdentity", 42u32);
        let proof = prover
            .prove("registerIdentity_RSA_SHA256_2048", inputs, &|done, _| {
                seen.store(done, Ordering::SeqCst)
            })
            .await
            .unwrap();

        assert_eq!(proof.proof, vec![7u8; 64]);
        assert_eq!(proof.public_signals[4], BigUint::from(5u8));
        assert_eq!(seen.load(Ordering::SeqCst), body.len() as u64);
    }

    #[tokio::test]
    async fn test_prover_failure_maps_to_generation_error() {
        let _m = mock("POST", "/prover-down/prove").with_status(500).create();
        let prover = HttpProver::new(
            format!("{}/prover-down", mockito::server_url()),
            NumericFormat::Decimal,
        )
        .unwrap();
        let err = prover
            .prove("c", CircuitInputs::new(), &|_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, PassportError::ProofGenerationFailed(_)));
    }

    #[tokio::test]
    async fn test_garbled_response_is_generation_error() {
        let _m = mock("POST", "/prover-garbled/prove")
            .with_status(200)
            .with_body("not json")
            .create();
        let prover = HttpProver::new(
            format!("{}/prover-garbled", mockito::server_url()),
            NumericFormat::Decimal,
        )
        .unwrap();
        let err = prover
            .prove("c", CircuitInputs::new(), &|_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, PassportError::ProofGenerationFailed(_)));
    }
}
