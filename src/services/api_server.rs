// src/services/api_server.rs
//! API Server for the passport verification core
//!
//! Exposes the stateless operations over HTTP with Axum:
//! - trust tree status and inclusion proofs for trusted certificates
//! - algorithm classification of a certificate
//! - circuit input generation for a document
//!
//! Registration itself is not served here; it runs through
//! [`RegistrationOrchestrator`](super::registration::RegistrationOrchestrator).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use ethers::utils::hex;
use log::{info, warn};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::blockchain::SmtProof;
use crate::certificate::Certificate;
use crate::dispatcher::{classify, Dispatcher};
use crate::error::{ErrorKind, PassportError};
use crate::models::document::Document;
use crate::trust::{InclusionProof, TrustStore};
use crate::zkp::circuit_inputs::builders::key_certificate;
use crate::zkp::circuit_inputs::{select_variant, BuildContext, NumericFormat};

#[derive(Serialize, Deserialize)]
struct CertificateRequest {
    /// Base64 DER.
    certificate: String,
}

#[derive(Serialize)]
struct DispatcherResponse {
    #[serde(flatten)]
    dispatcher: Dispatcher,
    data_type: String,
}

#[derive(Serialize)]
struct InclusionProofResponse {
    tree_version: String,
    root: String,
    #[serde(flatten)]
    proof: InclusionProof,
}

#[derive(Serialize)]
struct TrustTreeResponse {
    version: String,
    size: usize,
    root: Option<String>,
}

#[derive(Deserialize)]
struct SmtProofRequest {
    root: String,
    siblings: Vec<String>,
    existence: bool,
}

#[derive(Deserialize)]
struct CircuitInputsRequest {
    document: Document,
    /// Decimal.
    sk_identity: String,
    smt_proof: SmtProofRequest,
    #[serde(default)]
    format: Option<NumericFormat>,
}

#[derive(Serialize)]
struct CircuitInputsResponse {
    circuit: String,
    dispatcher: String,
    inputs: Value,
}

#[derive(Serialize)]
struct ErrorResponse {
    kind: Option<ErrorKind>,
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::MalformedCertificate
        | ErrorKind::MalformedSod
        | ErrorKind::MalformedDocument
        | ErrorKind::Serialization => StatusCode::BAD_REQUEST,
        ErrorKind::UnsupportedKeyAlgorithm | ErrorKind::UnsupportedCircuit => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::UntrustedIssuer => StatusCode::FORBIDDEN,
        ErrorKind::StaleTrustTree => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(e: PassportError) -> ApiError {
    let kind = e.kind();
    warn!("request rejected: {}", e);
    (
        status_for(kind),
        Json(ErrorResponse {
            kind: Some(kind),
            error: e.to_string(),
        }),
    )
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            kind: None,
            error: message.into(),
        }),
    )
}

fn hex32(value: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(value))
}

fn parse_bytes32(field: &str, value: &str) -> Result<[u8; 32], ApiError> {
    let bytes = hex::decode(value.trim_start_matches("0x"))
        .map_err(|_| bad_request(format!("{} is not hex", field)))?;
    let mut out = [0u8; 32];
    if bytes.len() > 32 {
        return Err(bad_request(format!("{} exceeds 32 bytes", field)));
    }
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}

fn parse_certificate(encoded: &str) -> Result<Certificate, ApiError> {
    let der = base64::decode(encoded).map_err(|_| bad_request("certificate is not base64"))?;
    Certificate::parse(&der).map_err(reject)
}

/// API server state
pub struct ApiServer {
    /// Trust tree shared with the registration flow
    trust: Arc<TrustStore>,
    smt_depth: usize,
    limb_bits: usize,
    numeric_format: NumericFormat,
}

impl ApiServer {
    pub fn new(
        trust: Arc<TrustStore>,
        smt_depth: usize,
        limb_bits: usize,
        numeric_format: NumericFormat,
    ) -> Self {
        ApiServer {
            trust,
            smt_depth,
            limb_bits,
            numeric_format,
        }
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/health", get(Self::health_handler))
            .route("/trust-tree", get(Self::trust_tree_handler))
            .route("/certificates/dispatcher", post(Self::dispatcher_handler))
            .route(
                "/certificates/inclusion-proof",
                post(Self::inclusion_proof_handler),
            )
            .route("/circuit-inputs", post(Self::circuit_inputs_handler))
            .with_state(Arc::new(self))
    }

    /// Binds `addr` and serves until the listener fails.
    pub async fn run(self, addr: SocketAddr) -> std::io::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on http://{}", addr);
        axum::serve(listener, app).await
    }

    /// GET /health
    async fn health_handler() -> Json<Value> {
        Json(json!({ "status": "ok" }))
    }

    /// GET /trust-tree
    async fn trust_tree_handler(State(state): State<Arc<ApiServer>>) -> Json<TrustTreeResponse> {
        let tree = state.trust.tree();
        Json(TrustTreeResponse {
            version: tree.version().to_string(),
            size: tree.len(),
            root: tree.root().as_ref().map(hex32),
        })
    }

    /// POST /certificates/dispatcher
    ///
    /// # Responses
    /// - 200 OK: dispatcher name, family, bits and on-chain data type
    /// - 400 Bad Request: certificate does not decode
    /// - 422 Unprocessable Entity: key algorithm not supported
    async fn dispatcher_handler(
        Json(payload): Json<CertificateRequest>,
    ) -> ApiResult<DispatcherResponse> {
        let certificate = parse_certificate(&payload.certificate)?;
        let dispatcher = classify(&certificate).map_err(reject)?;
        let data_type = hex32(&dispatcher.data_type());
        Ok(Json(DispatcherResponse {
            dispatcher,
            data_type,
        }))
    }

    /// POST /certificates/inclusion-proof
    ///
    /// # Responses
    /// - 200 OK: leaf, siblings (leaf to root) and the root they fold to
    /// - 404 Not Found: certificate is not a trust anchor
    async fn inclusion_proof_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<CertificateRequest>,
    ) -> ApiResult<InclusionProofResponse> {
        let certificate = parse_certificate(&payload.certificate)?;
        let tree = state.trust.tree();
        let proof = tree.prove_inclusion(&certificate).map_err(reject)?;
        Ok(Json(InclusionProofResponse {
            tree_version: tree.version().to_string(),
            root: hex32(&proof.compute_root()),
            proof,
        }))
    }

    /// POST /circuit-inputs
    ///
    /// Builds the inputs the registration circuit would receive for a
    /// document, its owner's secret and a caller-supplied SMT proof.
    async fn circuit_inputs_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<CircuitInputsRequest>,
    ) -> ApiResult<CircuitInputsResponse> {
        let sk_identity = BigUint::parse_bytes(payload.sk_identity.as_bytes(), 10)
            .ok_or_else(|| bad_request("sk_identity is not a decimal integer"))?;
        let smt_proof = SmtProof {
            root: parse_bytes32("smt_proof.root", &payload.smt_proof.root)?,
            siblings: payload
                .smt_proof
                .siblings
                .iter()
                .map(|s| parse_bytes32("smt_proof.siblings", s))
                .collect::<Result<_, _>>()?,
            existence: payload.smt_proof.existence,
        };
        if smt_proof.siblings.len() > state.smt_depth {
            return Err(bad_request("smt_proof has more siblings than the tree depth"));
        }

        let document = &payload.document;
        let sod = document.security_object().map_err(reject)?;
        document.verify_against(&sod).map_err(reject)?;

        let tree = state.trust.tree();
        let issuer = tree.find_issuer(sod.certificate()).ok_or_else(|| {
            reject(PassportError::UntrustedIssuer(
                "no trusted issuer for the document signer".to_string(),
            ))
        })?;
        let kind = document.kind();
        let key_cert = key_certificate(kind, &sod, issuer);
        let dispatcher = classify(key_cert).map_err(reject)?;
        let variant = select_variant(kind, dispatcher.family).map_err(reject)?;
        let inputs = (variant.build)(&BuildContext {
            document,
            sod: &sod,
            key_certificate: key_cert,
            dispatcher: &dispatcher,
            sk_identity: &sk_identity,
            smt_proof: &smt_proof,
            smt_depth: state.smt_depth,
            limb_bits: state.limb_bits,
        })
        .map_err(reject)?;

        let format = payload.format.unwrap_or(state.numeric_format);
        Ok(Json(CircuitInputsResponse {
            circuit: variant.circuit_name(&dispatcher),
            dispatcher: dispatcher.name.clone(),
            inputs: inputs.to_json(format),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::DocumentKind;
    use crate::test_fixtures::{self, CertSpec, SodSpec};
    use crate::trust::TrustAnchors;
    use crate::utils::crypto::HashAlgorithm;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn csca() -> CertSpec {
        CertSpec::rsa(384, true)
    }

    fn app() -> Router {
        let blobs = vec![
            test_fixtures::certificate(&csca()),
            test_fixtures::certificate(&CertSpec::rsa(256, true).with_seed(9).with_names("B", "B")),
        ];
        let store = Arc::new(TrustStore::new(&TrustAnchors::from_der("2024-01", &blobs)));
        ApiServer::new(store, 80, 120, NumericFormat::Decimal).router()
    }

    async fn call(method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(if method == "GET" {
                Body::empty()
            } else {
                Body::from(body.to_string())
            })
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn encoded(spec: &CertSpec) -> String {
        base64::encode(test_fixtures::certificate(spec))
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call("GET", "/health", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_trust_tree_summary() {
        let (status, body) = call("GET", "/trust-tree", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], "2024-01");
        assert_eq!(body["size"], 2);
        assert!(body["root"].as_str().unwrap().starts_with("0x"));
    }

    #[tokio::test]
    async fn test_dispatcher_endpoint() {
        let (status, body) = call(
            "POST",
            "/certificates/dispatcher",
            json!({ "certificate": encoded(&CertSpec::rsa(256, false)) }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "RSA_SHA256_2048");
        assert_eq!(body["bits"], 2048);
        assert_eq!(
            body["data_type"],
            hex32(&crate::utils::crypto::hash_data(b"RSA_SHA256_2048"))
        );
    }

    #[tokio::test]
    async fn test_dispatcher_rejects_pss() {
        let (status, body) = call(
            "POST",
            "/certificates/dispatcher",
            json!({ "certificate": encoded(&CertSpec::rsa_pss(256)) }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "UnsupportedKeyAlgorithm");
    }

    #[tokio::test]
    async fn test_dispatcher_rejects_garbage() {
        let (status, _) = call(
            "POST",
            "/certificates/dispatcher",
            json!({ "certificate": base64::encode([0x30, 0x05, 0x01]) }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_inclusion_proof_endpoint() {
        let (_, tree) = call("GET", "/trust-tree", Value::Null).await;
        let (status, body) = call(
            "POST",
            "/certificates/inclusion-proof",
            json!({ "certificate": encoded(&csca()) }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["root"], tree["root"]);
        assert_eq!(body["siblings"].as_array().unwrap().len(), 1);

        let (status, body) = call(
            "POST",
            "/certificates/inclusion-proof",
            json!({ "certificate": encoded(&CertSpec::rsa(256, true).with_seed(77)) }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "NotFound");
    }

    fn circuit_request(document: &Document) -> Value {
        json!({
            "document": document,
            "sk_identity": "12345",
            "smt_proof": {
                "root": format!("0x{}", "ab".repeat(32)),
                "siblings": ["0x01", "0x02"],
                "existence": true
            },
            "format": "hex"
        })
    }

    #[tokio::test]
    async fn test_circuit_inputs_endpoint() {
        let signer = test_fixtures::document_signer(&csca());
        let document = test_fixtures::passport(&SodSpec::new(signer, HashAlgorithm::Sha256));
        let (status, body) = call("POST", "/circuit-inputs", circuit_request(&document)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["circuit"], "registerIdentity_RSA_SHA256_2048");
        assert_eq!(body["inputs"]["skIdentity"], "0x3039");
        assert_eq!(
            body["inputs"]["slaveMerkleInclusionBranches"]
                .as_array()
                .unwrap()
                .len(),
            80
        );
    }

    #[tokio::test]
    async fn test_circuit_inputs_rejects_tampered_dg15() {
        let signer = test_fixtures::document_signer(&csca());
        let spec = SodSpec::new(signer, HashAlgorithm::Sha256);
        let mut dg15 = spec.dg15.clone();
        let last = dg15.len() - 1;
        dg15[last] ^= 0xFF;
        let document = Document::from_raw(
            DocumentKind::Passport,
            spec.dg1.clone(),
            test_fixtures::sod(&spec),
            None,
            Some(dg15),
            None,
        )
        .unwrap();

        let (status, body) = call("POST", "/circuit-inputs", circuit_request(&document)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "MalformedDocument");
    }

    #[tokio::test]
    async fn test_circuit_inputs_untrusted_issuer() {
        let foreign = CertSpec::rsa(256, true)
            .with_seed(50)
            .with_names("Nowhere CSCA", "Nowhere CSCA");
        let signer = test_fixtures::document_signer(&foreign);
        let document = test_fixtures::passport(&SodSpec::new(signer, HashAlgorithm::Sha256));
        let (status, body) = call("POST", "/circuit-inputs", circuit_request(&document)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], "UntrustedIssuer");
    }
}
