// src/main.rs

//! # Passport Identity - Service Entry Point
//!
//! Loads the trusted root certificates, builds the trust tree and serves the
//! HTTP surface.
//!
//! `passport-identity register <document.json> <sk_identity>` instead runs a
//! single registration for a document in transport form and prints the
//! resulting identity blob.
//!
//! ## Configuration
//! See [`passport_identity::config`]; every setting can be overridden with a
//! `PASSPORT_*` environment variable, optionally from a `.env` file.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenv::dotenv;
use log::{info, warn};
use num_bigint::BigUint;

use passport_identity::blockchain::{LedgerClient, RelayerClient};
use passport_identity::config::Settings;
use passport_identity::models::Document;
use passport_identity::services::{ApiServer, RegistrationOrchestrator, RegistrationRequest};
use passport_identity::trust::{TrustAnchors, TrustStore};
use passport_identity::zkp::{HttpProver, RegistrationVerifier};

/// Reads every `.der`, `.cer` and `.crt` file in `dir`.
fn load_anchors(dir: &Path, version: &str) -> Result<TrustAnchors> {
    let mut blobs = Vec::new();
    let entries = fs::read_dir(dir)
        .with_context(|| format!("reading master list directory {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        let is_certificate = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| matches!(e.to_ascii_lowercase().as_str(), "der" | "cer" | "crt"))
            .unwrap_or(false);
        if is_certificate {
            blobs.push(fs::read(&path).with_context(|| format!("reading {}", path.display()))?);
        }
    }
    Ok(TrustAnchors::from_der(version, &blobs))
}

async fn register(
    settings: &Settings,
    trust: Arc<TrustStore>,
    document_path: &str,
    sk_identity: &str,
) -> Result<()> {
    let transport = fs::read_to_string(document_path)
        .with_context(|| format!("reading {}", document_path))?;
    let document = Document::from_transport(&transport)?;
    let sk_identity = BigUint::parse_bytes(sk_identity.as_bytes(), 10)
        .context("sk_identity must be a decimal integer")?;

    let ledger = LedgerClient::new(&settings.rpc_url, settings.smt_depth)?;
    let prover = HttpProver::new(settings.prover_url.clone(), settings.numeric_format)?;
    let relayer = RelayerClient::new(settings.relayer_url.clone());
    let mut orchestrator = RegistrationOrchestrator::new(
        trust,
        ledger,
        prover,
        relayer,
        settings.registration_settings()?,
    )
    .with_event_hook(Box::new(|event| info!("{:?}", event)));
    if let Some(path) = &settings.verifying_key_path {
        orchestrator = orchestrator.with_verifier(RegistrationVerifier::from_file(path)?);
    }

    let identity = orchestrator
        .register(RegistrationRequest {
            document,
            sk_identity,
        })
        .await?;
    println!("{}", identity.serialize()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load().context("loading configuration")?;

    let anchors = load_anchors(&settings.master_list_dir, &settings.trust_anchor_version)?;
    if anchors.certificates.is_empty() {
        warn!(
            "no trust anchors in {}, every issuer lookup will fail",
            settings.master_list_dir.display()
        );
    }
    let trust = Arc::new(TrustStore::new(&anchors));
    info!(
        "trust tree {} built over {} anchors",
        trust.tree().version(),
        trust.tree().len()
    );

    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) == Some("register") {
        let (Some(document_path), Some(sk_identity)) = (args.get(2), args.get(3)) else {
            anyhow::bail!("usage: passport-identity register <document.json> <sk_identity>");
        };
        return register(&settings, trust, document_path, sk_identity).await;
    }

    let addr: SocketAddr = settings
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen_addr {}", settings.listen_addr))?;
    ApiServer::new(
        trust,
        settings.smt_depth,
        settings.limb_bits,
        settings.numeric_format,
    )
    .run(addr)
    .await
    .context("serving HTTP")?;
    Ok(())
}
