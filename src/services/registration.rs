// src/services/registration.rs
//! Registration orchestrator.
//!
//! Drives one registration attempt through
//! `Idle -> FetchingInclusionProof -> BuildingInputs -> GeneratingProof -> Registered`,
//! with `Failed(kind)` reachable from every stage. The current state is
//! published on a `watch` channel; progress and submissions are reported
//! through an optional event hook.
//!
//! At most one attempt runs at a time per orchestrator. Cancellation is
//! cooperative and only observed between stages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ethers::types::Address;
use ethers::utils::hex;
use log::{debug, info, warn};
use num_bigint::BigUint;
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::blockchain::abi::{self, CertificateRegistration, IdentityRegistration};
use crate::blockchain::ledger_client::check_depth;
use crate::blockchain::{Ledger, SmtProof, TransactionSubmitter};
use crate::certificate::{Certificate, SecurityObject};
use crate::dispatcher::{classify, Dispatcher};
use crate::error::{ErrorKind, PassportError, Result};
use crate::models::document::{Document, DocumentKind};
use crate::models::identity::{to_bytes32, Identity};
use crate::trust::{InclusionProof, TrustStore};
use crate::zkp::circuit_inputs::builders::key_certificate;
use crate::zkp::circuit_inputs::{select_variant, BuildContext};
use crate::zkp::proof_verification::RegistrationVerifier;
use crate::zkp::Prover;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegistrationState {
    Idle,
    FetchingInclusionProof,
    BuildingInputs,
    GeneratingProof,
    Registered,
    Failed(ErrorKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationEvent {
    StateChanged(RegistrationState),
    ProofGenerationStarted { circuit: String },
    /// Bytes of the prover response received so far.
    DownloadProgress { received: u64, total: Option<u64> },
    CertificateSubmitted { tx_id: String },
    RegistrationSubmitted { tx_id: String },
}

pub type EventHook = Box<dyn Fn(RegistrationEvent) + Send + Sync>;

/// Contract addresses and circuit parameters for one deployment.
#[derive(Debug, Clone)]
pub struct RegistrationSettings {
    pub registration_contract: Address,
    pub certificates_smt_contract: Address,
    pub state_keeper_contract: Address,
    /// Root the ledger currently accepts. Unset skips the staleness check.
    pub published_trust_root: Option<[u8; 32]>,
    pub smt_depth: usize,
    pub limb_bits: usize,
}

pub struct RegistrationRequest {
    pub document: Document,
    pub sk_identity: BigUint,
}

pub struct RegistrationOrchestrator<L, P, S> {
    trust: Arc<TrustStore>,
    ledger: L,
    prover: P,
    submitter: S,
    settings: RegistrationSettings,
    verifier: Option<RegistrationVerifier>,
    hook: Option<EventHook>,
    state: watch::Sender<RegistrationState>,
    in_flight: Mutex<()>,
    cancelled: AtomicBool,
}

impl<L, P, S> RegistrationOrchestrator<L, P, S>
where
    L: Ledger,
    P: Prover,
    S: TransactionSubmitter,
{
    pub fn new(
        trust: Arc<TrustStore>,
        ledger: L,
        prover: P,
        submitter: S,
        settings: RegistrationSettings,
    ) -> Self {
        let (state, _) = watch::channel(RegistrationState::Idle);
        Self {
            trust,
            ledger,
            prover,
            submitter,
            settings,
            verifier: None,
            hook: None,
            state,
            in_flight: Mutex::new(()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Verify proofs locally before submitting them.
    pub fn with_verifier(mut self, verifier: RegistrationVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_event_hook(mut self, hook: EventHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<RegistrationState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> RegistrationState {
        *self.state.borrow()
    }

    /// Requests cancellation of the running attempt at its next stage boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Runs one registration attempt to completion.
    ///
    /// # Errors
    /// `RegistrationInProgress` without touching the running attempt if one
    /// is already in flight. Every other failure also moves the published
    /// state to `Failed`.
    pub async fn register(&self, request: RegistrationRequest) -> Result<Identity> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| PassportError::RegistrationInProgress)?;
        self.cancelled.store(false, Ordering::SeqCst);

        let outcome = self.run(request).await;
        match &outcome {
            Ok(_) => self.publish(RegistrationState::Registered),
            Err(e) => {
                warn!("registration failed: {}", e);
                self.publish(RegistrationState::Failed(e.kind()));
            }
        }
        outcome
    }

    fn emit(&self, event: RegistrationEvent) {
        if let Some(hook) = &self.hook {
            hook(event);
        }
    }

    fn publish(&self, state: RegistrationState) {
        self.state.send_replace(state);
        self.emit(RegistrationEvent::StateChanged(state));
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(PassportError::Cancelled);
        }
        Ok(())
    }

    fn enter(&self, state: RegistrationState) -> Result<()> {
        self.check_cancelled()?;
        info!("registration stage {:?}", state);
        self.publish(state);
        Ok(())
    }

    async fn run(&self, request: RegistrationRequest) -> Result<Identity> {
        let RegistrationRequest {
            document,
            sk_identity,
        } = request;

        self.enter(RegistrationState::FetchingInclusionProof)?;
        let sod = document.security_object()?;
        let tree = self.trust.tree();
        let issuer = tree.find_issuer(sod.certificate()).ok_or_else(|| {
            PassportError::UntrustedIssuer(format!(
                "no issuer for the document signer in trust tree {}",
                tree.version()
            ))
        })?;
        let inclusion = tree.prove_inclusion(issuer)?;
        self.check_trust_root(&inclusion)?;
        let smt_proof = self.certificate_proof(&sod, issuer, &inclusion).await?;

        self.enter(RegistrationState::BuildingInputs)?;
        document.verify_against(&sod)?;
        let kind = document.kind();
        let key_cert = key_certificate(kind, &sod, issuer);
        let dispatcher = classify(key_cert)?;
        let variant = select_variant(kind, dispatcher.family)?;
        let circuit = variant.circuit_name(&dispatcher);
        let inputs = (variant.build)(&BuildContext {
            document: &document,
            sod: &sod,
            key_certificate: key_cert,
            dispatcher: &dispatcher,
            sk_identity: &sk_identity,
            smt_proof: &smt_proof,
            smt_depth: self.settings.smt_depth,
            limb_bits: self.settings.limb_bits,
        })?;
        debug!("built {} inputs for {}", inputs.len(), circuit);

        self.enter(RegistrationState::GeneratingProof)?;
        self.emit(RegistrationEvent::ProofGenerationStarted {
            circuit: circuit.clone(),
        });
        let progress = |received: u64, total: Option<u64>| {
            self.emit(RegistrationEvent::DownloadProgress { received, total })
        };
        let proof = self.prover.prove(&circuit, inputs, &progress).await?;
        if let Some(verifier) = &self.verifier {
            if !verifier.verify(&proof)? {
                return Err(PassportError::InvalidProof(format!(
                    "{} proof does not verify against its public signals",
                    circuit
                )));
            }
        }
        let identity = Identity::new(document, proof)?;

        self.check_cancelled()?;
        let signature = match kind {
            DocumentKind::Passport => sod.signature(),
            DocumentKind::Eid => sod.issuer_signature(),
        };
        self.submit_identity(
            &identity,
            &dispatcher,
            signature,
            key_cert.public_key().key_material(),
        )
        .await?;
        Ok(identity)
    }

    fn check_trust_root(&self, inclusion: &InclusionProof) -> Result<()> {
        let Some(expected) = self.settings.published_trust_root else {
            return Ok(());
        };
        let actual = inclusion.compute_root();
        if actual != expected {
            return Err(PassportError::StaleTrustTree {
                expected: hex::encode(expected),
                actual: hex::encode(actual),
            });
        }
        Ok(())
    }

    async fn fetch_certificate_proof(&self, key: [u8; 32]) -> Result<SmtProof> {
        let proof = self
            .ledger
            .get_proof(self.settings.certificates_smt_contract, key)
            .await?;
        check_depth(&proof, self.settings.smt_depth)?;
        Ok(proof)
    }

    /// SMT proof that the document signer is registered, registering it
    /// first if the ledger does not know it yet.
    async fn certificate_proof(
        &self,
        sod: &SecurityObject,
        issuer: &Certificate,
        inclusion: &InclusionProof,
    ) -> Result<SmtProof> {
        let key = sod.certificate_index();
        let proof = self.fetch_certificate_proof(key).await?;
        if proof.existence {
            return Ok(proof);
        }

        info!(
            "document signer 0x{} not in certificates tree, registering it",
            hex::encode(key)
        );
        let signer = sod.certificate();
        let expires = signer.expires_at().ok_or_else(|| {
            PassportError::certificate(
                "tbs.validity.notAfter",
                signer.expiration_offset(),
                "not a UTCTime or GeneralizedTime",
            )
        })?;
        if expires <= chrono::Utc::now() {
            return Err(PassportError::UntrustedIssuer(format!(
                "document signer expired at {}",
                expires.to_rfc3339()
            )));
        }
        let registration = CertificateRegistration {
            data_type: classify(issuer)?.data_type(),
            signed_attributes: sod.signing_certificate_tbs().to_vec(),
            key_offset: signer.public_key_offset(),
            expiration_offset: signer.expiration_offset(),
            signature: sod.issuer_signature().to_vec(),
            public_key: issuer.public_key().key_material().to_vec(),
            trust_tree_siblings: inclusion.siblings.clone(),
        };
        let tx_id = self
            .submitter
            .submit(
                self.settings.registration_contract,
                abi::encode_register_certificate(&registration),
            )
            .await?;
        self.emit(RegistrationEvent::CertificateSubmitted { tx_id });

        let proof = self.fetch_certificate_proof(key).await?;
        if !proof.existence {
            return Err(PassportError::UntrustedIssuer(
                "document signer still absent from certificates tree".to_string(),
            ));
        }
        Ok(proof)
    }

    async fn submit_identity(
        &self,
        identity: &Identity,
        dispatcher: &Dispatcher,
        signature: &[u8],
        key_material: &[u8],
    ) -> Result<()> {
        let passport_key = field_bytes(identity.identity_key(), "identity key")?;
        let public_key = field_bytes(identity.public_key(), "public key")?;

        let info = self
            .ledger
            .get_passport_info(self.settings.state_keeper_contract, passport_key)
            .await?;
        if info.is_bound() {
            if info.active_identity != public_key {
                return Err(PassportError::IdentityAlreadyRegisteredWithAnotherKey);
            }
            info!("passport already bound to this identity, nothing to submit");
            return Ok(());
        }

        let registration = IdentityRegistration {
            certificates_root: field_bytes(identity.certificates_root(), "certificates root")?,
            identity_key: identity.identity_key().clone(),
            dg_commit: identity.dg1_commitment().clone(),
            data_type: dispatcher.data_type(),
            signature: signature.to_vec(),
            public_key: key_material.to_vec(),
            passport_hash: field_bytes(identity.passport_hash(), "passport hash")?,
            proof: identity.proof().proof.clone(),
        };
        let tx_id = self
            .submitter
            .submit(
                self.settings.registration_contract,
                abi::encode_register_identity(&registration)?,
            )
            .await?;
        info!("registerIdentity submitted as {}", tx_id);
        self.emit(RegistrationEvent::RegistrationSubmitted { tx_id });
        Ok(())
    }
}

fn field_bytes(value: &BigUint, name: &str) -> Result<[u8; 32]> {
    to_bytes32(value)
        .ok_or_else(|| PassportError::InvalidProof(format!("{} exceeds 32 bytes", name)))
}
