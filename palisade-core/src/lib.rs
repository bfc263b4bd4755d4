//! Core policy services for the palisade login defense pipeline.
//!
//! This crate contains the building blocks of the pipeline: the counter
//! store and user directory contracts, audit events, the risk classifier,
//! the IP blocking service, the progressive delay service, the CAPTCHA gate,
//! and the credential verification abstraction.
//!
//! The crate is designed to be consumed through the `palisade` facade, which
//! wires the services into the full per-attempt control flow; each service
//! is also usable on its own against any [`CounterStore`] backend.
//!
//! See [`services::IpBlockingService`] for the enforcement policy,
//! [`services::RiskClassifier`] for tier lookups, and
//! [`credentials::ProofAdapter`] for the swappable verification mechanism.

pub mod audit;
pub mod credentials;
pub mod crypto;
pub mod error;
pub mod services;
pub mod store;

pub use audit::{AuditAction, AuditEvent, AuditLog, AuditSeverity, AuditSink, TracingAuditSink};
pub use credentials::{
    CommitmentAdapter, CredentialVerifier, HashingConfig, PasswordHasher, ProofAdapter,
    ProofBundle, ProofInput, VerificationHandle, VerificationWorker, VerifyInput,
};
pub use error::Error;
pub use services::{
    BlockInfo, BlockRecord, BlockingConfig, CaptchaConfig, CaptchaGate, CaptchaOutcome,
    CaptchaProvider, CaptchaVerdict, CaptchaVerificationRecord, DelayConfig, IpBlockingService,
    ProgressiveDelayService, RiskClassifier, RiskConfig, RiskLevel, TierPolicy,
};
pub use store::{CounterStore, UserDirectory};
