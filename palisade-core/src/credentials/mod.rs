//! Credential verification abstraction.
//!
//! Decouples "verify that these credentials are correct" from the concrete
//! cryptographic mechanism. A [`ProofAdapter`] produces and verifies opaque
//! proof artifacts; the integration layer ([`CredentialVerifier`]) guarantees
//! that only a slow-hashed digest, never the plaintext password, enters
//! proof material, and that verification is checked against a stored derived
//! public key, never against the password itself.
//!
//! The active adapter is an explicitly constructed, dependency-injected
//! strategy object: swapping implementations (test mock vs. production)
//! requires no change to call sites and no global state.

pub mod commitment;
pub mod hashing;
pub mod worker;

pub use commitment::CommitmentAdapter;
pub use hashing::{CredentialVerifier, HashingConfig, PasswordHasher};
pub use worker::{VerificationHandle, VerificationWorker};

use async_trait::async_trait;

use crate::Error;

/// Input to proof generation: identity, slow-hashed password digest, salt.
///
/// Callers must never place a plaintext password in `password_digest`; the
/// integration layer enforces this by hashing before construction.
#[derive(Debug, Clone)]
pub struct ProofInput {
    pub username: String,
    pub password_digest: String,
    pub salt: String,
}

/// Opaque proof artifacts produced by an adapter.
#[derive(Debug, Clone)]
pub struct ProofBundle {
    pub proof: String,
    pub public_signals: Vec<String>,
}

/// Input to proof verification.
#[derive(Debug, Clone)]
pub struct VerifyInput {
    pub proof: String,
    pub public_signals: Vec<String>,
    /// Stored derived identifier; non-secret.
    pub public_key: String,
}

/// Capability set for a credential verification mechanism.
///
/// One implementation is selected when the pipeline is constructed. The
/// artifacts are opaque to callers: nothing outside the adapter interprets
/// `proof` or `public_signals`.
#[async_trait]
pub trait ProofAdapter: Send + Sync + 'static {
    /// Produce a proof for the given input.
    async fn generate_proof(&self, input: &ProofInput) -> Result<ProofBundle, Error>;

    /// Check a proof against a stored public key.
    async fn verify_proof(&self, input: &VerifyInput) -> Result<bool, Error>;

    /// Generate a fresh salt for enrollment.
    fn generate_salt(&self) -> String;

    /// Derive the stored, non-secret public key for an identity.
    async fn derive_public_key(&self, input: &ProofInput) -> Result<String, Error>;
}
