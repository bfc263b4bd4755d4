//! SHA-256 commitment adapter.
//!
//! The default [`ProofAdapter`]: a hash-commitment scheme in which the stored
//! public key is a digest of `(username, password digest, salt)` and each
//! proof is a nonce-bound commitment to that key. Verification recomputes the
//! commitment from the public signals and compares in constant time.
//!
//! The artifacts are deliberately opaque strings so a stronger scheme (e.g. a
//! SNARK-backed adapter) can replace this one without touching call sites.

use async_trait::async_trait;

use crate::{
    Error,
    crypto::{constant_time_compare, generate_nonce, generate_salt, sha256_hex},
    error::CredentialError,
};

use super::{ProofAdapter, ProofBundle, ProofInput, VerifyInput};

#[derive(Debug, Default, Clone)]
pub struct CommitmentAdapter;

impl CommitmentAdapter {
    pub fn new() -> Self {
        Self
    }

    fn public_key_for(input: &ProofInput) -> String {
        sha256_hex(&format!(
            "{}:{}:{}",
            input.username, input.password_digest, input.salt
        ))
    }

    fn commitment(nonce: &str, public_key: &str) -> String {
        sha256_hex(&format!("{nonce}:{public_key}"))
    }
}

#[async_trait]
impl ProofAdapter for CommitmentAdapter {
    async fn generate_proof(&self, input: &ProofInput) -> Result<ProofBundle, Error> {
        let public_key = Self::public_key_for(input);
        let nonce = generate_nonce();
        let proof = Self::commitment(&nonce, &public_key);
        Ok(ProofBundle {
            proof,
            public_signals: vec![nonce],
        })
    }

    async fn verify_proof(&self, input: &VerifyInput) -> Result<bool, Error> {
        let nonce = input.public_signals.first().ok_or_else(|| {
            CredentialError::MalformedProof("missing nonce signal".to_string())
        })?;
        let expected = Self::commitment(nonce, &input.public_key);
        Ok(constant_time_compare(
            expected.as_bytes(),
            input.proof.as_bytes(),
        ))
    }

    fn generate_salt(&self) -> String {
        generate_salt()
    }

    async fn derive_public_key(&self, input: &ProofInput) -> Result<String, Error> {
        Ok(Self::public_key_for(input))
    }
}
