//! Password-hash integration layer.
//!
//! Wraps a configurable-cost bcrypt hash so the plaintext password is slow-
//! hashed before any proof material is constructed. The work factor comes
//! from an environment-style setting (`PALISADE_BCRYPT_COST`, default 10).
//!
//! [`CredentialVerifier`] is the seam callers use for login verification: it
//! pre-hashes, builds the proof through the injected [`ProofAdapter`], and
//! checks it against the stored public key, optionally dispatching the
//! verification to a [`VerificationHandle`] worker so the cryptographic work
//! does not block concurrent request handling.

use std::sync::Arc;

use crate::{
    Error,
    crypto::{decode_salt, generate_salt},
    error::{ConfigError, CredentialError},
};

use super::{ProofAdapter, ProofBundle, ProofInput, VerifyInput, worker::VerificationHandle};

/// Work-factor configuration for the slow hash.
#[derive(Debug, Clone, Copy)]
pub struct HashingConfig {
    pub cost: u32,
}

impl HashingConfig {
    pub const ENV_COST: &'static str = "PALISADE_BCRYPT_COST";

    /// bcrypt's valid cost range.
    const MIN_COST: u32 = 4;
    const MAX_COST: u32 = 31;

    /// Read the work factor from the environment; absent means default.
    pub fn from_env() -> Result<Self, Error> {
        match std::env::var(Self::ENV_COST) {
            Err(std::env::VarError::NotPresent) => Ok(Self::default()),
            Err(e) => Err(ConfigError::InvalidValue {
                name: Self::ENV_COST.to_string(),
                value: e.to_string(),
            }
            .into()),
            Ok(raw) => {
                let cost: u32 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                    name: Self::ENV_COST.to_string(),
                    value: raw.clone(),
                })?;
                if !(Self::MIN_COST..=Self::MAX_COST).contains(&cost) {
                    return Err(ConfigError::InvalidValue {
                        name: Self::ENV_COST.to_string(),
                        value: raw,
                    }
                    .into());
                }
                Ok(Self { cost })
            }
        }
    }
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self { cost: 10 }
    }
}

/// Configurable-cost bcrypt hashing.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(config: HashingConfig) -> Self {
        Self { cost: config.cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash with a random salt, for standard stored-hash use.
    pub fn hash_password(&self, password: &str) -> Result<String, Error> {
        bcrypt::hash(password, self.cost)
            .map_err(|e| CredentialError::Hash(e.to_string()).into())
    }

    /// Verify a plaintext against a stored bcrypt hash.
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, Error> {
        bcrypt::verify(password, hash).map_err(|e| CredentialError::Hash(e.to_string()).into())
    }

    /// Deterministic digest using a caller-provided salt.
    ///
    /// This is the pre-hash that enters proof material: the same (password,
    /// salt) pair always yields the same digest, so the derived public key is
    /// reproducible at login time.
    pub fn digest_with_salt(&self, password: &str, salt: &str) -> Result<String, Error> {
        let salt_bytes = decode_salt(salt).ok_or_else(|| {
            Error::from(CredentialError::InvalidSalt(
                "salt must decode to 16 bytes".to_string(),
            ))
        })?;
        let parts = bcrypt::hash_with_salt(password, self.cost, salt_bytes)
            .map_err(|e| Error::from(CredentialError::Hash(e.to_string())))?;
        Ok(parts.format_for_version(bcrypt::Version::TwoB))
    }

    /// Fresh salt suitable for [`digest_with_salt`].
    pub fn generate_salt() -> String {
        generate_salt()
    }
}

/// The credential verification pipeline: slow hash, then proof.
///
/// The plaintext password is consumed by the hashing call and is never
/// retained past it; everything downstream operates on the digest.
pub struct CredentialVerifier {
    adapter: Arc<dyn ProofAdapter>,
    hasher: PasswordHasher,
    worker: Option<VerificationHandle>,
}

impl CredentialVerifier {
    pub fn new(adapter: Arc<dyn ProofAdapter>, hasher: PasswordHasher) -> Self {
        Self {
            adapter,
            hasher,
            worker: None,
        }
    }

    /// Dispatch proof verification to a worker instead of running it inline.
    pub fn with_worker(mut self, worker: VerificationHandle) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    /// Fresh enrollment salt from the active adapter.
    pub fn generate_salt(&self) -> String {
        self.adapter.generate_salt()
    }

    fn proof_input(&self, username: &str, password: &str, salt: &str) -> Result<ProofInput, Error> {
        let digest = self.hasher.digest_with_salt(password, salt)?;
        Ok(ProofInput {
            username: username.to_string(),
            password_digest: digest,
            salt: salt.to_string(),
        })
    }

    /// Derive the public key stored at enrollment.
    pub async fn derive_public_key(
        &self,
        username: &str,
        password: &str,
        salt: &str,
    ) -> Result<String, Error> {
        let input = self.proof_input(username, password, salt)?;
        self.adapter.derive_public_key(&input).await
    }

    /// Build a login proof for the given credentials.
    pub async fn generate_login_proof(
        &self,
        username: &str,
        password: &str,
        salt: &str,
    ) -> Result<ProofBundle, Error> {
        let input = self.proof_input(username, password, salt)?;
        self.adapter.generate_proof(&input).await
    }

    /// Full login check: pre-hash, prove, verify against the stored key.
    pub async fn verify_login(
        &self,
        username: &str,
        password: &str,
        salt: &str,
        public_key: &str,
    ) -> Result<bool, Error> {
        let bundle = self.generate_login_proof(username, password, salt).await?;
        let input = VerifyInput {
            proof: bundle.proof,
            public_signals: bundle.public_signals,
            public_key: public_key.to_string(),
        };
        match &self.worker {
            Some(worker) => worker.verify(input).await,
            None => self.adapter.verify_proof(&input).await,
        }
    }
}
