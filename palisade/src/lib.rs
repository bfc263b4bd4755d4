//! # Palisade
//!
//! Palisade is an adaptive login defense pipeline. It combines four policy
//! layers over a shared counter store (risk classification, IP blocking,
//! CAPTCHA gating, and progressive response delay) with a pluggable
//! credential verification abstraction, and wires them into a single
//! per-attempt control flow:
//!
//! ```text
//! attempt -> blocked? (fail fast)
//!         -> CAPTCHA required? (token must verify)
//!         -> progressive delay (hold the caller)
//!         -> credential verification
//!         -> failure: record once, fan out to all counters (may block)
//!         -> success: reset all counters
//! ```
//!
//! Policy states (blocked, CAPTCHA required, invalid credentials) are
//! ordinary return values, never errors; infrastructure failures inside the
//! pipeline fail open so a store outage cannot become a login outage. The
//! caller maps an [`AttemptDecision`] to its user-facing response and owns
//! the overall request deadline.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use palisade::{AttemptDecision, LoginAttempt, PalisadeBuilder, StoredCredential};
//! use palisade_store_memory::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let palisade = PalisadeBuilder::new(Arc::new(MemoryStore::new()))
//!         .build()
//!         .await?;
//!
//!     // Enrollment: derive and store the salt + public key.
//!     let salt = palisade.verifier().generate_salt();
//!     let public_key = palisade
//!         .verifier()
//!         .derive_public_key("alice", "correct horse battery", &salt)
//!         .await?;
//!     let stored = StoredCredential { salt, public_key };
//!
//!     // Login attempt.
//!     let decision = palisade
//!         .process_attempt(
//!             &LoginAttempt {
//!                 ip: "198.51.100.7".into(),
//!                 username: "alice".into(),
//!                 user_agent: Some("Mozilla/5.0".into()),
//!                 password: "correct horse battery".into(),
//!                 captcha_token: None,
//!             },
//!             Some(&stored),
//!         )
//!         .await;
//!     assert_eq!(decision, AttemptDecision::Allowed);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

mod builder;

pub use builder::{PalisadeBuilder, PalisadeBuilderError};

pub use palisade_core::{
    AuditAction, AuditEvent, AuditLog, AuditSink, AuditSeverity, BlockInfo, BlockRecord,
    BlockingConfig, CaptchaConfig, CaptchaGate, CaptchaOutcome, CaptchaProvider, CaptchaVerdict,
    CaptchaVerificationRecord, CommitmentAdapter, CounterStore, CredentialVerifier, DelayConfig,
    Error, HashingConfig, IpBlockingService, PasswordHasher, ProgressiveDelayService, ProofAdapter,
    ProofBundle, ProofInput, RiskClassifier, RiskConfig, RiskLevel, TierPolicy, TracingAuditSink,
    UserDirectory, VerifyInput,
};

#[cfg(feature = "captcha-http")]
pub use palisade_captcha_http::{HttpCaptchaConfig, HttpCaptchaProvider};

/// One inbound authentication attempt.
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub ip: String,
    pub username: String,
    pub user_agent: Option<String>,
    pub password: String,
    pub captcha_token: Option<String>,
}

/// The salt and derived public key stored at enrollment.
///
/// Neither field is secret; the password itself is never stored.
#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub salt: String,
    pub public_key: String,
}

/// Outcome of processing an attempt. A policy state, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptDecision {
    /// Credentials verified; all counters for the IP were reset.
    Allowed,
    /// The IP is blocked (either already, or by this attempt).
    Blocked,
    /// A CAPTCHA must be solved before the attempt can be processed.
    CaptchaRequired,
    /// The submitted CAPTCHA token failed verification.
    CaptchaRejected,
    /// Credentials did not verify; the failure was recorded.
    InvalidCredentials,
}

/// What one recorded failure did to each policy counter.
#[derive(Debug, Clone, Copy)]
pub struct FailureRecord {
    /// The blocking policy transitioned (or already was) to BLOCKED.
    pub blocked: bool,
    /// The CAPTCHA gate is now armed for this IP.
    pub captcha_required: bool,
    /// The delay the next attempt from this IP will incur.
    pub delay: Duration,
}

/// The assembled login defense pipeline.
///
/// Construct with [`PalisadeBuilder`]. Individual policy services remain
/// accessible for administrative surfaces (unblocking, risk updates,
/// inspection) alongside the orchestrated [`process_attempt`] flow.
///
/// [`process_attempt`]: Palisade::process_attempt
pub struct Palisade<S: CounterStore> {
    pub(crate) risk: Arc<RiskClassifier<S>>,
    pub(crate) blocking: IpBlockingService<S>,
    pub(crate) captcha: CaptchaGate<S>,
    pub(crate) delay: ProgressiveDelayService<S>,
    pub(crate) verifier: CredentialVerifier,
    pub(crate) audit: AuditLog,
}

impl<S: CounterStore> Palisade<S> {
    /// Run the full control flow for one authentication attempt.
    ///
    /// `stored` is the enrolled credential for the claimed identity, or
    /// `None` when the identity is unknown. Unknown identities run the same
    /// failure path as wrong passwords so attempt counting cannot be used to
    /// enumerate users.
    pub async fn process_attempt(
        &self,
        attempt: &LoginAttempt,
        stored: Option<&StoredCredential>,
    ) -> AttemptDecision {
        let ip = attempt.ip.as_str();
        let user_agent = attempt.user_agent.as_deref();

        // Fail fast on blocked IPs. The recording call audits the rejection
        // without touching counters.
        if self.blocking.is_ip_blocked(ip).await {
            self.blocking
                .record_failed_attempt(ip, &attempt.username, user_agent)
                .await;
            return AttemptDecision::Blocked;
        }

        if self.captcha.is_required(ip).await {
            let Some(token) = attempt.captcha_token.as_deref() else {
                return AttemptDecision::CaptchaRequired;
            };
            if !self.captcha.verify(token, ip).await.accepted() {
                return AttemptDecision::CaptchaRejected;
            }
        }

        self.delay.apply_delay(ip).await;

        let verified = match stored {
            Some(credential) => {
                match self
                    .verifier
                    .verify_login(
                        &attempt.username,
                        &attempt.password,
                        &credential.salt,
                        &credential.public_key,
                    )
                    .await
                {
                    Ok(ok) => ok,
                    Err(e) => {
                        tracing::warn!(
                            ip = %ip,
                            username = %attempt.username,
                            error = %e,
                            "Credential verification failed"
                        );
                        false
                    }
                }
            }
            None => false,
        };

        if verified {
            self.reset_counters(ip).await;
            AttemptDecision::Allowed
        } else {
            let record = self
                .record_failure(ip, &attempt.username, user_agent)
                .await;
            if record.blocked {
                AttemptDecision::Blocked
            } else {
                AttemptDecision::InvalidCredentials
            }
        }
    }

    /// Record one failed attempt, fanned out to every policy counter.
    ///
    /// This is the single publication point for the conceptual "failed
    /// attempt" event: blocking, CAPTCHA, and delay each consume it
    /// independently, so call sites cannot forget one of the three.
    pub async fn record_failure(
        &self,
        ip: &str,
        username: &str,
        user_agent: Option<&str>,
    ) -> FailureRecord {
        let blocked = self
            .blocking
            .record_failed_attempt(ip, username, user_agent)
            .await;
        let captcha_required = self.captcha.record_failed_attempt(ip).await;
        let delay = self.delay.record_failed_attempt(ip).await;
        FailureRecord {
            blocked,
            captcha_required,
            delay,
        }
    }

    /// Reset every policy counter for an IP, called on successful login.
    ///
    /// Does not remove an existing block record; use
    /// [`IpBlockingService::unblock_ip`] for that.
    pub async fn reset_counters(&self, ip: &str) {
        if let Err(e) = self.blocking.reset_failed_attempts(ip).await {
            tracing::warn!(ip = %ip, error = %e, "Failed to reset blocking counter");
        }
        if let Err(e) = self.captcha.reset_requirement(ip).await {
            tracing::warn!(ip = %ip, error = %e, "Failed to reset CAPTCHA counter");
        }
        if let Err(e) = self.delay.reset(ip).await {
            tracing::warn!(ip = %ip, error = %e, "Failed to reset delay counter");
        }
    }

    pub fn risk(&self) -> &RiskClassifier<S> {
        &self.risk
    }

    pub fn blocking(&self) -> &IpBlockingService<S> {
        &self.blocking
    }

    pub fn captcha(&self) -> &CaptchaGate<S> {
        &self.captcha
    }

    pub fn delay_service(&self) -> &ProgressiveDelayService<S> {
        &self.delay
    }

    pub fn verifier(&self) -> &CredentialVerifier {
        &self.verifier
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }
}
