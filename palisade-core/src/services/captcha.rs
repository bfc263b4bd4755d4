//! CAPTCHA gating.
//!
//! Requires a human-verification challenge once an IP's failure count crosses
//! a risk-adjusted threshold, and verifies submitted tokens against an
//! external provider. Without a configured provider the gate degrades to a
//! coarse token-length heuristic; that acceptance is reported as a distinct
//! [`CaptchaOutcome::DegradedModeAccepted`] so production wiring can refuse
//! to run degraded.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    audit::{AuditAction, AuditEvent, AuditLog, AuditSeverity},
    error::StoreError,
    services::risk::{RiskClassifier, RiskLevel},
    store::{CounterStore, keys, read_count},
};

/// Result of a provider verification call.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaVerdict {
    pub success: bool,
    pub score: Option<f64>,
}

/// External CAPTCHA verification provider.
///
/// Implementations call out to a verification endpoint with the submitted
/// token and the client IP. Provider failures are surfaced as errors so the
/// gate can fall back to degraded mode.
#[async_trait]
pub trait CaptchaProvider: Send + Sync + 'static {
    async fn verify(&self, token: &str, remote_ip: &str) -> Result<CaptchaVerdict, Error>;
}

/// Outcome of a CAPTCHA verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaOutcome {
    /// Token verified by the configured provider, or gate not armed.
    Verified,
    /// Token accepted by the development-mode heuristic, not by a provider.
    /// Weaker guarantee; not a production security boundary.
    DegradedModeAccepted,
    Rejected,
}

impl CaptchaOutcome {
    /// Whether the attempt may proceed past the gate.
    pub fn accepted(&self) -> bool {
        matches!(
            self,
            CaptchaOutcome::Verified | CaptchaOutcome::DegradedModeAccepted
        )
    }
}

/// Successful verification record, kept briefly for audit/inspection only.
/// The gating decision never reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptchaVerificationRecord {
    pub ip_address: String,
    pub verified_at: DateTime<Utc>,
    pub truncated_token: String,
}

/// Risk-adjusted arming thresholds and record TTLs.
#[derive(Debug, Clone)]
pub struct CaptchaConfig {
    /// Failures before the gate arms, when no risk signal is available.
    pub fallback_threshold: i64,
    pub low_threshold: i64,
    pub medium_threshold: i64,
    pub high_threshold: i64,
    /// TTL of the failure counter, refreshed on every increment.
    pub counter_ttl: Duration,
    /// TTL of the verification record.
    pub verification_ttl: Duration,
    /// Minimum token length accepted by the degraded-mode heuristic.
    pub degraded_min_token_len: usize,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            fallback_threshold: 3,
            low_threshold: 5,
            medium_threshold: 2,
            high_threshold: 1,
            counter_ttl: Duration::hours(1),
            verification_ttl: Duration::minutes(5),
            degraded_min_token_len: 20,
        }
    }
}

impl CaptchaConfig {
    pub fn threshold_for(&self, risk: Option<RiskLevel>) -> i64 {
        match risk {
            Some(RiskLevel::Low) => self.low_threshold,
            Some(RiskLevel::Medium) => self.medium_threshold,
            Some(RiskLevel::High) => self.high_threshold,
            None => self.fallback_threshold,
        }
    }
}

/// Number of token characters preserved in audit records.
const TOKEN_AUDIT_LEN: usize = 10;

/// Decides when a CAPTCHA must be solved and verifies submitted tokens.
pub struct CaptchaGate<S: CounterStore> {
    store: Arc<S>,
    provider: Option<Arc<dyn CaptchaProvider>>,
    risk: Option<Arc<RiskClassifier<S>>>,
    audit: AuditLog,
    config: CaptchaConfig,
}

impl<S: CounterStore> CaptchaGate<S> {
    pub fn new(store: Arc<S>, audit: AuditLog) -> Self {
        Self {
            store,
            provider: None,
            risk: None,
            audit,
            config: CaptchaConfig::default(),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn CaptchaProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_risk_classifier(mut self, risk: Arc<RiskClassifier<S>>) -> Self {
        self.risk = Some(risk);
        self
    }

    pub fn with_config(mut self, config: CaptchaConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether a real provider is wired. `false` means every acceptance will
    /// be degraded-mode.
    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    fn counter_key(ip: &str) -> String {
        format!("{}{}", keys::CAPTCHA_REQUIRED, ip)
    }

    fn verification_key(ip: &str) -> String {
        format!("{}{}", keys::CAPTCHA_VERIFIED, ip)
    }

    async fn threshold(&self, ip: &str) -> i64 {
        let risk = match &self.risk {
            Some(classifier) => Some(classifier.risk_level(ip).await),
            None => None,
        };
        self.config.threshold_for(risk)
    }

    /// Whether the gate is armed for this IP.
    ///
    /// A store failure resolves to `false` (fail open, logged).
    pub async fn is_required(&self, ip: &str) -> bool {
        let count = match read_count(self.store.as_ref(), &Self::counter_key(ip)).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(ip = %ip, error = %e, "CAPTCHA counter read failed, gate inert");
                return false;
            }
        };
        count >= self.threshold(ip).await
    }

    /// Record a failed attempt and report whether the gate is now armed.
    ///
    /// A store failure resolves to `false` (fail open, logged).
    pub async fn record_failed_attempt(&self, ip: &str) -> bool {
        let key = Self::counter_key(ip);
        let count = match self.store.incr(&key).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(ip = %ip, error = %e, "CAPTCHA counter update failed, gate inert");
                return false;
            }
        };
        if let Err(e) = self.store.expire(&key, self.config.counter_ttl).await {
            tracing::warn!(ip = %ip, error = %e, "Failed to refresh CAPTCHA counter TTL");
        }
        count >= self.threshold(ip).await
    }

    /// Verify a submitted CAPTCHA token for an IP.
    ///
    /// - An empty token is always rejected, regardless of gate state.
    /// - When the gate is not armed the token is accepted without contacting
    ///   any provider.
    /// - A provider failure, or an absent provider, falls back to the
    ///   degraded token-length heuristic.
    ///
    /// Any acceptance persists a short-lived verification record and disarms
    /// the gate for this IP.
    pub async fn verify(&self, token: &str, ip: &str) -> CaptchaOutcome {
        if token.is_empty() {
            tracing::warn!(ip = %ip, "Empty CAPTCHA token rejected");
            return CaptchaOutcome::Rejected;
        }

        if !self.is_required(ip).await {
            return CaptchaOutcome::Verified;
        }

        let outcome = match &self.provider {
            Some(provider) => match provider.verify(token, ip).await {
                Ok(verdict) if verdict.success => CaptchaOutcome::Verified,
                Ok(verdict) => {
                    tracing::warn!(ip = %ip, score = ?verdict.score, "CAPTCHA token rejected by provider");
                    CaptchaOutcome::Rejected
                }
                Err(e) => {
                    tracing::warn!(ip = %ip, error = %e, "CAPTCHA provider unreachable, using degraded heuristic");
                    self.degraded_outcome(token)
                }
            },
            None => self.degraded_outcome(token),
        };

        if outcome.accepted() {
            self.complete_verification(token, ip, outcome).await;
        }
        outcome
    }

    /// Token-length heuristic for local/test environments. Not a production
    /// security boundary.
    fn degraded_outcome(&self, token: &str) -> CaptchaOutcome {
        if token.len() > self.config.degraded_min_token_len {
            CaptchaOutcome::DegradedModeAccepted
        } else {
            CaptchaOutcome::Rejected
        }
    }

    /// Persist the verification record and disarm the gate. Both writes are
    /// best-effort: the acceptance already happened.
    async fn complete_verification(&self, token: &str, ip: &str, outcome: CaptchaOutcome) {
        if let Err(e) = self.try_persist_verification(token, ip).await {
            tracing::warn!(ip = %ip, error = %e, "Failed to persist CAPTCHA verification record");
        }
        if let Err(e) = self.reset_requirement(ip).await {
            tracing::warn!(ip = %ip, error = %e, "Failed to disarm CAPTCHA gate");
        }

        self.audit
            .emit(
                AuditEvent::new(AuditAction::CaptchaVerified, AuditSeverity::Info, ip)
                    .with_success(true)
                    .with_details(serde_json::json!({
                        "token_prefix": truncate_token(token),
                        "degraded": outcome == CaptchaOutcome::DegradedModeAccepted,
                    })),
            )
            .await;
    }

    async fn try_persist_verification(&self, token: &str, ip: &str) -> Result<(), Error> {
        let record = CaptchaVerificationRecord {
            ip_address: ip.to_string(),
            verified_at: Utc::now(),
            truncated_token: truncate_token(token),
        };
        let json = serde_json::to_string(&record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.store
            .set(
                &Self::verification_key(ip),
                &json,
                Some(self.config.verification_ttl),
            )
            .await
    }

    /// Delete the failure counter, disarming the gate.
    pub async fn reset_requirement(&self, ip: &str) -> Result<(), Error> {
        self.store.del(&Self::counter_key(ip)).await
    }

    /// Last verification record for an IP, if still within its TTL.
    /// Inspection only; gating never reads this.
    pub async fn verification_record(&self, ip: &str) -> Option<CaptchaVerificationRecord> {
        let raw = match self.store.get(&Self::verification_key(ip)).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(ip = %ip, error = %e, "Verification record lookup failed");
                return None;
            }
        };
        serde_json::from_str(&raw).ok()
    }
}

fn truncate_token(token: &str) -> String {
    token.chars().take(TOKEN_AUDIT_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptchaError;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockStore {
        values: Mutex<HashMap<String, String>>,
    }

    impl MockStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                values: Mutex::new(HashMap::new()),
            })
        }
    }

    #[async_trait]
    impl CounterStore for MockStore {
        async fn get(&self, key: &str) -> Result<Option<String>, Error> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str, _ttl: Option<Duration>) -> Result<(), Error> {
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn incr(&self, key: &str) -> Result<i64, Error> {
            let mut values = self.values.lock().unwrap();
            let next = values
                .get(key)
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0)
                + 1;
            values.insert(key.to_string(), next.to_string());
            Ok(next)
        }

        async fn expire(&self, _key: &str, _ttl: Duration) -> Result<(), Error> {
            Ok(())
        }

        async fn del(&self, key: &str) -> Result<(), Error> {
            self.values.lock().unwrap().remove(key);
            Ok(())
        }

        async fn keys(&self, _pattern: &str) -> Result<Vec<String>, Error> {
            Ok(Vec::new())
        }
    }

    /// Provider scripted to accept or reject, counting calls.
    struct ScriptedProvider {
        accept: bool,
        fail: bool,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn accepting() -> Arc<Self> {
            Arc::new(Self {
                accept: true,
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn rejecting() -> Arc<Self> {
            Arc::new(Self {
                accept: false,
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                accept: false,
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CaptchaProvider for ScriptedProvider {
        async fn verify(&self, _token: &str, _remote_ip: &str) -> Result<CaptchaVerdict, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CaptchaError::Provider("timeout".to_string()).into());
            }
            Ok(CaptchaVerdict {
                success: self.accept,
                score: Some(0.9),
            })
        }
    }

    fn gate(store: Arc<MockStore>) -> CaptchaGate<MockStore> {
        CaptchaGate::new(store, AuditLog::new())
    }

    fn gate_with_risk(
        store: Arc<MockStore>,
    ) -> (CaptchaGate<MockStore>, Arc<RiskClassifier<MockStore>>) {
        let risk = Arc::new(RiskClassifier::new(store.clone(), AuditLog::new()));
        (
            gate(store).with_risk_classifier(risk.clone()),
            risk,
        )
    }

    const LONG_TOKEN: &str = "a-token-longer-than-twenty-chars";

    #[tokio::test]
    async fn test_not_required_before_threshold() {
        let (gate, _) = gate_with_risk(MockStore::new());
        // MEDIUM threshold is 2.
        assert!(!gate.record_failed_attempt("203.0.113.1").await);
        assert!(!gate.is_required("203.0.113.1").await);
        assert!(gate.record_failed_attempt("203.0.113.1").await);
        assert!(gate.is_required("203.0.113.1").await);
    }

    #[tokio::test]
    async fn test_high_risk_arms_after_single_failure() {
        let (gate, risk) = gate_with_risk(MockStore::new());
        risk.set_risk_level("203.0.113.2", RiskLevel::High).await.unwrap();

        assert!(gate.record_failed_attempt("203.0.113.2").await);
        assert!(gate.is_required("203.0.113.2").await);
    }

    #[tokio::test]
    async fn test_fallback_threshold_without_classifier() {
        let gate = gate(MockStore::new());
        assert!(!gate.record_failed_attempt("203.0.113.3").await);
        assert!(!gate.record_failed_attempt("203.0.113.3").await);
        assert!(gate.record_failed_attempt("203.0.113.3").await);
    }

    #[tokio::test]
    async fn test_empty_token_always_rejected() {
        let gate = gate(MockStore::new());
        assert_eq!(gate.verify("", "203.0.113.4").await, CaptchaOutcome::Rejected);

        // Still rejected when the gate is armed.
        for _ in 0..3 {
            gate.record_failed_attempt("203.0.113.4").await;
        }
        assert_eq!(gate.verify("", "203.0.113.4").await, CaptchaOutcome::Rejected);
    }

    #[tokio::test]
    async fn test_inert_gate_accepts_without_provider_call() {
        let provider = ScriptedProvider::rejecting();
        let gate = gate(MockStore::new()).with_provider(provider.clone());

        assert_eq!(
            gate.verify("any-token", "203.0.113.5").await,
            CaptchaOutcome::Verified
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_acceptance_disarms_gate() {
        let store = MockStore::new();
        let provider = ScriptedProvider::accepting();
        let (gate, _) = gate_with_risk(store.clone());
        let gate = gate.with_provider(provider.clone());

        for _ in 0..2 {
            gate.record_failed_attempt("203.0.113.6").await;
        }
        assert!(gate.is_required("203.0.113.6").await);

        assert_eq!(
            gate.verify("provider-token", "203.0.113.6").await,
            CaptchaOutcome::Verified
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(!gate.is_required("203.0.113.6").await);

        let record = gate.verification_record("203.0.113.6").await.unwrap();
        assert_eq!(record.truncated_token, "provider-t");
        assert_eq!(record.truncated_token.chars().count(), 10);
    }

    #[tokio::test]
    async fn test_provider_rejection_keeps_gate_armed() {
        let store = MockStore::new();
        let (gate, _) = gate_with_risk(store.clone());
        let gate = gate.with_provider(ScriptedProvider::rejecting());

        for _ in 0..2 {
            gate.record_failed_attempt("203.0.113.7").await;
        }
        assert_eq!(
            gate.verify(LONG_TOKEN, "203.0.113.7").await,
            CaptchaOutcome::Rejected
        );
        assert!(gate.is_required("203.0.113.7").await);
        assert!(gate.verification_record("203.0.113.7").await.is_none());
    }

    #[tokio::test]
    async fn test_provider_failure_falls_back_to_heuristic() {
        let store = MockStore::new();
        let (gate, _) = gate_with_risk(store.clone());
        let gate = gate.with_provider(ScriptedProvider::failing());

        for _ in 0..2 {
            gate.record_failed_attempt("203.0.113.8").await;
        }

        assert_eq!(
            gate.verify(LONG_TOKEN, "203.0.113.8").await,
            CaptchaOutcome::DegradedModeAccepted
        );
        assert!(!gate.is_required("203.0.113.8").await);
    }

    #[tokio::test]
    async fn test_no_provider_uses_heuristic_both_ways() {
        let store = MockStore::new();
        let (gate, _) = gate_with_risk(store.clone());

        for _ in 0..2 {
            gate.record_failed_attempt("203.0.113.9").await;
        }
        assert_eq!(
            gate.verify("short-token", "203.0.113.9").await,
            CaptchaOutcome::Rejected
        );
        assert_eq!(
            gate.verify(LONG_TOKEN, "203.0.113.9").await,
            CaptchaOutcome::DegradedModeAccepted
        );
    }

    #[tokio::test]
    async fn test_reset_requirement_disarms() {
        let (gate, _) = gate_with_risk(MockStore::new());
        for _ in 0..2 {
            gate.record_failed_attempt("203.0.113.10").await;
        }
        assert!(gate.is_required("203.0.113.10").await);

        gate.reset_requirement("203.0.113.10").await.unwrap();
        assert!(!gate.is_required("203.0.113.10").await);
    }

    #[test]
    fn test_threshold_table() {
        let config = CaptchaConfig::default();
        assert_eq!(config.threshold_for(None), 3);
        assert_eq!(config.threshold_for(Some(RiskLevel::Low)), 5);
        assert_eq!(config.threshold_for(Some(RiskLevel::Medium)), 2);
        assert_eq!(config.threshold_for(Some(RiskLevel::High)), 1);
    }

    #[test]
    fn test_outcome_accepted() {
        assert!(CaptchaOutcome::Verified.accepted());
        assert!(CaptchaOutcome::DegradedModeAccepted.accepted());
        assert!(!CaptchaOutcome::Rejected.accepted());
    }
}
