//! IP blocking enforcement.
//!
//! Tracks failed login attempts per IP and enforces a hard lockout once the
//! risk-adjusted maximum is reached. Thresholds and block durations scale
//! with the risk tier reported by the [`RiskClassifier`]; a service running
//! without a classifier uses the fallback tier.
//!
//! State machine per IP:
//!
//! ```text
//! CLEAN -> (failed attempt, count < max) -> ACCUMULATING
//!       -> (count >= max)                -> BLOCKED
//!       -> (TTL expiry | explicit unblock) -> CLEAN
//! ```
//!
//! The hot path fails open: a store outage during a read resolves to "not
//! blocked" and a failed write never fabricates a block. An infrastructure
//! outage must not become a denial of service against legitimate users.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    audit::{AuditAction, AuditEvent, AuditLog, AuditSeverity},
    error::StoreError,
    services::risk::{RiskClassifier, RiskLevel},
    store::{CounterStore, UserDirectory, keys, read_count},
};

/// Threshold and duration for one risk tier.
#[derive(Debug, Clone)]
pub struct TierPolicy {
    pub max_attempts: i64,
    pub block_duration: Duration,
}

/// Per-tier blocking thresholds and durations.
#[derive(Debug, Clone)]
pub struct BlockingConfig {
    /// Applied when no risk signal is available (no classifier wired).
    pub fallback: TierPolicy,
    pub low: TierPolicy,
    pub medium: TierPolicy,
    pub high: TierPolicy,
    /// TTL of the failed-attempt counter, refreshed on every increment.
    pub counter_ttl: Duration,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            fallback: TierPolicy {
                max_attempts: 10,
                block_duration: Duration::hours(24),
            },
            low: TierPolicy {
                max_attempts: 15,
                block_duration: Duration::hours(12),
            },
            medium: TierPolicy {
                max_attempts: 8,
                block_duration: Duration::hours(24),
            },
            high: TierPolicy {
                max_attempts: 5,
                block_duration: Duration::hours(48),
            },
            counter_ttl: Duration::hours(1),
        }
    }
}

impl BlockingConfig {
    /// Policy for a risk tier; `None` means no risk signal was available.
    pub fn policy_for(&self, risk: Option<RiskLevel>) -> &TierPolicy {
        match risk {
            Some(RiskLevel::Low) => &self.low,
            Some(RiskLevel::Medium) => &self.medium,
            Some(RiskLevel::High) => &self.high,
            None => &self.fallback,
        }
    }
}

/// Persisted block record, stored as JSON under the `block:` prefix with a
/// TTL equal to the block duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRecord {
    pub ip_address: String,
    pub blocked_at: DateTime<Utc>,
    pub reason: String,
    pub username: String,
    pub user_agent: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub block_duration_secs: i64,
}

/// A block record enriched with remaining time, clamped to >= 0.
#[derive(Debug, Clone)]
pub struct BlockInfo {
    pub record: BlockRecord,
    pub blocked_until: DateTime<Utc>,
    pub remaining_secs: i64,
    pub remaining_minutes: i64,
    pub remaining_hours: i64,
}

impl BlockInfo {
    fn from_record(record: BlockRecord, now: DateTime<Utc>) -> Self {
        let blocked_until = record.blocked_at + Duration::seconds(record.block_duration_secs);
        let remaining_secs = (blocked_until - now).num_seconds().max(0);
        Self {
            record,
            blocked_until,
            remaining_secs,
            remaining_minutes: remaining_secs / 60,
            remaining_hours: remaining_secs / 3600,
        }
    }
}

const BLOCK_REASON: &str = "Too many failed login attempts";

/// Top-level enforcement policy: failed-attempt accounting and IP lockout.
pub struct IpBlockingService<S: CounterStore> {
    store: Arc<S>,
    risk: Option<Arc<RiskClassifier<S>>>,
    directory: Option<Arc<dyn UserDirectory>>,
    audit: AuditLog,
    config: BlockingConfig,
}

impl<S: CounterStore> IpBlockingService<S> {
    pub fn new(store: Arc<S>, audit: AuditLog) -> Self {
        Self {
            store,
            risk: None,
            directory: None,
            audit,
            config: BlockingConfig::default(),
        }
    }

    /// Scale thresholds and durations by the classifier's risk tier.
    pub fn with_risk_classifier(mut self, risk: Arc<RiskClassifier<S>>) -> Self {
        self.risk = Some(risk);
        self
    }

    /// Attribute audit events to known identities via an indexed lookup.
    pub fn with_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_config(mut self, config: BlockingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &BlockingConfig {
        &self.config
    }

    fn counter_key(ip: &str) -> String {
        format!("{}{}", keys::FAILED, ip)
    }

    fn block_key(ip: &str) -> String {
        format!("{}{}", keys::BLOCK, ip)
    }

    async fn current_risk(&self, ip: &str) -> Option<RiskLevel> {
        match &self.risk {
            Some(classifier) => Some(classifier.risk_level(ip).await),
            None => None,
        }
    }

    /// Best-effort username -> user id attribution. Never fails the caller.
    async fn attribute_user(&self, username: &str) -> String {
        let Some(directory) = &self.directory else {
            return "unknown".to_string();
        };
        match directory.find_user_id(username).await {
            Ok(Some(user_id)) => user_id,
            Ok(None) => "unknown".to_string(),
            Err(e) => {
                tracing::debug!(username = %username, error = %e, "User attribution failed");
                "unknown".to_string()
            }
        }
    }

    /// Record a failed authentication attempt for an IP.
    ///
    /// Returns `true` when the IP is blocked after this call, either because
    /// it was already blocked (counters untouched, rejection audited) or
    /// because this attempt reached the risk-adjusted maximum.
    ///
    /// Infrastructure errors are logged and fail open to `false`.
    pub async fn record_failed_attempt(
        &self,
        ip: &str,
        username: &str,
        user_agent: Option<&str>,
    ) -> bool {
        match self.try_record_failed_attempt(ip, username, user_agent).await {
            Ok(blocked) => blocked,
            Err(e) => {
                tracing::error!(ip = %ip, error = %e, "Failed to record attempt, failing open");
                false
            }
        }
    }

    async fn try_record_failed_attempt(
        &self,
        ip: &str,
        username: &str,
        user_agent: Option<&str>,
    ) -> Result<bool, Error> {
        let user_id = self.attribute_user(username).await;

        if self.store.get(&Self::block_key(ip)).await?.is_some() {
            self.audit
                .emit(
                    AuditEvent::new(
                        AuditAction::BlockedAttemptRejected,
                        AuditSeverity::Error,
                        ip,
                    )
                    .with_user_id(user_id)
                    .with_user_agent(user_agent)
                    .with_details(serde_json::json!({
                        "username": username,
                        "reason": "IP address is blocked",
                    })),
                )
                .await;
            return Ok(true);
        }

        let counter_key = Self::counter_key(ip);
        let count = self.store.incr(&counter_key).await?;
        self.store.expire(&counter_key, self.config.counter_ttl).await?;

        let risk = self.current_risk(ip).await;
        let policy = self.config.policy_for(risk);
        let remaining = (policy.max_attempts - count).max(0);

        tracing::warn!(
            ip = %ip,
            username = %username,
            attempts = count,
            max_attempts = policy.max_attempts,
            "Failed login attempt"
        );

        self.audit
            .emit(
                AuditEvent::new(AuditAction::LoginFailed, AuditSeverity::Warning, ip)
                    .with_user_id(user_id.clone())
                    .with_user_agent(user_agent)
                    .with_details(serde_json::json!({
                        "username": username,
                        "attempts": count,
                        "max_attempts": policy.max_attempts,
                        "remaining_attempts": remaining,
                        "risk_level": risk.map(|r| r.to_string()),
                    })),
            )
            .await;

        if count >= policy.max_attempts {
            self.try_block_ip(ip, username, user_agent, &user_id, risk, policy, count)
                .await?;
            return Ok(true);
        }

        Ok(false)
    }

    /// Block an IP immediately, using the current risk tier for the duration.
    ///
    /// Normally reached through [`record_failed_attempt`]; exposed for
    /// administrative use. Infrastructure errors are logged, never raised.
    pub async fn block_ip(&self, ip: &str, username: &str, user_agent: Option<&str>) {
        let user_id = self.attribute_user(username).await;
        let risk = self.current_risk(ip).await;
        let policy = self.config.policy_for(risk).clone();
        if let Err(e) = self
            .try_block_ip(ip, username, user_agent, &user_id, risk, &policy, 0)
            .await
        {
            tracing::error!(ip = %ip, error = %e, "Failed to write block record");
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn try_block_ip(
        &self,
        ip: &str,
        username: &str,
        user_agent: Option<&str>,
        user_id: &str,
        risk: Option<RiskLevel>,
        policy: &TierPolicy,
        attempts: i64,
    ) -> Result<(), Error> {
        let record = BlockRecord {
            ip_address: ip.to_string(),
            blocked_at: Utc::now(),
            reason: BLOCK_REASON.to_string(),
            username: username.to_string(),
            user_agent: user_agent.map(|ua| ua.to_string()),
            risk_level: risk,
            block_duration_secs: policy.block_duration.num_seconds(),
        };
        let blocked_until = record.blocked_at + policy.block_duration;

        let json = serde_json::to_string(&record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.store
            .set(&Self::block_key(ip), &json, Some(policy.block_duration))
            .await?;

        let duration_hours = policy.block_duration.num_hours();
        tracing::error!(
            ip = %ip,
            username = %username,
            duration_hours,
            blocked_until = %blocked_until,
            "IP blocked"
        );

        self.audit
            .emit(
                AuditEvent::new(AuditAction::IpBlocked, AuditSeverity::Error, ip)
                    .with_user_id(user_id)
                    .with_user_agent(user_agent)
                    .with_details(serde_json::json!({
                        "username": username,
                        "reason": record.reason,
                        "attempts": attempts,
                        "risk_level": risk.map(|r| r.to_string()),
                        "block_duration_secs": record.block_duration_secs,
                        "block_duration_hours": duration_hours,
                        "blocked_until": blocked_until.to_rfc3339(),
                    })),
            )
            .await;

        Ok(())
    }

    /// Whether an IP currently has a block record.
    ///
    /// A store failure resolves to `false` (fail open, logged).
    pub async fn is_ip_blocked(&self, ip: &str) -> bool {
        match self.store.get(&Self::block_key(ip)).await {
            Ok(record) => record.is_some(),
            Err(e) => {
                tracing::error!(ip = %ip, error = %e, "Block lookup failed, failing open");
                false
            }
        }
    }

    /// Block record enriched with remaining time, or `None` when not blocked.
    pub async fn block_info(&self, ip: &str) -> Option<BlockInfo> {
        let raw = match self.store.get(&Self::block_key(ip)).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::error!(ip = %ip, error = %e, "Block lookup failed, failing open");
                return None;
            }
        };
        match serde_json::from_str::<BlockRecord>(&raw) {
            Ok(record) => Some(BlockInfo::from_record(record, Utc::now())),
            Err(e) => {
                tracing::warn!(ip = %ip, error = %e, "Malformed block record");
                None
            }
        }
    }

    /// Delete the failed-attempt counter only. Does not unblock.
    pub async fn reset_failed_attempts(&self, ip: &str) -> Result<(), Error> {
        self.store.del(&Self::counter_key(ip)).await
    }

    /// Current failed-attempt count for an IP.
    pub async fn failed_attempts(&self, ip: &str) -> Result<i64, Error> {
        read_count(self.store.as_ref(), &Self::counter_key(ip)).await
    }

    /// Remove a block and reset the attempt counter.
    ///
    /// Returns `false` without side effects when the IP is not blocked.
    /// Emits an `IP_UNBLOCKED` audit event recording the admin identity and
    /// the original block reason.
    pub async fn unblock_ip(&self, ip: &str, admin_username: &str) -> Result<bool, Error> {
        let Some(raw) = self.store.get(&Self::block_key(ip)).await? else {
            return Ok(false);
        };
        let record: Option<BlockRecord> = serde_json::from_str(&raw).ok();

        self.store.del(&Self::block_key(ip)).await?;
        self.reset_failed_attempts(ip).await?;

        tracing::info!(ip = %ip, admin = %admin_username, "IP unblocked");

        self.audit
            .emit(
                AuditEvent::new(AuditAction::IpUnblocked, AuditSeverity::Info, ip)
                    .with_success(true)
                    .with_details(serde_json::json!({
                        "admin": admin_username,
                        "original_reason": record.as_ref().map(|r| r.reason.clone()),
                        "blocked_at": record.as_ref().map(|r| r.blocked_at.to_rfc3339()),
                    })),
            )
            .await;

        Ok(true)
    }

    /// All currently blocked IPs, for administrative inspection.
    pub async fn blocked_ips(&self) -> Result<Vec<BlockInfo>, Error> {
        let pattern = format!("{}*", keys::BLOCK);
        let mut out = Vec::new();
        for key in self.store.keys(&pattern).await? {
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            match serde_json::from_str::<BlockRecord>(&raw) {
                Ok(record) => out.push(BlockInfo::from_record(record, Utc::now())),
                Err(e) => tracing::warn!(key = %key, error = %e, "Malformed block record"),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditSink;
    use crate::error::AuditError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MockStore {
        values: Mutex<HashMap<String, (String, Option<Duration>)>>,
        fail: AtomicBool,
    }

    impl MockStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                values: Mutex::new(HashMap::new()),
                fail: AtomicBool::new(false),
            })
        }

        fn ttl_of(&self, key: &str) -> Option<Duration> {
            self.values.lock().unwrap().get(key).and_then(|(_, ttl)| *ttl)
        }
    }

    #[async_trait]
    impl CounterStore for MockStore {
        async fn get(&self, key: &str) -> Result<Option<String>, Error> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Connection("store down".to_string()).into());
            }
            Ok(self
                .values
                .lock()
                .unwrap()
                .get(key)
                .map(|(v, _)| v.clone()))
        }

        async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), Error> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Connection("store down".to_string()).into());
            }
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), (value.to_string(), ttl));
            Ok(())
        }

        async fn incr(&self, key: &str) -> Result<i64, Error> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Connection("store down".to_string()).into());
            }
            let mut values = self.values.lock().unwrap();
            let next = values
                .get(key)
                .and_then(|(v, _)| v.parse::<i64>().ok())
                .unwrap_or(0)
                + 1;
            let ttl = values.get(key).and_then(|(_, ttl)| *ttl);
            values.insert(key.to_string(), (next.to_string(), ttl));
            Ok(next)
        }

        async fn expire(&self, key: &str, ttl: Duration) -> Result<(), Error> {
            let mut values = self.values.lock().unwrap();
            if let Some(entry) = values.get_mut(key) {
                entry.1 = Some(ttl);
            }
            Ok(())
        }

        async fn del(&self, key: &str) -> Result<(), Error> {
            self.values.lock().unwrap().remove(key);
            Ok(())
        }

        async fn keys(&self, pattern: &str) -> Result<Vec<String>, Error> {
            let prefix = pattern.trim_end_matches('*');
            Ok(self
                .values
                .lock()
                .unwrap()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }
    }

    struct RecordingSink {
        events: Mutex<Vec<AuditEvent>>,
    }

    #[async_trait]
    impl AuditSink for RecordingSink {
        async fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct StaticDirectory {
        user_id: Option<String>,
    }

    #[async_trait]
    impl UserDirectory for StaticDirectory {
        async fn find_user_id(&self, _username: &str) -> Result<Option<String>, Error> {
            Ok(self.user_id.clone())
        }
    }

    fn service_with_risk(
        store: Arc<MockStore>,
        audit: AuditLog,
    ) -> (IpBlockingService<MockStore>, Arc<RiskClassifier<MockStore>>) {
        let _ = tracing_subscriber::fmt().try_init();
        let risk = Arc::new(RiskClassifier::new(store.clone(), audit.clone()));
        let service = IpBlockingService::new(store, audit).with_risk_classifier(risk.clone());
        (service, risk)
    }

    #[tokio::test]
    async fn test_medium_tier_blocks_on_eighth_attempt() {
        let store = MockStore::new();
        let (service, _) = service_with_risk(store.clone(), AuditLog::new());

        // Risk unset resolves to MEDIUM: max 8 attempts.
        for _ in 0..7 {
            assert!(!service.record_failed_attempt("10.0.0.5", "alice", None).await);
        }
        assert!(service.record_failed_attempt("10.0.0.5", "alice", None).await);
        assert!(service.is_ip_blocked("10.0.0.5").await);

        let info = service.block_info("10.0.0.5").await.unwrap();
        assert!(info.remaining_hours == 23 || info.remaining_hours == 24);
        assert!(info.remaining_secs > 24 * 3600 - 60);
        assert_eq!(info.record.block_duration_secs, 24 * 3600);
    }

    #[tokio::test]
    async fn test_fallback_tier_without_classifier() {
        let store = MockStore::new();
        let service = IpBlockingService::new(store.clone(), AuditLog::new());

        for _ in 0..9 {
            assert!(!service.record_failed_attempt("10.0.0.6", "bob", None).await);
        }
        assert!(service.record_failed_attempt("10.0.0.6", "bob", None).await);

        let info = service.block_info("10.0.0.6").await.unwrap();
        assert_eq!(info.record.block_duration_secs, 24 * 3600);
    }

    #[tokio::test]
    async fn test_high_risk_blocks_after_five_with_48h_duration() {
        let store = MockStore::new();
        let (service, risk) = service_with_risk(store.clone(), AuditLog::new());
        risk.set_risk_level("10.0.0.7", RiskLevel::High).await.unwrap();

        for _ in 0..4 {
            assert!(!service.record_failed_attempt("10.0.0.7", "eve", None).await);
        }
        assert!(service.record_failed_attempt("10.0.0.7", "eve", None).await);

        let info = service.block_info("10.0.0.7").await.unwrap();
        assert_eq!(info.record.block_duration_secs, 48 * 3600);
        assert_eq!(info.record.risk_level, Some(RiskLevel::High));
        // TTL on the record matches the duration.
        assert_eq!(
            store.ttl_of("block:10.0.0.7"),
            Some(Duration::hours(48))
        );
    }

    #[tokio::test]
    async fn test_low_risk_allows_fifteen_with_12h_duration() {
        let store = MockStore::new();
        let (service, risk) = service_with_risk(store.clone(), AuditLog::new());
        risk.set_risk_level("10.0.0.8", RiskLevel::Low).await.unwrap();

        for _ in 0..14 {
            assert!(!service.record_failed_attempt("10.0.0.8", "carol", None).await);
        }
        assert!(service.record_failed_attempt("10.0.0.8", "carol", None).await);

        let info = service.block_info("10.0.0.8").await.unwrap();
        assert_eq!(info.record.block_duration_secs, 12 * 3600);
    }

    #[tokio::test]
    async fn test_blocked_attempt_does_not_increment_counter() {
        let store = MockStore::new();
        let audit = AuditLog::new();
        let sink = Arc::new(RecordingSink {
            events: Mutex::new(Vec::new()),
        });
        audit.register(sink.clone()).await;
        let (service, _) = service_with_risk(store.clone(), audit);

        for _ in 0..8 {
            service.record_failed_attempt("10.0.0.9", "mallory", None).await;
        }
        let count_at_block = service.failed_attempts("10.0.0.9").await.unwrap();

        // Further attempts are rejected without touching the counter.
        assert!(service.record_failed_attempt("10.0.0.9", "mallory", None).await);
        assert_eq!(
            service.failed_attempts("10.0.0.9").await.unwrap(),
            count_at_block
        );

        let events = sink.events.lock().unwrap();
        let rejected = events
            .iter()
            .filter(|e| e.action == AuditAction::BlockedAttemptRejected)
            .count();
        assert_eq!(rejected, 1);
        assert_eq!(
            events.last().unwrap().details["reason"],
            "IP address is blocked"
        );
    }

    #[tokio::test]
    async fn test_unblock_then_single_failure_stays_unblocked() {
        let store = MockStore::new();
        let (service, _) = service_with_risk(store.clone(), AuditLog::new());

        for _ in 0..8 {
            service.record_failed_attempt("10.0.1.1", "dave", None).await;
        }
        assert!(service.is_ip_blocked("10.0.1.1").await);

        assert!(service.unblock_ip("10.0.1.1", "admin").await.unwrap());
        assert!(!service.is_ip_blocked("10.0.1.1").await);

        // Counter was reset with the unblock: one new failure sits at 1 of 8.
        assert!(!service.record_failed_attempt("10.0.1.1", "dave", None).await);
        assert_eq!(service.failed_attempts("10.0.1.1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unblock_not_blocked_is_noop() {
        let store = MockStore::new();
        let (service, _) = service_with_risk(store.clone(), AuditLog::new());
        assert!(!service.unblock_ip("10.0.1.2", "admin").await.unwrap());
    }

    #[tokio::test]
    async fn test_unblock_audits_admin_and_original_reason() {
        let store = MockStore::new();
        let audit = AuditLog::new();
        let sink = Arc::new(RecordingSink {
            events: Mutex::new(Vec::new()),
        });
        audit.register(sink.clone()).await;
        let (service, _) = service_with_risk(store.clone(), audit);

        for _ in 0..8 {
            service.record_failed_attempt("10.0.1.3", "frank", None).await;
        }
        service.unblock_ip("10.0.1.3", "root-admin").await.unwrap();

        let events = sink.events.lock().unwrap();
        let unblocked = events
            .iter()
            .find(|e| e.action == AuditAction::IpUnblocked)
            .unwrap();
        assert_eq!(unblocked.severity, AuditSeverity::Info);
        assert_eq!(unblocked.details["admin"], "root-admin");
        assert_eq!(
            unblocked.details["original_reason"],
            "Too many failed login attempts"
        );
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let store = MockStore::new();
        let (service, _) = service_with_risk(store.clone(), AuditLog::new());
        store.fail.store(true, Ordering::SeqCst);

        assert!(!service.is_ip_blocked("10.0.1.4").await);
        assert!(!service.record_failed_attempt("10.0.1.4", "grace", None).await);
        assert!(service.block_info("10.0.1.4").await.is_none());
    }

    #[tokio::test]
    async fn test_counter_ttl_refreshed_on_increment() {
        let store = MockStore::new();
        let (service, _) = service_with_risk(store.clone(), AuditLog::new());

        service.record_failed_attempt("10.0.1.5", "heidi", None).await;
        assert_eq!(store.ttl_of("failed:10.0.1.5"), Some(Duration::hours(1)));
    }

    #[tokio::test]
    async fn test_attribution_through_directory() {
        let store = MockStore::new();
        let audit = AuditLog::new();
        let sink = Arc::new(RecordingSink {
            events: Mutex::new(Vec::new()),
        });
        audit.register(sink.clone()).await;
        let (service, _) = service_with_risk(store.clone(), audit);
        let service = service.with_directory(Arc::new(StaticDirectory {
            user_id: Some("user-42".to_string()),
        }));

        service
            .record_failed_attempt("10.0.1.6", "ivan", Some("curl/8.0"))
            .await;

        let events = sink.events.lock().unwrap();
        let failed = events
            .iter()
            .find(|e| e.action == AuditAction::LoginFailed)
            .unwrap();
        assert_eq!(failed.user_id.as_deref(), Some("user-42"));
        assert_eq!(failed.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[tokio::test]
    async fn test_unresolved_user_logs_unknown() {
        let store = MockStore::new();
        let audit = AuditLog::new();
        let sink = Arc::new(RecordingSink {
            events: Mutex::new(Vec::new()),
        });
        audit.register(sink.clone()).await;
        let (service, _) = service_with_risk(store.clone(), audit);
        let service = service.with_directory(Arc::new(StaticDirectory { user_id: None }));

        service.record_failed_attempt("10.0.1.7", "nobody", None).await;

        let events = sink.events.lock().unwrap();
        assert_eq!(events[0].user_id.as_deref(), Some("unknown"));
    }

    #[tokio::test]
    async fn test_blocked_ips_listing() {
        let store = MockStore::new();
        let (service, _) = service_with_risk(store.clone(), AuditLog::new());

        for ip in ["10.0.2.1", "10.0.2.2"] {
            for _ in 0..8 {
                service.record_failed_attempt(ip, "judy", None).await;
            }
        }

        let mut blocked: Vec<String> = service
            .blocked_ips()
            .await
            .unwrap()
            .into_iter()
            .map(|info| info.record.ip_address)
            .collect();
        blocked.sort();
        assert_eq!(blocked, vec!["10.0.2.1", "10.0.2.2"]);
    }
}
