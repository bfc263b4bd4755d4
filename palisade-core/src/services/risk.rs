//! IP risk classification.
//!
//! Maps a client IP to a coarse risk tier used to scale blocking and CAPTCHA
//! thresholds. The classifier is a pure read/write policy over its own key
//! prefix: risk records are written by explicit administrative action (or an
//! external reputation feed) and expire after 30 days.
//!
//! Reads fail open to [`RiskLevel::Medium`]: an absent record, a malformed
//! record, and a store outage all resolve to the default tier. The read path
//! never returns an error.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    audit::{AuditAction, AuditEvent, AuditLog, AuditSeverity},
    store::{CounterStore, keys},
};

/// Coarse classification of how suspicious an IP address is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl Default for RiskLevel {
    fn default() -> Self {
        RiskLevel::Medium
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown risk level: {0}")]
pub struct ParseRiskLevelError(String);

impl std::str::FromStr for RiskLevel {
    type Err = ParseRiskLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(RiskLevel::Low),
            "MEDIUM" => Ok(RiskLevel::Medium),
            "HIGH" => Ok(RiskLevel::High),
            other => Err(ParseRiskLevelError(other.to_string())),
        }
    }
}

/// Configuration for the risk classifier.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// How long a risk record lives before reverting to the default tier.
    pub record_ttl: Duration,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            record_ttl: Duration::days(30),
        }
    }
}

/// Reads and writes per-IP risk records.
///
/// No other component writes the `risk:` prefix; the blocking service and the
/// CAPTCHA gate consult the classifier through calls, never through the store.
pub struct RiskClassifier<S: CounterStore> {
    store: Arc<S>,
    audit: AuditLog,
    config: RiskConfig,
}

impl<S: CounterStore> RiskClassifier<S> {
    pub fn new(store: Arc<S>, audit: AuditLog) -> Self {
        Self {
            store,
            audit,
            config: RiskConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RiskConfig) -> Self {
        self.config = config;
        self
    }

    fn record_key(ip: &str) -> String {
        format!("{}{}", keys::RISK, ip)
    }

    /// Current risk tier for an IP.
    ///
    /// Fails open to MEDIUM: absent record, unparseable record, and store
    /// failure all resolve to the default tier.
    pub async fn risk_level(&self, ip: &str) -> RiskLevel {
        match self.store.get(&Self::record_key(ip)).await {
            Ok(Some(raw)) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(ip = %ip, value = %raw, "Malformed risk record, using default tier");
                RiskLevel::Medium
            }),
            Ok(None) => RiskLevel::Medium,
            Err(e) => {
                tracing::warn!(ip = %ip, error = %e, "Risk lookup failed, using default tier");
                RiskLevel::Medium
            }
        }
    }

    /// Overwrite the risk tier for an IP with a fresh 30-day TTL.
    ///
    /// Emits an `IP_RISK_LEVEL_CHANGED` audit event. Audit delivery is
    /// best-effort and cannot fail the update.
    pub async fn set_risk_level(&self, ip: &str, level: RiskLevel) -> Result<(), Error> {
        let previous = self.risk_level(ip).await;

        self.store
            .set(
                &Self::record_key(ip),
                &level.to_string(),
                Some(self.config.record_ttl),
            )
            .await?;

        tracing::info!(ip = %ip, previous = %previous, new = %level, "Risk level changed");

        self.audit
            .emit(
                AuditEvent::new(AuditAction::IpRiskLevelChanged, AuditSeverity::Info, ip)
                    .with_success(true)
                    .with_details(serde_json::json!({
                        "previous": previous.to_string(),
                        "new": level.to_string(),
                    })),
            )
            .await;

        Ok(())
    }
}
