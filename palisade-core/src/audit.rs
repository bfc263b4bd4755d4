//! Security audit events and the append-only sink abstraction.
//!
//! Every security-relevant transition in the pipeline (failed attempt, block,
//! rejected attempt against a blocked IP, unblock, risk tier change, CAPTCHA
//! verification) is described by an [`AuditEvent`] and handed to every
//! registered [`AuditSink`].
//!
//! Emission is fire-and-forget: a sink that fails is logged and skipped, and
//! the failure never propagates into the policy decision that produced the
//! event. An unreachable audit backend must not turn into a login outage.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::AuditError;

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditSeverity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for AuditSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditSeverity::Info => "INFO",
            AuditSeverity::Warning => "WARNING",
            AuditSeverity::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// The action an audit event describes.
///
/// Rendered as SCREAMING_SNAKE strings so downstream sinks can filter on a
/// stable vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    LoginFailed,
    IpBlocked,
    BlockedAttemptRejected,
    IpUnblocked,
    IpRiskLevelChanged,
    CaptchaVerified,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditAction::LoginFailed => "LOGIN_FAILED",
            AuditAction::IpBlocked => "IP_BLOCKED",
            AuditAction::BlockedAttemptRejected => "BLOCKED_ATTEMPT_REJECTED",
            AuditAction::IpUnblocked => "IP_UNBLOCKED",
            AuditAction::IpRiskLevelChanged => "IP_RISK_LEVEL_CHANGED",
            AuditAction::CaptchaVerified => "CAPTCHA_VERIFIED",
        };
        f.write_str(s)
    }
}

/// A single append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Attributed user id, `"unknown"` when attribution failed.
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    pub action: AuditAction,
    pub severity: AuditSeverity,
    pub ip_address: String,
    pub user_agent: Option<String>,
    /// Free-form structured context (attempt counts, durations, reasons).
    pub details: serde_json::Value,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, severity: AuditSeverity, ip_address: impl Into<String>) -> Self {
        Self {
            user_id: None,
            tenant_id: None,
            action,
            severity,
            ip_address: ip_address.into(),
            user_agent: None,
            details: serde_json::Value::Null,
            success: false,
            timestamp: Utc::now(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: Option<&str>) -> Self {
        self.user_agent = user_agent.map(|ua| ua.to_string());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }
}

/// A destination for audit events.
///
/// Implementors are registered with the [`AuditLog`] and receive every emitted
/// event. Sinks must tolerate being called concurrently.
#[async_trait]
pub trait AuditSink: Send + Sync + 'static {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Fan-out handle over all registered audit sinks.
///
/// Cloning is cheap; clones share the sink registry.
#[derive(Clone, Default)]
pub struct AuditLog {
    sinks: Arc<RwLock<Vec<Arc<dyn AuditSink>>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            sinks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register an audit sink.
    pub async fn register(&self, sink: Arc<dyn AuditSink>) {
        self.sinks.write().await.push(sink);
    }

    /// Emit an event to every registered sink, best-effort.
    ///
    /// A failing sink is logged at WARN and skipped; the remaining sinks still
    /// receive the event. This method never returns an error.
    pub async fn emit(&self, event: AuditEvent) {
        for sink in self.sinks.read().await.iter() {
            if let Err(e) = sink.record(&event).await {
                tracing::warn!(
                    error = %e,
                    action = %event.action,
                    ip = %event.ip_address,
                    "Audit sink failed, event dropped for this sink"
                );
            }
        }
    }
}

/// Audit sink that renders events as structured tracing records.
///
/// Registered by default so a deployment without an external audit backend
/// still has a complete trail in its logs.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        match event.severity {
            AuditSeverity::Info => tracing::info!(
                action = %event.action,
                ip = %event.ip_address,
                user_id = ?event.user_id,
                success = event.success,
                details = %event.details,
                "audit"
            ),
            AuditSeverity::Warning => tracing::warn!(
                action = %event.action,
                ip = %event.ip_address,
                user_id = ?event.user_id,
                success = event.success,
                details = %event.details,
                "audit"
            ),
            AuditSeverity::Error => tracing::error!(
                action = %event.action,
                ip = %event.ip_address,
                user_id = ?event.user_id,
                success = event.success,
                details = %event.details,
                "audit"
            ),
        }
        Ok(())
    }
}
