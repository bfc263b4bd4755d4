//! Builder for constructing [`Palisade`] pipelines.
//!
//! Every collaborator is injected explicitly: the counter store, the user
//! directory, the CAPTCHA provider, the proof adapter, and any audit sinks.
//! There is no global registry; swapping a collaborator for a test double is
//! a constructor argument, not a process-wide mutation.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use palisade::PalisadeBuilder;
//! use palisade_store_memory::MemoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let palisade = PalisadeBuilder::new(Arc::new(MemoryStore::new()))
//!     .offload_verification(true)
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use palisade_core::{
    AuditLog, AuditSink, BlockingConfig, CaptchaConfig, CaptchaGate, CaptchaProvider,
    CommitmentAdapter, CounterStore, CredentialVerifier, DelayConfig, HashingConfig,
    IpBlockingService, PasswordHasher, ProgressiveDelayService, ProofAdapter, RiskClassifier,
    RiskConfig, TracingAuditSink, UserDirectory, VerificationWorker,
};

use crate::Palisade;

/// Errors that can occur when building a [`Palisade`] instance.
#[derive(Debug, thiserror::Error)]
pub enum PalisadeBuilderError {
    /// Degraded CAPTCHA mode was refused: no provider is configured but
    /// [`PalisadeBuilder::require_captcha_provider`] was set.
    #[error("CAPTCHA provider required but not configured")]
    MissingCaptchaProvider,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Builder for [`Palisade`].
///
/// Only the counter store is mandatory. Defaults: risk-adjusted thresholds
/// per the standard tables, the SHA-256 commitment adapter, inline proof
/// verification, and a tracing audit sink.
pub struct PalisadeBuilder<S: CounterStore> {
    store: Arc<S>,
    directory: Option<Arc<dyn UserDirectory>>,
    captcha_provider: Option<Arc<dyn CaptchaProvider>>,
    adapter: Arc<dyn ProofAdapter>,
    blocking_config: BlockingConfig,
    captcha_config: CaptchaConfig,
    delay_config: DelayConfig,
    risk_config: RiskConfig,
    hashing_config: HashingConfig,
    audit_sinks: Vec<Arc<dyn AuditSink>>,
    tracing_audit: bool,
    require_captcha_provider: bool,
    offload_verification: bool,
}

impl<S: CounterStore> PalisadeBuilder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            directory: None,
            captcha_provider: None,
            adapter: Arc::new(CommitmentAdapter::new()),
            blocking_config: BlockingConfig::default(),
            captcha_config: CaptchaConfig::default(),
            delay_config: DelayConfig::default(),
            risk_config: RiskConfig::default(),
            hashing_config: HashingConfig::default(),
            audit_sinks: Vec::new(),
            tracing_audit: true,
            require_captcha_provider: false,
            offload_verification: false,
        }
    }

    /// Attribute audit events to known identities via an indexed lookup.
    pub fn with_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Verify CAPTCHA tokens against this provider. Without one, the gate
    /// runs in degraded mode.
    pub fn with_captcha_provider(mut self, provider: Arc<dyn CaptchaProvider>) -> Self {
        self.captcha_provider = Some(provider);
        self
    }

    /// Replace the proof adapter (default: [`CommitmentAdapter`]).
    pub fn with_proof_adapter(mut self, adapter: Arc<dyn ProofAdapter>) -> Self {
        self.adapter = adapter;
        self
    }

    pub fn with_blocking_config(mut self, config: BlockingConfig) -> Self {
        self.blocking_config = config;
        self
    }

    pub fn with_captcha_config(mut self, config: CaptchaConfig) -> Self {
        self.captcha_config = config;
        self
    }

    pub fn with_delay_config(mut self, config: DelayConfig) -> Self {
        self.delay_config = config;
        self
    }

    pub fn with_risk_config(mut self, config: RiskConfig) -> Self {
        self.risk_config = config;
        self
    }

    pub fn with_hashing_config(mut self, config: HashingConfig) -> Self {
        self.hashing_config = config;
        self
    }

    /// Register an additional audit sink.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sinks.push(sink);
        self
    }

    /// Disable the default tracing audit sink.
    pub fn without_tracing_audit(mut self) -> Self {
        self.tracing_audit = false;
        self
    }

    /// Refuse to build without a real CAPTCHA provider.
    ///
    /// Production wiring sets this so a missing provider secret is a startup
    /// error instead of a silent fall-through to the degraded heuristic.
    pub fn require_captcha_provider(mut self) -> Self {
        self.require_captcha_provider = true;
        self
    }

    /// Dispatch proof verification to a dedicated worker task instead of
    /// running it inline on the request path.
    pub fn offload_verification(mut self, offload: bool) -> Self {
        self.offload_verification = offload;
        self
    }

    /// Construct the pipeline.
    pub async fn build(self) -> Result<Palisade<S>, PalisadeBuilderError> {
        if self.require_captcha_provider && self.captcha_provider.is_none() {
            return Err(PalisadeBuilderError::MissingCaptchaProvider);
        }

        for (tier, policy) in [
            ("fallback", &self.blocking_config.fallback),
            ("low", &self.blocking_config.low),
            ("medium", &self.blocking_config.medium),
            ("high", &self.blocking_config.high),
        ] {
            if policy.max_attempts < 1 {
                return Err(PalisadeBuilderError::InvalidConfiguration(format!(
                    "blocking max_attempts for {tier} tier must be at least 1"
                )));
            }
        }

        let audit = AuditLog::new();
        if self.tracing_audit {
            audit.register(Arc::new(TracingAuditSink)).await;
        }
        for sink in self.audit_sinks {
            audit.register(sink).await;
        }

        let risk = Arc::new(
            RiskClassifier::new(self.store.clone(), audit.clone()).with_config(self.risk_config),
        );

        let mut blocking = IpBlockingService::new(self.store.clone(), audit.clone())
            .with_risk_classifier(risk.clone())
            .with_config(self.blocking_config);
        if let Some(directory) = self.directory {
            blocking = blocking.with_directory(directory);
        }

        let mut captcha = CaptchaGate::new(self.store.clone(), audit.clone())
            .with_risk_classifier(risk.clone())
            .with_config(self.captcha_config);
        if let Some(provider) = self.captcha_provider {
            captcha = captcha.with_provider(provider);
        }

        let delay =
            ProgressiveDelayService::new(self.store.clone()).with_config(self.delay_config);

        let hasher = PasswordHasher::new(self.hashing_config);
        let mut verifier = CredentialVerifier::new(self.adapter.clone(), hasher);
        if self.offload_verification {
            let (handle, _task) = VerificationWorker::spawn(self.adapter);
            verifier = verifier.with_worker(handle);
        }

        Ok(Palisade {
            risk,
            blocking,
            captcha,
            delay,
            verifier,
            audit,
        })
    }
}
