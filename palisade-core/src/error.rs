use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("CAPTCHA error: {0}")]
    Captcha(#[from] CaptchaError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Counter value is not an integer: {0}")]
    NonNumericCounter(String),
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit sink error: {0}")]
    Sink(String),
}

#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Provider returned a malformed response: {0}")]
    MalformedResponse(String),

    #[error("No provider secret configured")]
    MissingSecret,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error("Invalid salt: {0}")]
    InvalidSalt(String),

    #[error("Proof generation failed: {0}")]
    ProofGeneration(String),

    #[error("Malformed proof bundle: {0}")]
    MalformedProof(String),

    #[error("Verification worker is unavailable")]
    WorkerUnavailable,

    #[error("Verification timed out after {0:?}")]
    VerificationTimeout(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

impl Error {
    pub fn is_store_error(&self) -> bool {
        matches!(self, Error::Store(_))
    }

    pub fn is_audit_error(&self) -> bool {
        matches!(self, Error::Audit(_))
    }

    pub fn is_captcha_error(&self) -> bool {
        matches!(self, Error::Captcha(_))
    }

    pub fn is_credential_error(&self) -> bool {
        matches!(self, Error::Credential(_))
    }

    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}
