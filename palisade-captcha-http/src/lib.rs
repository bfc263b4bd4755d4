//! HTTP CAPTCHA provider.
//!
//! Verifies submitted CAPTCHA tokens against a siteverify-style endpoint:
//! a form POST of `{secret, response, remoteip}` answered with
//! `{"success": bool, "score": number?}`. This covers Google reCAPTCHA and
//! compatible services (hCaptcha, Turnstile) which share the wire shape.
//!
//! The provider is only constructed when a secret is configured; without one
//! the CAPTCHA gate runs in degraded mode by design.

use std::time::Duration;

use async_trait::async_trait;
use palisade_core::{CaptchaProvider, CaptchaVerdict, Error, error::CaptchaError};
use serde::Deserialize;

/// Default verification endpoint (Google reCAPTCHA siteverify).
pub const DEFAULT_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variable holding the provider secret.
pub const ENV_SECRET: &str = "PALISADE_CAPTCHA_SECRET";
/// Environment variable overriding the verification endpoint.
pub const ENV_VERIFY_URL: &str = "PALISADE_CAPTCHA_VERIFY_URL";

/// Configuration for the HTTP provider.
#[derive(Debug, Clone)]
pub struct HttpCaptchaConfig {
    pub secret: String,
    pub verify_url: String,
    pub timeout: Duration,
}

impl HttpCaptchaConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            verify_url: DEFAULT_VERIFY_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_verify_url(mut self, verify_url: impl Into<String>) -> Self {
        self.verify_url = verify_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build from the environment. `None` when no secret is configured,
    /// which callers should treat as "run the gate in degraded mode".
    pub fn from_env() -> Option<Self> {
        let secret = std::env::var(ENV_SECRET).ok().filter(|s| !s.is_empty())?;
        let mut config = Self::new(secret);
        if let Ok(url) = std::env::var(ENV_VERIFY_URL) {
            if !url.is_empty() {
                config.verify_url = url;
            }
        }
        Some(config)
    }
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    success: bool,
    score: Option<f64>,
}

/// [`CaptchaProvider`] backed by an HTTP verification endpoint.
pub struct HttpCaptchaProvider {
    client: reqwest::Client,
    config: HttpCaptchaConfig,
}

impl HttpCaptchaProvider {
    pub fn new(config: HttpCaptchaConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CaptchaError::Provider(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl CaptchaProvider for HttpCaptchaProvider {
    async fn verify(&self, token: &str, remote_ip: &str) -> Result<CaptchaVerdict, Error> {
        let params = [
            ("secret", self.config.secret.as_str()),
            ("response", token),
            ("remoteip", remote_ip),
        ];

        let response = self
            .client
            .post(&self.config.verify_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| CaptchaError::Provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CaptchaError::Provider(format!("HTTP {status}")).into());
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| CaptchaError::MalformedResponse(e.to_string()))?;

        tracing::debug!(
            remote_ip = %remote_ip,
            success = body.success,
            score = ?body.score,
            "CAPTCHA provider verdict"
        );

        Ok(CaptchaVerdict {
            success: body.success,
            score: body.score,
        })
    }
}
