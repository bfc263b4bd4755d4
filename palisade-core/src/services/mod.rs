//! Policy services for the login defense pipeline.
//!
//! Each service is an independent policy over its own key prefix in the
//! shared counter store. They coordinate only through service calls, never
//! by reading each other's keys.

pub mod blocking;
pub mod captcha;
pub mod delay;
pub mod risk;

pub use blocking::{BlockInfo, BlockRecord, BlockingConfig, IpBlockingService, TierPolicy};
pub use captcha::{
    CaptchaConfig, CaptchaGate, CaptchaOutcome, CaptchaProvider, CaptchaVerdict,
    CaptchaVerificationRecord,
};
pub use delay::{DelayConfig, ProgressiveDelayService};
pub use risk::{RiskClassifier, RiskConfig, RiskLevel};
