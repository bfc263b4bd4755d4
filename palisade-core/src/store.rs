//! Counter store and user directory contracts.
//!
//! The key-value store is the only shared mutable resource in the pipeline.
//! Each policy service owns exactly one key prefix and never touches another
//! service's keys; cross-policy coordination happens through service calls,
//! not through the store.
//!
//! # Atomicity
//!
//! [`CounterStore::incr`] must be an atomic increment-and-read. Two racing
//! failed attempts from the same IP may both observe "not yet blocked", but
//! because each reads its count back from its own increment, at least one of
//! them observes the threshold-crossing value. A block can be triggered more
//! than once; it can never be lost.

use async_trait::async_trait;
use chrono::Duration;

use crate::Error;

/// Key prefixes, one per record family.
pub mod keys {
    /// Risk tier records, written only by the risk classifier.
    pub const RISK: &str = "risk:";
    /// Failed attempt counter for the blocking policy.
    pub const FAILED: &str = "failed:";
    /// Block records.
    pub const BLOCK: &str = "block:";
    /// Failed attempt counter for the CAPTCHA gate.
    pub const CAPTCHA_REQUIRED: &str = "captcha:req:";
    /// Successful CAPTCHA verification records, audit-only.
    pub const CAPTCHA_VERIFIED: &str = "captcha:ok:";
    /// Failed attempt counter for the progressive delay policy.
    pub const DELAY: &str = "delay:";
}

/// Shared key-value store with atomic counters and per-key expiry.
///
/// Semantics follow the conventional counter-store contract:
///
/// - `get` on a missing key returns `None` (callers treat it as 0 for
///   counters)
/// - `incr` on a missing key initializes the counter to 1
/// - an expired key behaves exactly like a missing key
#[async_trait]
pub trait CounterStore: Send + Sync + 'static {
    /// Read a value. Missing or expired keys return `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    /// Write a value, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), Error>;

    /// Atomically increment a counter and return the new value.
    ///
    /// A missing key is initialized to 1. The returned value is the one this
    /// call produced, never a separately cached read.
    async fn incr(&self, key: &str) -> Result<i64, Error>;

    /// Refresh the TTL of an existing key. A missing key is a no-op.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), Error>;

    /// Delete a key. Deleting a missing key is a no-op.
    async fn del(&self, key: &str) -> Result<(), Error>;

    /// List keys matching a glob-style pattern (`block:*`).
    ///
    /// Used only by administrative inspection operations, never on the
    /// per-attempt hot path.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, Error>;
}

/// Indexed lookup from username (or email) to a user id.
///
/// Used to attribute security events to a known identity when possible. The
/// contract is an indexed lookup: implementations must resolve by key, not by
/// scanning all user records. Attribution is best-effort: a lookup failure
/// degrades to `"unknown"` in the audit trail and never affects the policy
/// outcome.
#[async_trait]
pub trait UserDirectory: Send + Sync + 'static {
    async fn find_user_id(&self, username: &str) -> Result<Option<String>, Error>;
}

/// Read a counter, treating missing and malformed values as 0.
pub(crate) async fn read_count<S: CounterStore + ?Sized>(store: &S, key: &str) -> Result<i64, Error> {
    let value = store.get(key).await?;
    Ok(value.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FixtureStore {
        values: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl CounterStore for FixtureStore {
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

    #[tokio::test]
    async fn test_read_count_missing_key_is_zero() {
        let store = FixtureStore {
            values: Mutex::new(HashMap::new()),
        };
        assert_eq!(read_count(&store, "failed:1.2.3.4").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_read_count_malformed_value_is_zero() {
        let store = FixtureStore {
            values: Mutex::new(HashMap::new()),
        };
        store.set("failed:1.2.3.4", "garbage", None).await.unwrap();
        assert_eq!(read_count(&store, "failed:1.2.3.4").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_incr_initializes_to_one() {
        let store = FixtureStore {
            values: Mutex::new(HashMap::new()),
        };
        assert_eq!(store.incr("failed:1.2.3.4").await.unwrap(), 1);
        assert_eq!(store.incr("failed:1.2.3.4").await.unwrap(), 2);
        assert_eq!(read_count(&store, "failed:1.2.3.4").await.unwrap(), 2);
    }
}
