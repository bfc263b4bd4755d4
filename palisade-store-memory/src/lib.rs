//! In-memory backend for the palisade counter store.
//!
//! Backed by a concurrent map with per-key expiry checked on access. This is
//! the backend used by tests, demos, and single-process deployments; a
//! production deployment pointing at a shared store implements
//! [`CounterStore`] against that service instead.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use palisade_core::{CounterStore, Error, UserDirectory, error::StoreError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Concurrent in-memory key-value store with TTL support.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.entries.iter().filter(|e| !e.expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expires_at(ttl: Option<Duration>) -> Option<DateTime<Utc>> {
        ttl.map(|ttl| Utc::now() + ttl)
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let now = Utc::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.expired(now) {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Lazily drop the expired entry.
        self.entries.remove_if(key, |_, entry| entry.expired(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), Error> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Self::expires_at(ttl),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, Error> {
        let now = Utc::now();
        let entry = self
            .entries
            .entry(key.to_string())
            .and_modify(|entry| {
                if entry.expired(now) {
                    entry.value = "1".to_string();
                    entry.expires_at = None;
                } else {
                    let current = entry.value.parse::<i64>().unwrap_or(0);
                    entry.value = (current + 1).to_string();
                }
            })
            .or_insert_with(|| Entry {
                value: "1".to_string(),
                expires_at: None,
            });
        Ok(entry.value.parse::<i64>().unwrap_or(0))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), Error> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Utc::now() + ttl);
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), Error> {
        self.entries.remove(key);
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, Error> {
        let regex = glob_to_regex(pattern)?;
        let now = Utc::now();
        Ok(self
            .entries
            .iter()
            .filter(|entry| !entry.expired(now) && regex.is_match(entry.key()))
            .map(|entry| entry.key().clone())
            .collect())
    }
}

/// Translate a glob pattern (`block:*`) into an anchored regex.
fn glob_to_regex(pattern: &str) -> Result<regex::Regex, Error> {
    let mut escaped = String::with_capacity(pattern.len() + 4);
    escaped.push('^');
    for c in pattern.chars() {
        match c {
            '*' => escaped.push_str(".*"),
            '?' => escaped.push('.'),
            other => escaped.push_str(&regex::escape(&other.to_string())),
        }
    }
    escaped.push('$');
    regex::Regex::new(&escaped)
        .map_err(|e| StoreError::Backend(format!("bad key pattern: {e}")).into())
}

/// In-memory username -> user id index.
#[derive(Default)]
pub struct MemoryDirectory {
    users: DashMap<String, String>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, username: impl Into<String>, user_id: impl Into<String>) {
        self.users.insert(username.into(), user_id.into());
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn find_user_id(&self, username: &str) -> Result<Option<String>, Error> {
        Ok(self.users.get(username).map(|id| id.clone()))
    }
}
