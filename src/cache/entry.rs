//! Expiring snapshot wrapper stored in a [`CacheStore`](super::CacheStore).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// When a cached snapshot stops being trustworthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum Expiry {
    /// Static data: computed once, valid forever.
    Never,
    /// Valid strictly before this instant.
    At(DateTime<Utc>),
}

impl Expiry {
    /// Expiry `ttl` after `now`.
    pub fn after(now: DateTime<Utc>, ttl: Duration) -> Self {
        Expiry::At(now + ttl)
    }

    /// An entry expiring at `t` is expired at any `now >= t`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self {
            Expiry::Never => false,
            Expiry::At(at) => *at <= now,
        }
    }
}

/// A snapshot together with its expiry. Replaced wholesale, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub expiry: Expiry,
    pub payload: T,
}

impl<T> CacheEntry<T> {
    pub fn new(expiry: Expiry, payload: T) -> Self {
        Self { expiry, payload }
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        !self.expiry.is_expired_at(now)
    }
}

/// A missing entry is stale, and so is one whose expiry has passed.
pub fn is_stale<T>(entry: Option<&CacheEntry<T>>, now: DateTime<Utc>) -> bool {
    match entry {
        None => true,
        Some(entry) => entry.expiry.is_expired_at(now),
    }
}
