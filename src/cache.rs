//! Time-stamped cache slots over a [`KvStore`].
//!
//! Each slot is a JSON blob `{ data, timestamp }` under its own key with its
//! own TTL. An entry is fresh while `now - timestamp < ttl`; stale entries are
//! left in place and simply overwritten by the next successful fetch. Fetch
//! failures propagate, a stale entry is never served as a fallback.

use crate::db::KvStore;
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const RAW_KEY: &str = "pollution_data";
pub const INTERPOLATED_KEY: &str = "interpolated_pollution_data";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Epoch milliseconds at which `data` was stored.
    pub timestamp: i64,
}

/// A named cache entry and how long it stays fresh.
#[derive(Debug, Clone)]
pub struct Slot {
    pub key: String,
    pub ttl: Duration,
}

impl Slot {
    pub fn new(key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            ttl,
        }
    }

    fn ttl_ms(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }
}

pub struct Cache<K> {
    store: Arc<K>,
}

impl<K> Clone for Cache<K> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<K: KvStore> Cache<K> {
    pub fn new(store: Arc<K>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    /// Reads `slot`, returning its entry if present and decodable, fresh or not.
    pub fn entry<T: DeserializeOwned>(&self, slot: &Slot) -> Option<CacheEntry<T>> {
        let raw = match self.store.get(&slot.key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Cache read for '{}' failed: {}", slot.key, e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Discarding unreadable cache entry '{}': {}", slot.key, e);
                None
            }
        }
    }

    fn fresh<T: DeserializeOwned>(&self, slot: &Slot) -> Option<T> {
        let entry = self.entry::<T>(slot)?;
        let age = self.store.now().saturating_sub(entry.timestamp);
        if age < slot.ttl_ms() {
            debug!("Cache hit for '{}' ({} ms old)", slot.key, age);
            Some(entry.data)
        } else {
            info!("Cache entry '{}' expired ({} ms old)", slot.key, age);
            None
        }
    }

    /// Overwrites `slot` with `data` stamped at the store's current time.
    pub fn put<T: Serialize>(&self, slot: &Slot, data: &T) {
        let entry = CacheEntry {
            data,
            timestamp: self.store.now(),
        };
        let written = serde_json::to_string(&entry)
            .map_err(Into::into)
            .and_then(|json| self.store.set(&slot.key, &json));
        if let Err(e) = written {
            warn!("Cache write for '{}' failed: {}", slot.key, e);
        }
    }

    /// Returns the fresh contents of `slot`, or runs `fetch` and stores its result.
    pub async fn get_or_fetch<T, F, Fut>(&self, slot: &Slot, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(data) = self.fresh(slot) {
            return Ok(data);
        }

        let data = fetch().await?;
        self.put(slot, &data);
        Ok(data)
    }

    /// Two-level lookup: a fresh `derived` entry wins outright; otherwise a
    /// fresh `raw` entry is re-derived without fetching; otherwise `fetch`
    /// runs and both slots are rewritten.
    pub async fn get_or_fetch_derived<T, D, F, Fut, G>(
        &self,
        raw: &Slot,
        derived: &Slot,
        fetch: F,
        derive: G,
    ) -> Result<D>
    where
        T: Serialize + DeserializeOwned,
        D: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        G: FnOnce(&T) -> D,
    {
        if let Some(data) = self.fresh::<D>(derived) {
            return Ok(data);
        }

        if let Some(source) = self.fresh::<T>(raw) {
            info!("Re-deriving '{}' from cached '{}'", derived.key, raw.key);
            let data = derive(&source);
            self.put(derived, &data);
            return Ok(data);
        }

        let source = fetch().await?;
        let data = derive(&source);
        self.put(raw, &source);
        self.put(derived, &data);
        Ok(data)
    }
}
