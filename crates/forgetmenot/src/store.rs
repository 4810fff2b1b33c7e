//! Store backend trait and the fetch-or-compute adapter

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::activity::Outcome;
use crate::error::{Error, Result};
use crate::keys::CacheKey;
use crate::scope::Scope;

/// Key/value backend with per-entry time-to-live
///
/// Expiry and eviction are the backend's responsibility. Writes are
/// last-write-wins per key.
pub trait CacheStore: Send + Sync {
    /// Read a live entry
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;

    /// Write an entry that expires after `ttl`
    fn put(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Drop an entry, returning whether it was present
    fn expire(&self, key: &CacheKey) -> Result<bool>;
}

/// Builds the host-provided store
pub type StoreFactory = fn() -> Arc<dyn CacheStore>;

static HOST_FALLBACK: OnceCell<StoreFactory> = OnceCell::new();

/// Install the process-wide fallback used when no store was set explicitly.
///
/// Returns false if a fallback was already installed.
pub fn set_host_fallback(factory: StoreFactory) -> bool {
    HOST_FALLBACK.set(factory).is_ok()
}

/// Build a store from the installed fallback, if any
pub fn host_fallback() -> Option<Arc<dyn CacheStore>> {
    HOST_FALLBACK.get().map(|factory| factory())
}

/// Uniform fetch-or-compute over the configured backend
#[derive(Default)]
pub struct StoreAdapter {
    slot: RwLock<Option<Arc<dyn CacheStore>>>,
}

impl StoreAdapter {
    /// Adapter with no store; resolved on first use
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter over an explicit store
    pub fn with_store(store: Arc<dyn CacheStore>) -> Self {
        Self {
            slot: RwLock::new(Some(store)),
        }
    }

    /// Replace the backend
    pub fn set_store(&self, store: Arc<dyn CacheStore>) {
        *self.slot.write() = Some(store);
    }

    /// The explicit store, else the host fallback, else a configuration error
    pub fn resolve(&self) -> Result<Arc<dyn CacheStore>> {
        if let Some(store) = self.slot.read().as_ref() {
            return Ok(Arc::clone(store));
        }

        let mut slot = self.slot.write();
        if let Some(store) = slot.as_ref() {
            return Ok(Arc::clone(store));
        }
        match host_fallback() {
            Some(store) => {
                debug!("no cache store set, using host fallback");
                *slot = Some(Arc::clone(&store));
                Ok(store)
            }
            None => Err(Error::Configuration(
                "no cache store configured and no host fallback installed; \
                 set a store explicitly before using cached members"
                    .to_string(),
            )),
        }
    }

    /// Whether `scope` bypasses the read path
    pub fn is_forced(&self, scope: &Scope) -> bool {
        scope.is_forced()
    }

    /// Read `key`, or run `compute` and store its result for `ttl`.
    ///
    /// A forced scope skips the read and stays active while `compute` runs,
    /// so nested cached calls refresh too. Failed computations are not stored.
    pub fn fetch_or_compute<R, E, F>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        scope: &Scope,
        compute: F,
    ) -> std::result::Result<(R, Outcome), E>
    where
        R: Serialize + DeserializeOwned,
        E: From<Error>,
        F: FnOnce() -> std::result::Result<R, E>,
    {
        let store = self.resolve()?;
        let forced = self.is_forced(scope);

        if !forced {
            if let Some(bytes) = store.get(key)? {
                let value = serde_json::from_slice(&bytes).map_err(Error::from)?;
                return Ok((value, Outcome::Hit));
            }
        }

        let value = {
            let _active = scope.enter();
            compute()?
        };
        let bytes = serde_json::to_vec(&value).map_err(Error::from)?;
        store.put(key, bytes, ttl)?;

        let outcome = if forced { Outcome::Refresh } else { Outcome::Miss };
        Ok((value, outcome))
    }
}
