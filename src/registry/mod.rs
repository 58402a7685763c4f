//! Component registry with time-based expiry
//!
//! Holds expensive-to-build objects (chat model clients, prompt templates,
//! chain objects) so pipeline steps can share one instance per distinct
//! `(kind, params)`. Entries expire once they have gone unused for longer
//! than the TTL. Expired entries are swept before every operation.
//!
//! The registry is an ordinary value: build one at the application's wiring
//! point and pass it (usually as `Arc<ComponentRegistry>`) to whoever needs it.

mod clock;
mod key;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::{canonical_json, component_key};

use crate::config::RegistryConfig;
use ahash::HashMap;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Type-erased cached object
pub type Component = Arc<dyn Any + Send + Sync>;

struct Entry {
    object: Component,
    last_access: DateTime<Utc>,
}

impl Entry {
    fn new(object: Component, now: DateTime<Utc>) -> Self {
        Self {
            object,
            last_access: now,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.last_access > ttl
    }

    /// Refresh and downcast; `None` when the stored type differs
    fn touch<T: Any + Send + Sync>(&mut self, now: DateTime<Utc>) -> Option<Arc<T>> {
        let object = Arc::clone(&self.object).downcast::<T>().ok()?;
        self.last_access = now;
        Some(object)
    }
}

#[derive(Default)]
struct Entries {
    components: HashMap<String, Entry>,
    chains: HashMap<String, BTreeMap<usize, Entry>>,
}

impl Entries {
    fn sweep(&mut self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let before = self.len();
        self.components.retain(|_, e| !e.is_expired(now, ttl));
        for steps in self.chains.values_mut() {
            steps.retain(|_, e| !e.is_expired(now, ttl));
        }
        self.chains.retain(|_, steps| !steps.is_empty());
        before - self.len()
    }

    fn len(&self) -> usize {
        self.components.len() + self.chains.values().map(BTreeMap::len).sum::<usize>()
    }
}

/// Keyed object cache with TTL eviction
pub struct ComponentRegistry {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<Entries>,
}

impl ComponentRegistry {
    /// Registry on the wall clock
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(Entries::default()),
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(config.ttl())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the live object for `(kind, params)`, building it on a miss
    ///
    /// `factory` runs under the registry lock, so concurrent callers asking
    /// for the same key build it once. The factory must not call back into
    /// this registry. Its error is returned unchanged and nothing is cached.
    pub fn get_or_create<T, E, F>(&self, kind: &str, params: &Value, factory: F) -> Result<Arc<T>, E>
    where
        T: Any + Send + Sync,
        F: FnOnce(&Value) -> Result<T, E>,
    {
        let key = component_key(kind, params);
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        self.sweep_locked(&mut entries, now);

        if let Some(entry) = entries.components.get_mut(&key) {
            match entry.touch::<T>(now) {
                Some(object) => {
                    tracing::debug!("Registry hit: {} [{}]", kind, key);
                    return Ok(object);
                }
                None => {
                    tracing::warn!("Registry entry {} [{}] has another type, rebuilding", kind, key);
                }
            }
        }

        tracing::debug!("Registry miss, creating: {} [{}]", kind, key);
        let object = Arc::new(factory(params)?);
        let stored: Component = object.clone();
        entries.components.insert(key, Entry::new(stored, now));
        Ok(object)
    }

    /// Lookup without creation; refreshes the entry on a hit
    pub fn get<T: Any + Send + Sync>(&self, kind: &str, params: &Value) -> Option<Arc<T>> {
        let key = component_key(kind, params);
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        self.sweep_locked(&mut entries, now);
        entries.components.get_mut(&key)?.touch::<T>(now)
    }

    /// Store `object` under `(kind, params)`, replacing any previous entry
    pub fn insert<T: Any + Send + Sync>(&self, kind: &str, params: &Value, object: T) -> Arc<T> {
        let key = component_key(kind, params);
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        self.sweep_locked(&mut entries, now);

        let object = Arc::new(object);
        let stored: Component = object.clone();
        entries.components.insert(key, Entry::new(stored, now));
        object
    }

    /// Remove every entry unused for longer than the TTL
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        self.sweep_locked(&mut entries, now)
    }

    fn sweep_locked(&self, entries: &mut Entries, now: DateTime<Utc>) -> usize {
        let removed = entries.sweep(now, self.ttl);
        if removed > 0 {
            tracing::debug!("Registry sweep evicted {} entries", removed);
        }
        removed
    }

    /// Attach an object to step `step_index` of chain `chain_id`
    pub fn set_chain_object<T: Any + Send + Sync>(
        &self,
        chain_id: &str,
        step_index: usize,
        object: T,
    ) -> Arc<T> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        self.sweep_locked(&mut entries, now);

        let object = Arc::new(object);
        let stored: Component = object.clone();
        entries
            .chains
            .entry(chain_id.to_string())
            .or_default()
            .insert(step_index, Entry::new(stored, now));
        object
    }

    pub fn get_chain_object<T: Any + Send + Sync>(
        &self,
        chain_id: &str,
        step_index: usize,
    ) -> Option<Arc<T>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        self.sweep_locked(&mut entries, now);
        entries
            .chains
            .get_mut(chain_id)?
            .get_mut(&step_index)?
            .touch::<T>(now)
    }

    /// Chain-scoped counterpart of [`get_or_create`](Self::get_or_create)
    pub fn chain_get_or_create<T, E, F>(
        &self,
        chain_id: &str,
        step_index: usize,
        factory: F,
    ) -> Result<Arc<T>, E>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Result<T, E>,
    {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        self.sweep_locked(&mut entries, now);

        let steps = entries.chains.entry(chain_id.to_string()).or_default();
        if let Some(object) = steps
            .get_mut(&step_index)
            .and_then(|entry| entry.touch::<T>(now))
        {
            return Ok(object);
        }

        let object = match factory() {
            Ok(object) => Arc::new(object),
            Err(e) => {
                if steps.is_empty() {
                    entries.chains.remove(chain_id);
                }
                return Err(e);
            }
        };
        let stored: Component = object.clone();
        steps.insert(step_index, Entry::new(stored, now));
        Ok(object)
    }

    /// Every live object of one chain, ordered by step index
    pub fn get_chain_objects(&self, chain_id: &str) -> Vec<(usize, Component)> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        self.sweep_locked(&mut entries, now);

        match entries.chains.get_mut(chain_id) {
            Some(steps) => steps
                .iter_mut()
                .map(|(&index, entry)| {
                    entry.last_access = now;
                    (index, Arc::clone(&entry.object))
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// Drop all objects of one chain; returns how many were removed
    pub fn remove_chain_objects(&self, chain_id: &str) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        self.sweep_locked(&mut entries, now);

        let removed = entries
            .chains
            .remove(chain_id)
            .map(|steps| steps.len())
            .unwrap_or(0);
        if removed > 0 {
            tracing::debug!("Removed {} objects of chain {}", removed, chain_id);
        }
        removed
    }

    /// Number of live entries, component and chain-scoped
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        self.sweep_locked(&mut entries, now);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.components.clear();
        entries.chains.clear();
    }
}

/// TTL taken from `CHAIN_CACHE_LRU_HOUR`, 24 hours when unset or invalid
impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::from_config(&RegistryConfig::from_env())
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
