//! Signature-keyed memo caches.
//!
//! `MemoCache` is a process-local map guarded by a `parking_lot::RwLock`, locked
//! only around individual get/set calls. It optionally bounds its size
//! (oldest-inserted entries go first), expires entries after a TTL, and can
//! run the work for a missing key once across concurrent callers through
//! striped per-key locks.
//!
//! `EngineCaches` bundles the three caches the engine owns: table loads, join
//! catalogs and join results. Nothing is invalidated automatically; callers
//! clear or invalidate explicitly.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

use crate::config::{CacheSettings, EngineConfig};
use crate::model::JoinDeclaration;

const N_FLIGHT_LOCKS: usize = 64;

pub trait CacheKey: Eq + Hash + Clone + Send + Sync {
    /// Stable hash used to pick a single-flight stripe.
    fn fingerprint(&self) -> u64;
}

impl CacheKey for String {
    fn fingerprint(&self) -> u64 { xxh3_64(self.as_bytes()) }
}

/// (workflow, data collection, filter signature)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableLoadKey {
    pub workflow_id: String,
    pub data_collection_id: String,
    pub signature: String,
}

impl CacheKey for TableLoadKey {
    fn fingerprint(&self) -> u64 {
        xxh3_64(format!("{}|{}|{}", self.workflow_id, self.data_collection_id, self.signature).as_bytes())
    }
}

/// (workflow, requested table, sorted participants, combined filter signature)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinResultKey {
    pub workflow_id: String,
    pub target: String,
    pub participants: Vec<String>,
    pub signature: String,
}

impl JoinResultKey {
    pub fn new(workflow_id: &str, target: &str, participants: &[String], signature: String) -> Self {
        let mut participants = participants.to_vec();
        participants.sort();
        participants.dedup();
        Self { workflow_id: workflow_id.to_string(), target: target.to_string(), participants, signature }
    }
}

impl CacheKey for JoinResultKey {
    fn fingerprint(&self) -> u64 {
        xxh3_64(format!("{}|{}|{}|{}", self.workflow_id, self.target, self.participants.join(","), self.signature).as_bytes())
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    seq: u64,
}

pub struct MemoCache<K, V> {
    name: &'static str,
    settings: CacheSettings,
    map: RwLock<HashMap<K, Entry<V>>>,
    flight_locks: Vec<Mutex<()>>,
    seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K: CacheKey, V: Clone> MemoCache<K, V> {
    pub fn new(name: &'static str, settings: CacheSettings) -> Self {
        let flight_locks = if settings.single_flight { (0..N_FLIGHT_LOCKS).map(|_| Mutex::new(())).collect() } else { Vec::new() };
        Self {
            name,
            settings,
            map: RwLock::new(HashMap::new()),
            flight_locks,
            seq: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str { self.name }
    pub fn settings(&self) -> &CacheSettings { &self.settings }

    fn is_expired(&self, e: &Entry<V>) -> bool {
        match self.settings.ttl_ms {
            Some(ms) => e.inserted_at.elapsed() >= Duration::from_millis(ms),
            None => false,
        }
    }

    fn lookup(&self, key: &K) -> Option<V> {
        if !self.settings.enabled { return None; }
        let expired = {
            let guard = self.map.read();
            match guard.get(key) {
                Some(e) if !self.is_expired(e) => return Some(e.value.clone()),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            let mut w = self.map.write();
            if w.get(key).map(|e| self.is_expired(e)).unwrap_or(false) {
                w.remove(key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        None
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let out = self.lookup(key);
        if out.is_some() { self.hits.fetch_add(1, Ordering::Relaxed); } else { self.misses.fetch_add(1, Ordering::Relaxed); }
        out
    }

    pub fn set(&self, key: K, value: V) {
        if !self.settings.enabled { return; }
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut w = self.map.write();
        w.insert(key, Entry { value, inserted_at: Instant::now(), seq });
        if let Some(max) = self.settings.max_entries {
            while w.len() > max {
                let oldest = w.iter().min_by_key(|(_, e)| e.seq).map(|(k, _)| k.clone());
                let Some(k) = oldest else { break; };
                w.remove(&k);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> { self.map.write().remove(key).map(|e| e.value) }

    /// Drop every entry whose key matches; returns the number removed.
    pub fn remove_where<F: Fn(&K) -> bool>(&self, pred: F) -> usize {
        let mut w = self.map.write();
        let before = w.len();
        w.retain(|k, _| !pred(k));
        before - w.len()
    }

    pub fn clear(&self) -> usize {
        let mut w = self.map.write();
        let n = w.len();
        w.clear();
        debug!(target: "dcjoin::cache", "cache '{}' cleared ({} entries)", self.name, n);
        n
    }

    pub fn len(&self) -> usize { self.map.read().len() }
    pub fn is_empty(&self) -> bool { self.map.read().is_empty() }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Return the cached value or compute, store and return it. Errors are
    /// not cached. With single-flight enabled, concurrent callers for the same
    /// stripe wait for the first computation and then read its result.
    pub fn get_or_try_insert_with<E, F: FnOnce() -> Result<V, E>>(&self, key: &K, compute: F) -> Result<V, E> {
        if let Some(v) = self.get(key) { return Ok(v); }
        if self.flight_locks.is_empty() || !self.settings.enabled {
            let v = compute()?;
            self.set(key.clone(), v.clone());
            return Ok(v);
        }
        let li = (key.fingerprint() as usize) & (N_FLIGHT_LOCKS - 1);
        let _g = self.flight_locks[li].lock();
        // Recheck after acquiring the stripe; a waiter counts as a hit, not a miss
        if let Some(v) = self.lookup(key) {
            self.misses.fetch_sub(1, Ordering::Relaxed);
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(v);
        }
        let v = compute()?;
        self.set(key.clone(), v.clone());
        Ok(v)
    }
}

/// The three engine caches, constructed once per process (or per test).
pub struct EngineCaches {
    pub tables: MemoCache<TableLoadKey, DataFrame>,
    pub catalogs: MemoCache<String, Vec<JoinDeclaration>>,
    pub results: MemoCache<JoinResultKey, DataFrame>,
}

impl EngineCaches {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self {
            tables: MemoCache::new("tables", cfg.table_cache.clone()),
            catalogs: MemoCache::new("catalogs", cfg.catalog_cache.clone()),
            results: MemoCache::new("results", cfg.result_cache.clone()),
        }
    }

    pub fn clear(&self) {
        self.tables.clear();
        self.catalogs.clear();
        self.results.clear();
    }

    /// Forget everything cached for a workflow. Returns the number of entries removed.
    pub fn invalidate_workflow(&self, workflow_id: &str) -> usize {
        self.tables.remove_where(|k| k.workflow_id == workflow_id)
            + self.catalogs.remove_where(|k| k == workflow_id)
            + self.results.remove_where(|k| k.workflow_id == workflow_id)
    }

    /// Forget the loads of one data collection and every join result it took part in.
    pub fn invalidate_data_collection(&self, workflow_id: &str, data_collection_id: &str) -> usize {
        self.tables.remove_where(|k| k.workflow_id == workflow_id && k.data_collection_id == data_collection_id)
            + self.results.remove_where(|k| k.workflow_id == workflow_id && k.participants.iter().any(|p| p == data_collection_id))
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod cache_tests;
