//! Result cache keyed by intent fingerprint, with single-flight misses.
//!
//! The first caller to miss on a fingerprint becomes the leader and gets a
//! `FlightGuard`; concurrent callers for the same fingerprint wait until the
//! guard completes (they then hit) or is dropped (one of them leads next).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lc_protocol::PipelineResult;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::CacheConfig;

struct CacheEntry {
    result: PipelineResult,
    stored_at: Instant,
}

enum Slot {
    Ready(CacheEntry),
    /// A leader is computing this fingerprint. The receiver resolves when
    /// its guard goes away.
    Pending {
        flight: u64,
        done: watch::Receiver<()>,
    },
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub enum CacheLookup<'a> {
    Hit(PipelineResult),
    /// This caller must compute the result and hand it to the guard.
    Lead(FlightGuard<'a>),
}

enum Step {
    Hit(PipelineResult),
    Lead(u64, watch::Sender<()>),
    Wait(watch::Receiver<()>),
}

pub struct ResultCache {
    slots: Mutex<HashMap<String, Slot>>,
    config: CacheConfig,
    next_flight: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            config,
            next_flight: AtomicU64::new(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        self.config.ttl_secs > 0
            && entry.stored_at.elapsed() >= Duration::from_secs(self.config.ttl_secs)
    }

    /// Look up `fingerprint`, joining an in-flight computation if there is one.
    ///
    /// `is_fresh` rejects stored results that no longer apply (e.g. the
    /// endpoint's content hash changed); a rejected entry is evicted.
    pub async fn begin<F>(&self, fingerprint: &str, is_fresh: F) -> CacheLookup<'_>
    where
        F: Fn(&PipelineResult) -> bool,
    {
        if !self.is_enabled() {
            return CacheLookup::Lead(FlightGuard::detached(self, fingerprint));
        }

        loop {
            match self.step(fingerprint, &is_fresh) {
                Step::Hit(result) => return CacheLookup::Hit(result),
                Step::Lead(flight, done) => {
                    return CacheLookup::Lead(FlightGuard {
                        cache: self,
                        fingerprint: fingerprint.to_string(),
                        flight: Some(flight),
                        _done: Some(done),
                    });
                }
                Step::Wait(mut done) => {
                    tracing::debug!(fingerprint, "Waiting for in-flight computation");
                    // Resolves with Err once the leader's sender is dropped
                    let _ = done.changed().await;
                }
            }
        }
    }

    fn step<F>(&self, fingerprint: &str, is_fresh: &F) -> Step
    where
        F: Fn(&PipelineResult) -> bool,
    {
        let mut slots = self.lock();
        match slots.get(fingerprint) {
            Some(Slot::Ready(entry)) if !self.is_expired(entry) && is_fresh(&entry.result) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Step::Hit(entry.result.clone());
            }
            Some(Slot::Ready(_)) => {
                tracing::debug!(fingerprint, "Evicting stale cache entry");
            }
            Some(Slot::Pending { done, .. }) => return Step::Wait(done.clone()),
            None => {}
        }

        let flight = self.next_flight.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(());
        slots.insert(fingerprint.to_string(), Slot::Pending { flight, done: rx });
        self.misses.fetch_add(1, Ordering::Relaxed);
        Step::Lead(flight, tx)
    }

    /// Non-blocking lookup of a stored result.
    pub fn get(&self, fingerprint: &str) -> Option<PipelineResult> {
        match self.lock().get(fingerprint) {
            Some(Slot::Ready(entry)) if !self.is_expired(entry) => Some(entry.result.clone()),
            _ => None,
        }
    }

    /// Store `result` under its fingerprint, replacing any ready entry.
    ///
    /// An in-flight computation for the same fingerprint is left alone.
    pub fn store(&self, result: PipelineResult) {
        if !self.is_enabled() {
            return;
        }
        let mut slots = self.lock();
        if matches!(slots.get(&result.intent_fingerprint), Some(Slot::Pending { .. })) {
            return;
        }
        self.insert_ready(&mut slots, result);
    }

    fn insert_ready(&self, slots: &mut HashMap<String, Slot>, result: PipelineResult) {
        slots.insert(
            result.intent_fingerprint.clone(),
            Slot::Ready(CacheEntry {
                result,
                stored_at: Instant::now(),
            }),
        );
        self.evict_over_capacity(slots);
    }

    fn evict_over_capacity(&self, slots: &mut HashMap<String, Slot>) {
        if self.config.capacity == 0 {
            return;
        }
        loop {
            let mut ready = slots.iter().filter_map(|(fp, slot)| match slot {
                Slot::Ready(entry) => Some((fp, entry.stored_at)),
                Slot::Pending { .. } => None,
            });
            let count = ready.clone().count();
            if count <= self.config.capacity {
                return;
            }
            let oldest = ready
                .by_ref()
                .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
                .map(|(fp, _)| fp.clone());
            match oldest {
                Some(fp) => {
                    tracing::debug!(fingerprint = %fp, "Evicting oldest cache entry");
                    slots.remove(&fp);
                }
                None => return,
            }
        }
    }

    /// Drop the entry for `fingerprint` only if it selected `endpoint_id`.
    pub fn invalidate_selection(&self, fingerprint: &str, endpoint_id: &str) -> bool {
        let mut slots = self.lock();
        let selected = matches!(
            slots.get(fingerprint),
            Some(Slot::Ready(entry)) if entry.result.selected_endpoint_id == endpoint_id
        );
        if selected {
            slots.remove(fingerprint);
        }
        selected
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self
            .lock()
            .values()
            .filter(|s| matches!(s, Slot::Ready(_)))
            .count();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries,
        }
    }
}

/// Leadership of one in-flight computation.
///
/// Dropping the guard without `complete` releases the fingerprint so a
/// waiter can take over.
pub struct FlightGuard<'a> {
    cache: &'a ResultCache,
    fingerprint: String,
    /// `None` when the cache is disabled.
    flight: Option<u64>,
    _done: Option<watch::Sender<()>>,
}

impl<'a> FlightGuard<'a> {
    fn detached(cache: &'a ResultCache, fingerprint: &str) -> Self {
        Self {
            cache,
            fingerprint: fingerprint.to_string(),
            flight: None,
            _done: None,
        }
    }

    /// Store `result` and wake every waiter.
    pub fn complete(mut self, result: PipelineResult) {
        let Some(flight) = self.flight.take() else {
            return;
        };
        let mut slots = self.cache.lock();
        let ours = matches!(
            slots.get(&self.fingerprint),
            Some(Slot::Pending { flight: f, .. }) if *f == flight
        );
        if ours {
            self.cache.insert_ready(&mut slots, result);
        }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let Some(flight) = self.flight.take() else {
            return;
        };
        let mut slots = self.cache.lock();
        let ours = matches!(
            slots.get(&self.fingerprint),
            Some(Slot::Pending { flight: f, .. }) if *f == flight
        );
        if ours {
            tracing::debug!(fingerprint = %self.fingerprint, "Releasing abandoned flight");
            slots.remove(&self.fingerprint);
        }
    }
}
