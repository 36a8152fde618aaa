//! Rendered views, shared by every copy of a message sent to one recipient.
//!
//! A message is rendered at most once per recipient. Concurrent requests for
//! the same view block on a single computation. Entries are removed once
//! every expected recipient was served, or when they outlive the ttl.

use crate::context::MessageId;
use crate::pipeline::RenderedView;
use once_cell::sync::OnceCell;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

type ViewSlot = Arc<OnceCell<Option<Arc<RenderedView>>>>;

/// Most evicted ids remembered at once, to notice late renders.
const EVICTED_MEMORY: usize = 4096;

struct MessageEntry {
    created: Instant,
    expected: usize,
    served: FxHashSet<u128>,
    views: FxHashMap<u128, ViewSlot>,
}

#[derive(Default)]
struct CacheState {
    messages: FxHashMap<MessageId, MessageEntry>,
    evicted: VecDeque<(MessageId, Instant)>,
    evicted_ids: FxHashSet<MessageId>,
}

impl CacheState {
    fn remember_evicted(&mut self, id: MessageId, now: Instant) {
        if self.evicted_ids.insert(id) {
            self.evicted.push_back((id, now));
        }
        while self.evicted.len() > EVICTED_MEMORY {
            if let Some((old, _)) = self.evicted.pop_front() {
                self.evicted_ids.remove(&old);
            }
        }
    }

    fn forget_evicted_before(&mut self, deadline: Instant) {
        while let Some(&(id, evicted)) = self.evicted.front() {
            if evicted >= deadline {
                break;
            }
            self.evicted.pop_front();
            self.evicted_ids.remove(&id);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub computations: u64,
    /// Views requested after their message was already evicted.
    pub eviction_races: u64,
    pub live_messages: usize,
}

pub struct RecipientViewCache {
    ttl: Duration,
    audience: AtomicUsize,
    state: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
    eviction_races: AtomicU64,
}

impl RecipientViewCache {
    pub fn new(ttl: Duration) -> RecipientViewCache {
        RecipientViewCache {
            ttl,
            audience: AtomicUsize::new(0),
            state: Default::default(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            computations: AtomicU64::new(0),
            eviction_races: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of recipients a message seen from now on is expected to reach.
    pub fn set_audience(&self, recipients: usize) {
        self.audience.store(recipients, Ordering::Relaxed);
    }

    /// Returns the view of `message` for `recipient`, running `compute` if
    /// nobody rendered it yet. `compute` runs at most once per pair while the
    /// entry lives, even when called from several threads at once.
    pub fn get_or_compute<F>(
        &self,
        message: MessageId,
        recipient: u128,
        compute: F,
    ) -> Option<Arc<RenderedView>>
    where
        F: FnOnce() -> Option<RenderedView>,
    {
        let slot = {
            let mut state = self.lock();
            if !state.messages.contains_key(&message) && state.evicted_ids.contains(&message) {
                self.eviction_races.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "View of message {} for {:032x} requested after eviction, rendering again",
                    message, recipient
                );
            }
            let audience = self.audience.load(Ordering::Relaxed);
            let entry = state
                .messages
                .entry(message)
                .or_insert_with(|| MessageEntry {
                    created: Instant::now(),
                    expected: audience,
                    served: FxHashSet::default(),
                    views: FxHashMap::default(),
                });
            match entry.views.get(&recipient) {
                Some(slot) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    slot.clone()
                }
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    let slot = ViewSlot::default();
                    entry.views.insert(recipient, slot.clone());
                    slot
                }
            }
        };

        // The lock is released here, so slow renders of other messages don't
        // wait on this one
        slot.get_or_init(|| {
            self.computations.fetch_add(1, Ordering::Relaxed);
            compute().map(Arc::new)
        })
        .clone()
    }

    /// Records that `recipient` was sent its copy of `message`. The entry is
    /// evicted once every expected recipient was served.
    pub fn mark_served(&self, message: MessageId, recipient: u128) {
        let mut state = self.lock();
        let Some(entry) = state.messages.get_mut(&message) else {
            return;
        };
        entry.served.insert(recipient);
        if entry.served.len() >= entry.expected {
            state.messages.remove(&message);
            state.remember_evicted(message, Instant::now());
        }
    }

    /// Evicts entries older than the ttl. Returns how many were evicted.
    pub fn evict_expired(&self) -> usize {
        self.evict_older_than(Instant::now())
    }

    fn evict_older_than(&self, now: Instant) -> usize {
        let mut state = self.lock();
        let expired: Vec<MessageId> = state
            .messages
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.created) >= self.ttl)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            state.messages.remove(id);
            state.remember_evicted(*id, now);
        }
        if let Some(deadline) = now.checked_sub(self.ttl) {
            state.forget_evicted_before(deadline);
        }
        if !expired.is_empty() {
            debug!("Evicted {} expired messages", expired.len());
        }
        expired.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            eviction_races: self.eviction_races.load(Ordering::Relaxed),
            live_messages: self.lock().messages.len(),
        }
    }
}
