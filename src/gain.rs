//! Per-route gain multipliers shared between the control plane and route threads.
//!
//! Values live in per-key `AtomicU32` slots (f32 bit patterns) inside a
//! sharded `DashMap`. Route threads hold a [`GainHandle`] that caches its
//! slot, so the per-tick read is a single atomic load. The map itself is
//! only consulted when the registry's generation changes (a key was added
//! or the registry was cleared), and then only with a non-blocking
//! `try_get`.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::try_result::TryResult;
use dashmap::DashMap;

/// Concurrent map from route/channel key to gain multiplier.
///
/// Unset keys read as `0.0` (silence), not unity.
///
/// # Example
///
/// ```
/// use route_audio::GainRegistry;
///
/// let gains = GainRegistry::new();
/// assert_eq!(gains.get("mic"), 0.0);
///
/// gains.set("mic", 0.5);
/// assert_eq!(gains.get("mic"), 0.5);
///
/// gains.clear();
/// assert_eq!(gains.get("mic"), 0.0);
/// ```
#[derive(Debug, Default)]
pub struct GainRegistry {
    slots: DashMap<String, Arc<AtomicU32>>,
    /// Bumped whenever the key set changes.
    generation: AtomicU64,
}

impl GainRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` for `key`; the last writer wins.
    pub fn set(&self, key: &str, value: f32) {
        if let Some(slot) = self.slots.get(key) {
            slot.store(value.to_bits(), Ordering::Relaxed);
            return;
        }

        self.slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AtomicU32::new(0)))
            .store(value.to_bits(), Ordering::Relaxed);
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Returns the stored multiplier, or `0.0` if `key` was never set.
    pub fn get(&self, key: &str) -> f32 {
        self.slots
            .get(key)
            .map_or(0.0, |slot| f32::from_bits(slot.load(Ordering::Relaxed)))
    }

    /// Removes every entry. Subsequent reads resolve to `0.0`.
    pub fn clear(&self) {
        self.slots.clear();
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Number of keys currently set.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no key is set.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Creates a lock-free reader for `key`, for use on a route thread.
    pub fn handle(self: &Arc<Self>, key: impl Into<String>) -> GainHandle {
        GainHandle {
            registry: Arc::clone(self),
            key: key.into(),
            slot: None,
            // Forces a lookup on the first read
            generation: u64::MAX,
        }
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

/// Cached per-route view of one registry key.
///
/// Reads never block: the slot is re-resolved with `try_get` only after
/// the registry's key set changed, and a contended shard just defers the
/// refresh to the next read.
#[derive(Debug)]
pub struct GainHandle {
    registry: Arc<GainRegistry>,
    key: String,
    slot: Option<Arc<AtomicU32>>,
    generation: u64,
}

impl GainHandle {
    /// The key this handle reads.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current multiplier for the key (`0.0` if unset).
    pub fn current(&mut self) -> f32 {
        let generation = self.registry.generation();
        if generation != self.generation {
            match self.registry.slots.try_get(self.key.as_str()) {
                TryResult::Present(slot) => {
                    self.slot = Some(Arc::clone(slot.value()));
                    self.generation = generation;
                }
                TryResult::Absent => {
                    self.slot = None;
                    self.generation = generation;
                }
                TryResult::Locked => {}
            }
        }

        self.slot
            .as_ref()
            .map_or(0.0, |slot| f32::from_bits(slot.load(Ordering::Relaxed)))
    }
}
