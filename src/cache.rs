// src/cache.rs - Bounded memoization of contact analyses keyed by input fingerprint

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;

use crate::config::Config;
use crate::contour::Contour;
use crate::errors::Result;
use crate::geometry::LineModel;
use crate::image_utils::GrayscaleImage;

/// 64-bit fingerprint of everything a contact analysis reads: the contour,
/// the baseline, the analysis settings of `config` and the grey image used
/// for edge refinement
pub fn fingerprint(
    contour: &Contour,
    baseline: &LineModel,
    config: &Config,
    image: Option<&GrayscaleImage>,
) -> u64 {
    let mut hasher = DefaultHasher::new();
    contour.len().hash(&mut hasher);
    for p in contour.points() {
        p.x.to_bits().hash(&mut hasher);
        p.y.to_bits().hash(&mut hasher);
    }
    baseline.slope.to_bits().hash(&mut hasher);
    baseline.intercept.to_bits().hash(&mut hasher);
    // Detector hints are the outermost support points
    for p in &baseline.support_points {
        p.x.to_bits().hash(&mut hasher);
        p.y.to_bits().hash(&mut hasher);
    }
    config.hash_analysis_fields(&mut hasher);
    match image {
        Some(image) => {
            (image.width, image.height).hash(&mut hasher);
            image.data.hash(&mut hasher);
        }
        None => 0u8.hash(&mut hasher),
    }
    hasher.finish()
}

type Slot<V> = Arc<Mutex<Option<V>>>;

struct CacheState<V> {
    slots: HashMap<u64, Slot<V>>,
    order: VecDeque<u64>,
}

/// Hit and miss counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

/// Fingerprint-keyed cache with FIFO eviction.
///
/// Each key owns a slot mutex, so concurrent requests for the same key run
/// the computation once while other keys proceed independently. Only
/// successful results are stored.
pub struct MeasurementCache<V> {
    capacity: usize,
    state: Mutex<CacheState<V>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<V: Clone> MeasurementCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(CacheState {
                slots: HashMap::new(),
                order: VecDeque::new(),
            }),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        lock(&self.state).slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// Stored value for `key`, if any
    pub fn get(&self, key: u64) -> Option<V> {
        let slot = lock(&self.state).slots.get(&key).cloned()?;
        let value = lock(&slot).clone();
        value
    }

    fn slot_for(&self, key: u64) -> Slot<V> {
        let mut state = lock(&self.state);
        if let Some(slot) = state.slots.get(&key) {
            return Arc::clone(slot);
        }
        let slot: Slot<V> = Arc::new(Mutex::new(None));
        state.slots.insert(key, Arc::clone(&slot));
        state.order.push_back(key);
        while state.slots.len() > self.capacity {
            match state.order.pop_front() {
                Some(old) => {
                    state.slots.remove(&old);
                    debug!("cache: evicted {:016x}", old);
                }
                None => break,
            }
        }
        slot
    }

    fn forget(&self, key: u64, slot: &Slot<V>) {
        let mut state = lock(&self.state);
        if state.slots.get(&key).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            state.slots.remove(&key);
            state.order.retain(|k| *k != key);
        }
    }

    /// Return the cached value for `key` or compute, store and return it.
    /// A failed computation leaves nothing behind.
    pub fn get_or_try_insert_with<F>(&self, key: u64, compute: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        let slot = self.slot_for(key);
        let mut guard = lock(&slot);
        if let Some(value) = guard.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        match compute() {
            Ok(value) => {
                *guard = Some(value.clone());
                Ok(value)
            }
            Err(e) => {
                drop(guard);
                self.forget(key, &slot);
                Err(e)
            }
        }
    }

    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.slots.clear();
        state.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ContactAngleError;
    use crate::geometry::Point;
    use std::thread;

    fn zigzag() -> Contour {
        Contour::from_unordered((0..30).map(|i| Point::new(i as f64, (i % 7) as f64)).collect())
    }

    #[test]
    fn fingerprint_depends_on_geometry() {
        let contour = zigzag();
        let config = Config::default();
        let a = fingerprint(&contour, &LineModel::horizontal(10.0), &config, None);
        let b = fingerprint(&contour, &LineModel::horizontal(10.5), &config, None);
        assert_ne!(a, b);
        assert_eq!(a, fingerprint(&contour, &LineModel::horizontal(10.0), &config, None));
    }

    #[test]
    fn fingerprint_depends_on_settings_and_image() {
        let contour = zigzag();
        let line = LineModel::horizontal(10.0);
        let config = Config::default();
        let tuned = Config {
            tangent_half_window: 3,
            contact_epsilon: 0.5,
            refine_samples: 5,
            ..Config::default()
        };
        let base = fingerprint(&contour, &line, &config, None);
        assert_ne!(base, fingerprint(&contour, &line, &tuned, None));

        let dark = GrayscaleImage::from_fn(8, 8, |_, _| 10);
        let light = GrayscaleImage::from_fn(8, 8, |_, _| 200);
        let with_dark = fingerprint(&contour, &line, &config, Some(&dark));
        assert_ne!(base, with_dark);
        assert_ne!(with_dark, fingerprint(&contour, &line, &config, Some(&light)));
    }

    #[test]
    fn second_lookup_is_a_hit() {
        let cache = MeasurementCache::new(4);
        let first = cache.get_or_try_insert_with(7, || Ok(42)).unwrap();
        let second = cache.get_or_try_insert_with(7, || Ok(0)).unwrap();
        assert_eq!((first, second), (42, 42));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1, entries: 1 });
    }

    #[test]
    fn failures_are_not_cached() {
        let cache: MeasurementCache<u32> = MeasurementCache::new(4);
        let err = cache.get_or_try_insert_with(1, || Err(ContactAngleError::EmptyMask));
        assert!(err.is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.get_or_try_insert_with(1, || Ok(5)).unwrap(), 5);
    }

    #[test]
    fn oldest_entry_is_evicted() {
        let cache = MeasurementCache::new(2);
        for key in 0..3u64 {
            cache.get_or_try_insert_with(key, || Ok(key)).unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(0).is_none());
        assert_eq!(cache.get(2), Some(2));
    }

    #[test]
    fn concurrent_requests_compute_once() {
        let cache = Arc::new(MeasurementCache::new(8));
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    cache
                        .get_or_try_insert_with(99, || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(20));
                            Ok(1u8)
                        })
                        .unwrap()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
