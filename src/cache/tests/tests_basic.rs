#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::cache::LruCache;

    const CAPACITY: usize = 1000;

    /// Harness in the style of the classic cache tests: u32 keys encoded
    /// as 4 bytes, i32 values, and a log of every deleter invocation.
    struct CacheHarness {
        cache: LruCache<i32>,
        deleted: Arc<Mutex<Vec<(u32, i32)>>>,
    }

    impl CacheHarness {
        fn new(capacity: usize) -> CacheHarness {
            CacheHarness {
                cache: LruCache::new(capacity),
                deleted: Arc::default(),
            }
        }

        fn encode(key: u32) -> [u8; 4] {
            key.to_le_bytes()
        }

        fn insert_charged(&self, key: u32, value: i32, charge: usize) {
            let deleted = Arc::clone(&self.deleted);
            let handle = self.cache.insert(
                &Self::encode(key),
                value,
                charge,
                Some(Box::new(move |k, v| {
                    let key = u32::from_le_bytes(k.try_into().expect("4-byte key"));
                    deleted.lock().unwrap().push((key, *v));
                })),
            );
            self.cache.release(handle);
        }

        fn insert(&self, key: u32, value: i32) {
            self.insert_charged(key, value, 1);
        }

        /// -1 encodes a miss, matching the reference scenarios.
        fn lookup(&self, key: u32) -> i32 {
            match self.cache.lookup(&Self::encode(key)) {
                Some(handle) => {
                    let value = *self.cache.value(&handle);
                    self.cache.release(handle);
                    value
                }
                None => -1,
            }
        }

        fn erase(&self, key: u32) {
            self.cache.erase(&Self::encode(key));
        }

        fn deleted(&self) -> Vec<(u32, i32)> {
            self.deleted.lock().unwrap().clone()
        }
    }

    #[test]
    fn test_hit_and_miss() {
        let h = CacheHarness::new(CAPACITY);
        assert_eq!(h.lookup(100), -1);

        h.insert(100, 101);
        assert_eq!(h.lookup(100), 101);
        assert_eq!(h.lookup(200), -1);
        assert_eq!(h.lookup(300), -1);

        h.insert(200, 201);
        assert_eq!(h.lookup(100), 101);
        assert_eq!(h.lookup(200), 201);
        assert_eq!(h.lookup(300), -1);

        // Replacing a key finish-erases the old entry.
        h.insert(100, 102);
        assert_eq!(h.lookup(100), 102);
        assert_eq!(h.lookup(200), 201);
        assert_eq!(h.lookup(300), -1);

        assert_eq!(h.deleted(), vec![(100, 101)]);
    }

    #[test]
    fn test_erase() {
        let h = CacheHarness::new(CAPACITY);
        h.erase(200); // absent: no-op

        h.insert(100, 101);
        h.insert(200, 201);
        h.erase(100);
        assert_eq!(h.lookup(100), -1);
        assert_eq!(h.lookup(200), 201);
        assert_eq!(h.deleted(), vec![(100, 101)]);

        h.erase(100); // already gone
        assert_eq!(h.deleted(), vec![(100, 101)]);
    }

    #[test]
    fn test_entries_are_pinned_by_handles() {
        let h = CacheHarness::new(CAPACITY);
        h.insert(100, 101);
        let h1 = h.cache.lookup(&CacheHarness::encode(100)).unwrap();
        assert_eq!(*h.cache.value(&h1), 101);

        // Replace while a handle to the old value is outstanding.
        h.insert(100, 102);
        let h2 = h.cache.lookup(&CacheHarness::encode(100)).unwrap();
        assert_eq!(*h.cache.value(&h2), 102);
        // Old value survives until its handle is released.
        assert!(h.deleted().is_empty());
        assert_eq!(*h.cache.value(&h1), 101);

        h.cache.release(h1);
        assert_eq!(h.deleted(), vec![(100, 101)]);

        // Erase with the new value still pinned.
        h.erase(100);
        assert_eq!(h.lookup(100), -1);
        assert_eq!(h.deleted(), vec![(100, 101)]);

        h.cache.release(h2);
        assert_eq!(h.deleted(), vec![(100, 101), (100, 102)]);
    }

    #[test]
    fn test_prune_spares_pinned_entries() {
        let h = CacheHarness::new(CAPACITY);
        h.insert(1, 100);
        h.insert(2, 200);

        let pinned = h.cache.lookup(&CacheHarness::encode(1)).unwrap();
        h.cache.prune();

        assert_eq!(*h.cache.value(&pinned), 100);
        assert_eq!(h.lookup(1), 100);
        assert_eq!(h.lookup(2), -1);
        assert_eq!(h.deleted(), vec![(2, 200)]);
        h.cache.release(pinned);
    }

    #[test]
    fn test_total_charge_tracks_inserts_and_erases() {
        let h = CacheHarness::new(CAPACITY);
        assert_eq!(h.cache.total_charge(), 0);
        h.insert_charged(1, 10, 100);
        h.insert_charged(2, 20, 250);
        assert_eq!(h.cache.total_charge(), 350);
        h.erase(1);
        assert_eq!(h.cache.total_charge(), 250);
    }

    #[test]
    fn test_zero_capacity_turns_caching_off() {
        let h = CacheHarness::new(0);
        h.insert(1, 100);
        assert_eq!(h.lookup(1), -1);
        // The untracked entry was destroyed when its handle was released.
        assert_eq!(h.deleted(), vec![(1, 100)]);
    }

    #[test]
    fn test_new_id_is_monotonic() {
        let cache: LruCache<i32> = LruCache::new(16);
        let a = cache.new_id();
        let b = cache.new_id();
        assert!(b > a);
    }

    #[test]
    fn test_concurrent_mixed_workload() {
        use std::thread;

        let h = Arc::new(CacheHarness::new(CAPACITY));
        let mut workers = Vec::new();
        for t in 0..4u32 {
            let h = Arc::clone(&h);
            workers.push(thread::spawn(move || {
                for i in 0..2_000u32 {
                    let key = (i * 7 + t) % 500;
                    match i % 3 {
                        0 => h.insert(key, key as i32),
                        1 => {
                            let got = h.lookup(key);
                            assert!(got == -1 || got == key as i32);
                        }
                        _ => h.erase(key),
                    }
                }
            }));
        }
        for w in workers {
            w.join().unwrap();
        }
    }
}
