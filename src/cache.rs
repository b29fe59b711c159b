//! LRU, single-flight block cache.
//!
//! Keyed by `(virtual archive name, uncompressed block offset)` so two
//! open file descriptors reading the same archive share decoded blocks.
//! A block mid-decode is recorded as `Entry::Pending`; concurrent readers
//! of that same block wait on a condvar instead of decoding it twice,
//! matching the "single-flight" requirement from the design: the lock is
//! never held across the actual decode call, which itself runs on a
//! `Pool` worker rather than the calling thread.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};

use crate::block::Block;
use crate::error::{Error, Result};
use crate::pool::Pool;

type Key = (String, u64);

enum Entry {
    Pending,
    Ready { data: Arc<Vec<u8>> },
}

struct State {
    entries: HashMap<Key, Entry>,
    lru: VecDeque<Key>,
    bytes: u64,
}

pub struct Cache {
    state: Mutex<State>,
    ready: Condvar,
    capacity_bytes: u64,
}

impl Cache {
    pub fn new(capacity_bytes: u64) -> Self {
        Cache {
            state: Mutex::new(State {
                entries: HashMap::new(),
                lru: VecDeque::new(),
                bytes: 0,
            }),
            ready: Condvar::new(),
            capacity_bytes,
        }
    }

    /// Returns the decoded bytes for `block`, decoding via `decode` only if
    /// no other thread already has (is decoding, or has decoded) it.
    ///
    /// The decode itself runs on `pool`, not the calling thread: this
    /// stands in for the "submit then block on a one-shot completion
    /// channel" shape a future-based design would use, without pulling in
    /// an async runtime (see `pool.rs`).
    pub fn get_or_decode(
        &self,
        archive_name: &str,
        block: &Block,
        pool: &Pool,
        decode: impl FnOnce() -> Result<Vec<u8>> + Send + 'static,
    ) -> Result<Arc<Vec<u8>>> {
        let key: Key = (archive_name.to_string(), block.uncompressed_offset);

        {
            let mut state = self.state.lock().unwrap();
            loop {
                match state.entries.get(&key) {
                    Some(Entry::Ready { data }) => {
                        let data = data.clone();
                        touch(&mut state, &key);
                        return Ok(data);
                    }
                    Some(Entry::Pending) => {
                        state = self.ready.wait(state).unwrap();
                    }
                    None => {
                        state.entries.insert(key.clone(), Entry::Pending);
                        break;
                    }
                }
            }
        }

        let (tx, rx) = crossbeam_channel::bounded(1);
        pool.submit(move || {
            let _ = tx.send(decode());
        });
        let result = rx
            .recv()
            .unwrap_or_else(|_| Err(Error::format(archive_name, "decompression worker vanished")));

        let mut state = self.state.lock().unwrap();
        match result {
            Ok(bytes) => {
                let data = Arc::new(bytes);
                let size = data.len() as u64;
                state
                    .entries
                    .insert(key.clone(), Entry::Ready { data: data.clone() });
                state.lru.push_back(key.clone());
                state.bytes += size;
                evict(&mut state, self.capacity_bytes);
                self.ready.notify_all();
                Ok(data)
            }
            Err(e) => {
                state.entries.remove(&key);
                self.ready.notify_all();
                Err(e)
            }
        }
    }

    /// Speculatively decodes `block` on `pool` without blocking the
    /// caller, for sequential readahead. A no-op if the block is already
    /// pending or cached — the caller has no way to know which, and
    /// doesn't need to.
    pub fn prefetch(
        cache: &Arc<Cache>,
        archive_name: &str,
        block: &Block,
        pool: &Pool,
        decode: impl FnOnce() -> Result<Vec<u8>> + Send + 'static,
    ) {
        let key: Key = (archive_name.to_string(), block.uncompressed_offset);
        {
            let mut state = cache.state.lock().unwrap();
            if state.entries.contains_key(&key) {
                return;
            }
            state.entries.insert(key.clone(), Entry::Pending);
        }

        let cache = Arc::clone(cache);
        pool.submit(move || {
            let result = decode();
            let mut state = cache.state.lock().unwrap();
            match result {
                Ok(bytes) => {
                    let data = Arc::new(bytes);
                    let size = data.len() as u64;
                    state.entries.insert(key.clone(), Entry::Ready { data });
                    state.lru.push_back(key.clone());
                    state.bytes += size;
                    evict(&mut state, cache.capacity_bytes);
                    cache.ready.notify_all();
                }
                Err(_) => {
                    state.entries.remove(&key);
                    cache.ready.notify_all();
                }
            }
        });
    }

    pub fn cached_bytes(&self) -> u64 {
        self.state.lock().unwrap().bytes
    }
}

fn touch(state: &mut State, key: &Key) {
    if let Some(pos) = state.lru.iter().position(|k| k == key) {
        let k = state.lru.remove(pos).unwrap();
        state.lru.push_back(k);
    }
}

fn evict(state: &mut State, capacity_bytes: u64) {
    while state.bytes > capacity_bytes {
        let Some(key) = state.lru.pop_front() else {
            break;
        };
        if let Some(Entry::Ready { data }) = state.entries.remove(&key) {
            state.bytes -= data.len() as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    fn block(off: u64, size: u64) -> Block {
        Block {
            compressed_offset: 0,
            compressed_size: 0,
            uncompressed_offset: off,
            uncompressed_size: size,
            kind: BlockKind::Lzop,
        }
    }

    #[test]
    fn decodes_once_per_block() {
        let cache = Cache::new(1024 * 1024);
        let pool = Pool::new(2);
        let calls = Arc::new(AtomicUsize::new(0));
        let b = block(0, 10);

        for _ in 0..5 {
            let calls = calls.clone();
            let data = cache
                .get_or_decode("a", &b, &pool, move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1u8; 10])
                })
                .unwrap();
            assert_eq!(data.len(), 10);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Unlike `decodes_once_per_block` above (which issues its calls
    /// sequentially, one fully finishing before the next starts), this
    /// lines up several threads on a barrier so they all call
    /// `get_or_decode` for the same key while the first decode is still
    /// in flight — the actual `Entry::Pending` + condvar-wait path.
    #[test]
    fn concurrent_callers_for_the_same_block_share_one_decode() {
        const READERS: usize = 8;

        let cache = Arc::new(Cache::new(1024 * 1024));
        let pool = Arc::new(Pool::new(4));
        let calls = Arc::new(AtomicUsize::new(0));
        let start = Arc::new(Barrier::new(READERS));
        let b = block(0, 10);

        let handles: Vec<_> = (0..READERS)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let pool = Arc::clone(&pool);
                let calls = Arc::clone(&calls);
                let start = Arc::clone(&start);
                let b = b.clone();
                thread::spawn(move || {
                    start.wait();
                    cache.get_or_decode("concurrent", &b, &pool, move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        Ok(vec![1u8; 10])
                    })
                })
            })
            .collect();

        for h in handles {
            let data = h.join().unwrap().unwrap();
            assert_eq!(data.len(), 10);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn prefetch_populates_the_cache_without_the_caller_decoding() {
        let cache = Arc::new(Cache::new(1024 * 1024));
        let pool = Pool::new(2);
        let calls = Arc::new(AtomicUsize::new(0));
        let b = block(0, 10);

        let prefetch_calls = calls.clone();
        Cache::prefetch(&cache, "a", &b, &pool, move || {
            prefetch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![5u8; 10])
        });

        // Whether this lands on the in-flight prefetch (Pending, so it
        // waits) or finds it already Ready, this closure must never run.
        let data = cache
            .get_or_decode("a", &b, &pool, || {
                panic!("prefetch should have already produced this block")
            })
            .unwrap();
        assert_eq!(*data, vec![5u8; 10]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn evicts_when_over_capacity() {
        let cache = Cache::new(15);
        let pool = Pool::new(2);
        let a = block(0, 10);
        let b = block(10, 10);
        cache.get_or_decode("x", &a, &pool, || Ok(vec![0u8; 10])).unwrap();
        cache.get_or_decode("x", &b, &pool, || Ok(vec![0u8; 10])).unwrap();
        assert!(cache.cached_bytes() <= 15);
    }

    #[test]
    fn failed_decode_does_not_poison_future_attempts() {
        let cache = Cache::new(1024);
        let pool = Pool::new(2);
        let b = block(0, 10);
        let err = cache.get_or_decode("a", &b, &pool, || {
            Err(crate::error::Error::format("x", "boom"))
        });
        assert!(err.is_err());
        let ok = cache.get_or_decode("a", &b, &pool, || Ok(vec![9u8; 3]));
        assert!(ok.is_ok());
    }
}
