use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use arc_swap::ArcSwap;
use imbl::OrdMap;

use crate::error::KvError;
use crate::store::{Check, Commit, Entry, EntryIter, Kv, Op, Versionstamp};

#[derive(Debug, Clone)]
struct Versioned {
    value: Vec<u8>,
    version: u64,
}

/// In-memory reference implementation of the [`Kv`] contract.
///
/// Readers load an immutable snapshot (`OrdMap` behind `ArcSwap`) and
/// never block. Writers serialize on a mutex, clone the map (structural
/// sharing makes this cheap), and publish the new snapshot, so an
/// atomic batch verifies its checks and applies its ops with no
/// interleaved writer.
pub struct MemoryKv {
    map: ArcSwap<OrdMap<Vec<u8>, Versioned>>,
    write_lock: Mutex<()>,
    clock: AtomicU64,
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self {
            map: ArcSwap::from_pointee(OrdMap::new()),
            write_lock: Mutex::new(()),
            clock: AtomicU64::new(1),
        }
    }
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn lock_writes(&self) -> Result<std::sync::MutexGuard<'_, ()>, KvError> {
        self.write_lock
            .lock()
            .map_err(|e| KvError::Storage(format!("write lock poisoned: {e}")))
    }
}

impl Kv for MemoryKv {
    fn get(&self, key: &[u8]) -> Result<Option<(Vec<u8>, Versionstamp)>, KvError> {
        let snapshot = self.map.load();
        Ok(snapshot
            .get(key)
            .map(|v| (v.value.clone(), Versionstamp::new(v.version))))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        let _guard = self.lock_writes()?;
        let mut map = (**self.map.load()).clone();
        map.insert(
            key.to_vec(),
            Versioned {
                value: value.to_vec(),
                version: self.next_version(),
            },
        );
        self.map.store(map.into());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), KvError> {
        let _guard = self.lock_writes()?;
        let mut map = (**self.map.load()).clone();
        map.remove(key);
        self.map.store(map.into());
        Ok(())
    }

    fn list(&self, start: &[u8], end: &[u8]) -> Result<EntryIter<'_>, KvError> {
        if !end.is_empty() && start >= end {
            return Ok(Box::new(std::iter::empty()));
        }
        let snapshot = self.map.load_full();
        let upper: Bound<Vec<u8>> = if end.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(end.to_vec())
        };
        let entries: Vec<Entry> = snapshot
            .range((Bound::Included(start.to_vec()), upper))
            .map(|(k, v)| Entry {
                key: k.clone(),
                value: v.value.clone(),
                version: Versionstamp::new(v.version),
            })
            .collect();
        Ok(Box::new(entries.into_iter().map(Ok)))
    }

    fn atomic(&self, checks: &[Check], ops: &[Op]) -> Result<Commit, KvError> {
        let _guard = self.lock_writes()?;
        let current = self.map.load_full();

        for check in checks {
            let holds = match check {
                Check::Absent(key) => current.get(key).is_none(),
                Check::Version(key, expected) => current
                    .get(key)
                    .is_some_and(|v| Versionstamp::new(v.version) == *expected),
            };
            if !holds {
                return Ok(Commit::Conflict);
            }
        }

        let mut map = (*current).clone();
        for op in ops {
            match op {
                Op::Set(key, value) => {
                    map.insert(
                        key.clone(),
                        Versioned {
                            value: value.clone(),
                            version: self.next_version(),
                        },
                    );
                }
                Op::Delete(key) => {
                    map.remove(key);
                }
            }
        }
        self.map.store(map.into());
        Ok(Commit::Committed)
    }
}
