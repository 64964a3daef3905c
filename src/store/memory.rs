//! In-memory counter store with Redis-like TTL semantics, driven by a `Clock`.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use super::{CounterStore, StoreError};
use crate::ratelimit::Clock;

#[derive(Debug)]
enum Value {
    List(VecDeque<i64>),
    Int(i64),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<i64>,
}

/// A fake of the shared store for exercising the remote-store limiter.
///
/// Keys expire once the clock reaches their expiry. Keys matching a
/// failing prefix return `StoreError::Unavailable` for every command.
pub(crate) struct InMemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    failing_prefixes: Mutex<Vec<String>>,
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Unavailable(format!("WRONGTYPE operation against key {}", key))
}

/// Resolve a Redis-style inclusive range against a list of `len` elements.
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

impl InMemoryStore {
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            failing_prefixes: Mutex::new(Vec::new()),
        }
    }

    /// Make every command against keys starting with `prefix` fail.
    pub(crate) fn fail_keys_with_prefix(&self, prefix: &str) {
        self.failing_prefixes.lock().push(prefix.to_string());
    }

    /// Stop injecting failures.
    pub(crate) fn heal(&self) {
        self.failing_prefixes.lock().clear();
    }

    /// Whether a key exists and has not expired.
    pub(crate) fn contains(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        self.purge_if_expired(&mut entries, key);
        entries.contains_key(key)
    }

    fn guard(&self, key: &str) -> Result<(), StoreError> {
        let failing = self.failing_prefixes.lock();
        if failing.iter().any(|p| key.starts_with(p.as_str())) {
            return Err(StoreError::Unavailable(format!("injected failure for {}", key)));
        }
        Ok(())
    }

    fn purge_if_expired(&self, entries: &mut HashMap<String, Entry>, key: &str) {
        let now = self.clock.now();
        let expired = entries
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| now >= at);
        if expired {
            entries.remove(key);
        }
    }

    fn with_list<T>(
        &self,
        key: &str,
        f: impl FnOnce(Option<&VecDeque<i64>>) -> T,
    ) -> Result<T, StoreError> {
        self.guard(key)?;
        let mut entries = self.entries.lock();
        self.purge_if_expired(&mut entries, key);
        match entries.get(key) {
            None => Ok(f(None)),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(f(Some(list))),
            Some(_) => Err(wrong_type(key)),
        }
    }
}

#[async_trait]
impl CounterStore for InMemoryStore {
    async fn lpush(&self, key: &str, value: i64) -> Result<i64, StoreError> {
        self.guard(key)?;
        let mut entries = self.entries.lock();
        self.purge_if_expired(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::List(VecDeque::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::List(list) => {
                list.push_front(value);
                Ok(list.len() as i64)
            }
            Value::Int(_) => Err(wrong_type(key)),
        }
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError> {
        self.guard(key)?;
        let mut entries = self.entries.lock();
        self.purge_if_expired(&mut entries, key);
        let remove = match entries.get_mut(key) {
            None => false,
            Some(Entry {
                value: Value::List(list),
                ..
            }) => match resolve_range(list.len(), start, stop) {
                Some((from, to)) => {
                    *list = list.range(from..=to).copied().collect();
                    false
                }
                None => true,
            },
            Some(_) => return Err(wrong_type(key)),
        };
        if remove {
            entries.remove(key);
        }
        Ok(())
    }

    async fn llen(&self, key: &str) -> Result<i64, StoreError> {
        self.with_list(key, |list| list.map_or(0, |l| l.len() as i64))
    }

    async fn lindex(&self, key: &str, index: isize) -> Result<Option<i64>, StoreError> {
        self.with_list(key, |list| {
            let list = list?;
            let len = list.len() as isize;
            let idx = if index < 0 { len + index } else { index };
            if idx < 0 {
                None
            } else {
                list.get(idx as usize).copied()
            }
        })
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<i64>, StoreError> {
        self.with_list(key, |list| match list {
            Some(list) => match resolve_range(list.len(), start, stop) {
                Some((from, to)) => list.range(from..=to).copied().collect(),
                None => Vec::new(),
            },
            None => Vec::new(),
        })
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.guard(key)?;
        let mut entries = self.entries.lock();
        self.purge_if_expired(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Int(0),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Int(n) => {
                *n = n.checked_add(delta).ok_or_else(|| {
                    StoreError::Unavailable(format!("increment on {} would overflow", key))
                })?;
                Ok(*n)
            }
            Value::List(_) => Err(wrong_type(key)),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.guard(key)?;
        let mut entries = self.entries.lock();
        self.purge_if_expired(&mut entries, key);
        match entries.get(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Int(n),
                ..
            }) => Ok(Some(*n)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.guard(key)?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        self.purge_if_expired(&mut entries, key);
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(now + ttl.as_secs() as i64);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::ManualClock;

    fn store_at(start: i64) -> (Arc<ManualClock>, InMemoryStore) {
        let clock = Arc::new(ManualClock::new(start));
        let store = InMemoryStore::new(clock.clone());
        (clock, store)
    }

    #[test]
    fn test_resolve_range() {
        assert_eq!(resolve_range(5, 0, -1), Some((0, 4)));
        assert_eq!(resolve_range(5, 0, 2), Some((0, 2)));
        assert_eq!(resolve_range(5, 0, 99), Some((0, 4)));
        assert_eq!(resolve_range(5, -2, -1), Some((3, 4)));
        assert_eq!(resolve_range(5, 3, 1), None);
        assert_eq!(resolve_range(0, 0, -1), None);
    }

    #[tokio::test]
    async fn test_list_primitives() {
        let (_clock, store) = store_at(0);

        for v in 1..=4 {
            store.lpush("l", v).await.unwrap();
        }
        assert_eq!(store.lrange("l", 0, -1).await.unwrap(), vec![4, 3, 2, 1]);

        store.ltrim("l", 0, 2).await.unwrap();
        assert_eq!(store.llen("l").await.unwrap(), 3);
        assert_eq!(store.lindex("l", 0).await.unwrap(), Some(4));
        assert_eq!(store.lindex("l", -1).await.unwrap(), Some(2));
        assert_eq!(store.lindex("l", 7).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_expire_with_clock() {
        let (clock, store) = store_at(100);

        assert_eq!(store.incr_by("c", 3).await.unwrap(), 3);
        store.expire("c", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.incr_by("c", 2).await.unwrap(), 5);

        clock.set(159);
        assert_eq!(store.get("c").await.unwrap(), Some(5));

        clock.set(160);
        assert_eq!(store.get("c").await.unwrap(), None);
        assert!(!store.contains("c"));
        assert_eq!(store.incr_by("c", 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_wrong_type_is_an_error() {
        let (_clock, store) = store_at(0);
        store.lpush("k", 1).await.unwrap();
        assert!(store.get("k").await.is_err());
        assert!(store.incr_by("k", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_increment_overflow_is_an_error() {
        let (_clock, store) = store_at(0);
        store.incr_by("n", i64::MAX).await.unwrap();
        assert!(store.incr_by("n", 1).await.is_err());
        assert_eq!(store.get("n").await.unwrap(), Some(i64::MAX));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let (_clock, store) = store_at(0);
        store.fail_keys_with_prefix("channel:tpm:");

        assert!(matches!(
            store.incr_by("channel:tpm:1:m", 1).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.incr_by("channel:rpd:1:m", 1).await.is_ok());

        store.heal();
        assert!(store.incr_by("channel:tpm:1:m", 1).await.is_ok());
    }
}
