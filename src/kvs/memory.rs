// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! In-process `Kvs` test double. Mirrors Redis semantics closely enough
//! that every unit and integration test in this crate runs against it
//! instead of a live service; the `redis_backend` module implements the
//! same trait against a real KVS.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Kvs, ScanPage};
use crate::error::Error;

#[derive(Default)]
struct Inner {
    strings: HashMap<String, String>,
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, BTreeSet<String>>,
    lists: HashMap<String, VecDeque<String>>,
}

/// A `Kvs` backed by in-memory collections instead of a network round trip.
#[derive(Default)]
pub struct MemoryKvs {
    inner: Mutex<Inner>,
}

impl MemoryKvs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl Kvs for MemoryKvs {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.lock().strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.lock().strings.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, Error> {
        // Mirrors Redis `DEL`, which removes a key regardless of its type.
        let mut guard = self.lock();
        let removed = guard.strings.remove(key).is_some()
            | guard.hashes.remove(key).is_some()
            | guard.sets.remove(key).is_some()
            | guard.lists.remove(key).is_some();
        Ok(removed)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, Error> {
        Ok(self
            .lock()
            .hashes
            .get(key)
            .and_then(|h| h.get(field).cloned()))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), Error> {
        self.lock()
            .hashes
            .entry(key.to_owned())
            .or_default()
            .insert(field.to_owned(), value.to_owned());
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, Error> {
        let mut guard = self.lock();
        let removed = guard
            .hashes
            .get_mut(key)
            .is_some_and(|h| h.remove(field).is_some());
        if guard.hashes.get(key).is_some_and(HashMap::is_empty) {
            guard.hashes.remove(key);
        }
        Ok(removed)
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, Error> {
        Ok(self
            .lock()
            .hashes
            .get(key)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn hincrby_clamped(&self, key: &str, field: &str, delta: i64) -> Result<i64, Error> {
        let mut guard = self.lock();
        let hash = guard.hashes.entry(key.to_owned()).or_default();
        let current: i64 = hash
            .get(field)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let mut new_value = current + delta;
        if new_value < 0 {
            log::warn!(
                "kvs/memory: counter {key}[{field}] would go negative ({current} + {delta}), clamping to 0"
            );
            new_value = 0;
        }
        if new_value == 0 {
            hash.remove(field);
        } else {
            hash.insert(field.to_owned(), new_value.to_string());
        }
        Ok(new_value)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, Error> {
        Ok(self
            .lock()
            .sets
            .entry(key.to_owned())
            .or_default()
            .insert(member.to_owned()))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, Error> {
        Ok(self
            .lock()
            .sets
            .get_mut(key)
            .is_some_and(|s| s.remove(member)))
    }

    async fn sscan(&self, key: &str, _cursor: u64, _count: usize) -> Result<ScanPage, Error> {
        let members = self
            .lock()
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        Ok(ScanPage { cursor: 0, members })
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<(), Error> {
        self.lock()
            .lists
            .entry(key.to_owned())
            .or_default()
            .push_back(value.to_owned());
        Ok(())
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.lock().lists.get_mut(key).and_then(VecDeque::pop_front))
    }

    async fn lrem_all(&self, key: &str, value: &str) -> Result<u64, Error> {
        let mut guard = self.lock();
        let Some(list) = guard.lists.get_mut(key) else {
            return Ok(0);
        };
        let before = list.len();
        list.retain(|item| item != value);
        Ok((before - list.len()) as u64)
    }

    async fn lrange_all(&self, key: &str) -> Result<Vec<String>, Error> {
        Ok(self
            .lock()
            .lists
            .get(key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn checkdel(&self, key: &str, expected: &str) -> Result<bool, Error> {
        let mut guard = self.lock();
        if guard.strings.get(key).map(String::as_str) == Some(expected) {
            guard.strings.remove(key);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn incrlimit(&self, key: &str, limit: i64) -> Result<i64, Error> {
        let mut guard = self.lock();
        let current: i64 = guard
            .strings
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let mut value = current + 1;
        if value > limit {
            value = 1;
        }
        guard.strings.insert(key.to_owned(), value.to_string());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_checkdel_only_deletes_matching_value() {
        let kvs = MemoryKvs::new();
        kvs.set("k", "n1").await.unwrap();
        assert!(!kvs.checkdel("k", "n2").await.unwrap());
        assert_eq!(kvs.get("k").await.unwrap(), Some("n1".to_owned()));
        assert!(kvs.checkdel("k", "n1").await.unwrap());
        assert_eq!(kvs.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incrlimit_wraps() {
        let kvs = MemoryKvs::new();
        for expected in 1..=65535 {
            assert_eq!(kvs.incrlimit("pid", 65535).await.unwrap(), expected);
        }
        assert_eq!(kvs.incrlimit("pid", 65535).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_hincrby_clamps_at_zero() {
        let kvs = MemoryKvs::new();
        kvs.hincrby_clamped("h", "f", 1).await.unwrap();
        let value = kvs.hincrby_clamped("h", "f", -5).await.unwrap();
        assert_eq!(value, 0);
    }

    #[tokio::test]
    async fn test_lrem_all_removes_duplicates() {
        let kvs = MemoryKvs::new();
        kvs.rpush("l", "1").await.unwrap();
        kvs.rpush("l", "2").await.unwrap();
        kvs.rpush("l", "1").await.unwrap();
        let removed = kvs.lrem_all("l", "1").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(kvs.lrange_all("l").await.unwrap(), vec!["2".to_owned()]);
    }
}
