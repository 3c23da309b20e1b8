// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! The KVS abstraction every other component of this crate is built on.
//!
//! `Kvs` is the interface + factory-registry seam called for in the
//! original design notes ("dynamic class loading for storage
//! implementations"): a storage backend is any `Kvs` trait object,
//! selected once at startup rather than loaded at runtime, which is the
//! idiomatic Rust rendition of that extensibility hook.
//!
//! Every method is non-blocking and returns a future; nothing here issues a
//! blocking command on the shared connection (spec §5).

#[cfg(feature = "redis_conn")]
pub mod redis_backend;

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::error::Error;

/// A shared, cheaply-cloned handle to whichever backend was selected at
/// startup. Every store in this crate (`SessionStore`, `SubscriptionStore`,
/// `RetainedStore`) is generic only over this handle, not over a concrete
/// backend type.
pub type SharedKvs = Arc<dyn Kvs>;

/// A boxed, pinned future of a single KVS round trip, used to build the
/// `Vec` passed to `await_all` when a composite operation's individual
/// writes have different concrete future types.
pub type BoxedOp<T> = std::pin::Pin<Box<dyn std::future::Future<Output = Result<T, Error>> + Send>>;

/// A single page of a cursor-based set scan. `cursor == 0` signals the scan
/// is complete (mirrors the Redis `SSCAN` cursor protocol).
#[derive(Debug, Clone)]
pub struct ScanPage {
    pub cursor: u64,
    pub members: Vec<String>,
}

/// Async, non-blocking access to the backing key-value store. Implementors
/// must be safe to share across concurrently-executing requests (the
/// connection itself may pipeline, but must never be asked to block).
#[async_trait]
pub trait Kvs: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;
    async fn set(&self, key: &str, value: &str) -> Result<(), Error>;
    async fn del(&self, key: &str) -> Result<bool, Error>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, Error>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), Error>;
    async fn hdel(&self, key: &str, field: &str) -> Result<bool, Error>;
    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, Error>;

    /// Increments `field` in the hash at `key` by `delta`, clamping the
    /// result to a minimum of 0 (spec invariant 4: "counters must not go
    /// negative; an implementation must clamp and log"). Returns the
    /// post-clamp value. A `delta` that would drive the field below zero
    /// logs an `InvariantDrift` warning and clamps instead of erroring,
    /// since negative counters indicate drift in a caller elsewhere, not a
    /// failure of this call.
    async fn hincrby_clamped(&self, key: &str, field: &str, delta: i64) -> Result<i64, Error>;

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, Error>;
    async fn srem(&self, key: &str, member: &str) -> Result<bool, Error>;
    async fn sscan(&self, key: &str, cursor: u64, count: usize) -> Result<ScanPage, Error>;

    async fn rpush(&self, key: &str, value: &str) -> Result<(), Error>;
    async fn lpop(&self, key: &str) -> Result<Option<String>, Error>;
    /// Removes all occurrences of `value` from the list at `key`.
    /// Returns the number removed.
    async fn lrem_all(&self, key: &str, value: &str) -> Result<u64, Error>;
    /// Snapshot of the full list, head first.
    async fn lrange_all(&self, key: &str) -> Result<Vec<String>, Error>;

    /// `CHECKDEL(key, expected)` — spec §4.C.
    async fn checkdel(&self, key: &str, expected: &str) -> Result<bool, Error>;
    /// `INCRLIMIT(key, limit)` — spec §4.C.
    async fn incrlimit(&self, key: &str, limit: i64) -> Result<i64, Error>;
}

/// Awaits a batch of independent futures together, the way the spec asks
/// composite operations to expose their KVS round trips: one future per
/// key, no mutual ordering guarantee between them, every outcome captured
/// rather than the first error short-circuiting the rest (spec §5, §9).
pub async fn await_all<F, T>(futures: Vec<F>) -> Vec<Result<T, Error>>
where
    F: std::future::Future<Output = Result<T, Error>>,
{
    join_all(futures).await
}
