// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Per-client subscription mirror, per-topic subscriber maps, and the
//! wildcard trie's child-refcount table — spec §4.E.
//!
//! The trie itself is never materialized as a tree of objects; it is
//! addressed purely by prefix strings into `topic_filter_child`, which is
//! what lets every broker node share it through the KVS without owning any
//! of it locally (spec §9: "do not introduce node-local caches ... without
//! an invalidation channel").

use std::collections::HashMap;

use log::{debug, warn};

use crate::error::Error;
use crate::keys;
use crate::kvs::SharedKvs;
use crate::topic::{self, END};

#[derive(Clone)]
pub struct SubscriptionStore {
    kvs: SharedKvs,
}

impl SubscriptionStore {
    #[must_use]
    pub fn new(kvs: SharedKvs) -> Self {
        SubscriptionStore { kvs }
    }

    #[must_use]
    pub(crate) fn kvs(&self) -> &SharedKvs {
        &self.kvs
    }

    /// `topic_filter(levels)` if `levels` is a filter, else `topic_name(levels)`.
    pub async fn get_topic_subscribers(
        &self,
        levels: &[String],
    ) -> Result<HashMap<String, u8>, Error> {
        let key = if topic::is_filter(levels) {
            keys::topic_filter(levels)
        } else {
            keys::topic_name(levels)
        };
        self.read_qos_map(&key).await
    }

    pub async fn get_client_subscriptions(
        &self,
        client_id: &str,
    ) -> Result<HashMap<String, u8>, Error> {
        self.read_qos_map(&keys::subscription(client_id)).await
    }

    /// The refcount of subscribed filters traversing the edge labeled
    /// `child` under `prefix`. `0` means the edge is absent (invariant 4).
    pub(crate) async fn child_count(&self, prefix: &[String], child: &str) -> Result<i64, Error> {
        let key = keys::topic_filter_child(prefix);
        let value = self.kvs.hget(&key, child).await?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    /// `updateSubscription` (spec §4.E). Overwrites the granted QoS if the
    /// client was already subscribed to `levels`; only mutates the trie
    /// refcounts the first time, so re-subscribing is idempotent on the
    /// counters (Open Question decision, SPEC_FULL §9).
    pub async fn update_subscription(
        &self,
        client_id: &str,
        levels: &[String],
        qos: u8,
    ) -> Result<(), Error> {
        let topic_str = topic::join(levels);
        let sub_key = keys::subscription(client_id);
        let already_existed = self.kvs.hget(&sub_key, &topic_str).await?.is_some();
        self.kvs.hset(&sub_key, &topic_str, &qos.to_string()).await?;

        if topic::is_filter(levels) {
            self.kvs
                .hset(&keys::topic_filter(levels), client_id, &qos.to_string())
                .await?;
            if !already_existed {
                self.adjust_trie_counters(levels, 1).await?;
            }
        } else {
            self.kvs
                .hset(&keys::topic_name(levels), client_id, &qos.to_string())
                .await?;
        }
        debug!(
            "subscription: update client={client_id} topic={topic_str} qos={qos} new={}",
            !already_existed
        );
        Ok(())
    }

    /// `removeSubscription` (spec §4.E). A no-op if the client was never
    /// subscribed to `levels`.
    pub async fn remove_subscription(&self, client_id: &str, levels: &[String]) -> Result<(), Error> {
        let topic_str = topic::join(levels);
        let sub_key = keys::subscription(client_id);
        let existed = self.kvs.hget(&sub_key, &topic_str).await?.is_some();
        if !existed {
            return Ok(());
        }
        self.kvs.hdel(&sub_key, &topic_str).await?;
        self.remove_subscription_entry(client_id, levels).await
    }

    /// The part of `remove_subscription` shared with `remove_all_subscriptions`,
    /// where the caller has already removed (or is about to remove) the
    /// `subscription(clientId)` entry and is not re-reading it.
    async fn remove_subscription_entry(&self, client_id: &str, levels: &[String]) -> Result<(), Error> {
        if topic::is_filter(levels) {
            self.kvs.hdel(&keys::topic_filter(levels), client_id).await?;
            self.adjust_trie_counters(levels, -1).await?;
        } else {
            self.kvs.hdel(&keys::topic_name(levels), client_id).await?;
        }
        Ok(())
    }

    /// `removeAllSubscriptions` (spec §4.E): reads the client's subscription
    /// snapshot once, then removes each entry without re-reading it, then
    /// drops the `subscription(clientId)` key itself.
    pub async fn remove_all_subscriptions(&self, client_id: &str) -> Result<(), Error> {
        let snapshot = self.kvs.hgetall(&keys::subscription(client_id)).await?;
        for (topic_str, _qos) in snapshot {
            let levels = topic::split(&topic_str);
            self.remove_subscription_entry(client_id, &levels).await?;
        }
        self.kvs.del(&keys::subscription(client_id)).await?;
        Ok(())
    }

    /// Walks each prefix of `levels` and adjusts its child counter by
    /// `delta` (+1 on subscribe, -1 on unsubscribe), then adjusts the
    /// `END` terminator at the full filter prefix (spec invariant 4).
    async fn adjust_trie_counters(&self, levels: &[String], delta: i64) -> Result<(), Error> {
        for i in 0..levels.len() {
            let prefix = &levels[0..i];
            let child = &levels[i];
            let key = keys::topic_filter_child(prefix);
            let new_value = self.kvs.hincrby_clamped(&key, child, delta).await?;
            if delta < 0 && new_value == 0 {
                warn!("subscription: counter {key}[{child}] reached 0, edge removed");
            }
        }
        let full_key = keys::topic_filter_child(levels);
        self.kvs.hincrby_clamped(&full_key, END, delta).await?;
        Ok(())
    }

    async fn read_qos_map(&self, key: &str) -> Result<HashMap<String, u8>, Error> {
        let fields = self.kvs.hgetall(key).await?;
        let mut map = HashMap::with_capacity(fields.len());
        for (field, value) in fields {
            match value.parse::<u8>() {
                Ok(qos) => {
                    map.insert(field, qos);
                }
                Err(_) => warn!("subscription: {key}[{field}] has non-numeric qos {value:?}"),
            }
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kvs::memory::MemoryKvs;
    use std::sync::Arc;

    fn store() -> SubscriptionStore {
        SubscriptionStore::new(Arc::new(MemoryKvs::new()))
    }

    #[tokio::test]
    async fn test_exact_topic_subscription_s1() {
        let store = store();
        let levels = topic::split("a/b");
        store.update_subscription("c1", &levels, 1).await.unwrap();

        let subs = store.get_topic_subscribers(&levels).await.unwrap();
        assert_eq!(subs.get("c1"), Some(&1));
        assert_eq!(
            store.get_client_subscriptions("c1").await.unwrap().get("a/b"),
            Some(&1)
        );
    }

    #[tokio::test]
    async fn test_plus_wildcard_counters_s2() {
        let store = store();
        let levels = topic::split("a/+/c");
        store.update_subscription("c1", &levels, 2).await.unwrap();

        assert_eq!(store.child_count(&[], "a").await.unwrap(), 1);
        assert_eq!(
            store.child_count(&topic::split("a"), "+").await.unwrap(),
            1
        );
        assert_eq!(
            store.child_count(&topic::split("a/+"), "c").await.unwrap(),
            1
        );
        assert_eq!(
            store.child_count(&topic::split("a/+/c"), END).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_resubscribe_is_idempotent_on_counters() {
        let store = store();
        let levels = topic::split("a/+/c");
        store.update_subscription("c1", &levels, 0).await.unwrap();
        store.update_subscription("c1", &levels, 2).await.unwrap();

        assert_eq!(store.child_count(&[], "a").await.unwrap(), 1);
        let subs = store.get_topic_subscribers(&levels).await.unwrap();
        assert_eq!(subs.get("c1"), Some(&2));
    }

    #[tokio::test]
    async fn test_unsubscribe_decrements_counters_to_zero() {
        let store = store();
        let levels = topic::split("a/+/c");
        store.update_subscription("c1", &levels, 1).await.unwrap();
        store.remove_subscription("c1", &levels).await.unwrap();

        assert_eq!(store.child_count(&[], "a").await.unwrap(), 0);
        assert_eq!(
            store.child_count(&topic::split("a/+/c"), END).await.unwrap(),
            0
        );
        assert!(store
            .get_client_subscriptions("c1")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_remove_all_subscriptions_clears_counters() {
        let store = store();
        store
            .update_subscription("c1", &topic::split("a/+"), 0)
            .await
            .unwrap();
        store
            .update_subscription("c1", &topic::split("a/b"), 2)
            .await
            .unwrap();

        store.remove_all_subscriptions("c1").await.unwrap();

        assert!(store
            .get_client_subscriptions("c1")
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.child_count(&[], "a").await.unwrap(), 0);
        assert!(store
            .get_topic_subscribers(&topic::split("a/b"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_overlap_keeps_both_filters_distinct() {
        let store = store();
        store
            .update_subscription("c1", &topic::split("a/+"), 0)
            .await
            .unwrap();
        store
            .update_subscription("c1", &topic::split("a/b"), 2)
            .await
            .unwrap();

        let exact = store
            .get_topic_subscribers(&topic::split("a/b"))
            .await
            .unwrap();
        assert_eq!(exact.get("c1"), Some(&2));

        let plus = store
            .get_topic_subscribers(&topic::split("a/+"))
            .await
            .unwrap();
        assert_eq!(plus.get("c1"), Some(&0));
    }
}
