// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Forward matching of a concrete topic name against the wildcard trie —
//! spec §4.G.
//!
//! The walk is iterative (an explicit work stack), not recursive, per spec
//! §5's "recursion must be converted to bounded iteration": depth is
//! bounded by the published topic's own level count, and every step reads
//! exactly the child fields it needs rather than dumping whole trie nodes.
//!
//! `+` is treated as matching the terminal level too (MQTT 3.1.1 §4.7.1-1:
//! a single-level wildcard matches exactly one level, including the last
//! one), and `#` is evaluated at every node visited, including the final
//! one, so that e.g. `sport/#` matches both `sport` and `sport/player1`
//! (MQTT 3.1.1 §4.7.1.3) — see SPEC_FULL.md §9 for the worked trace this
//! resolved against.
//!
//! `$`-prefixed system topics only forbid a wildcard *at the root* (MQTT
//! 3.1.1 §4.7.2): `#` and `+` subscribed at the top level must not match
//! `$SYS/...`, but a deeper filter like `$SYS/#` or `$SYS/broker/+` must
//! still match, since it never relies on a root-position wildcard. The
//! root-only suppression is applied once, at `depth == 0`, not as a
//! whole-walk bail-out.

use std::collections::HashMap;

use log::trace;

use crate::error::Error;
use crate::keys;
use crate::kvs::SharedKvs;
use crate::subscription::SubscriptionStore;
use crate::topic::{self, END};

const HASH: &str = "#";
const PLUS: &str = "+";

/// All subscribers of `levels` (by clientId, deduplicated to the highest
/// granted QoS when more than one matching filter names the same client —
/// spec scenario S4), combining the exact `topic_name` match with every
/// wildcard filter reachable by walking the trie.
pub async fn match_topic(
    subscriptions: &SubscriptionStore,
    levels: &[String],
) -> Result<HashMap<String, u8>, Error> {
    let mut result = subscriptions.get_topic_subscribers(levels).await?;
    let is_system_topic = topic::is_system_topic(levels);

    let kvs = subscriptions.kvs();
    let mut stack: Vec<Vec<String>> = vec![Vec::new()];
    while let Some(prefix) = stack.pop() {
        let depth = prefix.len();
        let root_wildcard_forbidden = depth == 0 && is_system_topic;
        trace!("matcher: visiting prefix={:?} depth={depth}", prefix);

        if !root_wildcard_forbidden && child_count(kvs, &prefix, HASH).await? > 0 {
            let mut filter = prefix.clone();
            filter.push(HASH.to_owned());
            merge_subscribers(&mut result, subscriptions.get_topic_subscribers(&filter).await?);
        }

        if depth == levels.len() {
            if child_count(kvs, &prefix, END).await? > 0 {
                merge_subscribers(&mut result, subscriptions.get_topic_subscribers(&prefix).await?);
            }
            continue;
        }

        let literal = &levels[depth];
        if child_count(kvs, &prefix, literal).await? > 0 {
            let mut next = prefix.clone();
            next.push(literal.clone());
            stack.push(next);
        }
        if !root_wildcard_forbidden && child_count(kvs, &prefix, PLUS).await? > 0 {
            let mut next = prefix.clone();
            next.push(PLUS.to_owned());
            stack.push(next);
        }
    }

    Ok(result)
}

async fn child_count(kvs: &SharedKvs, prefix: &[String], child: &str) -> Result<i64, Error> {
    let key = keys::topic_filter_child(prefix);
    let value = kvs.hget(&key, child).await?;
    Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
}

fn merge_subscribers(into: &mut HashMap<String, u8>, from: HashMap<String, u8>) {
    for (client_id, qos) in from {
        into.entry(client_id)
            .and_modify(|existing| *existing = (*existing).max(qos))
            .or_insert(qos);
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
    async fn test_exact_match_s1() {
        let subs = store();
        subs.update_subscription("c1", &topic::split("a/b"), 1)
            .await
            .unwrap();

        let matched = match_topic(&subs, &topic::split("a/b")).await.unwrap();
        assert_eq!(matched.get("c1"), Some(&1));
    }

    #[tokio::test]
    async fn test_plus_wildcard_match_s2() {
        let subs = store();
        subs.update_subscription("c1", &topic::split("a/+/c"), 2)
            .await
            .unwrap();

        let matched = match_topic(&subs, &topic::split("a/b/c")).await.unwrap();
        assert_eq!(matched.get("c1"), Some(&2));

        let no_match = match_topic(&subs, &topic::split("a/b/d")).await.unwrap();
        assert!(no_match.is_empty());
    }

    #[tokio::test]
    async fn test_hash_wildcard_match_s3() {
        let subs = store();
        subs.update_subscription("c1", &topic::split("a/#"), 0)
            .await
            .unwrap();

        // "#" matches the parent level itself as well as every descendant.
        let matched_parent = match_topic(&subs, &topic::split("a")).await.unwrap();
        assert_eq!(matched_parent.get("c1"), Some(&0));

        let matched_deep = match_topic(&subs, &topic::split("a/b/c/d")).await.unwrap();
        assert_eq!(matched_deep.get("c1"), Some(&0));
    }

    #[tokio::test]
    async fn test_overlap_dedup_takes_max_qos_s4() {
        let subs = store();
        subs.update_subscription("c1", &topic::split("a/+"), 0)
            .await
            .unwrap();
        subs.update_subscription("c1", &topic::split("a/b"), 2)
            .await
            .unwrap();

        let matched = match_topic(&subs, &topic::split("a/b")).await.unwrap();
        assert_eq!(matched.get("c1"), Some(&2));
    }

    #[tokio::test]
    async fn test_plus_matches_terminal_level() {
        let subs = store();
        subs.update_subscription("c1", &topic::split("a/+"), 1)
            .await
            .unwrap();

        let matched = match_topic(&subs, &topic::split("a/b")).await.unwrap();
        assert_eq!(matched.get("c1"), Some(&1));
    }

    #[tokio::test]
    async fn test_system_topic_excluded_from_wildcard_walk() {
        let subs = store();
        subs.update_subscription("c1", &topic::split("#"), 0)
            .await
            .unwrap();

        let matched = match_topic(&subs, &topic::split("$SYS/broker/uptime"))
            .await
            .unwrap();
        assert!(matched.is_empty());
    }

    #[tokio::test]
    async fn test_system_topic_still_matches_explicit_deeper_subscription() {
        let subs = store();
        subs.update_subscription("c1", &topic::split("$SYS/#"), 0)
            .await
            .unwrap();
        subs.update_subscription("c2", &topic::split("$SYS/broker/+"), 1)
            .await
            .unwrap();

        let matched = match_topic(&subs, &topic::split("$SYS/broker/uptime"))
            .await
            .unwrap();
        assert_eq!(matched.get("c1"), Some(&0));
        assert_eq!(matched.get("c2"), Some(&1));
    }
}
