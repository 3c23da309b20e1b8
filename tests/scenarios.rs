// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! End-to-end scenarios against an in-memory `Kvs`, exercising the crate's
//! public surface the way a front-end would rather than poking at
//! individual stores — scenarios S1-S4 from spec.md §8. S5 (presence
//! handoff) and S6 (packet id wraparound) live as unit tests in
//! `src/session.rs`, alongside the stores they exercise.

use std::sync::Arc;

use hebo_cluster_store::kvs::memory::MemoryKvs;
use hebo_cluster_store::{match_topic, ClusterStore, SharedKvs};

fn cluster_store() -> ClusterStore {
    let kvs: SharedKvs = Arc::new(MemoryKvs::new());
    ClusterStore::new(kvs)
}

fn levels(topic: &str) -> Vec<String> {
    hebo_cluster_store::topic::split(topic)
}

#[tokio::test]
async fn test_s1_exact_topic_match() {
    let store = cluster_store();
    store
        .subscription
        .update_subscription("c1", &levels("a/b"), 1)
        .await
        .unwrap();

    let matched = match_topic(&store.subscription, &levels("a/b")).await.unwrap();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched.get("c1"), Some(&1));
}

#[tokio::test]
async fn test_s2_single_level_wildcard_match() {
    let store = cluster_store();
    store
        .subscription
        .update_subscription("c1", &levels("a/+/c"), 2)
        .await
        .unwrap();

    let matched = match_topic(&store.subscription, &levels("a/b/c")).await.unwrap();
    assert_eq!(matched.get("c1"), Some(&2));

    let unmatched = match_topic(&store.subscription, &levels("a/b/d")).await.unwrap();
    assert!(unmatched.is_empty());
}

#[tokio::test]
async fn test_s3_multi_level_wildcard_match() {
    let store = cluster_store();
    store
        .subscription
        .update_subscription("c1", &levels("a/#"), 0)
        .await
        .unwrap();

    for topic in ["a", "a/b", "a/b/c/d"] {
        let matched = match_topic(&store.subscription, &levels(topic)).await.unwrap();
        assert_eq!(matched.get("c1"), Some(&0), "expected a/# to match {topic}");
    }

    let unmatched = match_topic(&store.subscription, &levels("other")).await.unwrap();
    assert!(unmatched.is_empty());
}

#[tokio::test]
async fn test_s4_overlapping_filters_dedup_to_max_qos() {
    let store = cluster_store();
    store
        .subscription
        .update_subscription("c1", &levels("a/+"), 0)
        .await
        .unwrap();
    store
        .subscription
        .update_subscription("c1", &levels("a/#"), 1)
        .await
        .unwrap();
    store
        .subscription
        .update_subscription("c1", &levels("a/b"), 2)
        .await
        .unwrap();

    let matched = match_topic(&store.subscription, &levels("a/b")).await.unwrap();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched.get("c1"), Some(&2));
}

#[tokio::test]
async fn test_clean_disconnect_tears_down_all_session_state() {
    let store = cluster_store();
    store
        .subscription
        .update_subscription("c1", &levels("a/+"), 1)
        .await
        .unwrap();
    store.session.update_session("c1", true).await.unwrap();
    let packet_id = store.session.next_packet_id("c1").await.unwrap();
    for result in store
        .session
        .add_in_flight(
            "c1",
            packet_id,
            hebo_cluster_store::Record::Pubrel { packet_id },
        )
        .await
    {
        result.unwrap();
    }

    store
        .session
        .remove_all_session_state("c1", &store.subscription)
        .await
        .unwrap();

    assert_eq!(store.session.get_session("c1").await.unwrap(), None);
    assert!(store
        .subscription
        .get_client_subscriptions("c1")
        .await
        .unwrap()
        .is_empty());
    assert!(store
        .session
        .get_all_in_flight_ids("c1")
        .await
        .unwrap()
        .is_empty());
    let matched = match_topic(&store.subscription, &levels("a/b")).await.unwrap();
    assert!(matched.is_empty());
}

#[tokio::test]
async fn test_retained_message_delivered_to_new_subscriber() {
    let store = cluster_store();
    let topic_levels = levels("a/b");
    for result in store
        .retained
        .add_retained(
            &topic_levels,
            1,
            hebo_cluster_store::Record::Publish {
                packet_id: 1,
                qos: 1,
                dup: false,
                retain: true,
                topic_name: "a/b".to_owned(),
                payload: b"hello".to_vec(),
            },
        )
        .await
    {
        result.unwrap();
    }

    let messages = store.retained.get_retained_messages(&topic_levels).await.unwrap();
    assert_eq!(messages.len(), 1);
}
