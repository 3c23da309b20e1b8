// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Shared session, presence and subscription store for a clustered MQTT
//! broker — every broker node reads and writes the same state through a
//! shared KVS (spec §1, §2). Nothing here owns a listener socket, parses a
//! wire packet, or enforces ACLs; those are front-end concerns layered on
//! top of this crate by the process that embeds it.

pub mod config;
pub mod error;
pub mod keys;
pub mod kvs;
pub mod log;
pub mod matcher;
pub mod record;
pub mod retained;
pub mod scripts;
pub mod session;
pub mod subscription;
pub mod topic;

pub use config::Config;
pub use error::{Error, ErrorKind};
pub use kvs::{Kvs, SharedKvs};
pub use matcher::match_topic;
pub use record::Record;
pub use retained::RetainedStore;
pub use session::{Membership, Removed, SessionStore};
pub use subscription::SubscriptionStore;

/// Convenience bundle of the three stores a broker node needs, all sharing
/// one `SharedKvs` handle. Constructing this is the only thing a front-end
/// has to do to start calling into this crate.
#[derive(Clone)]
pub struct ClusterStore {
    pub session: SessionStore,
    pub subscription: SubscriptionStore,
    pub retained: RetainedStore,
}

impl ClusterStore {
    #[must_use]
    pub fn new(kvs: SharedKvs) -> Self {
        ClusterStore {
            session: SessionStore::new(kvs.clone()),
            subscription: SubscriptionStore::new(kvs.clone()),
            retained: RetainedStore::new(kvs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kvs::memory::MemoryKvs;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_cluster_store_wires_shared_kvs() {
        let kvs: SharedKvs = Arc::new(MemoryKvs::new());
        let store = ClusterStore::new(kvs);

        store
            .subscription
            .update_subscription("c1", &topic::split("a/+"), 1)
            .await
            .unwrap();
        let matched = match_topic(&store.subscription, &topic::split("a/b"))
            .await
            .unwrap();
        assert_eq!(matched.get("c1"), Some(&1));
    }
}
