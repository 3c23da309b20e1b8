// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Presence, session flag, packet-id allocation, QoS2 dedup and in-flight
//! record storage — spec §4.D.

use log::{debug, warn};

use crate::error::Error;
use crate::keys;
use crate::kvs::{await_all, BoxedOp, SharedKvs};
use crate::record::Record;

/// Upper bound of the packet-id space; MQTT reserves 0, so ids wrap 1..=65535.
pub const MAX_PACKET_ID: i64 = 65535;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Added,
    AlreadyPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removed {
    Removed,
    NotPresent,
}

/// Shared session, presence and in-flight store for a single clientId.
/// Cheap to construct; all state lives in the KVS behind `kvs`.
#[derive(Clone)]
pub struct SessionStore {
    kvs: SharedKvs,
}

impl SessionStore {
    #[must_use]
    pub fn new(kvs: SharedKvs) -> Self {
        SessionStore { kvs }
    }

    /// Records that `client_id` is now hosted on `node`. The set membership
    /// and the pointer write are independent; invariant 1 (presence
    /// pairing) holds once both complete, which the caller is expected to
    /// arrange to happen only after the front-end has actually taken the
    /// session (spec §4.D).
    pub async fn update_connected_node(&self, client_id: &str, node: &str) -> Vec<Result<(), Error>> {
        debug!("session: update_connected_node client={client_id} node={node}");
        let set_key = keys::connected_clients(node);
        let ptr_key = keys::connected_node(client_id);
        let kvs_a = self.kvs.clone();
        let client_owned = client_id.to_owned();
        let kvs_b = self.kvs.clone();
        let node_owned = node.to_owned();
        let ops: Vec<BoxedOp<()>> = vec![
            Box::pin(async move { kvs_a.sadd(&set_key, &client_owned).await.map(|_| ()) }),
            Box::pin(async move { kvs_b.set(&ptr_key, &node_owned).await }),
        ];
        await_all(ops).await
    }

    /// Removes `client_id` from `node`'s presence set, then releases
    /// `connected_node(client_id)` only if it still names `node` (the
    /// `CHECKDEL` protocol: a stale disconnect must never clobber a newer
    /// connection that has already rebound to another node).
    pub async fn remove_connected_node(&self, client_id: &str, node: &str) -> Result<bool, Error> {
        let set_key = keys::connected_clients(node);
        self.kvs.srem(&set_key, client_id).await?;
        let ptr_key = keys::connected_node(client_id);
        let released = self.kvs.checkdel(&ptr_key, node).await?;
        debug!(
            "session: remove_connected_node client={client_id} node={node} released={released}"
        );
        Ok(released)
    }

    pub async fn get_connected_node(&self, client_id: &str) -> Result<Option<String>, Error> {
        self.kvs.get(&keys::connected_node(client_id)).await
    }

    /// Cursor-bounded scan over the clients presently hosted on `node`.
    pub async fn scan_connected_clients(
        &self,
        node: &str,
        cursor: u64,
        count: usize,
    ) -> Result<(u64, Vec<String>), Error> {
        let page = self
            .kvs
            .sscan(&keys::connected_clients(node), cursor, count)
            .await?;
        Ok((page.cursor, page.members))
    }

    pub async fn get_session(&self, client_id: &str) -> Result<Option<bool>, Error> {
        Ok(self
            .kvs
            .get(&keys::session(client_id))
            .await?
            .map(|flag| flag == "1"))
    }

    pub async fn update_session(&self, client_id: &str, clean: bool) -> Result<(), Error> {
        self.kvs
            .set(&keys::session(client_id), if clean { "1" } else { "0" })
            .await
    }

    pub async fn remove_session(&self, client_id: &str) -> Result<bool, Error> {
        self.kvs.del(&keys::session(client_id)).await
    }

    /// `INCRLIMIT(next_packet_id(clientId), 65535)`: always yields a value
    /// in `1..=65535`, wrapping to 1 rather than ever producing 0.
    pub async fn next_packet_id(&self, client_id: &str) -> Result<u16, Error> {
        let value = self
            .kvs
            .incrlimit(&keys::next_packet_id(client_id), MAX_PACKET_ID)
            .await?;
        Ok(value as u16)
    }

    pub async fn add_qos2_message_id(
        &self,
        client_id: &str,
        packet_id: u16,
    ) -> Result<Membership, Error> {
        let added = self
            .kvs
            .sadd(&keys::qos2_set(client_id), &packet_id.to_string())
            .await?;
        Ok(if added {
            Membership::Added
        } else {
            Membership::AlreadyPresent
        })
    }

    pub async fn remove_qos2_message_id(
        &self,
        client_id: &str,
        packet_id: u16,
    ) -> Result<Removed, Error> {
        let removed = self
            .kvs
            .srem(&keys::qos2_set(client_id), &packet_id.to_string())
            .await?;
        Ok(if removed {
            Removed::Removed
        } else {
            Removed::NotPresent
        })
    }

    pub async fn clear_qos2(&self, client_id: &str) -> Result<bool, Error> {
        self.kvs.del(&keys::qos2_set(client_id)).await
    }

    pub async fn get_all_in_flight_ids(&self, client_id: &str) -> Result<Vec<u16>, Error> {
        let raw = self.kvs.lrange_all(&keys::in_flight_list(client_id)).await?;
        Ok(raw.iter().filter_map(|s| s.parse().ok()).collect())
    }

    /// Reads the in-flight record for `packet_id`. A list id with no
    /// backing record is not an error (invariant 2's lazy-repair clause):
    /// callers should treat `Ok(None)` as "already acknowledged".
    pub async fn get_in_flight(
        &self,
        client_id: &str,
        packet_id: u16,
    ) -> Result<Option<Record>, Error> {
        Record::load(&self.kvs, &keys::in_flight_msg(client_id, packet_id)).await
    }

    /// Appends `packet_id` to the in-flight list and writes its record.
    /// The two writes are independent futures per spec §5; a crash between
    /// them is tolerated because readers absorb an orphaned list id.
    pub async fn add_in_flight(
        &self,
        client_id: &str,
        packet_id: u16,
        record: Record,
    ) -> Vec<Result<(), Error>> {
        let list_key = keys::in_flight_list(client_id);
        let msg_key = keys::in_flight_msg(client_id, packet_id);
        let kvs_a = self.kvs.clone();
        let id_str = packet_id.to_string();
        let kvs_b = self.kvs.clone();
        let ops: Vec<BoxedOp<()>> = vec![
            Box::pin(async move { kvs_a.rpush(&list_key, &id_str).await }),
            Box::pin(async move { record.store(&kvs_b, &msg_key).await }),
        ];
        await_all(ops).await
    }

    /// Removes every occurrence of `packet_id` from the in-flight list and
    /// deletes its record.
    pub async fn remove_in_flight(
        &self,
        client_id: &str,
        packet_id: u16,
    ) -> Result<(), Error> {
        self.kvs
            .lrem_all(&keys::in_flight_list(client_id), &packet_id.to_string())
            .await?;
        self.kvs
            .del(&keys::in_flight_msg(client_id, packet_id))
            .await?;
        Ok(())
    }

    /// Drains the in-flight list by repeatedly popping the head and
    /// deleting its record. Bounded by the list length observed at entry
    /// so a concurrent appender cannot make this loop run forever (spec
    /// §4.D, §5: recursion must be converted to bounded iteration).
    pub async fn clear_all_in_flight(&self, client_id: &str) -> Result<(), Error> {
        let list_key = keys::in_flight_list(client_id);
        let snapshot_len = self.kvs.lrange_all(&list_key).await?.len();
        for _ in 0..snapshot_len {
            match self.kvs.lpop(&list_key).await? {
                Some(id) => {
                    if let Ok(packet_id) = id.parse::<u16>() {
                        self.kvs.del(&keys::in_flight_msg(client_id, packet_id)).await?;
                    } else {
                        warn!("session: clear_all_in_flight found non-numeric id {id:?} for client {client_id}");
                    }
                }
                None => break,
            }
        }
        Ok(())
    }

    /// Composite teardown invoked on DISCONNECT of a clean session: removes
    /// the session flag, every subscription, the QoS2 dedup set, and every
    /// in-flight record.
    pub async fn remove_all_session_state(
        &self,
        client_id: &str,
        subscriptions: &crate::subscription::SubscriptionStore,
    ) -> Result<(), Error> {
        self.remove_session(client_id).await?;
        subscriptions.remove_all_subscriptions(client_id).await?;
        self.clear_qos2(client_id).await?;
        self.clear_all_in_flight(client_id).await?;
        Ok(())
    }
}
