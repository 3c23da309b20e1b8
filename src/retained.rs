// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Retained message storage — spec §4.F. Mirrors the in-flight record CRUD
//! in `session.rs`, but keyed by topic name rather than clientId, and with
//! a list that is expected to usually hold at most one id (MQTT retains one
//! message per topic; a longer list only arises from concurrent publishers
//! racing, which this module tolerates rather than forbids).

use log::warn;

use crate::error::Error;
use crate::keys;
use crate::kvs::SharedKvs;
use crate::record::Record;

#[derive(Clone)]
pub struct RetainedStore {
    kvs: SharedKvs,
}

impl RetainedStore {
    #[must_use]
    pub fn new(kvs: SharedKvs) -> Self {
        RetainedStore { kvs }
    }

    pub async fn get_retained_ids(&self, levels: &[String]) -> Result<Vec<u16>, Error> {
        let raw = self.kvs.lrange_all(&keys::topic_retain_list(levels)).await?;
        Ok(raw.iter().filter_map(|s| s.parse().ok()).collect())
    }

    /// Reads every retained record for `levels`, in list order (oldest
    /// first). A list id with no backing record is skipped rather than
    /// treated as an error, mirroring the in-flight lazy-repair tolerance.
    pub async fn get_retained_messages(&self, levels: &[String]) -> Result<Vec<Record>, Error> {
        let ids = self.get_retained_ids(levels).await?;
        let mut records = Vec::with_capacity(ids.len());
        for packet_id in ids {
            if let Some(record) = Record::load(&self.kvs, &keys::topic_retain_msg(levels, packet_id)).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Appends `record` to the retained list for `levels` and writes its
    /// backing hash. The list append and the hash write are independent
    /// writes, same discipline as `SessionStore::add_in_flight`.
    pub async fn add_retained(&self, levels: &[String], packet_id: u16, record: Record) -> Vec<Result<(), Error>> {
        let list_key = keys::topic_retain_list(levels);
        let msg_key = keys::topic_retain_msg(levels, packet_id);
        let kvs_a = self.kvs.clone();
        let id_str = packet_id.to_string();
        let kvs_b = self.kvs.clone();
        let ops: Vec<crate::kvs::BoxedOp<()>> = vec![
            Box::pin(async move { kvs_a.rpush(&list_key, &id_str).await }),
            Box::pin(async move { record.store(&kvs_b, &msg_key).await }),
        ];
        crate::kvs::await_all(ops).await
    }

    pub async fn remove_retained(&self, levels: &[String], packet_id: u16) -> Result<(), Error> {
        self.kvs
            .lrem_all(&keys::topic_retain_list(levels), &packet_id.to_string())
            .await?;
        self.kvs.del(&keys::topic_retain_msg(levels, packet_id)).await?;
        Ok(())
    }

    /// An empty PUBLISH payload to a topic clears every retained message
    /// for that topic (MQTT 3.1.1 §3.3.1.3). Drains the list bounded by its
    /// length at entry, same discipline as `SessionStore::clear_all_in_flight`.
    pub async fn clear_all_retained(&self, levels: &[String]) -> Result<(), Error> {
        let list_key = keys::topic_retain_list(levels);
        let snapshot_len = self.kvs.lrange_all(&list_key).await?.len();
        for _ in 0..snapshot_len {
            match self.kvs.lpop(&list_key).await? {
                Some(id) => {
                    if let Ok(packet_id) = id.parse::<u16>() {
                        self.kvs
                            .del(&keys::topic_retain_msg(levels, packet_id))
                            .await?;
                    } else {
                        warn!("retained: clear_all_retained found non-numeric id {id:?}");
                    }
                }
                None => break,
            }
        }
        Ok(())
    }
}
