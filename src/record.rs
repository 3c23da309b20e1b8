// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! The record shape shared by in-flight messages (`in_flight_msg`) and
//! retained messages (`topic_retain_msg`) — spec §3. Stored as a KVS hash
//! so a reader that finds the key absent can tell "never written" apart
//! from "fields missing", and payload bytes are base64-encoded since the
//! `Kvs` trait carries UTF-8 strings, not raw bytes (spec §9: "do not use a
//! text codec that collapses bytes").

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{Error, ErrorKind};
use crate::kvs::SharedKvs;

const FIELD_TYPE: &str = "type";
const FIELD_RETAIN: &str = "retain";
const FIELD_QOS: &str = "qos";
const FIELD_DUP: &str = "dup";
const FIELD_TOPIC_NAME: &str = "topicName";
const FIELD_PACKET_ID: &str = "packetId";
const FIELD_PAYLOAD: &str = "payload";

const TYPE_PUBLISH: &str = "PUBLISH";
const TYPE_PUBREL: &str = "PUBREL";

/// A message awaiting acknowledgement, either a QoS>0 PUBLISH or the PUBREL
/// half of a QoS2 handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Publish {
        packet_id: u16,
        qos: u8,
        dup: bool,
        retain: bool,
        topic_name: String,
        payload: Vec<u8>,
    },
    Pubrel {
        packet_id: u16,
    },
}

impl Record {
    #[must_use]
    pub fn packet_id(&self) -> u16 {
        match self {
            Record::Publish { packet_id, .. } | Record::Pubrel { packet_id } => *packet_id,
        }
    }

    /// Writes every field of this record into the hash at `key`.
    pub(crate) async fn store(&self, kvs: &SharedKvs, key: &str) -> Result<(), Error> {
        match self {
            Record::Publish {
                packet_id,
                qos,
                dup,
                retain,
                topic_name,
                payload,
            } => {
                kvs.hset(key, FIELD_TYPE, TYPE_PUBLISH).await?;
                kvs.hset(key, FIELD_PACKET_ID, &packet_id.to_string())
                    .await?;
                kvs.hset(key, FIELD_QOS, &qos.to_string()).await?;
                kvs.hset(key, FIELD_DUP, if *dup { "1" } else { "0" }).await?;
                kvs.hset(key, FIELD_RETAIN, if *retain { "1" } else { "0" })
                    .await?;
                kvs.hset(key, FIELD_TOPIC_NAME, topic_name).await?;
                kvs.hset(key, FIELD_PAYLOAD, &BASE64.encode(payload)).await?;
            }
            Record::Pubrel { packet_id } => {
                kvs.hset(key, FIELD_TYPE, TYPE_PUBREL).await?;
                kvs.hset(key, FIELD_PACKET_ID, &packet_id.to_string())
                    .await?;
            }
        }
        Ok(())
    }

    /// Reads the hash at `key` back into a `Record`, or `None` if the key
    /// does not exist (the list-but-no-record case tolerated by invariant 2
    /// — treated by callers as "already acknowledged").
    pub(crate) async fn load(kvs: &SharedKvs, key: &str) -> Result<Option<Record>, Error> {
        let fields = kvs.hgetall(key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let get = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };
        let kind = get(FIELD_TYPE).ok_or_else(|| {
            Error::from_string(
                ErrorKind::ContractViolation,
                format!("record at {key} missing 'type' field"),
            )
        })?;
        let packet_id: u16 = get(FIELD_PACKET_ID)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| {
                Error::from_string(
                    ErrorKind::ContractViolation,
                    format!("record at {key} has invalid packetId"),
                )
            })?;
        match kind.as_str() {
            TYPE_PUBREL => Ok(Some(Record::Pubrel { packet_id })),
            TYPE_PUBLISH => {
                let qos: u8 = get(FIELD_QOS).and_then(|v| v.parse().ok()).ok_or_else(|| {
                    Error::from_string(
                        ErrorKind::ContractViolation,
                        format!("record at {key} has invalid qos"),
                    )
                })?;
                let dup = get(FIELD_DUP).as_deref() == Some("1");
                let retain = get(FIELD_RETAIN).as_deref() == Some("1");
                let topic_name = get(FIELD_TOPIC_NAME).ok_or_else(|| {
                    Error::from_string(
                        ErrorKind::ContractViolation,
                        format!("record at {key} missing topicName"),
                    )
                })?;
                let payload = get(FIELD_PAYLOAD)
                    .ok_or_else(|| {
                        Error::from_string(
                            ErrorKind::ContractViolation,
                            format!("record at {key} missing payload"),
                        )
                    })
                    .and_then(|encoded| {
                        BASE64.decode(encoded).map_err(|err| {
                            Error::from_string(
                                ErrorKind::ContractViolation,
                                format!("record at {key} has invalid payload encoding: {err}"),
                            )
                        })
                    })?;
                Ok(Some(Record::Publish {
                    packet_id,
                    qos,
                    dup,
                    retain,
                    topic_name,
                    payload,
                }))
            }
            other => Err(Error::from_string(
                ErrorKind::ContractViolation,
                format!("record at {key} has unknown type {other:?}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kvs::memory::MemoryKvs;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_publish_record_roundtrip() {
        let kvs: SharedKvs = Arc::new(MemoryKvs::new());
        let record = Record::Publish {
            packet_id: 42,
            qos: 2,
            dup: false,
            retain: true,
            topic_name: "a/b".to_owned(),
            payload: vec![0, 159, 146, 150],
        };
        record.store(&kvs, "key").await.unwrap();
        let loaded = Record::load(&kvs, "key").await.unwrap();
        assert_eq!(loaded, Some(record));
    }

    #[tokio::test]
    async fn test_pubrel_record_roundtrip() {
        let kvs: SharedKvs = Arc::new(MemoryKvs::new());
        let record = Record::Pubrel { packet_id: 7 };
        record.store(&kvs, "key").await.unwrap();
        assert_eq!(Record::load(&kvs, "key").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let kvs: SharedKvs = Arc::new(MemoryKvs::new());
        assert_eq!(Record::load(&kvs, "absent").await.unwrap(), None);
    }
}
