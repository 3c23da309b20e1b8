// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! `Kvs` implementation backed by Redis, behind the `redis_conn` feature.
//!
//! Uses `redis::aio::ConnectionManager`, which reconnects transparently and
//! is cheap to clone, so every call below clones it into a short-lived
//! local binding rather than holding a lock across an await point — the
//! core must never issue a blocking command on a connection shared by
//! concurrent callers (spec §5).

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

use crate::config::KvsConfig;
use crate::error::{Error, ErrorKind};
use crate::scripts;

use async_trait::async_trait;

use super::{Kvs, ScanPage};

pub struct RedisKvs {
    conn: ConnectionManager,
    checkdel: Script,
    incrlimit: Script,
}

impl RedisKvs {
    pub async fn connect(config: &KvsConfig) -> Result<Self, Error> {
        let mut url = format!("redis://{}/{}", config.server, config.database);
        if let Some(password) = &config.password {
            url = format!("redis://:{password}@{}/{}", config.server, config.database);
        }
        let client = Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        log::info!("kvs/redis: connected to {}", config.server);
        Ok(RedisKvs {
            conn,
            checkdel: Script::new(scripts::CHECKDEL),
            incrlimit: Script::new(scripts::INCRLIMIT),
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl Kvs for RedisKvs {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.conn().get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.conn().set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, Error> {
        let removed: u64 = self.conn().del(key).await?;
        Ok(removed > 0)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, Error> {
        Ok(self.conn().hget(key, field).await?)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), Error> {
        self.conn().hset::<_, _, _, ()>(key, field, value).await?;
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, Error> {
        let removed: u64 = self.conn().hdel(key, field).await?;
        Ok(removed > 0)
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, Error> {
        let map: std::collections::HashMap<String, String> = self.conn().hgetall(key).await?;
        Ok(map.into_iter().collect())
    }

    async fn hincrby_clamped(&self, key: &str, field: &str, delta: i64) -> Result<i64, Error> {
        let new_value: i64 = self.conn().hincr(key, field, delta).await?;
        if new_value < 0 {
            log::warn!(
                "kvs/redis: counter {key}[{field}] drifted negative ({new_value}), clamping to 0"
            );
            self.conn().hset::<_, _, _, ()>(key, field, 0).await?;
            return Ok(0);
        }
        Ok(new_value)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, Error> {
        let added: u64 = self.conn().sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, Error> {
        let removed: u64 = self.conn().srem(key, member).await?;
        Ok(removed > 0)
    }

    async fn sscan(&self, key: &str, cursor: u64, count: usize) -> Result<ScanPage, Error> {
        let (next, members): (u64, Vec<String>) = redis::cmd("SSCAN")
            .arg(key)
            .arg(cursor)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut self.conn())
            .await?;
        Ok(ScanPage {
            cursor: next,
            members,
        })
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<(), Error> {
        self.conn().rpush::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.conn().lpop(key, None).await?)
    }

    async fn lrem_all(&self, key: &str, value: &str) -> Result<u64, Error> {
        // count = 0 means "remove all occurrences" (per LREM semantics).
        Ok(self.conn().lrem(key, 0, value).await?)
    }

    async fn lrange_all(&self, key: &str) -> Result<Vec<String>, Error> {
        Ok(self.conn().lrange(key, 0, -1).await?)
    }

    async fn checkdel(&self, key: &str, expected: &str) -> Result<bool, Error> {
        let result: i64 = self
            .checkdel
            .key(key)
            .arg(expected)
            .invoke_async(&mut self.conn())
            .await?;
        Ok(result == 1)
    }

    async fn incrlimit(&self, key: &str, limit: i64) -> Result<i64, Error> {
        let result: i64 = self
            .incrlimit
            .key(key)
            .arg(limit)
            .invoke_async(&mut self.conn())
            .await
            .map_err(|err| {
                Error::from_string(ErrorKind::Transport, format!("incrlimit script failed: {err}"))
            })?;
        Ok(result)
    }
}
