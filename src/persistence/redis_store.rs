//! Aggregate store backed by Redis (or any server speaking its protocol, such
//! as Valkey). `INCRBY` and `HINCRBY` are atomic on the server; `incr_all`
//! wraps several of them in a `MULTI`/`EXEC` pipeline.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::persistence::{AggregateStore, Counter};
use crate::utils::error::StoreError;

/// `ConnectionManager` multiplexes commands over one connection and
/// reconnects on its own, so the store is cheap to clone into every worker.
#[derive(Clone)]
pub struct RedisStore {
    con: ConnectionManager,
}

impl RedisStore {
    /// Connects to `url` (e.g. `redis://127.0.0.1:6379`) and checks the
    /// server answers before handing out the store.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let mut con = ConnectionManager::new(client).await?;
        let _: () = redis::cmd("PING").query_async(&mut con).await?;
        Ok(Self { con })
    }
}

#[async_trait]
impl AggregateStore for RedisStore {
    async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut con = self.con.clone();
        Ok(con.incr(key, delta).await?)
    }

    async fn hincr(&self, hash: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        let mut con = self.con.clone();
        Ok(con.hincr(hash, field, delta).await?)
    }

    async fn incr_all(&self, counters: &[Counter<'_>], delta: i64) -> Result<(), StoreError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for counter in counters {
            match *counter {
                Counter::Key(key) => pipe.incr(key, delta).ignore(),
                Counter::Field { hash, field } => pipe.hincr(hash, field, delta).ignore(),
            };
        }

        let mut con = self.con.clone();
        let _: () = pipe.query_async(&mut con).await?;
        Ok(())
    }

    async fn hset_all(&self, hash: &str, fields: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let _: () = con.hset_multiple(hash, fields).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut con = self.con.clone();
        Ok(con.get(key).await?)
    }

    async fn hget(&self, hash: &str, field: &str) -> Result<Option<i64>, StoreError> {
        let mut con = self.con.clone();
        Ok(con.hget(hash, field).await?)
    }

    async fn hgetall(&self, hash: &str) -> Result<HashMap<String, i64>, StoreError> {
        let mut con = self.con.clone();
        Ok(con.hgetall(hash).await?)
    }

    async fn hgetall_text(&self, hash: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut con = self.con.clone();
        Ok(con.hgetall(hash).await?)
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("con", &"redis::aio::ConnectionManager")
            .finish()
    }
}
