//! Aggregate store backed by `sled`
//!
//! Scalar counters live in the default tree, keyed by name. Each hash gets a
//! tree of its own (`hash/<name>`), keyed by field. Values are big-endian
//! `i64`s. Increments go through `update_and_fetch`, which retries its
//! compare-and-swap until it wins, so concurrent increments are never lost.
//! `incr_all` runs one transaction over every tree it touches.
//!
//! Text hashes share the `records` tree, keyed by `<hash>\x1f<field>`.

use std::collections::HashMap;

use async_trait::async_trait;
use sled::transaction::ConflictableTransactionError::Abort;
use sled::transaction::{ConflictableTransactionResult, TransactionError};
use sled::{Batch, Db, IVec, Transactional, Tree};

use crate::persistence::{AggregateStore, Counter, add};
use crate::utils::error::StoreError;

const RECORDS_TREE: &str = "records";
const RECORD_SEPARATOR: char = '\x1f';

#[derive(Clone)]
pub struct SledStore {
    db: Db,
}

impl SledStore {
    /// Open or create a sled database at `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Blocks until all pending writes are on disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    fn hash_tree(&self, hash: &str) -> Result<Tree, StoreError> {
        Ok(self.db.open_tree(format!("hash/{hash}"))?)
    }

    fn tree_for(&self, counter: &Counter<'_>) -> Result<Tree, StoreError> {
        match counter {
            Counter::Key(_) => Ok((*self.db).clone()),
            Counter::Field { hash, .. } => self.hash_tree(hash),
        }
    }
}

fn record_prefix(hash: &str) -> String {
    format!("{hash}{RECORD_SEPARATOR}")
}

/// Adds `delta` to the counter at `key` in `tree`. A corrupt or overflowing
/// counter is left as it was.
fn increment(tree: &Tree, key: &str, delta: i64) -> Result<i64, StoreError> {
    let mut failure = None;
    let updated = tree.update_and_fetch(key, |old| {
        let current = match old {
            None => 0,
            Some(bytes) => match <[u8; 8]>::try_from(bytes) {
                Ok(raw) => i64::from_be_bytes(raw),
                Err(_) => {
                    failure = Some(StoreError::Corrupt(key.to_string()));
                    return Some(bytes.to_vec());
                }
            },
        };
        match add(key, current, delta) {
            Ok(next) => {
                failure = None;
                Some(next.to_be_bytes().to_vec())
            }
            Err(e) => {
                failure = Some(e);
                old.map(<[u8]>::to_vec)
            }
        }
    })?;

    if let Some(e) = failure {
        return Err(e);
    }
    match updated {
        Some(bytes) => decode(key, &bytes),
        None => Err(StoreError::Corrupt(key.to_string())),
    }
}

fn decode(key: &str, bytes: &IVec) -> Result<i64, StoreError> {
    <[u8; 8]>::try_from(bytes.as_ref())
        .map(i64::from_be_bytes)
        .map_err(|_| StoreError::Corrupt(key.to_string()))
}

#[async_trait]
impl AggregateStore for SledStore {
    async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        increment(&self.db, key, delta)
    }

    async fn hincr(&self, hash: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        increment(&self.hash_tree(hash)?, field, delta)
    }

    async fn incr_all(&self, counters: &[Counter<'_>], delta: i64) -> Result<(), StoreError> {
        let mut names: Vec<Option<&str>> = Vec::new();
        let mut trees: Vec<Tree> = Vec::new();
        let mut targets: Vec<(usize, &str)> = Vec::with_capacity(counters.len());
        for counter in counters {
            let (tree_name, key) = match *counter {
                Counter::Key(key) => (None, key),
                Counter::Field { hash, field } => (Some(hash), field),
            };
            let index = match names.iter().position(|name| *name == tree_name) {
                Some(index) => index,
                None => {
                    names.push(tree_name);
                    trees.push(self.tree_for(counter)?);
                    trees.len() - 1
                }
            };
            targets.push((index, key));
        }

        let result = trees.as_slice().transaction(
            |views| -> ConflictableTransactionResult<(), StoreError> {
                for &(index, key) in &targets {
                    let view = &views[index];
                    let current = match view.get(key)? {
                        Some(bytes) => decode(key, &bytes).map_err(Abort)?,
                        None => 0,
                    };
                    let next = add(key, current, delta).map_err(Abort)?;
                    view.insert(key, next.to_be_bytes().to_vec())?;
                }
                Ok(())
            },
        );

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(StoreError::Sled(e)),
        }
    }

    async fn hset_all(&self, hash: &str, fields: &[(&str, &str)]) -> Result<(), StoreError> {
        let prefix = record_prefix(hash);
        let mut batch = Batch::default();
        for (field, value) in fields {
            batch.insert(format!("{prefix}{field}").as_bytes(), value.as_bytes());
        }
        self.db.open_tree(RECORDS_TREE)?.apply_batch(batch)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.db
            .get(key)?
            .map(|bytes| decode(key, &bytes))
            .transpose()
    }

    async fn hget(&self, hash: &str, field: &str) -> Result<Option<i64>, StoreError> {
        self.hash_tree(hash)?
            .get(field)?
            .map(|bytes| decode(field, &bytes))
            .transpose()
    }

    async fn hgetall(&self, hash: &str) -> Result<HashMap<String, i64>, StoreError> {
        let mut fields = HashMap::new();
        for entry in self.hash_tree(hash)?.iter() {
            let (key, value) = entry?;
            let field = String::from_utf8_lossy(&key).into_owned();
            let count = decode(&field, &value)?;
            fields.insert(field, count);
        }
        Ok(fields)
    }

    async fn hgetall_text(&self, hash: &str) -> Result<HashMap<String, String>, StoreError> {
        let prefix = record_prefix(hash);
        let mut fields = HashMap::new();
        for entry in self.db.open_tree(RECORDS_TREE)?.scan_prefix(&prefix) {
            let (key, value) = entry?;
            let field = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            fields.insert(field, String::from_utf8_lossy(&value).into_owned());
        }
        Ok(fields)
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("db", &"sled::Db")
            .finish()
    }
}
