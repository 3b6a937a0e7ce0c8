use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::persistence::{AggregateStore, Counter, add};
use crate::utils::error::StoreError;

#[derive(Debug, Default)]
struct Counters {
    scalars: HashMap<String, i64>,
    hashes: HashMap<String, HashMap<String, i64>>,
    texts: HashMap<String, HashMap<String, String>>,
}

impl Counters {
    fn value(&self, counter: &Counter<'_>) -> i64 {
        let current = match counter {
            Counter::Key(key) => self.scalars.get(*key),
            Counter::Field { hash, field } => {
                self.hashes.get(*hash).and_then(|fields| fields.get(*field))
            }
        };
        current.copied().unwrap_or(0)
    }

    fn slot(&mut self, counter: &Counter<'_>) -> &mut i64 {
        match counter {
            Counter::Key(key) => self.scalars.entry(key.to_string()).or_insert(0),
            Counter::Field { hash, field } => self
                .hashes
                .entry(hash.to_string())
                .or_default()
                .entry(field.to_string())
                .or_insert(0),
        }
    }
}

/// In-process aggregate store.
///
/// Each operation runs under one lock, which gives the same per-key atomicity
/// the external store offers. Can be switched unavailable to exercise store
/// failures.
#[derive(Debug)]
pub struct MemoryStore {
    counters: Mutex<Counters>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            available: AtomicBool::new(true),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Names of the text hashes starting with `prefix`, sorted.
    pub fn text_hashes(&self, prefix: &str) -> Vec<String> {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = counters
            .texts
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn counters(&self) -> Result<MutexGuard<'_, Counters>, StoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        Ok(self.counters.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

fn name<'a>(counter: &Counter<'a>) -> &'a str {
    match counter {
        Counter::Key(key) => *key,
        Counter::Field { field, .. } => *field,
    }
}

#[async_trait]
impl AggregateStore for MemoryStore {
    async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut counters = self.counters()?;
        let value = counters.slot(&Counter::Key(key));
        *value = add(key, *value, delta)?;
        Ok(*value)
    }

    async fn hincr(&self, hash: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        let mut counters = self.counters()?;
        let value = counters.slot(&Counter::Field { hash, field });
        *value = add(field, *value, delta)?;
        Ok(*value)
    }

    async fn incr_all(&self, targets: &[Counter<'_>], delta: i64) -> Result<(), StoreError> {
        let mut counters = self.counters()?;

        // every sum is checked before anything is written
        let mut staged: HashMap<Counter<'_>, i64> = HashMap::new();
        for counter in targets {
            let current = staged
                .get(counter)
                .copied()
                .unwrap_or_else(|| counters.value(counter));
            staged.insert(*counter, add(name(counter), current, delta)?);
        }

        for (counter, value) in staged {
            *counters.slot(&counter) = value;
        }
        Ok(())
    }

    async fn hset_all(&self, hash: &str, fields: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut counters = self.counters()?;
        let entry = counters.texts.entry(hash.to_string()).or_default();
        for (field, value) in fields {
            entry.insert(field.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.counters()?.scalars.get(key).copied())
    }

    async fn hget(&self, hash: &str, field: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .counters()?
            .hashes
            .get(hash)
            .and_then(|fields| fields.get(field))
            .copied())
    }

    async fn hgetall(&self, hash: &str) -> Result<HashMap<String, i64>, StoreError> {
        Ok(self.counters()?.hashes.get(hash).cloned().unwrap_or_default())
    }

    async fn hgetall_text(&self, hash: &str) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.counters()?.texts.get(hash).cloned().unwrap_or_default())
    }
}
