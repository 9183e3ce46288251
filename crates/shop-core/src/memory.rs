//! # In-Memory Store
//!
//! Map-of-maps implementation of [`Store`]: one ordered table per record
//! kind, rows held as JSON values keyed by [`Record::key`].
//!
//! Units of work are serialized through an owned async mutex. Each one
//! stages its writes on a private copy of the tables, and `commit` swaps the
//! copy in. Concurrent check-then-act sequences (promotion reuse, one-time
//! code rate limiting) therefore cannot interleave.

use crate::error::{ShopError, ShopResult};
use crate::store::{Record, Store, UnitOfWork};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

type Table = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Default, Clone)]
struct Tables {
    by_kind: HashMap<&'static str, Table>,
}

/// In-memory storage collaborator
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Unit of work over a [`MemoryStore`]
pub struct MemoryUnitOfWork {
    committed: OwnedMutexGuard<Tables>,
    working: Tables,
    staged: usize,
}

impl MemoryUnitOfWork {
    fn table_mut(&mut self, kind: &'static str) -> &mut Table {
        self.working.by_kind.entry(kind).or_default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryUnitOfWork;

    async fn begin(&self) -> ShopResult<MemoryUnitOfWork> {
        let committed = Arc::clone(&self.tables).lock_owned().await;
        let working = committed.clone();
        Ok(MemoryUnitOfWork {
            committed,
            working,
            staged: 0,
        })
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn query<R: Record>(&self, query: &R::Query) -> ShopResult<Vec<R>> {
        let Some(table) = self.working.by_kind.get(R::KIND) else {
            return Ok(Vec::new());
        };

        let mut rows = Vec::new();
        for value in table.values() {
            let record: R = serde_json::from_value(value.clone())?;
            if record.matches(query) {
                rows.push(record);
            }
        }
        Ok(rows)
    }

    async fn add<R: Record>(&mut self, record: R) -> ShopResult<()> {
        let key = record.key();
        let value = serde_json::to_value(&record)?;
        let table = self.table_mut(R::KIND);
        if table.contains_key(&key) {
            return Err(ShopError::Storage(format!(
                "duplicate key {key} in {}",
                R::KIND
            )));
        }
        table.insert(key, value);
        self.staged += 1;
        Ok(())
    }

    async fn update<R: Record>(&mut self, record: R) -> ShopResult<()> {
        let key = record.key();
        let value = serde_json::to_value(&record)?;
        let table = self.table_mut(R::KIND);
        match table.get_mut(&key) {
            Some(row) => *row = value,
            None => {
                return Err(ShopError::Storage(format!(
                    "no row {key} in {} to update",
                    R::KIND
                )))
            }
        }
        self.staged += 1;
        Ok(())
    }

    async fn delete<R: Record>(&mut self, record: &R) -> ShopResult<()> {
        let key = record.key();
        if self.table_mut(R::KIND).remove(&key).is_none() {
            return Err(ShopError::Storage(format!(
                "no row {key} in {} to delete",
                R::KIND
            )));
        }
        self.staged += 1;
        Ok(())
    }

    async fn commit(self) -> ShopResult<()> {
        let Self {
            mut committed,
            working,
            staged,
        } = self;
        *committed = working;
        trace!(staged, "unit of work committed");
        Ok(())
    }
}
