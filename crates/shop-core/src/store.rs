//! # Storage Collaborator
//!
//! A capability interface generic over record types. Workflows open a
//! [`UnitOfWork`], express reads as explicit per-entity query structs, stage
//! writes, and commit once. Dropping a unit of work without committing
//! discards everything it staged.
//!
//! ```text
//! Store::begin() ──► UnitOfWork ──► query / find_one / add / update / delete
//!                                   └──► commit()   (all or nothing)
//! ```

use crate::error::{ShopError, ShopResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

/// An entity the storage collaborator can hold.
///
/// Each record type names its table, derives a unique key, and declares the
/// criteria struct callers use to select it.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Table name
    const KIND: &'static str;

    /// Query criteria for this entity
    type Query: Send + Sync;

    /// Primary key, unique within [`Record::KIND`]
    fn key(&self) -> String;

    /// Whether this record satisfies the criteria
    fn matches(&self, query: &Self::Query) -> bool;
}

/// One atomic unit of work against the store
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// All records matching the criteria, in key order
    async fn query<R: Record>(&self, query: &R::Query) -> ShopResult<Vec<R>>;

    /// First record matching the criteria
    async fn find_one<R: Record>(&self, query: &R::Query) -> ShopResult<Option<R>> {
        Ok(self.query::<R>(query).await?.into_iter().next())
    }

    /// Stage an insert. Fails if the key already exists.
    async fn add<R: Record>(&mut self, record: R) -> ShopResult<()>;

    /// Stage a replacement. Fails if the key does not exist.
    async fn update<R: Record>(&mut self, record: R) -> ShopResult<()>;

    /// Stage a delete. Fails if the key does not exist.
    async fn delete<R: Record>(&mut self, record: &R) -> ShopResult<()>;

    /// Make every staged change visible at once
    async fn commit(self) -> ShopResult<()>
    where
        Self: Sized;
}

/// Factory for units of work
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    type Tx: UnitOfWork;

    /// Open a unit of work. Concurrent units of work on the same store are
    /// isolated from each other's staged changes.
    async fn begin(&self) -> ShopResult<Self::Tx>;
}

/// Run a collaborator call under a deadline, surfacing expiry as
/// [`ShopError::ExternalService`].
pub async fn within<T, F>(limit: Duration, service: &'static str, fut: F) -> ShopResult<T>
where
    F: Future<Output = ShopResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ShopError::external(
            service,
            format!("timed out after {}ms", limit.as_millis()),
        )),
    }
}

/// Insert a batch of records in a single unit of work
pub async fn insert_all<S, R>(store: &S, records: impl IntoIterator<Item = R>) -> ShopResult<usize>
where
    S: Store,
    R: Record,
{
    let mut tx = store.begin().await?;
    let mut count = 0;
    for record in records {
        tx.add(record).await?;
        count += 1;
    }
    tx.commit().await?;
    Ok(count)
}
