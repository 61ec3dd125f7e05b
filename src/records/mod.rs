//! Record store integration
//!
//! `RecordService` is the raw JSON seam to the remote REST API, implemented
//! by `RecordClient` (HTTP) and `MockRecordClient` (in memory). `RecordStore`
//! layers the typed, validated operations on top of it.

pub mod client;
pub mod mock;
pub mod store;

pub use client::RecordClient;
pub use mock::MockRecordClient;
pub use store::RecordStore;

use crate::models::Collection;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;

/// PATCH sends only the changed fields, PUT the full record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    Patch,
    Put,
}

#[async_trait]
pub trait RecordService: Send + Sync {
    async fn list(&self, collection: Collection) -> Result<Vec<Value>>;
    async fn get(&self, collection: Collection, id: u64) -> Result<Value>;
    async fn create(&self, collection: Collection, body: &Value) -> Result<Value>;
    async fn update(
        &self,
        collection: Collection,
        id: u64,
        body: &Value,
        mode: UpdateMode,
    ) -> Result<Value>;
    /// `Error::NotFound` when the record does not exist.
    async fn delete(&self, collection: Collection, id: u64) -> Result<()>;
}
