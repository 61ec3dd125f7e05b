//! Asset storage integration
//!
//! Client side of the asset storage service: uploads files, deletes them by
//! filename and lists what is stored for a kind.

pub mod client;
pub mod mock;

pub use client::AssetClient;
pub use mock::MockAssetClient;

use crate::models::{AssetKind, AssetReference, FileUpload};
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait AssetService: Send + Sync {
    /// Store `file` and return the canonical reference the service assigned.
    async fn upload(&self, kind: AssetKind, file: &FileUpload) -> Result<AssetReference>;
    /// Idempotent: `Ok(false)` when the file was already gone.
    async fn delete(&self, kind: AssetKind, filename: &str) -> Result<bool>;
    async fn list(&self, kind: AssetKind) -> Result<Vec<String>>;
}
