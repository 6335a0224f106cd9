//! # gcsproxy store
//!
//! Object storage access layer used by the gcsproxy gateway.
//!
//! This crate provides:
//! - **ObjectStore trait**: fetch, conditional fetch, write, delete and
//!   prefix listing, each returning object attributes or a not-found signal
//! - **GcsObjectStore**: Google Cloud Storage JSON API client
//! - **MemoryObjectStore**: in-memory backend for development and tests
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            gcsproxy gateway             │
//! ├─────────────────────────────────────────┤
//! │           ObjectStore Trait             │
//! ├────────────────────┬────────────────────┤
//! │   GcsObjectStore   │ MemoryObjectStore  │
//! ├────────────────────┴────────────────────┤
//! │     storage.googleapis.com / RAM        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use gcsproxy_store::{GcsConfig, GcsObjectStore, GetOptions, ObjectStore};
//!
//! let store = GcsObjectStore::new(GcsConfig::with_bucket("my-bucket"))?;
//! let reader = store.get_object("index.html", &GetOptions::default()).await?;
//! println!("generation {}", reader.attrs.generation);
//! ```

pub mod auth;
pub mod error;
pub mod gcs;
pub mod memory;
pub mod types;

pub use auth::{ServiceAccountKey, TokenSource};
pub use error::{Result, StoreError};
pub use gcs::{GcsConfig, GcsObjectStore};
pub use memory::MemoryObjectStore;
pub use types::{
    ByteRange, ByteStream, ContentRange, GetOptions, ListEntry, ListPage, ListQuery,
    ObjectAttrs, ObjectReader, PutOptions, DEFAULT_CONTENT_TYPE,
};

use async_trait::async_trait;

/// Delimiter used to group keys into "directories"
pub const DEFAULT_DELIMITER: &str = "/";

/// Largest page size a listing may ask for
pub const MAX_LIST_RESULTS: usize = 1000;

/// Trait for object storage backends
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open an object for reading, honoring generation preconditions and range
    async fn get_object(&self, key: &str, options: &GetOptions) -> Result<ObjectReader>;

    /// Write an object from a body stream and return its new attributes
    async fn put_object(&self, key: &str, options: PutOptions, body: ByteStream)
        -> Result<ObjectAttrs>;

    /// Delete an object
    async fn delete_object(&self, key: &str) -> Result<()>;

    /// List one page of keys under a prefix
    async fn list_objects(&self, query: &ListQuery) -> Result<ListPage>;

    /// Release resources held by the client
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
