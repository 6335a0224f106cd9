//! Store double for failure paths the in-memory store cannot produce

use async_trait::async_trait;
use gcsproxy_store::{
    ByteStream, GetOptions, ListPage, ListQuery, MemoryObjectStore, ObjectAttrs, ObjectReader,
    ObjectStore, PutOptions, Result, StoreError,
};
use std::collections::HashSet;

/// Delegates to a [`MemoryObjectStore`], except that reads of the chosen
/// keys fail with a 503 from the storage API
#[derive(Clone, Default)]
pub struct FailingStore {
    pub inner: MemoryObjectStore,
    failing: HashSet<String>,
}

impl FailingStore {
    pub fn failing<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: MemoryObjectStore::new(),
            failing: keys.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ObjectStore for FailingStore {
    async fn get_object(&self, key: &str, options: &GetOptions) -> Result<ObjectReader> {
        if self.failing.contains(key) {
            return Err(StoreError::Api {
                status: 503,
                message: format!("backend unavailable: {key}"),
            });
        }
        self.inner.get_object(key, options).await
    }

    async fn put_object(
        &self,
        key: &str,
        options: PutOptions,
        body: ByteStream,
    ) -> Result<ObjectAttrs> {
        self.inner.put_object(key, options, body).await
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.inner.delete_object(key).await
    }

    async fn list_objects(&self, query: &ListQuery) -> Result<ListPage> {
        self.inner.list_objects(query).await
    }
}
