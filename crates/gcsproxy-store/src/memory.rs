//! In-memory object store for development and testing

use crate::{
    ByteStream, GetOptions, ListEntry, ListPage, ListQuery, ObjectAttrs, ObjectReader,
    ObjectStore, PutOptions, Result, StoreError, DEFAULT_CONTENT_TYPE, MAX_LIST_RESULTS,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use dashmap::DashMap;
use futures::{stream, StreamExt};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

#[derive(Clone)]
struct StoredObject {
    attrs: ObjectAttrs,
    data: Bytes,
}

/// An in-memory object store
///
/// Generations come from a counter shared by all keys, so every write
/// produces a value never seen before in this store.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<DashMap<String, StoredObject>>,
    generation: Arc<AtomicI64>,
}

impl MemoryObjectStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of objects stored
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Store an object directly, bypassing the stream interface
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>, options: PutOptions) -> ObjectAttrs {
        let key = key.into();
        let data = data.into();
        let attrs = ObjectAttrs {
            key: key.clone(),
            size: data.len() as u64,
            content_type: Some(
                options
                    .content_type
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            ),
            content_encoding: options.content_encoding,
            content_disposition: options.content_disposition,
            content_language: options.content_language,
            cache_control: options.cache_control,
            updated: Some(Utc::now()),
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
            metadata: options.metadata,
        };
        self.objects.insert(
            key,
            StoredObject {
                attrs: attrs.clone(),
                data,
            },
        );
        attrs
    }

    /// Get the raw contents of an object
    pub fn data(&self, key: &str) -> Option<Bytes> {
        self.objects.get(key).map(|entry| entry.data.clone())
    }

    /// Get the attributes of an object
    pub fn attrs(&self, key: &str) -> Option<ObjectAttrs> {
        self.objects.get(key).map(|entry| entry.attrs.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, key: &str, options: &GetOptions) -> Result<ObjectReader> {
        let stored = self
            .objects
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        let generation = stored.attrs.generation;
        if options.generation_match.is_some_and(|expected| expected != generation) {
            return Err(StoreError::PreconditionFailed(key.to_string()));
        }
        if options.generation_not_match == Some(generation) {
            return Err(StoreError::NotModified(key.to_string()));
        }

        let (range, data) = match options.range {
            Some(requested) => {
                let range = requested
                    .resolve(stored.attrs.size)
                    .ok_or_else(|| StoreError::RangeNotSatisfiable(key.to_string()))?;
                let data = stored.data.slice(range.start as usize..=range.end as usize);
                (Some(range), data)
            }
            None => (None, stored.data),
        };

        Ok(ObjectReader {
            attrs: stored.attrs,
            range,
            body: stream::once(async move { Ok(data) }).boxed(),
        })
    }

    async fn put_object(
        &self,
        key: &str,
        options: PutOptions,
        mut body: ByteStream,
    ) -> Result<ObjectAttrs> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(self.insert(key, buf.freeze(), options))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn list_objects(&self, query: &ListQuery) -> Result<ListPage> {
        let delimiter = query.delimiter.as_deref().filter(|d| !d.is_empty());
        let mut entries: BTreeMap<String, ListEntry> = BTreeMap::new();

        for item in self.objects.iter() {
            let key = item.key();
            let Some(rest) = key.strip_prefix(query.prefix.as_str()) else {
                continue;
            };
            match delimiter.and_then(|d| rest.find(d).map(|idx| idx + d.len())) {
                Some(end) => {
                    let prefix = format!("{}{}", query.prefix, &rest[..end]);
                    entries
                        .entry(prefix.clone())
                        .or_insert(ListEntry::Prefix(prefix));
                }
                None => {
                    entries.insert(key.clone(), ListEntry::Object(item.value().attrs.clone()));
                }
            }
        }

        let max = query
            .max_results
            .unwrap_or(MAX_LIST_RESULTS)
            .clamp(1, MAX_LIST_RESULTS);
        let start_after = query.page_token.as_deref();
        let mut remaining = entries
            .into_iter()
            .filter(|(name, _)| start_after.map_or(true, |token| name.as_str() > token))
            .map(|(_, entry)| entry);

        let page: Vec<ListEntry> = remaining.by_ref().take(max).collect();
        let next_page_token = match remaining.next() {
            Some(_) => page.last().map(|entry| entry.name().to_string()),
            None => None,
        };

        Ok(ListPage {
            entries: page,
            next_page_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ByteRange;

    fn body(data: &'static str) -> ByteStream {
        stream::once(async move { Ok(Bytes::from_static(data.as_bytes())) }).boxed()
    }

    async fn read_all(reader: ObjectReader) -> Bytes {
        let mut buf = BytesMut::new();
        let mut body = reader.body;
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk.unwrap());
        }
        buf.freeze()
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryObjectStore::new();
        let attrs = store
            .put_object("docs/a.txt", PutOptions::with_content_type("text/plain"), body("hello"))
            .await
            .unwrap();
        assert_eq!(attrs.size, 5);
        assert_eq!(attrs.content_type.as_deref(), Some("text/plain"));

        let reader = store.get_object("docs/a.txt", &GetOptions::default()).await.unwrap();
        assert_eq!(reader.attrs.generation, attrs.generation);
        assert_eq!(read_all(reader).await, Bytes::from_static(b"hello"));

        store.delete_object("docs/a.txt").await.unwrap();
        let err = store.get_object("docs/a.txt", &GetOptions::default()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.delete_object("docs/a.txt").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_generations_change_on_write() {
        let store = MemoryObjectStore::new();
        let first = store.insert("k", "one", PutOptions::default());
        let second = store.insert("k", "two", PutOptions::default());
        assert_ne!(first.generation, second.generation);
        assert_eq!(second.content_type.as_deref(), Some(DEFAULT_CONTENT_TYPE));
    }

    #[tokio::test]
    async fn test_generation_preconditions() {
        let store = MemoryObjectStore::new();
        let attrs = store.insert("k", "data", PutOptions::default());

        let matching = GetOptions {
            generation_match: Some(attrs.generation),
            ..Default::default()
        };
        assert!(store.get_object("k", &matching).await.is_ok());

        let stale = GetOptions {
            generation_match: Some(attrs.generation + 1),
            ..Default::default()
        };
        assert!(matches!(
            store.get_object("k", &stale).await,
            Err(StoreError::PreconditionFailed(_))
        ));

        let not_match = GetOptions {
            generation_not_match: Some(attrs.generation),
            ..Default::default()
        };
        assert!(matches!(
            store.get_object("k", &not_match).await,
            Err(StoreError::NotModified(_))
        ));
    }

    #[tokio::test]
    async fn test_ranged_read() {
        let store = MemoryObjectStore::new();
        store.insert("k", "0123456789", PutOptions::default());

        let options = GetOptions {
            range: Some(ByteRange::FromTo(2, 4)),
            ..Default::default()
        };
        let reader = store.get_object("k", &options).await.unwrap();
        assert_eq!(reader.content_length(), 3);
        assert_eq!(read_all(reader).await, Bytes::from_static(b"234"));

        let options = GetOptions {
            range: Some(ByteRange::From(10)),
            ..Default::default()
        };
        assert!(matches!(
            store.get_object("k", &options).await,
            Err(StoreError::RangeNotSatisfiable(_))
        ));
    }

    #[tokio::test]
    async fn test_list_groups_prefixes() {
        let store = MemoryObjectStore::new();
        for key in ["a.txt", "docs/b.txt", "docs/c/d.txt", "docs/e.txt", "z.txt"] {
            store.insert(key, "x", PutOptions::default());
        }

        let page = store
            .list_objects(&ListQuery {
                prefix: "docs/".to_string(),
                delimiter: Some("/".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let names: Vec<_> = page.entries.iter().map(ListEntry::name).collect();
        assert_eq!(names, vec!["docs/b.txt", "docs/c/", "docs/e.txt"]);
        assert!(matches!(page.entries[1], ListEntry::Prefix(_)));
        assert!(page.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let store = MemoryObjectStore::new();
        for i in 0..5 {
            store.insert(format!("f{i}"), "x", PutOptions::default());
        }

        let mut query = ListQuery {
            max_results: Some(2),
            ..Default::default()
        };
        let mut seen = Vec::new();
        loop {
            let page = store.list_objects(&query).await.unwrap();
            seen.extend(page.entries.iter().map(|e| e.name().to_string()));
            match page.next_page_token {
                Some(token) => query.page_token = Some(token),
                None => break,
            }
        }
        assert_eq!(seen, vec!["f0", "f1", "f2", "f3", "f4"]);
    }
}
