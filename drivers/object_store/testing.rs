//! In-memory object store for driver tests / 测试用内存对象存储
//!
//! Implements `ObjectApi` over sorted in-memory maps, including delimiter
//! grouping and token pagination, so adapter semantics are exercised without
//! a network. Counters expose how often each primitive was hit.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::client::{ListRequest, ListedObject, ListingPage, ObjectApi, ObjectMeta};
use crate::error::{VfsError, VfsResult};
use crate::params::{AccessControl, RequestParams};

/// One stored object plus the parameters it was uploaded with / 存储的对象
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
    pub access_control: Option<AccessControl>,
    pub cache_control: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Counters {
    get: u32,
    head: u32,
    list: u32,
    container: u32,
}

#[derive(Default)]
struct Inner {
    containers: HashMap<String, BTreeMap<String, StoredObject>>,
    deny_writes: bool,
    counters: Counters,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    inner: Mutex<Inner>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, container: &str, key: &str, data: Vec<u8>) {
        let mut inner = self.inner.lock().await;
        inner.containers.entry(container.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: crate::vfs::detect_content_type(key),
                access_control: None,
                cache_control: None,
                expires: None,
                modified: Utc::now(),
            },
        );
    }

    pub async fn stored(&self, container: &str, key: &str) -> Option<StoredObject> {
        let inner = self.inner.lock().await;
        inner.containers.get(container)?.get(key).cloned()
    }

    pub async fn deny_writes(&self, deny: bool) {
        self.inner.lock().await.deny_writes = deny;
    }

    pub async fn get_count(&self) -> u32 {
        self.inner.lock().await.counters.get
    }

    pub async fn head_count(&self) -> u32 {
        self.inner.lock().await.counters.head
    }

    pub async fn list_count(&self) -> u32 {
        self.inner.lock().await.counters.list
    }

    pub async fn container_count(&self) -> u32 {
        self.inner.lock().await.counters.container
    }
}

fn loc(container: &str, key: &str) -> String {
    format!("{}/{}", container, key)
}

#[async_trait]
impl ObjectApi for MemoryObjectStore {
    async fn get(
        &self,
        container: &str,
        key: &str,
        range: Option<Range<u64>>,
    ) -> VfsResult<Bytes> {
        let mut inner = self.inner.lock().await;
        inner.counters.get += 1;
        let object = inner
            .containers
            .get(container)
            .and_then(|objects| objects.get(key))
            .ok_or_else(|| VfsError::not_found(loc(container, key)))?;

        let data = match range {
            Some(r) => {
                let len = object.data.len();
                let start = (r.start as usize).min(len);
                let end = (r.end as usize).min(len);
                object.data[start..end].to_vec()
            }
            None => object.data.clone(),
        };
        Ok(Bytes::from(data))
    }

    async fn head(&self, container: &str, key: &str) -> VfsResult<ObjectMeta> {
        let mut inner = self.inner.lock().await;
        inner.counters.head += 1;
        let object = inner
            .containers
            .get(container)
            .and_then(|objects| objects.get(key))
            .ok_or_else(|| VfsError::not_found(loc(container, key)))?;

        Ok(ObjectMeta {
            size: object.data.len() as u64,
            modified: Some(object.modified),
            content_type: object.content_type.clone(),
        })
    }

    async fn put(
        &self,
        container: &str,
        key: &str,
        body: Bytes,
        params: &RequestParams,
    ) -> VfsResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.deny_writes {
            return Err(VfsError::permission_denied(loc(container, key)));
        }
        inner.containers.entry(container.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                data: body.to_vec(),
                content_type: params.content_type.clone(),
                access_control: params.access_control,
                cache_control: params.cache_control.clone(),
                expires: params.expires,
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, container: &str, key: &str) -> VfsResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(objects) = inner.containers.get_mut(container) {
            objects.remove(key);
        }
        Ok(())
    }

    async fn copy(
        &self,
        src_container: &str,
        src_key: &str,
        dst_container: &str,
        dst_key: &str,
    ) -> VfsResult<()> {
        let mut inner = self.inner.lock().await;
        let mut object = inner
            .containers
            .get(src_container)
            .and_then(|objects| objects.get(src_key))
            .cloned()
            .ok_or_else(|| VfsError::not_found(loc(src_container, src_key)))?;
        object.modified = Utc::now();
        inner
            .containers
            .entry(dst_container.to_string())
            .or_default()
            .insert(dst_key.to_string(), object);
        Ok(())
    }

    async fn list_page(&self, container: &str, request: &ListRequest) -> VfsResult<ListingPage> {
        let mut inner = self.inner.lock().await;
        inner.counters.list += 1;

        let mut objects = Vec::new();
        let mut prefixes: BTreeSet<String> = BTreeSet::new();
        let mut count: i32 = 0;
        let mut truncated = false;
        let mut last_key: Option<String> = None;

        if let Some(stored) = inner.containers.get(container) {
            for (key, object) in stored.iter() {
                if !key.starts_with(&request.prefix) {
                    continue;
                }
                if let Some(token) = &request.token {
                    if key.as_str() <= token.as_str() {
                        continue;
                    }
                }

                let rest = &key[request.prefix.len()..];
                let grouped = request
                    .delimiter
                    .as_ref()
                    .and_then(|d| rest.find(d.as_str()).map(|i| &key[..request.prefix.len() + i + d.len()]));

                // A repeated common prefix advances the cursor but does not
                // count toward max_keys again.
                if let Some(p) = grouped {
                    if prefixes.contains(p) {
                        last_key = Some(key.clone());
                        continue;
                    }
                }

                if count >= request.max_keys {
                    truncated = true;
                    break;
                }

                match grouped {
                    Some(p) => {
                        prefixes.insert(p.to_string());
                    }
                    None => objects.push(ListedObject {
                        key: key.clone(),
                        size: object.data.len() as u64,
                        modified: Some(object.modified),
                    }),
                }
                count += 1;
                last_key = Some(key.clone());
            }
        }

        Ok(ListingPage {
            objects,
            prefixes: prefixes.into_iter().collect(),
            next_token: if truncated { last_key } else { None },
            truncated,
        })
    }

    async fn container_exists(&self, container: &str) -> VfsResult<bool> {
        let mut inner = self.inner.lock().await;
        inner.counters.container += 1;
        Ok(inner.containers.contains_key(container))
    }
}
