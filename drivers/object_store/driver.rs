//! Object-store driver core / 对象存储驱动核心
//!
//! Maps the filesystem contract onto a flat key space: directories are
//! emulated with delimiter-bounded prefix listings and zero-byte placeholder
//! keys, metadata lookups go through the shared LRU cache, and every backend
//! failure is translated before it reaches a caller.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;

use super::client::{ListRequest, ObjectApi, ObjectStoreClient};
use super::config::ObjectStoreConfig;
use super::dir::ObjectDir;
use super::file::{BufferBody, FileBody, ObjectFile, RemoteBody};
use crate::cache::StatCache;
use crate::error::{report, VfsError, VfsResult};
use crate::params::{AccessControl, RequestParams};
use crate::path::VfsPath;
use crate::vfs::{
    EntryKind, ObserverSet, OpenMode, StatEntry, VfsDir, VfsDriver, VfsFile, WriteObserver,
};

/// 对象存储驱动
pub struct ObjectStoreDriver {
    api: Arc<dyn ObjectApi>,
    cache: Arc<StatCache>,
    defaults: RequestParams,
    expires_seconds: Option<i64>,
    page_size: i32,
    read_chunk_size: usize,
    observers: ObserverSet,
}

impl ObjectStoreDriver {
    /// Build over an already-constructed API client / 基于现成客户端构建
    pub fn new(api: Arc<dyn ObjectApi>, config: &ObjectStoreConfig) -> Self {
        let defaults = RequestParams {
            access_control: config.default_acl,
            cache_control: config.cache_control.clone(),
            ..Default::default()
        };
        Self {
            api,
            cache: Arc::new(StatCache::new(config.cache_capacity)),
            defaults,
            expires_seconds: config.expires_seconds,
            page_size: config.page_size,
            read_chunk_size: config.read_chunk_size,
            observers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Resolve credentials and build the SDK-backed driver / 创建驱动实例
    pub async fn connect(config: ObjectStoreConfig) -> anyhow::Result<Self> {
        let client = ObjectStoreClient::connect(&config).await?;
        Ok(Self::new(Arc::new(client), &config))
    }

    /// Shared metadata cache, exposed for host diagnostics / 元数据缓存
    pub fn stat_cache(&self) -> &Arc<StatCache> {
        &self.cache
    }

    /// Effective parameters: path query override > per-call set > defaults
    /// 参数合并：路径查询 > 调用参数 > 进程默认
    fn merge(&self, parsed: &VfsPath, call: &RequestParams) -> RequestParams {
        let mut merged = parsed.overrides.overlay(&call.overlay(&self.defaults));
        if merged.expires.is_none() {
            if let Some(secs) = self.expires_seconds {
                merged.expires = Some(Utc::now() + chrono::Duration::seconds(secs));
            }
        }
        merged
    }

    /// Object metadata through the cache; misses issue a HEAD / 经缓存的对象元数据
    async fn object_meta(&self, parsed: &VfsPath, canonical: &str) -> VfsResult<StatEntry> {
        if let Some(entry) = self.cache.get(canonical) {
            if matches!(entry.kind, EntryKind::Object) {
                return Ok(entry);
            }
        }
        let meta = self.api.head(&parsed.container, &parsed.key).await?;
        let entry = StatEntry {
            kind: EntryKind::Object,
            size: meta.size,
            modified: meta.modified,
            mode: 0o644,
            content_type: meta.content_type,
        };
        self.cache.put(canonical.to_string(), entry.clone());
        Ok(entry)
    }

    /// Zero-byte probe PUT: the backend has no dedicated write-permission
    /// check, so fail `open` now instead of surfacing the denial at close.
    /// 零字节探测PUT，open时即暴露权限错误
    async fn probe_write(
        &self,
        parsed: &VfsPath,
        canonical: &str,
        params: &RequestParams,
    ) -> VfsResult<()> {
        self.api
            .put(&parsed.container, &parsed.key, Bytes::new(), params)
            .await?;
        self.cache.invalidate(canonical);
        Ok(())
    }

    fn buffered_file(
        &self,
        parsed: &VfsPath,
        canonical: String,
        mode: OpenMode,
        params: RequestParams,
        body: BufferBody,
        dirty: bool,
    ) -> Box<dyn VfsFile> {
        Box::new(ObjectFile::new(
            self.api.clone(),
            self.cache.clone(),
            self.observers.clone(),
            parsed.container.clone(),
            parsed.key.clone(),
            canonical,
            mode,
            params,
            FileBody::Buffer(body),
            dirty,
        ))
    }

    async fn open_inner(
        &self,
        parsed: &VfsPath,
        canonical: &str,
        mode: OpenMode,
        params: RequestParams,
    ) -> VfsResult<Box<dyn VfsFile>> {
        match mode {
            OpenMode::Read => {
                let meta = self.object_meta(parsed, canonical).await?;
                let body = RemoteBody::new(
                    self.api.clone(),
                    parsed.container.clone(),
                    parsed.key.clone(),
                    meta.size,
                    self.read_chunk_size,
                    params.wants_seekable(),
                );
                Ok(Box::new(ObjectFile::new(
                    self.api.clone(),
                    self.cache.clone(),
                    self.observers.clone(),
                    parsed.container.clone(),
                    parsed.key.clone(),
                    canonical.to_string(),
                    mode,
                    params,
                    FileBody::Remote(body),
                    false,
                )))
            }
            OpenMode::Write | OpenMode::CreateExclusive => {
                if mode == OpenMode::CreateExclusive
                    && self.api.head(&parsed.container, &parsed.key).await.is_ok()
                {
                    return Err(VfsError::already_exists(canonical));
                }
                self.probe_write(parsed, canonical, &params).await?;
                Ok(self.buffered_file(
                    parsed,
                    canonical.to_string(),
                    mode,
                    params,
                    BufferBody::default(),
                    true,
                ))
            }
            OpenMode::Append => {
                match self.api.get(&parsed.container, &parsed.key, None).await {
                    Ok(existing) => Ok(self.buffered_file(
                        parsed,
                        canonical.to_string(),
                        mode,
                        params,
                        BufferBody::new(existing.to_vec(), true),
                        false,
                    )),
                    Err(err) if err.is_not_found() => {
                        // 对象不存在时降级为写模式
                        self.probe_write(parsed, canonical, &params).await?;
                        Ok(self.buffered_file(
                            parsed,
                            canonical.to_string(),
                            mode,
                            params,
                            BufferBody::default(),
                            true,
                        ))
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }

    async fn stat_inner(&self, parsed: &VfsPath) -> VfsResult<StatEntry> {
        let canonical = parsed.canonical();
        if let Some(entry) = self.cache.get(&canonical) {
            return Ok(entry);
        }

        // Container root is verified against the backend once, then cached
        if parsed.key.is_empty() {
            return if self.api.container_exists(&parsed.container).await? {
                let entry = StatEntry::container();
                self.cache.put(canonical, entry.clone());
                Ok(entry)
            } else {
                Err(VfsError::not_found(canonical))
            };
        }

        // Suffix-less paths are assumed directories and always exist; this
        // trades one class of false positives for skipping a network probe
        // on every existence check. / 无扩展名路径视为始终存在的目录
        if !parsed.has_file_suffix() {
            return Ok(StatEntry::directory());
        }

        match self.api.head(&parsed.container, &parsed.key).await {
            Ok(meta) => {
                let entry = StatEntry {
                    kind: EntryKind::Object,
                    size: meta.size,
                    modified: meta.modified,
                    mode: 0o644,
                    content_type: meta.content_type,
                };
                self.cache.put(canonical, entry.clone());
                Ok(entry)
            }
            Err(err) if err.is_not_found() => {
                // HEAD失败时用1条前缀列举区分伪目录与真正不存在
                let page = self
                    .api
                    .list_page(
                        &parsed.container,
                        &ListRequest {
                            prefix: format!("{}/", parsed.key),
                            delimiter: None,
                            token: None,
                            max_keys: 1,
                        },
                    )
                    .await?;
                if page.objects.is_empty() && page.prefixes.is_empty() {
                    Err(VfsError::not_found(canonical))
                } else {
                    let entry = StatEntry::directory();
                    self.cache.put(canonical, entry.clone());
                    Ok(entry)
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn mkdir_inner(
        &self,
        parsed: &VfsPath,
        mode: u32,
        params: &RequestParams,
    ) -> VfsResult<()> {
        if parsed.key.is_empty() {
            return Err(VfsError::unsupported("mkdir", "container root always exists"));
        }
        let canonical = parsed.canonical();
        let placeholder = format!("{}/", parsed.key);

        // The prefix listing also matches the placeholder itself, so one
        // round trip detects both an existing directory and real keys under
        // it. / 一次前缀列举同时检测占位对象与前缀下的真实键
        let page = self
            .api
            .list_page(
                &parsed.container,
                &ListRequest {
                    prefix: placeholder.clone(),
                    delimiter: None,
                    token: None,
                    max_keys: 1,
                },
            )
            .await?;
        if !(page.objects.is_empty() && page.prefixes.is_empty()) {
            return Err(VfsError::already_exists(canonical));
        }

        let mut merged = self.merge(parsed, params);
        merged.access_control = Some(AccessControl::from_mode(mode));

        self.api
            .put(&parsed.container, &placeholder, Bytes::new(), &merged)
            .await?;

        self.cache.put(
            canonical,
            StatEntry {
                kind: EntryKind::Directory,
                size: 0,
                modified: None,
                mode: mode & 0o777,
                content_type: None,
            },
        );
        Ok(())
    }

    async fn rmdir_inner(&self, parsed: &VfsPath) -> VfsResult<()> {
        if parsed.key.is_empty() {
            return Err(VfsError::unsupported("rmdir", "refusing to remove container root"));
        }
        let canonical = parsed.canonical();
        let placeholder = format!("{}/", parsed.key);

        let page = self
            .api
            .list_page(
                &parsed.container,
                &ListRequest {
                    prefix: placeholder.clone(),
                    delimiter: Some("/".to_string()),
                    token: None,
                    max_keys: 2,
                },
            )
            .await?;

        let has_other_objects = page.objects.iter().any(|o| o.key != placeholder);
        if has_other_objects || page.truncated {
            return Err(VfsError::NotEmpty {
                path: canonical,
                nested_dirs: false,
            });
        }
        if !page.prefixes.is_empty() {
            return Err(VfsError::NotEmpty {
                path: canonical,
                nested_dirs: true,
            });
        }
        if page.objects.is_empty() {
            return Err(VfsError::not_found(canonical));
        }

        self.api.delete(&parsed.container, &placeholder).await?;
        self.cache.invalidate(&canonical);
        Ok(())
    }

    async fn rename_inner(&self, from: &VfsPath, to: &VfsPath) -> VfsResult<()> {
        // Copy-then-delete: the backend has no rename primitive. A crash
        // between the two calls leaves both objects present. / 复制后删除
        self.api
            .copy(&from.container, &from.key, &to.container, &to.key)
            .await?;
        self.api.delete(&from.container, &from.key).await?;

        self.cache.invalidate(&from.canonical());
        self.cache.invalidate(&to.canonical());
        tracing::debug!("object renamed: {} -> {}", from.canonical(), to.canonical());
        Ok(())
    }
}

#[async_trait]
impl VfsDriver for ObjectStoreDriver {
    fn name(&self) -> &str {
        "s3"
    }

    async fn open(
        &self,
        path: &str,
        mode: OpenMode,
        params: &RequestParams,
    ) -> VfsResult<Box<dyn VfsFile>> {
        let result = async {
            let parsed = VfsPath::parse(path)?;
            if parsed.key.is_empty() {
                return Err(VfsError::unsupported("open", "container-only path"));
            }
            let merged = self.merge(&parsed, params);
            let canonical = parsed.canonical();
            self.open_inner(&parsed, &canonical, mode, merged).await
        }
        .await;
        report(result, "open", path, false)
    }

    async fn stat(&self, path: &str, quiet: bool) -> VfsResult<StatEntry> {
        let result = async {
            let parsed = VfsPath::parse(path)?;
            self.stat_inner(&parsed).await
        }
        .await;
        report(result, "stat", path, quiet)
    }

    async fn mkdir(&self, path: &str, mode: u32, params: &RequestParams) -> VfsResult<()> {
        let result = async {
            let parsed = VfsPath::parse(path)?;
            self.mkdir_inner(&parsed, mode, params).await
        }
        .await;
        report(result, "mkdir", path, false)
    }

    async fn rmdir(&self, path: &str) -> VfsResult<()> {
        let result = async {
            let parsed = VfsPath::parse(path)?;
            self.rmdir_inner(&parsed).await
        }
        .await;
        report(result, "rmdir", path, false)
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let result = async {
            let from_p = VfsPath::parse(from)?;
            let to_p = VfsPath::parse(to)?;
            if from_p.key.is_empty() || to_p.key.is_empty() {
                return Err(VfsError::unsupported("rename", "container-only path"));
            }
            self.rename_inner(&from_p, &to_p).await
        }
        .await;
        report(result, "rename", from, false)
    }

    async fn unlink(&self, path: &str) -> VfsResult<()> {
        let result = async {
            let parsed = VfsPath::parse(path)?;
            if parsed.key.is_empty() {
                return Err(VfsError::unsupported("unlink", "container-only path"));
            }
            self.api.delete(&parsed.container, &parsed.key).await?;
            self.cache.invalidate(&parsed.canonical());
            Ok(())
        }
        .await;
        report(result, "unlink", path, false)
    }

    async fn opendir(&self, path: &str, params: &RequestParams) -> VfsResult<Box<dyn VfsDir>> {
        let result = async {
            let parsed = VfsPath::parse(path)?;
            let merged = self.merge(&parsed, params);
            let delimiter = merged.delimiter_or_default().to_string();

            // A trailing `*` narrows the listing to a partial-name prefix:
            // cheaper than a full directory scan, and deliberately narrower.
            // 结尾通配符收窄为部分名称前缀列举
            let (prefix, strip) = match parsed.wildcard_split() {
                Some((dir, partial)) => (format!("{}{}", dir, partial), dir),
                None if parsed.key.is_empty() => (String::new(), String::new()),
                None => {
                    let p = format!("{}{}", parsed.key, delimiter);
                    (p.clone(), p)
                }
            };

            Ok(Box::new(ObjectDir::new(
                self.api.clone(),
                self.cache.clone(),
                parsed.scheme.clone(),
                parsed.container.clone(),
                prefix,
                strip,
                delimiter,
                merged.list_filter,
                self.page_size,
            )) as Box<dyn VfsDir>)
        }
        .await;
        report(result, "opendir", path, false)
    }

    fn subscribe_writes(&self, observer: WriteObserver) {
        self.observers.write().push(observer);
    }
}
