//! Stream handles over stored objects / 对象流句柄
//!
//! Read handles pull the body lazily in ranged chunks; the backend stream is
//! sequential, so seeking requires the `seekable` parameter, which retains
//! consumed bytes locally and replays backward seeks without re-requesting.
//! Write/append handles buffer the whole body in memory and upload once on
//! flush/close — the backend has no partial-write or append primitive.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::client::ObjectApi;
use crate::cache::StatCache;
use crate::error::{report, VfsError, VfsResult};
use crate::params::RequestParams;
use crate::vfs::{
    detect_content_type, notify_observers, ObserverSet, OpenMode, SeekFrom, VfsFile, WriteEvent,
};

/// In-memory body for write/append handles / 写句柄的内存缓冲体
#[derive(Debug, Default)]
pub(crate) struct BufferBody {
    data: Vec<u8>,
    pos: u64,
}

impl BufferBody {
    pub(crate) fn new(data: Vec<u8>, cursor_at_end: bool) -> Self {
        let pos = if cursor_at_end { data.len() as u64 } else { 0 };
        Self { data, pos }
    }

    fn read(&mut self, n: usize) -> Bytes {
        let len = self.data.len() as u64;
        if self.pos >= len || n == 0 {
            return Bytes::new();
        }
        let start = self.pos as usize;
        let end = (start + n).min(self.data.len());
        self.pos = end as u64;
        Bytes::copy_from_slice(&self.data[start..end])
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        let pos = self.pos as usize;
        // Cursor past the end zero-fills the gap / 游标越过末尾时补零
        if pos > self.data.len() {
            self.data.resize(pos, 0);
        }
        let overlap = (self.data.len() - pos).min(buf.len());
        self.data[pos..pos + overlap].copy_from_slice(&buf[..overlap]);
        self.data.extend_from_slice(&buf[overlap..]);
        self.pos += buf.len() as u64;
        buf.len()
    }

    fn seek(&mut self, pos: SeekFrom) -> VfsResult<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
            SeekFrom::End(delta) => self.data.len() as i64 + delta,
        };
        if target < 0 {
            return Err(VfsError::unsupported("seek", "negative offset"));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }

    fn eof(&self) -> bool {
        self.pos >= self.data.len() as u64
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn snapshot(&self) -> Bytes {
        Bytes::from(self.data.clone())
    }
}

/// Lazily fetched read body / 惰性分块读取体
pub(crate) struct RemoteBody {
    api: Arc<dyn ObjectApi>,
    container: String,
    key: String,
    size: u64,
    pos: u64,
    /// Current window for sequential reads / 顺序读取的当前窗口
    chunk: Bytes,
    chunk_start: u64,
    /// All consumed bytes, kept when a seekable body was requested / 已读字节缓存
    retained: Option<Vec<u8>>,
    chunk_size: usize,
}

impl RemoteBody {
    pub(crate) fn new(
        api: Arc<dyn ObjectApi>,
        container: String,
        key: String,
        size: u64,
        chunk_size: usize,
        seekable: bool,
    ) -> Self {
        Self {
            api,
            container,
            key,
            size,
            pos: 0,
            chunk: Bytes::new(),
            chunk_start: 0,
            retained: if seekable { Some(Vec::new()) } else { None },
            chunk_size: chunk_size.max(1),
        }
    }

    async fn fetch(&self, start: u64) -> VfsResult<Bytes> {
        let end = (start + self.chunk_size as u64).min(self.size);
        let bytes = self
            .api
            .get(&self.container, &self.key, Some(start..end))
            .await?;
        if bytes.is_empty() && start < end {
            return Err(VfsError::Backend(anyhow::anyhow!(
                "short read at offset {} of {}/{}",
                start,
                self.container,
                self.key
            )));
        }
        Ok(bytes)
    }

    /// Extend the retained buffer until it covers `target` / 补齐缓存到target
    async fn fill_retained_to(&mut self, target: u64) -> VfsResult<()> {
        let target = target.min(self.size);
        loop {
            let have = self.retained.as_ref().map(|r| r.len() as u64).unwrap_or(0);
            if have >= target {
                return Ok(());
            }
            let bytes = self.fetch(have).await?;
            if let Some(retained) = self.retained.as_mut() {
                retained.extend_from_slice(&bytes);
            }
        }
    }

    async fn read(&mut self, n: usize) -> VfsResult<Bytes> {
        if n == 0 || self.pos >= self.size {
            return Ok(Bytes::new());
        }
        let want_end = (self.pos + n as u64).min(self.size);

        if self.retained.is_some() {
            self.fill_retained_to(want_end).await?;
            let start = self.pos as usize;
            let end = want_end as usize;
            let out = match &self.retained {
                Some(retained) => Bytes::copy_from_slice(&retained[start..end]),
                None => Bytes::new(),
            };
            self.pos = want_end;
            return Ok(out);
        }

        let window_end = self.chunk_start + self.chunk.len() as u64;
        if self.pos < self.chunk_start || self.pos >= window_end {
            self.chunk = self.fetch(self.pos).await?;
            self.chunk_start = self.pos;
        }

        let offset = (self.pos - self.chunk_start) as usize;
        let take = (self.chunk.len() - offset).min((want_end - self.pos) as usize);
        let out = self.chunk.slice(offset..offset + take);
        self.pos += take as u64;
        Ok(out)
    }

    fn seek(&mut self, pos: SeekFrom) -> VfsResult<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
            SeekFrom::End(delta) => self.size as i64 + delta,
        };
        if target < 0 {
            return Err(VfsError::unsupported("seek", "negative offset"));
        }
        let target = (target as u64).min(self.size);

        if self.retained.is_none() && target != self.pos {
            return Err(VfsError::unsupported(
                "seek",
                "body is not seekable; open with seekable=1",
            ));
        }
        self.pos = target;
        Ok(self.pos)
    }

    fn eof(&self) -> bool {
        self.pos >= self.size
    }
}

pub(crate) enum FileBody {
    Buffer(BufferBody),
    Remote(RemoteBody),
}

/// Open handle on a stored object / 打开的对象句柄
pub struct ObjectFile {
    api: Arc<dyn ObjectApi>,
    cache: Arc<StatCache>,
    observers: ObserverSet,
    container: String,
    key: String,
    canonical: String,
    mode: OpenMode,
    params: RequestParams,
    body: FileBody,
    dirty: bool,
}

impl ObjectFile {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        api: Arc<dyn ObjectApi>,
        cache: Arc<StatCache>,
        observers: ObserverSet,
        container: String,
        key: String,
        canonical: String,
        mode: OpenMode,
        params: RequestParams,
        body: FileBody,
        dirty: bool,
    ) -> Self {
        Self {
            api,
            cache,
            observers,
            container,
            key,
            canonical,
            mode,
            params,
            body,
            dirty,
        }
    }

    /// Full-object PUT of the buffered body / 缓冲体全量上传
    async fn upload(&mut self) -> VfsResult<()> {
        let data = match &self.body {
            FileBody::Buffer(buffer) => buffer.snapshot(),
            FileBody::Remote(_) => return Ok(()),
        };

        let mut params = self.params.clone();
        if params.content_type.is_none() {
            params.content_type = detect_content_type(&self.key)
                .or_else(|| Some("application/octet-stream".to_string()));
        }

        let result = self
            .api
            .put(&self.container, &self.key, data.clone(), &params)
            .await;
        report(result, "flush", &self.canonical, false)?;

        self.cache.invalidate(&self.canonical);
        notify_observers(
            &self.observers,
            &WriteEvent {
                path: self.canonical.clone(),
                size: data.len() as u64,
                content_type: params.content_type.clone(),
            },
        );
        tracing::debug!("object uploaded: path={}, size={}", self.canonical, data.len());

        self.dirty = false;
        Ok(())
    }
}

#[async_trait]
impl VfsFile for ObjectFile {
    async fn read(&mut self, n: usize) -> VfsResult<Bytes> {
        match &mut self.body {
            FileBody::Buffer(buffer) => Ok(buffer.read(n)),
            FileBody::Remote(remote) => remote.read(n).await,
        }
    }

    async fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        if !self.mode.is_write() {
            return Err(VfsError::unsupported("write", "handle opened read-only"));
        }
        match &mut self.body {
            FileBody::Buffer(buffer) => {
                let written = buffer.write(buf);
                self.dirty = true;
                Ok(written)
            }
            FileBody::Remote(_) => Err(VfsError::unsupported("write", "handle opened read-only")),
        }
    }

    async fn seek(&mut self, pos: SeekFrom) -> VfsResult<u64> {
        match &mut self.body {
            FileBody::Buffer(buffer) => buffer.seek(pos),
            FileBody::Remote(remote) => remote.seek(pos),
        }
    }

    fn tell(&self) -> u64 {
        match &self.body {
            FileBody::Buffer(buffer) => buffer.pos,
            FileBody::Remote(remote) => remote.pos,
        }
    }

    fn eof(&self) -> bool {
        match &self.body {
            FileBody::Buffer(buffer) => buffer.eof(),
            FileBody::Remote(remote) => remote.eof(),
        }
    }

    async fn flush(&mut self) -> VfsResult<()> {
        if !self.mode.is_write() {
            return Ok(());
        }
        self.upload().await
    }

    async fn close(mut self: Box<Self>) -> VfsResult<()> {
        if self.dirty && self.mode.is_write() {
            self.upload().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::MemoryObjectStore;
    use super::*;

    #[test]
    fn test_buffer_body_read_write_seek() {
        let mut body = BufferBody::default();
        assert_eq!(body.write(b"hello"), 5);
        assert_eq!(body.len(), 5);
        assert!(body.eof());

        body.seek(SeekFrom::Start(0)).unwrap();
        assert!(!body.eof());
        assert_eq!(&body.read(5)[..], b"hello");

        // Overwrite in the middle, then extend / 中间覆盖并扩展
        body.seek(SeekFrom::Start(1)).unwrap();
        body.write(b"app");
        body.seek(SeekFrom::End(0)).unwrap();
        body.write(b"!");
        body.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(&body.read(16)[..], b"happo!");
    }

    #[test]
    fn test_buffer_body_zero_fills_past_end() {
        let mut body = BufferBody::default();
        body.seek(SeekFrom::Start(3)).unwrap();
        body.write(b"x");
        body.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(&body.read(8)[..], b"\0\0\0x");
        assert!(body.seek(SeekFrom::Current(-100)).is_err());
    }

    #[test]
    fn test_buffer_body_cursor_at_end() {
        let body = BufferBody::new(b"abc".to_vec(), true);
        assert_eq!(body.pos, 3);
        let body = BufferBody::new(b"abc".to_vec(), false);
        assert_eq!(body.pos, 0);
    }

    #[tokio::test]
    async fn test_remote_body_sequential_chunks() {
        let store = Arc::new(MemoryObjectStore::new());
        store.seed("media", "blob.bin", b"0123456789".to_vec()).await;

        let mut body = RemoteBody::new(
            store.clone(),
            "media".to_string(),
            "blob.bin".to_string(),
            10,
            4,
            false,
        );

        assert_eq!(&body.read(3).await.unwrap()[..], b"012");
        assert_eq!(body.pos, 3);
        // Crosses the chunk boundary: serves the window remainder first
        assert_eq!(&body.read(3).await.unwrap()[..], b"3");
        assert_eq!(&body.read(4).await.unwrap()[..], b"4567");
        assert_eq!(&body.read(10).await.unwrap()[..], b"89");
        assert!(body.eof());
        assert_eq!(body.read(1).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_remote_body_sequential_rejects_seek() {
        let store = Arc::new(MemoryObjectStore::new());
        store.seed("media", "blob.bin", b"0123456789".to_vec()).await;

        let mut body = RemoteBody::new(
            store,
            "media".to_string(),
            "blob.bin".to_string(),
            10,
            4,
            false,
        );
        // Short read: the first chunk window holds 4 bytes
        assert_eq!(&body.read(5).await.unwrap()[..], b"0123");

        assert!(body.seek(SeekFrom::Start(0)).is_err());
        // No-op repositioning stays allowed
        assert_eq!(body.seek(SeekFrom::Current(0)).unwrap(), 4);
    }

    #[tokio::test]
    async fn test_remote_body_seekable_replays_from_cache() {
        let store = Arc::new(MemoryObjectStore::new());
        store.seed("media", "blob.bin", b"0123456789".to_vec()).await;

        let mut body = RemoteBody::new(
            store.clone(),
            "media".to_string(),
            "blob.bin".to_string(),
            10,
            4,
            true,
        );

        assert_eq!(&body.read(6).await.unwrap()[..], b"012345");
        let fetches = store.get_count().await;

        // Backward seek replays retained bytes without another request
        body.seek(SeekFrom::Start(2)).unwrap();
        assert_eq!(&body.read(3).await.unwrap()[..], b"234");
        assert_eq!(store.get_count().await, fetches);

        // Forward seek past the retained high-water mark fetches the gap
        body.seek(SeekFrom::End(-2)).unwrap();
        assert_eq!(&body.read(4).await.unwrap()[..], b"89");
        assert!(store.get_count().await > fetches);
    }

    #[test]
    fn test_detect_content_type() {
        assert_eq!(detect_content_type("a.txt").as_deref(), Some("text/plain"));
        assert_eq!(detect_content_type("photo.jpg").as_deref(), Some("image/jpeg"));
        assert_eq!(detect_content_type("no-suffix"), None);
    }
}
