//! Virtual filesystem contract / 虚拟文件系统契约
//!
//! One uniform set of file operations implemented by every backend. Host
//! integration code is written once against these traits and never learns
//! which backend is active.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::VfsResult;
use crate::params::RequestParams;

pub use std::io::SeekFrom;

/// How a stream handle is opened / 打开模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
    /// Like write, but fails with AlreadyExists when the target exists / 排他创建
    CreateExclusive,
}

impl OpenMode {
    pub fn is_write(&self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}

/// What a path resolves to / 路径指向的实体类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// A regular stored object / 普通对象
    Object,
    /// A pseudo-directory emulated over the flat key space / 伪目录
    Directory,
    /// The container/bucket root / 容器根
    Container,
}

/// Cached metadata for a path / 路径元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatEntry {
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    /// Permission bits in the filesystem sense; advisory for object backends
    pub mode: u32,
    pub content_type: Option<String>,
}

impl StatEntry {
    pub fn is_dir(&self) -> bool {
        !matches!(self.kind, EntryKind::Object)
    }

    /// Synthetic entry for paths assumed to be directories / 合成目录条目
    pub fn directory() -> Self {
        StatEntry {
            kind: EntryKind::Directory,
            size: 0,
            modified: None,
            mode: 0o755,
            content_type: None,
        }
    }

    pub fn container() -> Self {
        StatEntry {
            kind: EntryKind::Container,
            ..StatEntry::directory()
        }
    }
}

/// One directory listing entry, name relative to the opened prefix / 目录条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Emitted after a write/append handle uploads its object / 对象写入事件
#[derive(Debug, Clone)]
pub struct WriteEvent {
    pub path: String,
    pub size: u64,
    pub content_type: Option<String>,
}

/// Observer callback type / 写入观察者回调
/// 参数: 本次上传的事件 / Parameter: the completed upload
pub type WriteObserver = Arc<dyn Fn(&WriteEvent) + Send + Sync>;

/// Shared observer list, cloned into handles at open time / 共享观察者列表
pub(crate) type ObserverSet = Arc<parking_lot::RwLock<Vec<WriteObserver>>>;

pub(crate) fn notify_observers(observers: &ObserverSet, event: &WriteEvent) {
    for observer in observers.read().iter() {
        observer(event);
    }
}

/// Content type detected from a key's extension / 根据扩展名推断内容类型
pub fn detect_content_type(key: &str) -> Option<String> {
    mime_guess::from_path(key)
        .first()
        .map(|m| m.essence_str().to_string())
}

/// Open stream handle / 打开的流句柄
///
/// A handle belongs to a single logical caller; no internal locking.
/// Write/append handles buffer locally and upload on flush/close.
#[async_trait]
pub trait VfsFile: Send {
    /// Pull up to `n` bytes from the body / 读取至多n字节
    async fn read(&mut self, n: usize) -> VfsResult<Bytes>;

    /// Append to the local buffer; returns bytes accepted / 写入本地缓冲
    async fn write(&mut self, buf: &[u8]) -> VfsResult<usize>;

    /// Reposition the cursor. Fails on a sequential (non-seekable) body.
    async fn seek(&mut self, pos: SeekFrom) -> VfsResult<u64>;

    fn tell(&self) -> u64;

    fn eof(&self) -> bool;

    /// Upload the buffered body now (write/append handles) / 立即上传缓冲
    async fn flush(&mut self) -> VfsResult<()>;

    /// Flush if dirty and release the handle / 关闭句柄
    async fn close(self: Box<Self>) -> VfsResult<()>;
}

/// Open directory listing handle / 打开的目录列举句柄
///
/// A lazy, finite, non-restartable sequence; `rewind` re-opens the listing.
#[async_trait]
pub trait VfsDir: Send {
    /// Next entry, or None when exhausted / 下一个条目
    async fn next_entry(&mut self) -> VfsResult<Option<DirEntry>>;

    /// Restart from the beginning by re-issuing the listing / 重新列举
    async fn rewind(&mut self) -> VfsResult<()>;
}

/// Backend driver interface / 后端驱动接口
#[async_trait]
pub trait VfsDriver: Send + Sync {
    /// Driver name for diagnostics / 驱动名称
    fn name(&self) -> &str;

    /// Open a stream handle on a path / 打开文件句柄
    async fn open(
        &self,
        path: &str,
        mode: OpenMode,
        params: &RequestParams,
    ) -> VfsResult<Box<dyn VfsFile>>;

    /// Metadata lookup; `quiet` suppresses diagnostics for existence probes
    async fn stat(&self, path: &str, quiet: bool) -> VfsResult<StatEntry>;

    /// Existence probe over a quiet stat / 存在性探测
    async fn exists(&self, path: &str) -> bool {
        self.stat(path, true).await.is_ok()
    }

    /// Create a directory with the given permission bits / 创建目录
    async fn mkdir(&self, path: &str, mode: u32, params: &RequestParams) -> VfsResult<()>;

    /// Remove an empty directory / 删除空目录
    async fn rmdir(&self, path: &str) -> VfsResult<()>;

    /// Rename an entry. Object backends implement copy-then-delete and the
    /// pair is not atomic. / 重命名
    async fn rename(&self, from: &str, to: &str) -> VfsResult<()>;

    /// Delete an object / 删除对象
    async fn unlink(&self, path: &str) -> VfsResult<()>;

    /// Open a one-level directory listing / 打开目录列举
    async fn opendir(&self, path: &str, params: &RequestParams) -> VfsResult<Box<dyn VfsDir>>;

    /// Register an observer for completed uploads / 注册写入观察者
    fn subscribe_writes(&self, observer: WriteObserver);
}

pub mod local_factory;
pub mod registry;

pub use local_factory::LocalDriverFactory;
pub use registry::{DriverBox, DriverFactory, DriverRegistry};
