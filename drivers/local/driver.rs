//! Local-disk fallback driver / 本地磁盘回退驱动
//!
//! Implements the identical filesystem contract over `tokio::fs`, confined
//! to one configured root directory. Exists to prove the contract is
//! backend-agnostic and to support offline/dev configurations.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::{from_io_error, report, VfsError, VfsResult};
use crate::params::{ListFilter, RequestParams};
use crate::path::VfsPath;
use crate::vfs::{
    detect_content_type, notify_observers, DirEntry, EntryKind, ObserverSet, OpenMode, SeekFrom,
    StatEntry, VfsDir, VfsDriver, VfsFile, WriteEvent, WriteObserver,
};

pub struct LocalDriver {
    root: PathBuf,
    observers: ObserverSet,
}

impl LocalDriver {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            observers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Get root directory / 获取根目录
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Map (container, key) under the root, rejecting traversal / 映射并拒绝越界
    fn resolve(&self, parsed: &VfsPath, key: &str) -> VfsResult<PathBuf> {
        if parsed.container == ".." || parsed.container == "." || parsed.container.contains('\\') {
            return Err(VfsError::permission_denied(parsed.canonical()));
        }

        let mut full = self.root.join(&parsed.container);
        // The translator already resolved `..` inside the key; check each
        // segment anyway so a hand-built VfsPath cannot escape the root.
        for segment in key.split('/').filter(|s| !s.is_empty()) {
            if segment == ".." {
                return Err(VfsError::permission_denied(parsed.canonical()));
            }
            full.push(segment);
        }
        Ok(full)
    }

    async fn ensure_parent(&self, full: &PathBuf, canonical: &str) -> VfsResult<()> {
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| from_io_error(e, canonical))?;
        }
        Ok(())
    }

    async fn open_inner(&self, parsed: &VfsPath, mode: OpenMode) -> VfsResult<Box<dyn VfsFile>> {
        let canonical = parsed.canonical();
        let full = self.resolve(parsed, &parsed.key)?;

        let (file, size, pos) = match mode {
            OpenMode::Read => {
                let file = fs::File::open(&full)
                    .await
                    .map_err(|e| from_io_error(e, &canonical))?;
                let meta = file
                    .metadata()
                    .await
                    .map_err(|e| from_io_error(e, &canonical))?;
                if meta.is_dir() {
                    return Err(VfsError::unsupported("open", "path is a directory"));
                }
                (file, meta.len(), 0)
            }
            OpenMode::Write => {
                self.ensure_parent(&full, &canonical).await?;
                let file = fs::File::create(&full)
                    .await
                    .map_err(|e| from_io_error(e, &canonical))?;
                (file, 0, 0)
            }
            OpenMode::CreateExclusive => {
                self.ensure_parent(&full, &canonical).await?;
                let file = fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&full)
                    .await
                    .map_err(|e| from_io_error(e, &canonical))?;
                (file, 0, 0)
            }
            OpenMode::Append => {
                self.ensure_parent(&full, &canonical).await?;
                let file = fs::OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(&full)
                    .await
                    .map_err(|e| from_io_error(e, &canonical))?;
                let size = file
                    .metadata()
                    .await
                    .map_err(|e| from_io_error(e, &canonical))?
                    .len();
                (file, size, size)
            }
        };

        Ok(Box::new(LocalFile {
            file,
            canonical,
            key: parsed.key.clone(),
            mode,
            pos,
            size,
            dirty: false,
            observers: self.observers.clone(),
        }))
    }

    async fn stat_inner(&self, parsed: &VfsPath) -> VfsResult<StatEntry> {
        let canonical = parsed.canonical();
        let full = self.resolve(parsed, &parsed.key)?;
        let meta = fs::metadata(&full)
            .await
            .map_err(|e| from_io_error(e, &canonical))?;

        let kind = if meta.is_dir() {
            if parsed.key.is_empty() {
                EntryKind::Container
            } else {
                EntryKind::Directory
            }
        } else {
            EntryKind::Object
        };

        Ok(StatEntry {
            kind,
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            mode: permission_bits(&meta),
            content_type: if kind == EntryKind::Object {
                detect_content_type(parsed.file_name())
            } else {
                None
            },
        })
    }
}

#[cfg(unix)]
fn permission_bits(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permission_bits(meta: &std::fs::Metadata) -> u32 {
    if meta.is_dir() {
        0o755
    } else {
        0o644
    }
}

#[async_trait]
impl VfsDriver for LocalDriver {
    fn name(&self) -> &str {
        "local"
    }

    async fn open(
        &self,
        path: &str,
        mode: OpenMode,
        _params: &RequestParams,
    ) -> VfsResult<Box<dyn VfsFile>> {
        let result = async {
            let parsed = VfsPath::parse(path)?;
            if parsed.key.is_empty() {
                return Err(VfsError::unsupported("open", "container-only path"));
            }
            self.open_inner(&parsed, mode).await
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

    async fn mkdir(&self, path: &str, mode: u32, _params: &RequestParams) -> VfsResult<()> {
        let result = async {
            let parsed = VfsPath::parse(path)?;
            let canonical = parsed.canonical();
            let full = self.resolve(&parsed, &parsed.key)?;

            if fs::metadata(&full).await.is_ok() {
                return Err(VfsError::already_exists(canonical));
            }
            fs::create_dir_all(&full)
                .await
                .map_err(|e| from_io_error(e, &canonical))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&full, std::fs::Permissions::from_mode(mode & 0o777))
                    .await
                    .map_err(|e| from_io_error(e, &canonical))?;
            }
            #[cfg(not(unix))]
            let _ = mode;

            Ok(())
        }
        .await;
        report(result, "mkdir", path, false)
    }

    async fn rmdir(&self, path: &str) -> VfsResult<()> {
        let result = async {
            let parsed = VfsPath::parse(path)?;
            let canonical = parsed.canonical();
            let full = self.resolve(&parsed, &parsed.key)?;

            let mut entries = fs::read_dir(&full)
                .await
                .map_err(|e| from_io_error(e, &canonical))?;
            let mut has_file = false;
            let mut has_dir = false;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| from_io_error(e, &canonical))?
            {
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| from_io_error(e, &canonical))?;
                if file_type.is_dir() {
                    has_dir = true;
                } else {
                    has_file = true;
                }
            }

            if has_file {
                return Err(VfsError::NotEmpty {
                    path: canonical,
                    nested_dirs: false,
                });
            }
            if has_dir {
                return Err(VfsError::NotEmpty {
                    path: canonical,
                    nested_dirs: true,
                });
            }

            fs::remove_dir(&full)
                .await
                .map_err(|e| from_io_error(e, &canonical))
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

            let from_full = self.resolve(&from_p, &from_p.key)?;
            let to_full = self.resolve(&to_p, &to_p.key)?;
            self.ensure_parent(&to_full, &to_p.canonical()).await?;

            fs::rename(&from_full, &to_full)
                .await
                .map_err(|e| from_io_error(e, &from_p.canonical()))
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
            let full = self.resolve(&parsed, &parsed.key)?;
            fs::remove_file(&full)
                .await
                .map_err(|e| from_io_error(e, &parsed.canonical()))
        }
        .await;
        report(result, "unlink", path, false)
    }

    async fn opendir(&self, path: &str, params: &RequestParams) -> VfsResult<Box<dyn VfsDir>> {
        let result = async {
            let parsed = VfsPath::parse(path)?;
            let merged = parsed.overrides.overlay(params);

            // Wildcard form filters names on the partial final segment,
            // mirroring the object driver's narrowed prefix listing.
            let (dir_key, partial) = match parsed.wildcard_split() {
                Some((dir, partial)) => {
                    (dir.trim_end_matches('/').to_string(), Some(partial))
                }
                None => (parsed.key.clone(), None),
            };

            let full = self.resolve(&parsed, &dir_key)?;
            let reader = fs::read_dir(&full)
                .await
                .map_err(|e| from_io_error(e, &parsed.canonical()))?;

            Ok(Box::new(LocalDir {
                dir: full,
                canonical: parsed.canonical(),
                partial,
                filter: merged.list_filter,
                reader,
            }) as Box<dyn VfsDir>)
        }
        .await;
        report(result, "opendir", path, false)
    }

    fn subscribe_writes(&self, observer: WriteObserver) {
        self.observers.write().push(observer);
    }
}

/// Open handle on a local file / 本地文件句柄
struct LocalFile {
    file: fs::File,
    canonical: String,
    key: String,
    mode: OpenMode,
    pos: u64,
    size: u64,
    dirty: bool,
    observers: ObserverSet,
}

#[async_trait]
impl VfsFile for LocalFile {
    async fn read(&mut self, n: usize) -> VfsResult<Bytes> {
        if self.mode != OpenMode::Read {
            return Err(VfsError::unsupported("read", "handle not opened for reading"));
        }
        let mut buf = vec![0u8; n];
        let read = self
            .file
            .read(&mut buf)
            .await
            .map_err(|e| from_io_error(e, &self.canonical))?;
        buf.truncate(read);
        self.pos += read as u64;
        Ok(Bytes::from(buf))
    }

    async fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        if !self.mode.is_write() {
            return Err(VfsError::unsupported("write", "handle opened read-only"));
        }
        self.file
            .write_all(buf)
            .await
            .map_err(|e| from_io_error(e, &self.canonical))?;
        self.pos += buf.len() as u64;
        self.size = self.size.max(self.pos);
        self.dirty = true;
        Ok(buf.len())
    }

    async fn seek(&mut self, pos: SeekFrom) -> VfsResult<u64> {
        self.pos = self
            .file
            .seek(pos)
            .await
            .map_err(|e| from_io_error(e, &self.canonical))?;
        Ok(self.pos)
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn eof(&self) -> bool {
        self.pos >= self.size
    }

    async fn flush(&mut self) -> VfsResult<()> {
        self.file
            .flush()
            .await
            .map_err(|e| from_io_error(e, &self.canonical))
    }

    async fn close(mut self: Box<Self>) -> VfsResult<()> {
        self.file
            .flush()
            .await
            .map_err(|e| from_io_error(e, &self.canonical))?;

        if self.mode.is_write() && self.dirty {
            notify_observers(
                &self.observers,
                &WriteEvent {
                    path: self.canonical.clone(),
                    size: self.size,
                    content_type: detect_content_type(&self.key),
                },
            );
        }
        Ok(())
    }
}

/// Directory listing over `read_dir` / 基于read_dir的目录列举
struct LocalDir {
    dir: PathBuf,
    canonical: String,
    partial: Option<String>,
    filter: Option<ListFilter>,
    reader: fs::ReadDir,
}

#[async_trait]
impl VfsDir for LocalDir {
    async fn next_entry(&mut self) -> VfsResult<Option<DirEntry>> {
        loop {
            let entry = self
                .reader
                .next_entry()
                .await
                .map_err(|e| from_io_error(e, &self.canonical))?;
            let entry = match entry {
                Some(entry) => entry,
                None => return Ok(None),
            };

            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(partial) = &self.partial {
                if !name.starts_with(partial.as_str()) {
                    continue;
                }
            }
            if let Some(filter) = &self.filter {
                if !filter.matches(&name) {
                    continue;
                }
            }

            let meta = entry
                .metadata()
                .await
                .map_err(|e| from_io_error(e, &self.canonical))?;
            let is_dir = meta.is_dir();
            return Ok(Some(DirEntry {
                name,
                kind: if is_dir {
                    EntryKind::Directory
                } else {
                    EntryKind::Object
                },
                size: if is_dir { 0 } else { meta.len() },
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            }));
        }
    }

    async fn rewind(&mut self) -> VfsResult<()> {
        self.reader = fs::read_dir(&self.dir)
            .await
            .map_err(|e| from_io_error(e, &self.canonical))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, LocalDriver) {
        let root = TempDir::new().unwrap();
        let driver = LocalDriver::new(root.path().to_path_buf());
        (root, driver)
    }

    async fn collect_names(dir: &mut Box<dyn VfsDir>) -> Vec<String> {
        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await.unwrap() {
            names.push(entry.name);
        }
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_write_stat_read_round_trip() {
        let (_root, driver) = setup();
        let params = RequestParams::default();

        let mut file = driver
            .open("file://media/docs/hello.txt", OpenMode::Write, &params)
            .await
            .unwrap();
        file.write(b"hello").await.unwrap();
        file.close().await.unwrap();

        let entry = driver
            .stat("file://media/docs/hello.txt", false)
            .await
            .unwrap();
        assert_eq!(entry.kind, EntryKind::Object);
        assert_eq!(entry.size, 5);
        assert_eq!(entry.content_type.as_deref(), Some("text/plain"));

        let mut file = driver
            .open("file://media/docs/hello.txt", OpenMode::Read, &params)
            .await
            .unwrap();
        assert_eq!(&file.read(5).await.unwrap()[..], b"hello");
        assert!(file.eof());
        file.seek(SeekFrom::Start(1)).await.unwrap();
        assert_eq!(&file.read(2).await.unwrap()[..], b"el");
        file.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_exclusive_conflict() {
        let (_root, driver) = setup();
        let params = RequestParams::default();

        let file = driver
            .open("file://media/a.txt", OpenMode::CreateExclusive, &params)
            .await
            .unwrap();
        file.close().await.unwrap();

        let err = driver
            .open("file://media/a.txt", OpenMode::CreateExclusive, &params)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, VfsError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_append_modes() {
        let (_root, driver) = setup();
        let params = RequestParams::default();

        let mut file = driver
            .open("file://media/log.txt", OpenMode::Write, &params)
            .await
            .unwrap();
        file.write(b"hello").await.unwrap();
        file.close().await.unwrap();

        let mut file = driver
            .open("file://media/log.txt", OpenMode::Append, &params)
            .await
            .unwrap();
        assert_eq!(file.tell(), 5);
        file.write(b" world").await.unwrap();
        file.close().await.unwrap();

        assert_eq!(
            driver.stat("file://media/log.txt", false).await.unwrap().size,
            11
        );

        // Append to a missing file behaves like write / 追加缺失文件等同写入
        let mut file = driver
            .open("file://media/fresh.txt", OpenMode::Append, &params)
            .await
            .unwrap();
        assert_eq!(file.tell(), 0);
        file.write(b"first").await.unwrap();
        file.close().await.unwrap();
        assert_eq!(
            driver.stat("file://media/fresh.txt", false).await.unwrap().size,
            5
        );
    }

    #[tokio::test]
    async fn test_rename_moves_content() {
        let (_root, driver) = setup();
        let params = RequestParams::default();

        let mut file = driver
            .open("file://media/a.txt", OpenMode::Write, &params)
            .await
            .unwrap();
        file.write(b"payload").await.unwrap();
        file.close().await.unwrap();

        driver
            .rename("file://media/a.txt", "file://media/sub/b.txt")
            .await
            .unwrap();

        assert_eq!(
            driver.stat("file://media/sub/b.txt", false).await.unwrap().size,
            7
        );
        assert!(driver
            .stat("file://media/a.txt", true)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_mkdir_rmdir_cycle() {
        let (_root, driver) = setup();
        let params = RequestParams::default();

        driver
            .mkdir("file://media/docs", 0o750, &params)
            .await
            .unwrap();
        assert!(driver.exists("file://media/docs").await);

        let err = driver
            .mkdir("file://media/docs", 0o750, &params)
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::AlreadyExists { .. }));

        driver.rmdir("file://media/docs").await.unwrap();
        assert!(!driver.exists("file://media/docs").await);
        assert!(driver
            .rmdir("file://media/docs")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_rmdir_not_empty_variants() {
        let (_root, driver) = setup();
        let params = RequestParams::default();

        driver
            .mkdir("file://media/full", 0o755, &params)
            .await
            .unwrap();
        let mut file = driver
            .open("file://media/full/x.txt", OpenMode::Write, &params)
            .await
            .unwrap();
        file.write(b"x").await.unwrap();
        file.close().await.unwrap();

        match driver.rmdir("file://media/full").await.unwrap_err() {
            VfsError::NotEmpty { nested_dirs, .. } => assert!(!nested_dirs),
            other => panic!("expected NotEmpty, got {other}"),
        }

        driver
            .mkdir("file://media/parent/child", 0o755, &params)
            .await
            .unwrap();
        match driver.rmdir("file://media/parent").await.unwrap_err() {
            VfsError::NotEmpty { nested_dirs, .. } => assert!(nested_dirs),
            other => panic!("expected NotEmpty, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_unlink() {
        let (_root, driver) = setup();
        let params = RequestParams::default();

        let file = driver
            .open("file://media/gone.txt", OpenMode::Write, &params)
            .await
            .unwrap();
        file.close().await.unwrap();

        driver.unlink("file://media/gone.txt").await.unwrap();
        assert!(driver
            .stat("file://media/gone.txt", true)
            .await
            .unwrap_err()
            .is_not_found());
        assert!(driver
            .unlink("file://media/gone.txt")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let (_root, driver) = setup();

        let err = driver.stat("file://../outside.txt", true).await.unwrap_err();
        assert!(matches!(err, VfsError::PermissionDenied { .. }));

        // `..` inside the key collapses within the container instead of
        // escaping the root / 键内的..在容器内消解
        let parsed = VfsPath::parse("file://media/a/../../../b.txt").unwrap();
        assert_eq!(parsed.key, "b.txt");
    }

    #[tokio::test]
    async fn test_opendir_wildcard_and_filter() {
        let (_root, driver) = setup();
        let params = RequestParams::default();

        for name in ["jan.jpg", "feb.jpg", "mar.png"] {
            let mut file = driver
                .open(&format!("file://media/2024/{}", name), OpenMode::Write, &params)
                .await
                .unwrap();
            file.write(b"x").await.unwrap();
            file.close().await.unwrap();
        }

        let mut dir = driver.opendir("file://media/2024", &params).await.unwrap();
        assert_eq!(
            collect_names(&mut dir).await,
            vec!["feb.jpg", "jan.jpg", "mar.png"]
        );

        dir.rewind().await.unwrap();
        assert_eq!(collect_names(&mut dir).await.len(), 3);

        let mut dir = driver
            .opendir("file://media/2024/ja*", &params)
            .await
            .unwrap();
        assert_eq!(collect_names(&mut dir).await, vec!["jan.jpg"]);

        let filtered = RequestParams {
            list_filter: Some(ListFilter::new(r"\.jpg$").unwrap()),
            ..Default::default()
        };
        let mut dir = driver.opendir("file://media/2024", &filtered).await.unwrap();
        assert_eq!(collect_names(&mut dir).await, vec!["feb.jpg", "jan.jpg"]);
    }

    #[tokio::test]
    async fn test_stat_container_kind() {
        let (_root, driver) = setup();
        driver
            .mkdir("file://media", 0o755, &RequestParams::default())
            .await
            .unwrap();

        let entry = driver.stat("file://media", false).await.unwrap();
        assert_eq!(entry.kind, EntryKind::Container);
    }

    #[tokio::test]
    async fn test_write_observer() {
        let (_root, driver) = setup();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        driver.subscribe_writes(Arc::new(move |event: &WriteEvent| {
            sink.lock().push(event.clone());
        }));

        let mut file = driver
            .open("file://media/seen.txt", OpenMode::Write, &RequestParams::default())
            .await
            .unwrap();
        file.write(b"abc").await.unwrap();
        file.close().await.unwrap();

        let events = seen.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].path, "file://media/seen.txt");
        assert_eq!(events[0].size, 3);
        assert_eq!(events[0].content_type.as_deref(), Some("text/plain"));
    }
}
