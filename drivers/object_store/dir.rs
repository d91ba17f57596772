//! Directory listing handles / 目录列举句柄
//!
//! One logical directory level is emulated with a delimiter-bounded prefix
//! listing. Pages are fetched lazily as entries are consumed; the sequence
//! is finite and non-restartable — rewinding re-opens the listing.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;

use super::client::{ListRequest, ListingPage, ObjectApi};
use crate::cache::StatCache;
use crate::error::VfsResult;
use crate::params::ListFilter;
use crate::vfs::{DirEntry, EntryKind, StatEntry, VfsDir};

pub struct ObjectDir {
    api: Arc<dyn ObjectApi>,
    cache: Arc<StatCache>,
    scheme: String,
    container: String,
    /// Listed key prefix; with the wildcard form this may end mid-name / 列举前缀
    prefix: String,
    /// Directory part stripped from entry names / 从条目名中剥离的目录前缀
    strip: String,
    delimiter: String,
    filter: Option<ListFilter>,
    page_size: i32,
    queue: VecDeque<DirEntry>,
    token: Option<String>,
    exhausted: bool,
}

impl ObjectDir {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        api: Arc<dyn ObjectApi>,
        cache: Arc<StatCache>,
        scheme: String,
        container: String,
        prefix: String,
        strip: String,
        delimiter: String,
        filter: Option<ListFilter>,
        page_size: i32,
    ) -> Self {
        Self {
            api,
            cache,
            scheme,
            container,
            prefix,
            strip,
            delimiter,
            filter,
            page_size,
            queue: VecDeque::new(),
            token: None,
            exhausted: false,
        }
    }

    fn canonical_for(&self, key: &str) -> String {
        format!("{}://{}/{}", self.scheme, self.container, key)
    }

    fn accepts(&self, name: &str) -> bool {
        match &self.filter {
            Some(filter) => filter.matches(name),
            None => true,
        }
    }

    /// Turn one backend page into queued entries, populating the stat cache
    /// as a side effect so list-then-stat callers never go back to the
    /// network. / 将一页结果转换为条目并顺带填充stat缓存
    fn absorb_page(&mut self, page: ListingPage) {
        for prefix in &page.prefixes {
            let trimmed = prefix.trim_end_matches(&self.delimiter);
            let name = trimmed
                .strip_prefix(&self.strip)
                .unwrap_or(trimmed)
                .to_string();
            if name.is_empty() || !self.accepts(&name) {
                continue;
            }

            self.cache
                .put(self.canonical_for(trimmed), StatEntry::directory());
            self.queue.push_back(DirEntry {
                name,
                kind: EntryKind::Directory,
                size: 0,
                modified: None,
            });
        }

        for object in &page.objects {
            // Placeholder keys end in the delimiter; they make the directory
            // non-empty but are never shown to callers. / 排除占位键
            if object.key.ends_with(&self.delimiter) {
                continue;
            }
            let name = object
                .key
                .strip_prefix(&self.strip)
                .unwrap_or(&object.key)
                .to_string();
            if name.is_empty() || !self.accepts(&name) {
                continue;
            }

            self.cache.put(
                self.canonical_for(&object.key),
                StatEntry {
                    kind: EntryKind::Object,
                    size: object.size,
                    modified: object.modified,
                    mode: 0o644,
                    content_type: None,
                },
            );
            self.queue.push_back(DirEntry {
                name,
                kind: EntryKind::Object,
                size: object.size,
                modified: object.modified,
            });
        }

        self.token = page.next_token;
        self.exhausted = !page.truncated;
    }

    async fn fetch_page(&mut self) -> VfsResult<()> {
        let request = ListRequest {
            prefix: self.prefix.clone(),
            delimiter: Some(self.delimiter.clone()),
            token: self.token.take(),
            max_keys: self.page_size,
        };
        let page = self.api.list_page(&self.container, &request).await?;
        self.absorb_page(page);
        Ok(())
    }
}

#[async_trait]
impl VfsDir for ObjectDir {
    async fn next_entry(&mut self) -> VfsResult<Option<DirEntry>> {
        loop {
            if let Some(entry) = self.queue.pop_front() {
                return Ok(Some(entry));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    async fn rewind(&mut self) -> VfsResult<()> {
        // Re-open: drop all pagination state, the next read re-issues the
        // listing from the start. / 重新打开列举
        self.queue.clear();
        self.token = None;
        self.exhausted = false;
        Ok(())
    }
}
