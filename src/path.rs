//! Path/key translation / 路径与对象键转换
//!
//! Hierarchical paths use the form `scheme://container/key[?query]`. The
//! translator splits them into (scheme, container, key), normalizes the key
//! (collapses `//`, resolves `.` and `..` without ever escaping the
//! container) and lifts recognized query keys into per-call parameter
//! overrides.

use crate::error::{VfsError, VfsResult};
use crate::params::{AccessControl, RequestParams};

/// Parsed path plus per-call overrides from its query string / 解析后的路径
#[derive(Debug, Clone)]
pub struct VfsPath {
    pub scheme: String,
    pub container: String,
    /// Normalized key; empty for the container root. A trailing `*` on the
    /// final segment survives normalization (wildcard listing form).
    pub key: String,
    pub overrides: RequestParams,
}

impl VfsPath {
    /// Parse `scheme://container/key[?query]` / 解析完整路径
    pub fn parse(raw: &str) -> VfsResult<Self> {
        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| VfsError::unsupported("path", format!("missing scheme: {}", raw)))?;
        if scheme.is_empty() {
            return Err(VfsError::unsupported("path", format!("empty scheme: {}", raw)));
        }

        let (location, query) = match rest.split_once('?') {
            Some((l, q)) => (l, Some(q)),
            None => (rest, None),
        };

        let (container, raw_key) = match location.split_once('/') {
            Some((c, k)) => (c, k),
            None => (location, ""),
        };
        if container.is_empty() {
            return Err(VfsError::unsupported(
                "path",
                format!("missing container: {}", raw),
            ));
        }

        let overrides = match query {
            Some(q) => parse_query(q)?,
            None => RequestParams::default(),
        };

        Ok(VfsPath {
            scheme: scheme.to_string(),
            container: container.to_string(),
            key: clean_key(raw_key),
            overrides,
        })
    }

    /// Canonical form used as the metadata-cache key / 规范形式，用作缓存键
    pub fn canonical(&self) -> String {
        if self.key.is_empty() {
            format!("{}://{}", self.scheme, self.container)
        } else {
            format!("{}://{}/{}", self.scheme, self.container, self.key)
        }
    }

    /// Final key segment / 最后一段
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or("")
    }

    /// Whether the final segment carries a file-type suffix. Suffix-less
    /// paths are assumed to be directories and treated as always existing,
    /// trading an existence probe per call for one class of false positives.
    /// 最后一段是否带文件扩展名
    pub fn has_file_suffix(&self) -> bool {
        std::path::Path::new(self.file_name())
            .extension()
            .map(|e| !e.is_empty())
            .unwrap_or(false)
    }

    /// Split the wildcard listing form: a trailing `*` on the final segment
    /// yields (directory part of the key, partial name before the `*`).
    /// 通配符列举形式拆分
    pub fn wildcard_split(&self) -> Option<(String, String)> {
        let stripped = self.key.strip_suffix('*')?;
        match stripped.rsplit_once('/') {
            Some((dir, partial)) => Some((format!("{}/", dir), partial.to_string())),
            None => Some((String::new(), stripped.to_string())),
        }
    }
}

/// Normalize a key: drop empty and `.` segments, resolve `..` by popping
/// (never past the container root). / 规范化对象键
pub fn clean_key(raw: &str) -> String {
    let raw = raw.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();

    for part in raw.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }

    parts.join("/")
}

/// Lift recognized query keys into parameter overrides; unknown keys are
/// ignored. / 查询参数解析
fn parse_query(query: &str) -> VfsResult<RequestParams> {
    let mut params = RequestParams::default();

    for pair in query.split('&') {
        let (name, value) = match pair.split_once('=') {
            Some((n, v)) => (n, v),
            None => (pair, ""),
        };
        let value = urlencoding::decode(value)
            .map_err(|e| VfsError::unsupported("path", format!("bad query encoding: {}", e)))?;

        match name {
            "acl" => {
                params.access_control = AccessControl::parse(&value);
            }
            "contentType" => params.content_type = Some(value.into_owned()),
            "cacheControl" => params.cache_control = Some(value.into_owned()),
            "expires" => {
                let stamp = chrono::DateTime::parse_from_rfc3339(&value).map_err(|e| {
                    VfsError::unsupported("path", format!("bad expires stamp: {}", e))
                })?;
                params.expires = Some(stamp.with_timezone(&chrono::Utc));
            }
            "seekable" => params.seekable = Some(value == "1" || value == "true"),
            "delimiter" => params.delimiter = Some(value.into_owned()),
            _ => {}
        }
    }

    Ok(params)
}
