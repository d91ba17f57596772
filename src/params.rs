//! Per-request parameter merging / 请求参数合并
//!
//! Every operation resolves one effective parameter set from three layers:
//! explicit per-call override > per-context option > process-wide default.
//! Defaults are injected at driver construction, never read from ambient
//! global state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{VfsError, VfsResult};

/// Canned access-control grants understood by the object backend / 预设访问控制
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessControl {
    Private,
    PublicRead,
    AuthenticatedRead,
    PublicReadWrite,
}

impl AccessControl {
    /// Parse the wire form used in query strings and configs / 解析字符串形式
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "private" => Some(AccessControl::Private),
            "public-read" => Some(AccessControl::PublicRead),
            "authenticated-read" => Some(AccessControl::AuthenticatedRead),
            "public-read-write" => Some(AccessControl::PublicReadWrite),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessControl::Private => "private",
            AccessControl::PublicRead => "public-read",
            AccessControl::AuthenticatedRead => "authenticated-read",
            AccessControl::PublicReadWrite => "public-read-write",
        }
    }

    /// Deterministic mapping from mkdir permission bits to a grant.
    /// Owner rwx → public-read, owner rw → authenticated-read, else private.
    /// 权限位到访问控制的确定性映射
    pub fn from_mode(mode: u32) -> Self {
        match mode & 0o700 {
            0o700 => AccessControl::PublicRead,
            0o600 => AccessControl::AuthenticatedRead,
            _ => AccessControl::Private,
        }
    }
}

/// Filter applied to listing entry names / 列举结果过滤器
#[derive(Debug, Clone)]
pub struct ListFilter(regex::Regex);

impl ListFilter {
    pub fn new(pattern: &str) -> VfsResult<Self> {
        let re = regex::Regex::new(pattern)
            .map_err(|e| VfsError::unsupported("list_filter", e.to_string()))?;
        Ok(ListFilter(re))
    }

    pub fn matches(&self, name: &str) -> bool {
        self.0.is_match(name)
    }
}

/// Merged request configuration / 合并后的请求配置
///
/// All fields optional; `None` means "fall through to the next layer".
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    /// Access-control grant applied on upload / 上传时的访问控制
    pub access_control: Option<AccessControl>,
    /// Explicit content type; detected from the key extension when unset / 内容类型
    pub content_type: Option<String>,
    /// Static Cache-Control header value / 缓存控制头
    pub cache_control: Option<String>,
    /// Static expiry stamp / 过期时间
    pub expires: Option<DateTime<Utc>>,
    /// Request a seekable read body (consumed bytes retained for backward
    /// seeks) / 请求可回退读取
    pub seekable: Option<bool>,
    /// Listing delimiter, defaults to "/" / 列举分隔符
    pub delimiter: Option<String>,
    /// Listing entry filter / 列举过滤器
    pub list_filter: Option<ListFilter>,
}

impl RequestParams {
    /// Layer `self` (the more specific set) over `base`; every field present
    /// in `self` wins. / 以self覆盖base合并
    pub fn overlay(&self, base: &RequestParams) -> RequestParams {
        RequestParams {
            access_control: self.access_control.or(base.access_control),
            content_type: self.content_type.clone().or_else(|| base.content_type.clone()),
            cache_control: self.cache_control.clone().or_else(|| base.cache_control.clone()),
            expires: self.expires.or(base.expires),
            seekable: self.seekable.or(base.seekable),
            delimiter: self.delimiter.clone().or_else(|| base.delimiter.clone()),
            list_filter: self.list_filter.clone().or_else(|| base.list_filter.clone()),
        }
    }

    /// Effective delimiter for directory emulation / 生效的分隔符
    pub fn delimiter_or_default(&self) -> &str {
        self.delimiter.as_deref().unwrap_or("/")
    }

    pub fn wants_seekable(&self) -> bool {
        self.seekable.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_precedence() {
        let defaults = RequestParams {
            access_control: Some(AccessControl::Private),
            cache_control: Some("max-age=300".to_string()),
            ..Default::default()
        };
        let context = RequestParams {
            access_control: Some(AccessControl::PublicRead),
            content_type: Some("image/png".to_string()),
            ..Default::default()
        };
        let call = RequestParams {
            content_type: Some("image/webp".to_string()),
            ..Default::default()
        };

        let effective = call.overlay(&context.overlay(&defaults));
        assert_eq!(effective.access_control, Some(AccessControl::PublicRead));
        assert_eq!(effective.content_type.as_deref(), Some("image/webp"));
        assert_eq!(effective.cache_control.as_deref(), Some("max-age=300"));
        assert_eq!(effective.delimiter_or_default(), "/");
    }

    #[test]
    fn test_access_control_from_mode() {
        assert_eq!(AccessControl::from_mode(0o700), AccessControl::PublicRead);
        assert_eq!(AccessControl::from_mode(0o777), AccessControl::PublicRead);
        assert_eq!(AccessControl::from_mode(0o600), AccessControl::AuthenticatedRead);
        assert_eq!(AccessControl::from_mode(0o644), AccessControl::AuthenticatedRead);
        assert_eq!(AccessControl::from_mode(0o400), AccessControl::Private);
        assert_eq!(AccessControl::from_mode(0), AccessControl::Private);
    }

    #[test]
    fn test_access_control_parse_round_trip() {
        for acl in [
            AccessControl::Private,
            AccessControl::PublicRead,
            AccessControl::AuthenticatedRead,
            AccessControl::PublicReadWrite,
        ] {
            assert_eq!(AccessControl::parse(acl.as_str()), Some(acl));
        }
        assert_eq!(AccessControl::parse("bucket-owner"), None);
    }

    #[test]
    fn test_list_filter() {
        let filter = ListFilter::new(r"\.jpg$").unwrap();
        assert!(filter.matches("photo.jpg"));
        assert!(!filter.matches("photo.png"));
        assert!(ListFilter::new("[unclosed").is_err());
    }
}
