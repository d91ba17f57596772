//! Object store client facade / 对象存储客户端
//!
//! Thin wrapper over the S3 SDK exposing the primitives the adapter needs,
//! with credential resolution and request-parameter injection. Retry and
//! backoff are whatever the SDK client was configured with; nothing is
//! added here.

use std::ops::Range;

use async_trait::async_trait;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::config::ObjectStoreConfig;
use crate::error::{VfsError, VfsResult};
use crate::params::{AccessControl, RequestParams};

/// Metadata returned by a head lookup / head查询返回的元数据
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
}

/// One stored object in a listing page / 列举页中的一个对象
#[derive(Debug, Clone)]
pub struct ListedObject {
    pub key: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// One page of a prefix listing / 前缀列举的一页
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub objects: Vec<ListedObject>,
    /// Keys grouped by the delimiter into one pseudo-directory each / 公共前缀
    pub prefixes: Vec<String>,
    pub next_token: Option<String>,
    pub truncated: bool,
}

/// Parameters of one listing page request / 单页列举请求参数
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub prefix: String,
    pub delimiter: Option<String>,
    pub token: Option<String>,
    pub max_keys: i32,
}

/// Backend primitives the adapter is written against / 适配器依赖的后端原语
#[async_trait]
pub trait ObjectApi: Send + Sync {
    /// GET an object body, optionally a byte range (end exclusive) / 读取对象
    async fn get(&self, container: &str, key: &str, range: Option<Range<u64>>)
        -> VfsResult<Bytes>;

    /// HEAD an object / 查询对象元数据
    async fn head(&self, container: &str, key: &str) -> VfsResult<ObjectMeta>;

    /// PUT a whole object with merged request parameters / 上传整个对象
    async fn put(
        &self,
        container: &str,
        key: &str,
        body: Bytes,
        params: &RequestParams,
    ) -> VfsResult<()>;

    /// DELETE an object; deleting a missing key succeeds / 删除对象
    async fn delete(&self, container: &str, key: &str) -> VfsResult<()>;

    /// Server-side copy / 服务端复制
    async fn copy(
        &self,
        src_container: &str,
        src_key: &str,
        dst_container: &str,
        dst_key: &str,
    ) -> VfsResult<()>;

    /// One page of a prefix listing / 单页前缀列举
    async fn list_page(&self, container: &str, request: &ListRequest) -> VfsResult<ListingPage>;

    /// Container existence probe / 容器存在性探测
    async fn container_exists(&self, container: &str) -> VfsResult<bool>;
}

/// SDK-backed client / 基于官方SDK的客户端实现
pub struct ObjectStoreClient {
    client: Client,
}

impl ObjectStoreClient {
    /// Resolve credentials and build the client / 解析凭证并构建客户端
    ///
    /// Explicit key/secret from the config wins; otherwise the SDK default
    /// provider chain applies (environment, profile, instance identity).
    pub async fn connect(config: &ObjectStoreConfig) -> anyhow::Result<Self> {
        let base = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = S3ConfigBuilder::from(&base);

        if !config.access_key_id.is_empty() {
            let session_token = if config.session_token.is_empty() {
                None
            } else {
                Some(config.session_token.clone())
            };
            builder = builder.credentials_provider(Credentials::new(
                config.access_key_id.clone(),
                config.secret_access_key.clone(),
                session_token,
                None,
                "bucketfs-config",
            ));
        }

        if !config.endpoint.is_empty() {
            builder = builder.endpoint_url(config.endpoint.clone());
        }
        builder = builder.force_path_style(config.force_path_style);

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }

    /// Wrap an externally supplied SDK client as-is / 使用外部提供的客户端
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

/// The single failure-translation boundary: SDK errors become `VfsError`
/// and never escape further up. / 统一错误翻译边界
fn translate_sdk<E>(path: &str, err: SdkError<E>) -> VfsError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = match &err {
        SdkError::ServiceError(ctx) => Some(ctx.raw().status().as_u16()),
        _ => None,
    };
    let code = err.code().map(|c| c.to_string());

    match (code.as_deref(), status) {
        (Some("NoSuchKey"), _) | (Some("NoSuchBucket"), _) | (Some("NotFound"), _)
        | (_, Some(404)) => VfsError::not_found(path),
        (Some("AccessDenied"), _)
        | (Some("InvalidAccessKeyId"), _)
        | (Some("SignatureDoesNotMatch"), _)
        | (_, Some(403)) => VfsError::permission_denied(path),
        (Some("BucketAlreadyOwnedByYou"), _) | (Some("BucketAlreadyExists"), _) => {
            VfsError::already_exists(path)
        }
        _ => VfsError::Backend(anyhow::Error::new(err).context(path.to_string())),
    }
}

fn to_canned_acl(acl: AccessControl) -> ObjectCannedAcl {
    match acl {
        AccessControl::Private => ObjectCannedAcl::Private,
        AccessControl::PublicRead => ObjectCannedAcl::PublicRead,
        AccessControl::AuthenticatedRead => ObjectCannedAcl::AuthenticatedRead,
        AccessControl::PublicReadWrite => ObjectCannedAcl::PublicReadWrite,
    }
}

fn to_chrono(stamp: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    chrono::DateTime::from_timestamp(stamp.secs(), stamp.subsec_nanos())
}

/// Copy source with each key segment percent-encoded / 复制源，逐段URL编码
fn encode_copy_source(container: &str, key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("{}/{}", container, encoded.join("/"))
}

fn loc(container: &str, key: &str) -> String {
    format!("{}/{}", container, key)
}

#[async_trait]
impl ObjectApi for ObjectStoreClient {
    async fn get(
        &self,
        container: &str,
        key: &str,
        range: Option<Range<u64>>,
    ) -> VfsResult<Bytes> {
        tracing::debug!("object get: container={}, key={}, range={:?}", container, key, range);

        let mut request = self.client.get_object().bucket(container).key(key);
        if let Some(r) = &range {
            // HTTP的Range头为闭区间
            request = request.range(format!("bytes={}-{}", r.start, r.end.saturating_sub(1)));
        }

        let output = request
            .send()
            .await
            .map_err(|e| translate_sdk(&loc(container, key), e))?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| VfsError::Backend(anyhow::Error::new(e)))?;
        Ok(data.into_bytes())
    }

    async fn head(&self, container: &str, key: &str) -> VfsResult<ObjectMeta> {
        tracing::debug!("object head: container={}, key={}", container, key);

        let output = self
            .client
            .head_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(|e| translate_sdk(&loc(container, key), e))?;

        Ok(ObjectMeta {
            size: output.content_length().unwrap_or(0).max(0) as u64,
            modified: output.last_modified().and_then(to_chrono),
            content_type: output.content_type().map(|s| s.to_string()),
        })
    }

    async fn put(
        &self,
        container: &str,
        key: &str,
        body: Bytes,
        params: &RequestParams,
    ) -> VfsResult<()> {
        tracing::debug!(
            "object put: container={}, key={}, size={}, content_type={:?}",
            container,
            key,
            body.len(),
            params.content_type
        );

        let mut request = self
            .client
            .put_object()
            .bucket(container)
            .key(key)
            .body(ByteStream::from(body.to_vec()));

        if let Some(content_type) = &params.content_type {
            request = request.content_type(content_type);
        }
        if let Some(acl) = params.access_control {
            request = request.acl(to_canned_acl(acl));
        }
        if let Some(cache_control) = &params.cache_control {
            request = request.cache_control(cache_control);
        }
        if let Some(expires) = params.expires {
            request = request.expires(aws_sdk_s3::primitives::DateTime::from_secs(
                expires.timestamp(),
            ));
        }

        request
            .send()
            .await
            .map(|_| ())
            .map_err(|e| translate_sdk(&loc(container, key), e))
    }

    async fn delete(&self, container: &str, key: &str) -> VfsResult<()> {
        tracing::debug!("object delete: container={}, key={}", container, key);

        self.client
            .delete_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| translate_sdk(&loc(container, key), e))
    }

    async fn copy(
        &self,
        src_container: &str,
        src_key: &str,
        dst_container: &str,
        dst_key: &str,
    ) -> VfsResult<()> {
        tracing::debug!(
            "object copy: {}/{} -> {}/{}",
            src_container,
            src_key,
            dst_container,
            dst_key
        );

        self.client
            .copy_object()
            .copy_source(encode_copy_source(src_container, src_key))
            .bucket(dst_container)
            .key(dst_key)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| translate_sdk(&loc(src_container, src_key), e))
    }

    async fn list_page(&self, container: &str, request: &ListRequest) -> VfsResult<ListingPage> {
        tracing::debug!(
            "object list: container={}, prefix={}, token={:?}",
            container,
            request.prefix,
            request.token
        );

        let mut call = self
            .client
            .list_objects_v2()
            .bucket(container)
            .prefix(&request.prefix)
            .max_keys(request.max_keys);
        if let Some(delimiter) = &request.delimiter {
            call = call.delimiter(delimiter);
        }
        if let Some(token) = &request.token {
            call = call.continuation_token(token);
        }

        let output = call
            .send()
            .await
            .map_err(|e| translate_sdk(&loc(container, &request.prefix), e))?;

        let objects = output
            .contents()
            .iter()
            .map(|obj| ListedObject {
                key: obj.key().unwrap_or_default().to_string(),
                size: obj.size().unwrap_or(0).max(0) as u64,
                modified: obj.last_modified().and_then(to_chrono),
            })
            .collect();

        let prefixes = output
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(|s| s.to_string()))
            .collect();

        Ok(ListingPage {
            objects,
            prefixes,
            next_token: output.next_continuation_token().map(|s| s.to_string()),
            truncated: output.is_truncated().unwrap_or(false),
        })
    }

    async fn container_exists(&self, container: &str) -> VfsResult<bool> {
        tracing::debug!("container head: container={}", container);

        match self
            .client
            .head_bucket()
            .bucket(container)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => match translate_sdk(container, err) {
                VfsError::NotFound { .. } => Ok(false),
                other => Err(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canned_acl_mapping() {
        assert_eq!(
            to_canned_acl(AccessControl::PublicRead),
            ObjectCannedAcl::PublicRead
        );
        assert_eq!(to_canned_acl(AccessControl::Private), ObjectCannedAcl::Private);
        assert_eq!(
            to_canned_acl(AccessControl::AuthenticatedRead),
            ObjectCannedAcl::AuthenticatedRead
        );
    }

    #[test]
    fn test_encode_copy_source_keeps_separators() {
        assert_eq!(
            encode_copy_source("media", "2024/año nuevo.jpg"),
            "media/2024/a%C3%B1o%20nuevo.jpg"
        );
        assert_eq!(encode_copy_source("media", "plain.txt"), "media/plain.txt");
    }
}
