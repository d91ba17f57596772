//! 对象存储驱动配置

use serde::{Deserialize, Serialize};

use crate::params::AccessControl;

/// Object-store configuration / 对象存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// 端点地址，留空使用AWS默认
    /// MinIO: http://localhost:9000
    #[serde(default)]
    pub endpoint: String,
    /// 区域
    #[serde(default = "default_region")]
    pub region: String,
    /// Access Key ID（留空时走环境/实例身份凭证链）
    #[serde(default)]
    pub access_key_id: String,
    /// Secret Access Key
    #[serde(default)]
    pub secret_access_key: String,
    /// Session Token（用于临时凭证）
    #[serde(default)]
    pub session_token: String,
    /// 强制使用路径风格（而非虚拟主机风格）
    /// MinIO等需要设置为true
    #[serde(default)]
    pub force_path_style: bool,
    /// 进程级默认访问控制
    #[serde(default)]
    pub default_acl: Option<AccessControl>,
    /// 静态Cache-Control头，上传时合并
    #[serde(default)]
    pub cache_control: Option<String>,
    /// 对象过期秒数，上传时换算为Expires头
    #[serde(default)]
    pub expires_seconds: Option<i64>,
    /// 元数据缓存容量
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// 列举分页大小
    #[serde(default = "default_page_size")]
    pub page_size: i32,
    /// 顺序读取的分块大小
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_cache_capacity() -> usize {
    1024
}

fn default_page_size() -> i32 {
    1000
}

fn default_read_chunk_size() -> usize {
    1024 * 1024
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: default_region(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            session_token: String::new(),
            force_path_style: false,
            default_acl: None,
            cache_control: None,
            expires_seconds: None,
            cache_capacity: default_cache_capacity(),
            page_size: default_page_size(),
            read_chunk_size: default_read_chunk_size(),
        }
    }
}
