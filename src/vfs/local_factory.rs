use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

use super::{DriverFactory, VfsDriver};
use crate::drivers::local;

/// Factory for the local-disk fallback driver / 本地磁盘驱动工厂
pub struct LocalDriverFactory;

#[async_trait]
impl DriverFactory for LocalDriverFactory {
    fn scheme(&self) -> &'static str {
        "file"
    }

    async fn create_driver(&self, config: Value) -> Result<Box<dyn VfsDriver>> {
        let root_path = config
            .get("root")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("缺少 root 配置"))?;

        let root = PathBuf::from(root_path);

        // 同步初始化（工厂方法是同步的）
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }
        let canonical_root = root.canonicalize()?;

        tracing::info!("Local driver initialized, root: {:?}", canonical_root);

        Ok(Box::new(local::LocalDriver::new(canonical_root)))
    }
}
