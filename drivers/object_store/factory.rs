//! 对象存储驱动工厂

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::config::ObjectStoreConfig;
use super::driver::ObjectStoreDriver;
use crate::vfs::{DriverFactory, VfsDriver};

/// 对象存储驱动工厂
pub struct ObjectStoreDriverFactory;

#[async_trait]
impl DriverFactory for ObjectStoreDriverFactory {
    fn scheme(&self) -> &'static str {
        "s3"
    }

    async fn create_driver(&self, config: Value) -> Result<Box<dyn VfsDriver>> {
        let config: ObjectStoreConfig =
            serde_json::from_value(config).map_err(|e| anyhow!("配置解析失败: {}", e))?;
        Ok(Box::new(ObjectStoreDriver::connect(config).await?))
    }
}
