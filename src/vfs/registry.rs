//! Backend registry / 后端注册表
//!
//! Explicit table mapping scheme name → driver factory. Owned by the host
//! and passed to collaborators; nothing here is ambient global state.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::VfsDriver;
use crate::error::{VfsError, VfsResult};
use crate::path::VfsPath;

pub type DriverBox = Arc<Box<dyn VfsDriver>>;

/// Driver factory trait / 驱动工厂 trait
///
/// Creation is async because some backends resolve ambient credentials
/// during construction.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Path scheme this factory serves / 工厂服务的路径scheme
    fn scheme(&self) -> &'static str;

    /// 创建驱动实例
    async fn create_driver(&self, config: Value) -> Result<Box<dyn VfsDriver>>;
}

/// Registry of active drivers and their factories / 驱动注册表
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: Arc<RwLock<HashMap<String, DriverBox>>>,
    factories: Arc<RwLock<HashMap<String, Arc<Box<dyn DriverFactory>>>>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver factory / 注册驱动工厂
    pub async fn register_factory(&self, factory: Box<dyn DriverFactory>) -> Result<()> {
        let scheme = factory.scheme().to_string();

        let mut factories = self.factories.write().await;
        factories.insert(scheme.clone(), Arc::new(factory));

        tracing::info!("Driver factory registered: {}", scheme);
        Ok(())
    }

    /// Build the driver for a scheme from its factory config / 创建驱动实例
    pub async fn create_driver(&self, scheme: &str, config: Value) -> Result<()> {
        let factories = self.factories.read().await;
        let factory = factories
            .get(scheme)
            .ok_or_else(|| anyhow!("Driver scheme not registered: {}", scheme))?;

        let factory = factory.clone();
        drop(factories);

        match factory.create_driver(config).await {
            Ok(driver) => {
                let mut drivers = self.drivers.write().await;
                drivers.insert(scheme.to_string(), Arc::new(driver));
                tracing::info!("Driver created: {}", scheme);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Driver creation failed: {} - {}", scheme, e);
                Err(e)
            }
        }
    }

    /// Install an already-built driver instance / 安装现成的驱动实例
    pub async fn install_driver(&self, scheme: &str, driver: Box<dyn VfsDriver>) {
        let mut drivers = self.drivers.write().await;
        drivers.insert(scheme.to_string(), Arc::new(driver));
        tracing::info!("Driver installed: {}", scheme);
    }

    /// Get driver instance / 获取驱动实例
    pub async fn get_driver(&self, scheme: &str) -> Option<DriverBox> {
        let drivers = self.drivers.read().await;
        drivers.get(scheme).cloned()
    }

    /// Remove driver instance / 移除驱动实例
    pub async fn remove_driver(&self, scheme: &str) -> Result<()> {
        let mut drivers = self.drivers.write().await;
        drivers
            .remove(scheme)
            .ok_or_else(|| anyhow!("Driver not found: {}", scheme))?;

        tracing::info!("Driver removed: {}", scheme);
        Ok(())
    }

    /// Schemes with an active driver / 已激活的scheme
    pub async fn list_schemes(&self) -> Vec<String> {
        let drivers = self.drivers.read().await;
        drivers.keys().cloned().collect()
    }

    /// Registered factory schemes / 已注册的工厂scheme
    pub async fn list_factory_schemes(&self) -> Vec<String> {
        let factories = self.factories.read().await;
        factories.keys().cloned().collect()
    }

    /// Resolve a full path to the driver serving its scheme / 按路径解析驱动
    pub async fn resolve(&self, path: &str) -> VfsResult<DriverBox> {
        let parsed = VfsPath::parse(path)?;
        self.get_driver(&parsed.scheme).await.ok_or_else(|| {
            VfsError::unsupported("resolve", format!("no driver for scheme: {}", parsed.scheme))
        })
    }
}
