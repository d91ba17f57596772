// Driver package / 驱动包
pub mod local;
pub mod object_store;

use crate::vfs::DriverRegistry;

/// Register all drivers to the registry / 注册所有驱动
pub async fn register_all(registry: &DriverRegistry) -> anyhow::Result<()> {
    // Register local driver (using LocalDriverFactory from vfs module) / 注册本地驱动
    registry
        .register_factory(Box::new(crate::vfs::LocalDriverFactory))
        .await?;
    // Register object-store driver / 注册对象存储驱动
    registry
        .register_factory(Box::new(object_store::ObjectStoreDriverFactory))
        .await?;
    Ok(())
}
