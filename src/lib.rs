pub mod cache;
pub mod error;
pub mod params;
pub mod path;
pub mod vfs;

// Driver modules (point to project root drivers via path attribute) / 驱动模块
#[path = "../drivers/mod.rs"]
pub mod drivers;

pub use cache::StatCache;
pub use error::{VfsError, VfsResult};
pub use params::{AccessControl, ListFilter, RequestParams};
pub use path::VfsPath;
pub use vfs::{
    DirEntry, DriverRegistry, EntryKind, OpenMode, SeekFrom, StatEntry, VfsDir, VfsDriver,
    VfsFile, WriteEvent, WriteObserver,
};

// Register all bundled drivers (call unified registration function from drivers module) / 注册所有驱动
pub async fn register_drivers(registry: &vfs::DriverRegistry) -> anyhow::Result<()> {
    drivers::register_all(registry).await
}
