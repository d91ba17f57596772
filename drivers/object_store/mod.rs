//! Object-store backed virtual filesystem driver / 对象存储虚拟文件系统驱动
//!
//! 设计原则：
//! - 所有后端调用经过统一的错误翻译边界
//! - 目录在扁平键空间上模拟（零字节占位对象，键以分隔符结尾）
//! - 写入全量缓冲，关闭时一次性上传

pub mod client;
pub mod config;
pub mod dir;
pub mod driver;
pub mod factory;
pub mod file;

#[cfg(test)]
pub mod testing;

pub use client::{ListRequest, ListingPage, ObjectApi, ObjectMeta, ObjectStoreClient};
pub use config::ObjectStoreConfig;
pub use dir::ObjectDir;
pub use driver::ObjectStoreDriver;
pub use factory::ObjectStoreDriverFactory;
pub use file::ObjectFile;
