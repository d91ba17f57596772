//! Failure taxonomy for the virtual filesystem contract / 虚拟文件系统错误分类
//!
//! Backend/SDK errors never escape the public operations untranslated: every
//! driver funnels them through this module and callers only ever see `VfsError`.

use thiserror::Error;

/// Result alias used across the filesystem contract / 文件系统契约的统一返回类型
pub type VfsResult<T> = Result<T, VfsError>;

/// Failure kinds a filesystem operation can report / 文件系统操作的失败类别
#[derive(Debug, Error)]
pub enum VfsError {
    /// Path does not resolve to an object, pseudo-directory or container / 路径不存在
    #[error("not found: {path}")]
    NotFound { path: String },

    /// Backend denied the request / 后端拒绝访问
    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    /// Target already exists (create-exclusive, mkdir) / 目标已存在
    #[error("already exists: {path}")]
    AlreadyExists { path: String },

    /// Directory still holds entries. `nested_dirs` is true when only
    /// sub-directories (common prefixes) remain under it. / 目录非空
    #[error("directory not empty: {path}")]
    NotEmpty { path: String, nested_dirs: bool },

    /// Operation the backend cannot express (e.g. renaming a container-only
    /// path, seeking a sequential body) / 后端不支持的操作
    #[error("unsupported operation: {op}: {reason}")]
    Unsupported { op: &'static str, reason: String },

    /// Opaque wrapped transport/service failure / 封装的后端错误
    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl VfsError {
    /// Shorthand constructors used throughout the drivers / 常用构造函数
    pub fn not_found(path: impl Into<String>) -> Self {
        VfsError::NotFound { path: path.into() }
    }

    pub fn permission_denied(path: impl Into<String>) -> Self {
        VfsError::PermissionDenied { path: path.into() }
    }

    pub fn already_exists(path: impl Into<String>) -> Self {
        VfsError::AlreadyExists { path: path.into() }
    }

    pub fn unsupported(op: &'static str, reason: impl Into<String>) -> Self {
        VfsError::Unsupported { op, reason: reason.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound { .. })
    }
}

/// Surface a failed operation on the diagnostic channel and pass it through.
/// Existence-style probes set `quiet` to suppress the emission while still
/// returning an accurate result. / 失败诊断输出，quiet模式下静默
pub fn report<T>(result: VfsResult<T>, op: &str, path: &str, quiet: bool) -> VfsResult<T> {
    if let Err(ref e) = result {
        if !quiet {
            tracing::warn!("{} failed: path={}, error={}", op, path, e);
        }
    }
    result
}

/// Translate a local filesystem error into the shared taxonomy / 本地IO错误翻译
pub fn from_io_error(err: std::io::Error, path: &str) -> VfsError {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::NotFound => VfsError::not_found(path),
        ErrorKind::PermissionDenied => VfsError::permission_denied(path),
        ErrorKind::AlreadyExists => VfsError::already_exists(path),
        _ => VfsError::Backend(anyhow::Error::new(err).context(path.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_translation() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(from_io_error(err, "/a/b").is_not_found());

        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no");
        assert!(matches!(
            from_io_error(err, "/a/b"),
            VfsError::PermissionDenied { .. }
        ));

        let err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(matches!(from_io_error(err, "/a/b"), VfsError::Backend(_)));
    }

    #[test]
    fn test_report_passes_value_through() {
        let ok: VfsResult<u32> = Ok(7);
        assert_eq!(report(ok, "stat", "s3://b/k", false).unwrap(), 7);

        let err: VfsResult<u32> = Err(VfsError::not_found("s3://b/k"));
        assert!(report(err, "stat", "s3://b/k", true).is_err());
    }
}
