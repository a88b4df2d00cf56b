// 远程目录创建（幂等）

use tracing::debug;

use super::error::DirectoryError;
use super::service::RemoteFs;

/// 确保远程目录存在
///
/// 服务器对“目录已存在”只返回通用失败码，无法与其他失败区分，
/// 所以遇到通用失败时再 `stat` 一次：确认存在即视为成功，否则返回最初的错误。
/// 其他类型的失败直接返回，不做二次确认。
pub async fn ensure_directory(fs: &dyn RemoteFs, path: &str) -> Result<(), DirectoryError> {
    let err = match fs.mkdir(path).await {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };

    if err.is_generic_failure() {
        if let Ok(attrs) = fs.stat(path).await {
            if attrs.is_dir {
                debug!("[SFTP] Directory already exists: {}", path);
                return Ok(());
            }
        }
    }

    Err(DirectoryError::Create {
        path: path.to_string(),
        source: err,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sftp::{SftpError, SftpStatus};
    use crate::testing::MemoryFs;

    #[tokio::test]
    async fn test_ensure_directory_twice() {
        let fs = MemoryFs::new("/home/alice");
        ensure_directory(&fs, "/home/alice/project").await.unwrap();
        ensure_directory(&fs, "/home/alice/project").await.unwrap();
        assert!(fs.stat("/home/alice/project").await.unwrap().is_dir);
        assert_eq!(fs.mkdir_calls(), 2);
    }

    #[tokio::test]
    async fn test_existing_file_is_not_a_directory() {
        let fs = MemoryFs::new("/home/alice");
        fs.add_file("/home/alice/project", b"x".to_vec());

        let err = ensure_directory(&fs, "/home/alice/project")
            .await
            .unwrap_err();
        match err {
            DirectoryError::Create { path, source } => {
                assert_eq!(path, "/home/alice/project");
                assert!(source.is_generic_failure());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_other_failures_skip_recheck() {
        let fs = MemoryFs::new("/home/alice");
        fs.fail_mkdir_with(SftpError::status(
            SftpStatus::PermissionDenied,
            "Permission denied",
        ));

        let err = ensure_directory(&fs, "/home/alice/locked")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DirectoryError::Create {
                source: SftpError::Status {
                    status: SftpStatus::PermissionDenied,
                    ..
                },
                ..
            }
        ));
        assert_eq!(fs.stat_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_parent_is_reported() {
        let fs = MemoryFs::new("/home/alice");
        let err = ensure_directory(&fs, "/home/alice/a/b").await.unwrap_err();
        assert!(matches!(err, DirectoryError::Create { .. }));
    }
}
