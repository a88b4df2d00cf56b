// 远程目录列表

use std::cmp::Ordering;

use tracing::debug;

use super::error::DirectoryError;
use super::service::RemoteFs;
use crate::models::sftp::{Listing, RemoteEntry};

/// 切换到 `path` 并列出其内容
///
/// 返回规范化后的绝对路径和排好序的条目：目录在前，同类按原始文件名忽略大小写排序。
/// `.` 被过滤，`..` 保留。
pub async fn list_remote(fs: &dyn RemoteFs, path: &str) -> Result<Listing, DirectoryError> {
    fs.change_dir(path)
        .await
        .map_err(|source| DirectoryError::ChangeDir {
            path: path.to_string(),
            source,
        })?;

    let pwd = fs.pwd().await.map_err(|source| DirectoryError::ChangeDir {
        path: path.to_string(),
        source,
    })?;

    let raw = fs
        .read_dir(&pwd)
        .await
        .map_err(|source| DirectoryError::List {
            path: pwd.clone(),
            source,
        })?;

    let mut entries: Vec<RemoteEntry> = raw
        .iter()
        .filter(|entry| entry.name != ".")
        .map(RemoteEntry::from)
        .collect();
    entries.sort_by(compare_entries);

    debug!("[SFTP] Listed {} ({} entries)", pwd, entries.len());
    Ok(Listing { path: pwd, entries })
}

/// 目录在前；同类按忽略大小写的名称排序，相同时按原始名称保证稳定
fn compare_entries(a: &RemoteEntry, b: &RemoteEntry) -> Ordering {
    b.is_directory
        .cmp(&a.is_directory)
        .then_with(|| a.raw_name.to_lowercase().cmp(&b.raw_name.to_lowercase()))
        .then_with(|| a.raw_name.cmp(&b.raw_name))
}
