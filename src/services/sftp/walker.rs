// 目录树上传

use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use super::error::TransferError;
use super::mkdir::ensure_directory;
use super::transfer::TransferEngine;
use crate::models::sftp::join_path;

/// 遍历得到的一项
#[derive(Debug)]
struct WalkItem {
    local: PathBuf,
    remote: String,
    is_dir: bool,
}

/// 把本地目录树镜像上传到 `remote_base` 下
///
/// 先序遍历，目录总是在其内容之前创建；根目录本身对应 `remote_base`，
/// 由调用方负责确保存在。任一文件上传失败即中止整个遍历。
/// 返回上传的文件数。
pub async fn upload_tree(
    engine: &TransferEngine,
    local_root: &Path,
    remote_base: &str,
) -> Result<usize, TransferError> {
    info!("[SFTP] Uploading tree {:?} -> {}", local_root, remote_base);
    let items = collect(local_root, remote_base).await?;

    let mut uploaded = 0;
    for item in items {
        if item.is_dir {
            debug!("[SFTP] Ensuring remote directory {}", item.remote);
            ensure_directory(engine.fs(), &item.remote)
                .await
                .map_err(|e| TransferError::new(item.remote.clone(), e))?;
        } else {
            engine.upload_file(&item.local, &item.remote).await?;
            uploaded += 1;
        }
    }

    info!("[SFTP] Tree upload finished: {} files", uploaded);
    Ok(uploaded)
}

/// 在阻塞线程上遍历本地目录
async fn collect(local_root: &Path, remote_base: &str) -> Result<Vec<WalkItem>, TransferError> {
    let root = local_root.to_path_buf();
    let base = remote_base.to_string();

    tokio::task::spawn_blocking(move || walk(&root, &base))
        .await
        .map_err(|e| TransferError::new(local_root.display().to_string(), io::Error::other(e)))?
}

fn walk(root: &Path, remote_base: &str) -> Result<Vec<WalkItem>, TransferError> {
    let mut items = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).display().to_string();
            TransferError::new(path, io::Error::from(e))
        })?;

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        items.push(WalkItem {
            local: entry.path().to_path_buf(),
            remote: remote_path(remote_base, relative),
            is_dir: entry.file_type().is_dir(),
        });
    }
    Ok(items)
}

/// 相对路径转为远程路径，始终以 `/` 分隔
fn remote_path(remote_base: &str, relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy()),
            _ => None,
        })
        .fold(remote_base.to_string(), |acc, name| join_path(&acc, &name))
}
