// 单文件传输（带进度统计）

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncRead;
use tracing::{debug, error, info};

use super::error::TransferError;
use super::service::RemoteFs;
use crate::models::sftp::{TaskList, TransferTask};
use crate::services::cache::LocalCache;
use crate::state::{UiEvent, UiSender};

/// 传输引擎
///
/// 下载会登记到共享任务列表（最新的在最前）并持续上报进度；
/// 上传不建任务，只向终端日志输出开始/成功/失败文本。失败不会自动重试。
#[derive(Clone)]
pub struct TransferEngine {
    fs: Arc<dyn RemoteFs>,
    tasks: TaskList,
    cache: LocalCache,
    ui: UiSender,
}

impl TransferEngine {
    pub fn new(fs: Arc<dyn RemoteFs>, tasks: TaskList, cache: LocalCache, ui: UiSender) -> Self {
        Self {
            fs,
            tasks,
            cache,
            ui,
        }
    }

    pub fn fs(&self) -> &dyn RemoteFs {
        self.fs.as_ref()
    }

    /// 下载远程文件到本地，总是覆盖已有文件
    ///
    /// 返回的任务句柄在成功时为 Completed；失败时任务被标记为 Failed，
    /// 错误以 `TransferError` 返回。
    pub async fn download(
        &self,
        remote: &str,
        local: &Path,
        total: u64,
    ) -> Result<Arc<TransferTask>, TransferError> {
        let file_name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| remote.to_string());

        let task = Arc::new(TransferTask::new(file_name, total));
        self.tasks.push_front(task.clone());
        self.ui.send(UiEvent::TaskAdded(task.snapshot()));
        info!("[SFTP] Downloading {} ({} bytes) -> {:?}", remote, total, local);

        // 写入期间禁止清理删除该文件
        let _lease = self.cache.lease(local);

        // 进度事件按整百分比节流
        let last_percent = AtomicU64::new(u64::MAX);
        let progress = |increment: u64| {
            task.add_progress(increment);
            let percent = (task.progress() * 100.0) as u64;
            if last_percent.swap(percent, Ordering::AcqRel) != percent {
                self.ui.send(UiEvent::TaskUpdated(task.snapshot()));
            }
        };

        match self.fs.get(remote, local, &progress).await {
            Ok(bytes) => {
                task.finish();
                self.ui.send(UiEvent::TaskUpdated(task.snapshot()));
                debug!("[SFTP] Download of {} finished ({} bytes)", remote, bytes);
                Ok(task)
            }
            Err(e) => {
                error!("[SFTP] Download of {} failed: {}", remote, e);
                task.fail(e.to_string());
                self.ui.send(UiEvent::TaskUpdated(task.snapshot()));
                Err(TransferError::new(remote, e))
            }
        }
    }

    /// 上传一个数据流到当前远程目录下的 `remote_name`
    pub async fn upload(
        &self,
        source: &mut (dyn AsyncRead + Send + Unpin),
        remote_name: &str,
    ) -> Result<u64, TransferError> {
        self.ui.line(format!("Uploading {}...", remote_name));

        match self.fs.put(source, remote_name).await {
            Ok(bytes) => {
                info!("[SFTP] Uploaded {} ({} bytes)", remote_name, bytes);
                self.ui.line(format!("Uploaded {}", remote_name));
                Ok(bytes)
            }
            Err(e) => {
                error!("[SFTP] Upload of {} failed: {}", remote_name, e);
                self.ui.line(format!("Upload failed: {}: {}", remote_name, e));
                Err(TransferError::new(remote_name, e))
            }
        }
    }

    /// 上传本地文件
    pub async fn upload_file(&self, local: &Path, remote_name: &str) -> Result<u64, TransferError> {
        let mut file = match tokio::fs::File::open(local).await {
            Ok(file) => file,
            Err(e) => {
                self.ui
                    .line(format!("Upload failed: {}: {}", local.display(), e));
                return Err(TransferError::new(local.display().to_string(), e));
            }
        };
        self.upload(&mut file, remote_name).await
    }
}
