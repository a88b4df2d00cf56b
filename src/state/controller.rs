// 会话协调器
// 前台持有当前远程路径、目录列表和下载任务列表；网络与磁盘操作都交给 TaskScheduler

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Context};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::event::{UiEvent, UiSender};
use super::scheduler::TaskScheduler;
use crate::models::settings::AppSettings;
use crate::models::sftp::{join_path, Listing, RemoteEntry, TaskList};
use crate::services::cache::LocalCache;
use crate::services::opener::open_local;
use crate::services::sftp::{
    ensure_directory, list_remote, upload_tree, DirectoryError, RemoteFs, TransferEngine,
    TransferError,
};
use crate::services::shell::ShellRelay;
use crate::ssh::{ConnectionState, Connector, Session, SessionManager, SshConfig};

/// 断开后等待 Shell 转发输出关闭提示的上限
const RELAY_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// 一个活动会话及其上的服务
struct ActiveSession {
    session: Arc<Session>,
    engine: TransferEngine,
    relay: ShellRelay,
}

/// 会话协调器
///
/// 方法都在前台调用且不阻塞：需要网络或磁盘的操作提交到后台，
/// 结果通过 `UiEvent` 回到前台，再由 [`SessionController::apply`] 更新本地状态。
/// 当前远程路径只在 `apply` 收到新列表时改变。
pub struct SessionController {
    settings: AppSettings,
    scheduler: TaskScheduler,
    ui: UiSender,
    manager: SessionManager,
    tasks: TaskList,
    cache: LocalCache,
    active: Arc<Mutex<Option<Arc<ActiveSession>>>>,
    /// 后台连接进行中，直到会话写入 `active` 或连接失败
    connecting: Arc<AtomicBool>,
    current_path: String,
    listing: Listing,
    connection: ConnectionState,
}

impl SessionController {
    pub fn new(
        settings: AppSettings,
        scheduler: TaskScheduler,
        connector: Arc<dyn Connector>,
        cache: LocalCache,
    ) -> Self {
        let ui = scheduler.ui().clone();
        Self {
            settings,
            manager: SessionManager::new(connector, ui.clone()),
            scheduler,
            ui,
            tasks: TaskList::new(),
            cache,
            active: Arc::default(),
            connecting: Arc::default(),
            current_path: String::new(),
            listing: Listing::default(),
            connection: ConnectionState::Disconnected,
        }
    }

    pub fn current_path(&self) -> &str {
        &self.current_path
    }

    pub fn listing(&self) -> &Listing {
        &self.listing
    }

    pub fn tasks(&self) -> &TaskList {
        &self.tasks
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.slot().is_some()
    }

    /// 处理一条前台事件
    pub fn apply(&mut self, event: &UiEvent) {
        match event {
            UiEvent::Listing(listing) => {
                self.current_path = listing.path.clone();
                self.listing = listing.clone();
            }
            UiEvent::Connection(state) => {
                self.connection = *state;
                if *state == ConnectionState::Disconnected {
                    self.listing = Listing::default();
                }
            }
            _ => {}
        }
    }

    /// 连接并打开 Shell / SFTP 通道，成功后列出主目录
    pub fn connect(&self, config: SshConfig) -> Option<JoinHandle<()>> {
        if self.is_connected() || self.connection == ConnectionState::Connected {
            self.ui.line("Already connected");
            return None;
        }
        if self.connecting.swap(true, Ordering::AcqRel) {
            self.ui.line("Connection already in progress");
            return None;
        }

        let manager = self.manager.clone();
        let scheduler = self.scheduler.clone();
        let ui = self.ui.clone();
        let tasks = self.tasks.clone();
        let cache = self.cache.clone();
        let slot = self.active.clone();
        let connecting = self.connecting.clone();
        let poll_interval = self.settings.terminal.poll_interval();

        Some(self.scheduler.spawn_reported("Connection", async move {
            let session = manager.connect(&config).await;
            let session = match session {
                Ok(session) => session,
                Err(e) => {
                    connecting.store(false, Ordering::Release);
                    return Err(e);
                }
            };

            let active = Arc::new(ActiveSession {
                engine: TransferEngine::new(session.fs(), tasks, cache, ui.clone()),
                relay: ShellRelay::start(session.shell(), ui.clone(), poll_interval, &scheduler),
                session,
            });
            let fs = active.session.fs();
            *lock(&slot) = Some(active);
            connecting.store(false, Ordering::Release);

            if let Err(e) = publish_listing(fs.as_ref(), ".", &ui).await {
                ui.line(format!("Listing failed: {}", e));
            }
            Ok::<(), crate::ssh::SshError>(())
        }))
    }

    /// 向 Shell 发送一条命令
    pub fn send_command(&self, text: impl Into<String>) -> Option<JoinHandle<()>> {
        let active = self.require_active()?;
        let text = text.into();
        Some(
            self.scheduler
                .spawn(async move { active.relay.send_command(&text).await }),
        )
    }

    /// 重新列出当前目录
    pub fn refresh(&self) -> Option<JoinHandle<()>> {
        let path = if self.current_path.is_empty() {
            ".".to_string()
        } else {
            self.current_path.clone()
        };
        self.navigate(path)
    }

    /// 切换到指定目录并列出
    pub fn navigate(&self, path: impl Into<String>) -> Option<JoinHandle<()>> {
        let active = self.require_active()?;
        let path = path.into();
        let ui = self.ui.clone();

        Some(self.scheduler.spawn_reported("Listing", async move {
            publish_listing(active.engine.fs(), &path, &ui).await
        }))
    }

    /// 打开一个列表条目：目录进入，文件下载后用默认程序打开
    pub fn enter(&self, entry: &RemoteEntry) -> Option<JoinHandle<()>> {
        if entry.is_directory {
            self.navigate(join_path(&self.current_path, &entry.raw_name))
        } else {
            self.open_remote_file(entry)
        }
    }

    /// 下载文件到缓存目录
    pub fn download(&self, entry: &RemoteEntry) -> Option<JoinHandle<()>> {
        let active = self.require_active()?;
        let remote = join_path(&self.current_path, &entry.raw_name);
        let name = entry.raw_name.clone();
        let cache = self.cache.clone();

        Some(self.scheduler.spawn_reported("Download", async move {
            fetch(&active, &cache, &remote, &name).await.map(|_| ())
        }))
    }

    /// 下载文件到缓存目录，然后用系统默认程序打开
    pub fn open_remote_file(&self, entry: &RemoteEntry) -> Option<JoinHandle<()>> {
        let active = self.require_active()?;
        let remote = join_path(&self.current_path, &entry.raw_name);
        let name = entry.raw_name.clone();
        let cache = self.cache.clone();
        let scheduler = self.scheduler.clone();

        Some(self.scheduler.spawn_reported("Open", async move {
            let local = fetch(&active, &cache, &remote, &name).await?;
            open_in_background(&scheduler, local, &name).await
        }))
    }

    /// 用默认程序打开缓存目录中已下载的文件，不需要连接
    pub fn open_cached(&self, name: &str) -> JoinHandle<()> {
        let name = name.to_string();
        let cache = self.cache.clone();
        let scheduler = self.scheduler.clone();

        self.scheduler.spawn_reported("Open", async move {
            // 只接受缓存根目录下的文件名
            if Path::new(&name).file_name() != Some(OsStr::new(&name)) {
                return Err(anyhow!("Invalid cached file name {}", name));
            }
            let local = cache.path_for(&name);
            if !local.is_file() {
                return Err(anyhow!("{} is not in the download cache", name));
            }
            open_in_background(&scheduler, local, &name).await
        })
    }

    /// 上传本地文件或目录到当前远程目录
    pub fn upload(&self, local: impl Into<PathBuf>) -> Option<JoinHandle<()>> {
        let active = self.require_active()?;
        let local = local.into();
        let current = self.current_path.clone();
        let ui = self.ui.clone();

        Some(self.scheduler.spawn_reported("Upload", async move {
            let name = local
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| anyhow!("Invalid local path {}", local.display()))?;

            upload_path(&active.engine, &local, &name).await?;
            ui.line("Upload succeeded");

            publish_listing(active.engine.fs(), &current, &ui).await?;
            Ok::<(), anyhow::Error>(())
        }))
    }

    /// 扫描缓存目录，把尚未列出的文件作为已完成任务追加到列表
    pub fn download_list(&self) -> JoinHandle<()> {
        let tasks = self.tasks.clone();
        let cache = self.cache.clone();
        let ui = self.ui.clone();

        self.scheduler.spawn_blocking(move || {
            match cache.scan_as_entries(&tasks.file_names()) {
                Ok(found) => {
                    for task in found {
                        tasks.push_back(Arc::new(task));
                    }
                    ui.send(UiEvent::TaskList(tasks.snapshots()));
                }
                Err(e) => ui.line(format!("Could not read download cache: {}", e)),
            }
        })
    }

    /// 清理缓存
    ///
    /// 列表里立即去掉非传输中的任务；物理删除在后台进行，跳过传输中的文件。
    pub fn clear_cache(&self) -> JoinHandle<()> {
        let removed = self.tasks.retain_in_progress();
        self.ui.send(UiEvent::TaskList(self.tasks.snapshots()));
        info!("[Cache] Dropped {} finished tasks from the list", removed);

        let exclude = self.tasks.in_progress_names();
        let cache = self.cache.clone();
        let ui = self.ui.clone();

        self.scheduler.spawn_blocking(move || {
            let report = cache.purge(&exclude);
            for (path, err) in &report.failures {
                ui.line(format!("Could not delete {}: {}", path.display(), err));
            }
            ui.line(format!(
                "Download cache cleared ({} files removed)",
                report.removed_files
            ));
        })
    }

    /// 断开当前会话
    pub fn disconnect(&self) -> Option<JoinHandle<()>> {
        let active = lock(&self.active).take()?;
        let manager = self.manager.clone();

        Some(self.scheduler.spawn(async move {
            manager.disconnect(&active.session).await;
            if tokio::time::timeout(RELAY_SHUTDOWN_TIMEOUT, active.relay.wait_finished())
                .await
                .is_err()
            {
                warn!("[Shell] Relay still running after disconnect");
            }
        }))
    }

    fn slot(&self) -> Option<Arc<ActiveSession>> {
        lock(&self.active).clone()
    }

    fn require_active(&self) -> Option<Arc<ActiveSession>> {
        let active = self.slot();
        if active.is_none() {
            self.ui.line("Not connected");
        }
        active
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 列出目录并投递到前台
async fn publish_listing(
    fs: &dyn RemoteFs,
    path: &str,
    ui: &UiSender,
) -> Result<(), DirectoryError> {
    let listing = list_remote(fs, path).await?;
    ui.send(UiEvent::Listing(listing));
    Ok(())
}

/// 下载到缓存目录，返回本地路径
async fn fetch(
    active: &ActiveSession,
    cache: &LocalCache,
    remote: &str,
    name: &str,
) -> Result<PathBuf, TransferError> {
    let attrs = active
        .engine
        .fs()
        .stat(remote)
        .await
        .map_err(|e| TransferError::new(remote, e))?;
    cache
        .ensure_root()
        .map_err(|e| TransferError::new(cache.root().display().to_string(), e))?;

    let local = cache.path_for(name);
    active.engine.download(remote, &local, attrs.size).await?;
    Ok(local)
}

/// 在阻塞线程池上调用系统默认程序
async fn open_in_background(
    scheduler: &TaskScheduler,
    local: PathBuf,
    name: &str,
) -> anyhow::Result<()> {
    scheduler.ui().line(format!("Opening {}", name));
    scheduler
        .spawn_blocking(move || open_local(&local))
        .await
        .context("Opener task panicked")?
        .with_context(|| format!("Could not open {}", name))?;
    Ok(())
}

/// 上传单个文件，或确保目标目录存在后上传整棵目录树
async fn upload_path(
    engine: &TransferEngine,
    local: &Path,
    remote_name: &str,
) -> anyhow::Result<()> {
    if local.is_dir() {
        ensure_directory(engine.fs(), remote_name).await?;
        upload_tree(engine, local, remote_name).await?;
    } else {
        engine.upload_file(local, remote_name).await?;
    }
    Ok(())
}
