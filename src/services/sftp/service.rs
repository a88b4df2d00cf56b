// SFTP 服务 - 封装 russh-sftp 客户端

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileAttributes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use super::error::SftpError;
use crate::constants::TRANSFER_CHUNK_SIZE;
use crate::models::sftp::{join_path, RemoteAttrs, RemoteDirEntry};

/// 传输通道
///
/// 带有一个“当前远程目录”游标，只有 `change_dir` 会修改它；
/// 其余操作中的相对路径都基于这个游标解析。
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// 切换当前目录
    async fn change_dir(&self, path: &str) -> Result<(), SftpError>;

    /// 当前目录的规范化绝对路径
    async fn pwd(&self) -> Result<String, SftpError>;

    /// 列出目录
    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteDirEntry>, SftpError>;

    /// 获取属性
    async fn stat(&self, path: &str) -> Result<RemoteAttrs, SftpError>;

    /// 创建目录
    async fn mkdir(&self, path: &str) -> Result<(), SftpError>;

    /// 下载文件，总是覆盖本地已有文件；`progress` 收到每次的字节增量
    async fn get(
        &self,
        remote: &str,
        local: &Path,
        progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<u64, SftpError>;

    /// 把数据流写入远程文件
    async fn put(
        &self,
        source: &mut (dyn AsyncRead + Send + Unpin),
        remote: &str,
    ) -> Result<u64, SftpError>;

    /// 关闭通道；已关闭时返回 `SftpError::Closed`
    async fn close(&self) -> Result<(), SftpError>;
}

/// 基于 russh-sftp 的传输通道
pub struct RusshRemoteFs {
    sftp: SftpSession,
    cwd: Mutex<String>,
    closed: AtomicBool,
}

impl RusshRemoteFs {
    /// 在已请求 sftp 子系统的通道流上创建会话，游标初始为用户主目录
    pub async fn open<S>(stream: S) -> Result<Self, SftpError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let sftp = SftpSession::new(stream).await?;
        let home = sftp.canonicalize(".").await?;
        debug!("[SFTP] Home directory: {}", home);

        Ok(Self {
            sftp,
            cwd: Mutex::new(home),
            closed: AtomicBool::new(false),
        })
    }

    fn cwd(&self) -> String {
        self.cwd
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 相对路径基于当前目录解析
    fn resolve(&self, path: &str) -> String {
        if path.starts_with('/') {
            path.to_string()
        } else if path.is_empty() || path == "." {
            self.cwd()
        } else {
            join_path(&self.cwd(), path)
        }
    }

    fn ensure_open(&self) -> Result<(), SftpError> {
        if self.closed.load(Ordering::Acquire) {
            Err(SftpError::Closed)
        } else {
            Ok(())
        }
    }
}

fn to_attrs(attrs: &FileAttributes) -> RemoteAttrs {
    RemoteAttrs {
        size: attrs.size.unwrap_or(0),
        permissions: attrs.permissions,
        mtime: attrs.mtime,
        is_dir: attrs.is_dir(),
        is_symlink: attrs.is_symlink(),
    }
}

#[async_trait]
impl RemoteFs for RusshRemoteFs {
    async fn change_dir(&self, path: &str) -> Result<(), SftpError> {
        self.ensure_open()?;
        let canonical = self.sftp.canonicalize(self.resolve(path)).await?;
        let attrs = self.sftp.metadata(canonical.clone()).await?;
        if !attrs.is_dir() {
            return Err(SftpError::NotADirectory(canonical));
        }

        debug!("[SFTP] cd {}", canonical);
        *self.cwd.lock().unwrap_or_else(PoisonError::into_inner) = canonical;
        Ok(())
    }

    async fn pwd(&self) -> Result<String, SftpError> {
        self.ensure_open()?;
        Ok(self.cwd())
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteDirEntry>, SftpError> {
        self.ensure_open()?;
        let path = self.resolve(path);
        debug!("[SFTP] Reading directory: {}", path);

        let entries: Vec<RemoteDirEntry> = self
            .sftp
            .read_dir(path.clone())
            .await?
            .map(|entry| RemoteDirEntry::new(entry.file_name(), to_attrs(&entry.metadata())))
            .collect();

        debug!("[SFTP] Read {} entries from {}", entries.len(), path);
        Ok(entries)
    }

    async fn stat(&self, path: &str) -> Result<RemoteAttrs, SftpError> {
        self.ensure_open()?;
        let attrs = self.sftp.metadata(self.resolve(path)).await?;
        Ok(to_attrs(&attrs))
    }

    async fn mkdir(&self, path: &str) -> Result<(), SftpError> {
        self.ensure_open()?;
        let path = self.resolve(path);
        info!("[SFTP] Creating directory: {}", path);
        self.sftp.create_dir(path).await?;
        Ok(())
    }

    async fn get(
        &self,
        remote: &str,
        local: &Path,
        progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<u64, SftpError> {
        self.ensure_open()?;
        let remote = self.resolve(remote);
        let mut remote_file = self.sftp.open(remote.clone()).await?;
        // File::create 会截断已有文件
        let mut local_file = tokio::fs::File::create(local).await?;

        let mut buffer = vec![0u8; TRANSFER_CHUNK_SIZE];
        let mut transferred = 0u64;
        loop {
            let n = remote_file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            local_file.write_all(&buffer[..n]).await?;
            transferred += n as u64;
            progress(n as u64);
        }
        local_file.flush().await?;

        debug!("[SFTP] Downloaded {} ({} bytes) -> {:?}", remote, transferred, local);
        Ok(transferred)
    }

    async fn put(
        &self,
        source: &mut (dyn AsyncRead + Send + Unpin),
        remote: &str,
    ) -> Result<u64, SftpError> {
        self.ensure_open()?;
        let remote = self.resolve(remote);
        let mut remote_file = self.sftp.create(remote.clone()).await?;

        let mut buffer = vec![0u8; TRANSFER_CHUNK_SIZE];
        let mut transferred = 0u64;
        loop {
            let n = source.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            remote_file.write_all(&buffer[..n]).await?;
            transferred += n as u64;
        }
        remote_file.shutdown().await?;

        debug!("[SFTP] Uploaded {} bytes -> {}", transferred, remote);
        Ok(transferred)
    }

    async fn close(&self) -> Result<(), SftpError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(SftpError::Closed);
        }
        info!("[SFTP] Closing SFTP session");
        self.sftp.close().await?;
        Ok(())
    }
}
