// 传输层抽象
// 会话编排只依赖这些 trait，russh 实现位于 client.rs / session.rs

use std::sync::Arc;

use async_trait::async_trait;

use super::config::SshConfig;
use super::error::SshError;
use crate::services::sftp::RemoteFs;

/// 建立 SSH 会话
#[async_trait]
pub trait Connector: Send + Sync {
    /// 打开会话（含认证），超时由 `config.connect_timeout` 限定
    async fn open_session(&self, config: &SshConfig) -> Result<Arc<dyn SessionLink>, SshError>;
}

/// 已认证的 SSH 会话，可在其上复用多个通道
#[async_trait]
pub trait SessionLink: Send + Sync {
    /// 打开交互式 Shell 通道
    async fn open_shell(&self, config: &SshConfig) -> Result<Arc<dyn ShellIo>, SshError>;

    /// 打开 SFTP 通道
    async fn open_sftp(&self) -> Result<Arc<dyn RemoteFs>, SshError>;

    /// 关闭会话；已关闭时返回 `SshError::Disconnected`
    async fn close(&self) -> Result<(), SshError>;
}

/// Shell 通道的字节流
///
/// 读取端是非阻塞的：`drain` 只返回当前已缓冲的字节。
/// 实现必须先写入缓冲再置位 `is_closed`，保证关闭后的最后一次 `drain` 能拿到全部剩余数据。
#[async_trait]
pub trait ShellIo: Send + Sync {
    /// 取出当前可用的全部字节（可能为空）
    fn drain(&self) -> Vec<u8>;

    /// 通道是否已被任一方关闭
    fn is_closed(&self) -> bool;

    /// 写入输入端
    async fn write(&self, data: &[u8]) -> Result<(), SshError>;

    /// 刷新输入端
    async fn flush(&self) -> Result<(), SshError>;

    /// 关闭通道；已关闭时返回 `SshError::Disconnected`
    async fn close(&self) -> Result<(), SshError>;
}
