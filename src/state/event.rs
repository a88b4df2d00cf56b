// 前台事件
// 后台任务产生的所有展示层更新都经由同一个有序通道投递

use tokio::sync::mpsc;

use crate::models::sftp::{Listing, TransferSnapshot};
use crate::ssh::ConnectionState;

/// 投递给前台的更新
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// 追加到终端日志的文本
    Output(String),
    /// 连接状态变化
    Connection(ConnectionState),
    /// 已连接的目标
    ConnectionInfo {
        host: String,
        port: u16,
        user: String,
    },
    /// 新的目录列表（整体替换旧列表）
    Listing(Listing),
    /// 新增下载任务
    TaskAdded(TransferSnapshot),
    /// 下载任务进度或状态变化
    TaskUpdated(TransferSnapshot),
    /// 整个任务列表被替换（扫描缓存或清理缓存之后）
    TaskList(Vec<TransferSnapshot>),
}

pub type UiReceiver = mpsc::UnboundedReceiver<UiEvent>;

/// 前台通道的发送端
///
/// 接收端关闭（前台退出）后发送静默失败。
#[derive(Debug, Clone)]
pub struct UiSender {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl UiSender {
    pub fn channel() -> (Self, UiReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }

    /// 追加一段终端文本
    pub fn output(&self, text: impl Into<String>) {
        self.send(UiEvent::Output(text.into()));
    }

    /// 追加一行终端文本
    pub fn line(&self, text: impl AsRef<str>) {
        self.send(UiEvent::Output(format!("{}\n", text.as_ref())));
    }

    pub fn connection(&self, state: ConnectionState) {
        self.send(UiEvent::Connection(state));
    }
}
