// SSH 连接模块
//
// 模块结构:
// - config: 连接配置 (SshConfig, AuthMethod)
// - error: 错误类型 (SshError)
// - event: 连接状态 (ConnectionState)
// - handler: russh Handler 实现
// - transport: 传输层抽象 (Connector, SessionLink, ShellIo)
// - client: SSH 客户端核心 (SshClient, RusshConnector)
// - session: russh 会话与 Shell 通道 (SshSession, RusshShell)
// - manager: 会话生命周期 (SessionManager, Session)

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod manager;
pub mod session;
pub mod transport;

// 公开导出
pub use client::{RusshConnector, SshClient};
pub use config::{AuthMethod, KeepaliveConfig, SshConfig};
pub use error::SshError;
pub use event::ConnectionState;
pub use manager::{Session, SessionManager};
pub use session::{RusshShell, SshSession};
pub use transport::{Connector, SessionLink, ShellIo};
