// SSH 客户端核心实现

use std::net::ToSocketAddrs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::Handle;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use super::config::{AuthMethod, SshConfig};
use super::error::SshError;
use super::handler::SshClientHandler;
use super::session::SshSession;
use super::transport::{Connector, SessionLink};

/// SSH 客户端
/// 负责建立 SSH 连接并完成认证
pub struct SshClient {
    /// 连接配置
    config: SshConfig,
}

impl SshClient {
    /// 创建新的 SSH 客户端
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// 执行连接（异步）
    /// TCP 连接与 SSH 握手各自受 `connect_timeout` 约束
    pub async fn connect(&self) -> Result<Handle<SshClientHandler>, SshError> {
        info!("[SSH] Starting SSH connection to {}", self.config.target());

        // 解析地址
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| SshError::Config(format!("Failed to resolve address: {}", e)))?
            .next()
            .ok_or_else(|| SshError::Config("No valid address found".to_string()))?;

        debug!("[SSH] Connecting to {}...", socket_addr);

        let connect_timeout = Duration::from_secs(self.config.connect_timeout);
        let tcp_stream = timeout(connect_timeout, TcpStream::connect(socket_addr))
            .await
            .map_err(|_| SshError::Timeout(self.config.connect_timeout))?
            .map_err(SshError::Io)?;

        debug!("[SSH] TCP connection established, starting handshake");

        let russh_config = Arc::new(self.config.to_russh_config());
        let handler = SshClientHandler::new(self.config.host.clone());

        let mut handle = timeout(
            connect_timeout,
            russh::client::connect_stream(russh_config, tcp_stream, handler),
        )
        .await
        .map_err(|_| SshError::Timeout(self.config.connect_timeout))?
        .map_err(SshError::from)?;

        debug!("[SSH] Handshake completed, authenticating as '{}'", self.config.username);

        timeout(connect_timeout, self.authenticate(&mut handle))
            .await
            .map_err(|_| SshError::Timeout(self.config.connect_timeout))??;

        info!("[SSH] Authenticated to {}", self.config.target());
        Ok(handle)
    }

    /// 执行认证
    async fn authenticate(&self, handle: &mut Handle<SshClientHandler>) -> Result<(), SshError> {
        use russh::client::AuthResult;

        let auth_result = match &self.config.auth {
            AuthMethod::Password(password) => {
                debug!("[SSH] Using password authentication");
                handle
                    .authenticate_password(&self.config.username, password)
                    .await
                    .map_err(SshError::from)?
            }
            AuthMethod::PublicKey {
                key_path,
                passphrase,
            } => {
                debug!("[SSH] Using public key authentication: {:?}", key_path);

                let key = load_private_key(key_path, passphrase.as_deref()).await?;
                let key_with_alg = russh::keys::PrivateKeyWithHashAlg::new(Arc::new(key), None);

                handle
                    .authenticate_publickey(&self.config.username, key_with_alg)
                    .await
                    .map_err(SshError::from)?
            }
        };

        match auth_result {
            AuthResult::Success => Ok(()),
            AuthResult::Failure {
                remaining_methods,
                partial_success,
            } => {
                if partial_success {
                    return Err(SshError::Auth(
                        "Partial authentication - additional auth required".to_string(),
                    ));
                }
                Err(SshError::Auth(format!(
                    "Server rejected credentials. Server suggests: {:?}",
                    remaining_methods
                )))
            }
        }
    }
}

/// 加载私钥文件
async fn load_private_key(
    key_path: &Path,
    passphrase: Option<&str>,
) -> Result<russh::keys::PrivateKey, SshError> {
    let key_data = tokio::fs::read(key_path)
        .await
        .map_err(|e| SshError::Key(format!("Failed to read key file: {}", e)))?;

    russh::keys::decode_secret_key(&String::from_utf8_lossy(&key_data), passphrase)
        .map_err(|e| SshError::Key(format!("Failed to decode key: {}", e)))
}

/// 基于 russh 的连接器
#[derive(Debug, Default, Clone, Copy)]
pub struct RusshConnector;

#[async_trait]
impl Connector for RusshConnector {
    async fn open_session(&self, config: &SshConfig) -> Result<Arc<dyn SessionLink>, SshError> {
        let handle = SshClient::new(config.clone()).connect().await?;
        Ok(Arc::new(SshSession::new(
            Arc::new(handle),
            config.host.clone(),
            config.username.clone(),
        )))
    }
}
