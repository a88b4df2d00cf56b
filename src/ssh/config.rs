// SSH 连接配置

use std::path::PathBuf;

use crate::models::settings::AppSettings;

/// SSH 连接配置
#[derive(Clone, Debug)]
pub struct SshConfig {
    /// 目标主机
    pub host: String,
    /// 端口
    pub port: u16,
    /// 用户名
    pub username: String,
    /// 认证方式
    pub auth: AuthMethod,
    /// 连接超时（秒）
    pub connect_timeout: u64,
    /// 心跳配置
    pub keepalive: KeepaliveConfig,
    /// 终端类型
    pub term: String,
    /// 终端列数
    pub cols: u32,
    /// 终端行数
    pub rows: u32,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: String::new(),
            auth: AuthMethod::Password(String::new()),
            connect_timeout: 10,
            keepalive: KeepaliveConfig::default(),
            term: "xterm-256color".to_string(),
            cols: 80,
            rows: 24,
        }
    }
}

impl SshConfig {
    /// 按应用设置中的连接/终端参数创建配置
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        auth: AuthMethod,
        settings: &AppSettings,
    ) -> Self {
        let connection = &settings.connection;
        Self {
            host: host.into(),
            port,
            username: username.into(),
            auth,
            connect_timeout: connection.connect_timeout_secs,
            keepalive: KeepaliveConfig {
                enabled: connection.keepalive_enabled,
                interval: connection.keepalive_interval_secs,
                max_retries: connection.keepalive_max_retries,
            },
            term: settings.terminal.term.clone(),
            cols: settings.terminal.cols,
            rows: settings.terminal.rows,
        }
    }

    /// 用于日志的目标描述
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

/// 认证方式
#[derive(Clone)]
pub enum AuthMethod {
    /// 密码认证
    Password(String),
    /// 公钥认证
    PublicKey {
        /// 私钥文件路径
        key_path: PathBuf,
        /// 私钥密码（如果有）
        passphrase: Option<String>,
    },
}

// 不把密码打进日志
impl std::fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::Password(_) => f.write_str("Password(***)"),
            AuthMethod::PublicKey { key_path, .. } => f
                .debug_struct("PublicKey")
                .field("key_path", key_path)
                .finish_non_exhaustive(),
        }
    }
}

/// 心跳配置
#[derive(Clone, Debug)]
pub struct KeepaliveConfig {
    /// 是否启用心跳
    pub enabled: bool,
    /// 心跳间隔（秒）
    pub interval: u64,
    /// 最大重试次数
    pub max_retries: u32,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 60,
            max_retries: 3,
        }
    }
}

/// russh 客户端配置构建
impl SshConfig {
    /// 构建 russh 配置
    pub fn to_russh_config(&self) -> russh::client::Config {
        let mut config = russh::client::Config::default();
        if self.keepalive.enabled {
            config.keepalive_interval =
                Some(std::time::Duration::from_secs(self.keepalive.interval));
            config.keepalive_max = self.keepalive.max_retries as usize;
        }
        config
    }
}
