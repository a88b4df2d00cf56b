// Settings 配置数据结构

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ======================== 主配置结构 ========================

/// 应用设置（持久化用）
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub connection: ConnectionSettings,
    pub terminal: TerminalSettings,
    pub sftp: SftpSettings,
}

// ======================== 连接设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionSettings {
    pub default_port: u16,
    pub connect_timeout_secs: u64,
    pub keepalive_enabled: bool,
    pub keepalive_interval_secs: u64,
    pub keepalive_max_retries: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            default_port: 22,
            connect_timeout_secs: 10,
            keepalive_enabled: true,
            keepalive_interval_secs: 60,
            keepalive_max_retries: 3,
        }
    }
}

// ======================== 终端设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerminalSettings {
    pub term: String,
    pub cols: u32,
    pub rows: u32,
    /// Shell 输出为空时的轮询间隔（毫秒）
    pub poll_interval_ms: u64,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            term: "xterm-256color".to_string(),
            cols: 80,
            rows: 24,
            poll_interval_ms: 100,
        }
    }
}

impl TerminalSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

// ======================== SFTP 设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SftpSettings {
    /// 下载缓存目录名（位于系统临时目录下）
    pub cache_dir_name: String,
}

impl Default for SftpSettings {
    fn default() -> Self {
        Self {
            cache_dir_name: crate::constants::CACHE_DIR_NAME.to_string(),
        }
    }
}

impl SftpSettings {
    /// 缓存目录的完整路径
    pub fn cache_root(&self) -> std::path::PathBuf {
        std::env::temp_dir().join(&self.cache_dir_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: AppSettings =
            serde_json::from_str(r#"{ "terminal": { "poll_interval_ms": 250 } }"#).unwrap();
        assert_eq!(settings.terminal.poll_interval(), Duration::from_millis(250));
        assert_eq!(settings.terminal.cols, 80);
        assert_eq!(settings.connection.connect_timeout_secs, 10);
        assert_eq!(settings.sftp.cache_dir_name, "remote-files");
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let terminal = TerminalSettings {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(terminal.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_cache_root_is_under_temp_dir() {
        let root = SftpSettings::default().cache_root();
        assert!(root.starts_with(std::env::temp_dir()));
        assert!(root.ends_with("remote-files"));
    }
}
