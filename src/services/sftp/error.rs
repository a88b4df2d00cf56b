// SFTP 错误类型

use thiserror::Error;

/// SFTP 状态码分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SftpStatus {
    /// 通用失败（SSH_FX_FAILURE），“目录已存在”也落在这一类
    Failure,
    NoSuchFile,
    PermissionDenied,
    Eof,
    ConnectionLost,
    Unsupported,
    Other,
}

/// 传输通道上单个请求的错误
#[derive(Debug, Error)]
pub enum SftpError {
    /// 服务器返回的状态错误
    #[error("{message} ({status:?})")]
    Status { status: SftpStatus, message: String },

    /// 本地 IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 通道已关闭
    #[error("SFTP channel closed")]
    Closed,

    /// 路径不是目录
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// 协议或超时等其他错误
    #[error("SFTP protocol error: {0}")]
    Protocol(String),
}

impl SftpError {
    pub fn status(status: SftpStatus, message: impl Into<String>) -> Self {
        SftpError::Status {
            status,
            message: message.into(),
        }
    }

    /// 可能意味着“已存在”的失败（需要二次确认）
    pub fn is_generic_failure(&self) -> bool {
        matches!(
            self,
            SftpError::Status {
                status: SftpStatus::Failure,
                ..
            }
        )
    }
}

impl From<russh_sftp::client::error::Error> for SftpError {
    fn from(e: russh_sftp::client::error::Error) -> Self {
        use russh_sftp::client::error::Error;
        use russh_sftp::protocol::StatusCode;

        match e {
            Error::Status(status) => {
                let kind = match status.status_code {
                    StatusCode::Failure => SftpStatus::Failure,
                    StatusCode::NoSuchFile => SftpStatus::NoSuchFile,
                    StatusCode::PermissionDenied => SftpStatus::PermissionDenied,
                    StatusCode::Eof => SftpStatus::Eof,
                    StatusCode::NoConnection | StatusCode::ConnectionLost => {
                        SftpStatus::ConnectionLost
                    }
                    StatusCode::OpUnsupported => SftpStatus::Unsupported,
                    _ => SftpStatus::Other,
                };
                SftpError::status(kind, status.error_message)
            }
            other => SftpError::Protocol(other.to_string()),
        }
    }
}

/// 目录操作（列表、切换目录、创建）失败
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Failed to change directory to {path}: {source}")]
    ChangeDir { path: String, source: SftpError },

    #[error("Failed to list {path}: {source}")]
    List { path: String, source: SftpError },

    #[error("Failed to create remote directory {path}: {source}")]
    Create { path: String, source: SftpError },
}

/// 文件传输失败
#[derive(Debug, Error)]
#[error("Transfer of {path} failed: {source}")]
pub struct TransferError {
    pub path: String,
    #[source]
    pub source: TransferCause,
}

/// 传输失败的原因
#[derive(Debug, Error)]
pub enum TransferCause {
    #[error(transparent)]
    Sftp(#[from] SftpError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("local IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    pub fn new(path: impl Into<String>, source: impl Into<TransferCause>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
        }
    }
}
