// SFTP 后端服务

mod error;
mod listing;
mod mkdir;
mod service;
mod transfer;
mod walker;

pub use error::{DirectoryError, SftpError, SftpStatus, TransferCause, TransferError};
pub use listing::list_remote;
pub use mkdir::ensure_directory;
pub use service::{RemoteFs, RusshRemoteFs};
pub use transfer::TransferEngine;
pub use walker::upload_tree;
