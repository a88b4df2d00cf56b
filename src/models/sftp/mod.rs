// SFTP 数据模型

pub mod transfer;
pub mod types;

pub use transfer::{TaskList, TransferSnapshot, TransferStatus, TransferTask};
pub use types::{join_path, Listing, RemoteAttrs, RemoteDirEntry, RemoteEntry};
