// 后端服务模块

pub mod cache;
pub mod format;
pub mod opener;
pub mod sftp;
pub mod shell;
pub mod storage;
