// 全局常量

/// 下载缓存目录名（位于系统临时目录下）
pub const CACHE_DIR_NAME: &str = "remote-files";

/// SFTP 读写块大小
pub const TRANSFER_CHUNK_SIZE: usize = 64 * 1024;

/// 配置目录名
pub const APP_DIR_NAME: &str = "openterm";

/// 连接关闭时写入终端的提示
pub const CONNECTION_CLOSED_NOTICE: &str = "\nConnection closed\n";
