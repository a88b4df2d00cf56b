// 用系统默认程序打开本地文件

use std::path::Path;

use tracing::{info, warn};

/// 打开本地文件；失败只返回错误，由调用方报告
pub fn open_local(path: &Path) -> std::io::Result<()> {
    info!("[Open] Opening {:?} with the default application", path);
    open::that(path).inspect_err(|e| warn!("[Open] Failed to open {:?}: {}", path, e))
}
