// 本地下载缓存目录管理

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::models::sftp::TransferTask;

/// 下载缓存目录
///
/// 下载中的文件持有一个租约（`CacheLease`），清理时跳过被租用的路径。
/// 租约登记和删除在同一把锁下进行，清理开始后才启动的下载也不会被删掉。
/// 同一路径可以同时有多个租约，按引用计数，最后一个释放时才解除保护。
#[derive(Debug, Clone)]
pub struct LocalCache {
    root: PathBuf,
    leases: Arc<Mutex<HashMap<PathBuf, usize>>>,
}

/// 一次清理的结果
#[derive(Debug, Default)]
pub struct PurgeReport {
    pub removed_files: usize,
    pub removed_dirs: usize,
    /// 因传输中被跳过的路径
    pub skipped: Vec<PathBuf>,
    /// 删除失败的路径（不会中断清理）
    pub failures: Vec<(PathBuf, io::Error)>,
}

impl PurgeReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl LocalCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            leases: Arc::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 首次使用时创建缓存目录
    pub fn ensure_root(&self) -> io::Result<&Path> {
        if !self.root.exists() {
            debug!("[Cache] Creating cache directory {:?}", self.root);
            fs::create_dir_all(&self.root)?;
        }
        Ok(&self.root)
    }

    /// 缓存中某个文件名对应的本地路径
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    /// 登记一个正在写入的路径，租约释放前清理不会删除它
    pub fn lease(&self, path: impl Into<PathBuf>) -> CacheLease {
        let path = path.into();
        *self.leases().entry(path.clone()).or_insert(0) += 1;
        CacheLease {
            path,
            leases: self.leases.clone(),
        }
    }

    pub fn is_leased(&self, path: &Path) -> bool {
        self.leases().contains_key(path)
    }

    /// 为缓存根目录下尚未出现在任务列表中的文件合成“已完成”任务
    ///
    /// 只看直接子文件，按文件名排序。
    pub fn scan_as_entries(&self, existing: &HashSet<String>) -> io::Result<Vec<TransferTask>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if existing.contains(&name) {
                continue;
            }
            found.push((name, metadata.len()));
        }
        found.sort();

        debug!("[Cache] Found {} cached files", found.len());
        Ok(found
            .into_iter()
            .map(|(name, size)| TransferTask::completed(name, size))
            .collect())
    }

    /// 删除缓存内容，但保留根目录本身
    ///
    /// 后序遍历：先删文件，再删已清空的子目录。`exclude` 中的顶层名称和
    /// 被租用的路径会被跳过；单个条目删除失败只记录，不中断遍历。
    pub fn purge(&self, exclude: &HashSet<String>) -> PurgeReport {
        let mut report = PurgeReport::default();
        if !self.root.exists() {
            return report;
        }

        info!("[Cache] Purging {:?}", self.root);
        let walker = WalkDir::new(&self.root).min_depth(1).contents_first(true);
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    warn!("[Cache] Failed to read {:?}: {}", path, err);
                    report.failures.push((path, io::Error::from(err)));
                    continue;
                }
            };

            let path = entry.path();
            if self.is_excluded(path, exclude) {
                report.skipped.push(path.to_path_buf());
                continue;
            }

            // 检查租约和删除放在同一把锁下
            let leases = self.leases();
            if leases.contains_key(path) {
                drop(leases);
                debug!("[Cache] Skipping in-use file {:?}", path);
                report.skipped.push(path.to_path_buf());
                continue;
            }

            let result = if entry.file_type().is_dir() {
                fs::remove_dir(path).map(|_| report.removed_dirs += 1)
            } else {
                fs::remove_file(path).map(|_| report.removed_files += 1)
            };
            drop(leases);

            if let Err(err) = result {
                warn!("[Cache] Failed to delete {:?}: {}", path, err);
                report.failures.push((path.to_path_buf(), err));
            }
        }

        info!(
            "[Cache] Purge finished: {} files, {} directories removed, {} skipped, {} failed",
            report.removed_files,
            report.removed_dirs,
            report.skipped.len(),
            report.failures.len()
        );
        report
    }

    fn is_excluded(&self, path: &Path, exclude: &HashSet<String>) -> bool {
        path.strip_prefix(&self.root)
            .ok()
            .and_then(|relative| relative.components().next())
            .map(|first| exclude.contains(first.as_os_str().to_string_lossy().as_ref()))
            .unwrap_or(false)
    }

    fn leases(&self) -> MutexGuard<'_, HashMap<PathBuf, usize>> {
        self.leases.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 缓存文件租约，drop 时释放
#[derive(Debug)]
pub struct CacheLease {
    path: PathBuf,
    leases: Arc<Mutex<HashMap<PathBuf, usize>>>,
}

impl CacheLease {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLease {
    fn drop(&mut self) {
        let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = leases.get_mut(&self.path) {
            *count -= 1;
            if *count == 0 {
                leases.remove(&self.path);
            }
        }
    }
}
