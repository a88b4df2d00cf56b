// SFTP 传输相关类型
// 定义传输状态、进度和下载任务列表

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::services::format::format_bytes;

/// 传输状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TransferStatus {
    /// 等待中
    #[default]
    Pending = 0,
    /// 传输中
    InProgress = 1,
    /// 已完成
    Completed = 2,
    /// 失败（终态）
    Failed = 3,
}

impl TransferStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::InProgress,
            2 => Self::Completed,
            3 => Self::Failed,
            _ => Self::Pending,
        }
    }

    /// 获取状态的显示文本
    pub fn display_text(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "Downloading...",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

/// 单个传输任务
///
/// 进度回调可能来自后台任务，所以计数和状态都用原子量维护：
/// `transferred` 只增不减，`Failed` 之后不再变化。
#[derive(Debug)]
pub struct TransferTask {
    id: String,
    file_name: String,
    total: u64,
    transferred: AtomicU64,
    status: AtomicU8,
    error: Mutex<Option<String>>,
}

impl TransferTask {
    /// 创建等待中的任务
    pub fn new(file_name: impl Into<String>, total: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_name: file_name.into(),
            total,
            transferred: AtomicU64::new(0),
            status: AtomicU8::new(TransferStatus::Pending as u8),
            error: Mutex::new(None),
        }
    }

    /// 为缓存目录中已有的文件合成一个已完成的任务
    pub fn completed(file_name: impl Into<String>, total: u64) -> Self {
        let task = Self::new(file_name, total);
        task.transferred.store(total, Ordering::Relaxed);
        task.status
            .store(TransferStatus::Completed as u8, Ordering::Relaxed);
        task
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Acquire)
    }

    pub fn status(&self) -> TransferStatus {
        TransferStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn error(&self) -> Option<String> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 进度（0.0 - 1.0）
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return if self.status() == TransferStatus::Completed {
                1.0
            } else {
                0.0
            };
        }
        (self.transferred() as f64 / self.total as f64).min(1.0)
    }

    /// 累加一次进度增量
    ///
    /// 失败后的增量被忽略；状态只会向前推进（Pending → InProgress → Completed）。
    pub fn add_progress(&self, increment: u64) {
        if self.status() == TransferStatus::Failed {
            return;
        }
        self.transferred.fetch_add(increment, Ordering::AcqRel);

        let _ = self
            .status
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                match TransferStatus::from_u8(current) {
                    TransferStatus::Failed | TransferStatus::Completed => None,
                    _ if self.transferred.load(Ordering::Acquire) >= self.total => {
                        Some(TransferStatus::Completed as u8)
                    }
                    TransferStatus::InProgress => None,
                    TransferStatus::Pending => Some(TransferStatus::InProgress as u8),
                }
            });
    }

    /// 传输正常结束（远端文件比预期短或为空时也标记完成）
    pub fn finish(&self) {
        let _ = self
            .status
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (TransferStatus::from_u8(current) != TransferStatus::Failed)
                    .then_some(TransferStatus::Completed as u8)
            });
    }

    /// 标记失败
    pub fn fail(&self, error: impl Into<String>) {
        *self.error.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.into());
        self.status
            .store(TransferStatus::Failed as u8, Ordering::Release);
    }

    /// 生成给展示层的快照
    pub fn snapshot(&self) -> TransferSnapshot {
        TransferSnapshot {
            id: self.id.clone(),
            file_name: self.file_name.clone(),
            size: format_bytes(self.total as i64),
            total: self.total,
            transferred: self.transferred(),
            progress: self.progress(),
            status: self.status(),
            error: self.error(),
        }
    }
}

/// 任务快照（纯数据，经 UiEvent 投递到前台）
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSnapshot {
    pub id: String,
    pub file_name: String,
    pub size: String,
    pub total: u64,
    pub transferred: u64,
    pub progress: f64,
    pub status: TransferStatus,
    pub error: Option<String>,
}

/// 下载任务列表（最新的在最前）
#[derive(Debug, Clone, Default)]
pub struct TaskList {
    inner: Arc<RwLock<VecDeque<Arc<TransferTask>>>>,
}

impl TaskList {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入到最前面
    pub fn push_front(&self, task: Arc<TransferTask>) {
        self.write().push_front(task);
    }

    /// 追加到末尾（扫描到的历史文件）
    pub fn push_back(&self, task: Arc<TransferTask>) {
        self.write().push_back(task);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn tasks(&self) -> Vec<Arc<TransferTask>> {
        self.read().iter().cloned().collect()
    }

    pub fn snapshots(&self) -> Vec<TransferSnapshot> {
        self.read().iter().map(|t| t.snapshot()).collect()
    }

    /// 列表中已有的文件名
    pub fn file_names(&self) -> HashSet<String> {
        self.read()
            .iter()
            .map(|t| t.file_name().to_string())
            .collect()
    }

    /// 正在传输中的文件名
    pub fn in_progress_names(&self) -> HashSet<String> {
        self.read()
            .iter()
            .filter(|t| t.status() == TransferStatus::InProgress)
            .map(|t| t.file_name().to_string())
            .collect()
    }

    /// 只保留传输中的任务，返回被移除的数量
    pub fn retain_in_progress(&self) -> usize {
        let mut tasks = self.write();
        let before = tasks.len();
        tasks.retain(|t| t.status() == TransferStatus::InProgress);
        before - tasks.len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, VecDeque<Arc<TransferTask>>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, VecDeque<Arc<TransferTask>>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_many_small_increments_complete() {
        let task = TransferTask::new("big.bin", 10 * 1024);
        assert_eq!(task.status(), TransferStatus::Pending);

        for i in 0..10 * 1024 {
            task.add_progress(1);
            if i < 10 * 1024 - 1 {
                assert_eq!(task.status(), TransferStatus::InProgress);
            }
        }

        assert_eq!(task.transferred(), 10 * 1024);
        assert_eq!(task.status(), TransferStatus::Completed);
        assert_eq!(task.progress(), 1.0);
    }

    #[test]
    fn test_progress_is_clamped() {
        let task = TransferTask::new("a", 100);
        task.add_progress(60);
        assert!((task.progress() - 0.6).abs() < f64::EPSILON);
        task.add_progress(60);
        assert_eq!(task.transferred(), 120);
        assert_eq!(task.progress(), 1.0);
        assert_eq!(task.status(), TransferStatus::Completed);
    }

    #[test]
    fn test_failed_is_terminal() {
        let task = TransferTask::new("a", 100);
        task.add_progress(10);
        task.fail("connection lost");
        task.add_progress(90);
        task.finish();

        assert_eq!(task.status(), TransferStatus::Failed);
        assert_eq!(task.transferred(), 10);
        assert_eq!(task.error().as_deref(), Some("connection lost"));
    }

    #[test]
    fn test_completed_synthesized_task() {
        let task = TransferTask::completed("old.log", 2048);
        assert_eq!(task.status(), TransferStatus::Completed);
        assert_eq!(task.progress(), 1.0);
        assert_eq!(task.snapshot().size, "2.0 KiB");
    }

    #[test]
    fn test_zero_byte_task() {
        let task = TransferTask::new("empty", 0);
        assert_eq!(task.progress(), 0.0);
        task.finish();
        assert_eq!(task.status(), TransferStatus::Completed);
        assert_eq!(task.progress(), 1.0);
    }

    #[test]
    fn test_concurrent_increments() {
        let task = Arc::new(TransferTask::new("c", 8000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let task = task.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        task.add_progress(1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(task.transferred(), 8000);
        assert_eq!(task.status(), TransferStatus::Completed);
    }

    #[test]
    fn test_task_list_ordering_and_retain() {
        let list = TaskList::new();
        let first = Arc::new(TransferTask::completed("first", 1));
        let second = Arc::new(TransferTask::new("second", 10));
        second.add_progress(1);
        list.push_front(first);
        list.push_front(second);

        let names: Vec<_> = list.snapshots().into_iter().map(|s| s.file_name).collect();
        assert_eq!(names, vec!["second", "first"]);
        assert_eq!(list.in_progress_names().len(), 1);

        assert_eq!(list.retain_in_progress(), 1);
        assert_eq!(list.len(), 1);
        assert!(list.file_names().contains("second"));
    }
}
