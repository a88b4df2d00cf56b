// 测试用的内存传输层
// Connector / SessionLink / ShellIo / RemoteFs 的内存实现，不涉及网络

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::models::sftp::{join_path, RemoteAttrs, RemoteDirEntry};
use crate::services::sftp::{RemoteFs, SftpError, SftpStatus};
use crate::ssh::{Connector, SessionLink, ShellIo, SshConfig, SshError};

/// 关闭顺序记录
pub type CloseLog = Arc<Mutex<Vec<&'static str>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

// ======================== RemoteFs ========================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsOp {
    Mkdir(String),
    Put(String),
    Get(String),
}

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

struct FsState {
    cwd: String,
    nodes: BTreeMap<String, Node>,
    ops: Vec<FsOp>,
    mkdir_calls: usize,
    stat_calls: usize,
    mkdir_failure: Option<SftpError>,
    put_failures: HashSet<String>,
    stall_after: Option<u64>,
}

/// 内存中的远程文件系统
pub struct MemoryFs {
    state: Mutex<FsState>,
    chunk_size: usize,
    closed: AtomicBool,
    close_log: CloseLog,
}

fn not_found(path: &str) -> SftpError {
    SftpError::status(SftpStatus::NoSuchFile, format!("No such file: {}", path))
}

fn failure(message: &str) -> SftpError {
    SftpError::status(SftpStatus::Failure, message)
}

/// 规范化绝对路径，处理 `.` 和 `..`
fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

fn parent(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

fn attrs(node: &Node) -> RemoteAttrs {
    match node {
        Node::Dir => RemoteAttrs {
            size: 4096,
            permissions: Some(0o40755),
            mtime: Some(1_700_000_000),
            is_dir: true,
            is_symlink: false,
        },
        Node::File(data) => RemoteAttrs {
            size: data.len() as u64,
            permissions: Some(0o100644),
            mtime: Some(1_700_000_000),
            is_dir: false,
            is_symlink: false,
        },
    }
}

impl MemoryFs {
    /// 创建文件系统，`home` 为初始目录
    pub fn new(home: &str) -> Self {
        let fs = Self {
            state: Mutex::new(FsState {
                cwd: normalize(home),
                nodes: BTreeMap::from([("/".to_string(), Node::Dir)]),
                ops: Vec::new(),
                mkdir_calls: 0,
                stat_calls: 0,
                mkdir_failure: None,
                put_failures: HashSet::new(),
                stall_after: None,
            }),
            chunk_size: 64 * 1024,
            closed: AtomicBool::new(false),
            close_log: CloseLog::default(),
        };
        fs.add_dir(home);
        fs
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// 创建目录（含所有父目录）
    pub fn add_dir(&self, path: &str) {
        let path = normalize(path);
        let mut state = lock(&self.state);
        let mut current = String::from("/");
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = join_path(&current, part);
            state.nodes.entry(current.clone()).or_insert(Node::Dir);
        }
    }

    /// 写入文件（自动创建父目录）
    pub fn add_file(&self, path: &str, data: Vec<u8>) {
        let path = normalize(path);
        self.add_dir(&parent(&path));
        lock(&self.state).nodes.insert(path, Node::File(data));
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        match lock(&self.state).nodes.get(&normalize(path)) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn ops(&self) -> Vec<FsOp> {
        lock(&self.state).ops.clone()
    }

    pub fn mkdir_calls(&self) -> usize {
        lock(&self.state).mkdir_calls
    }

    pub fn stat_calls(&self) -> usize {
        lock(&self.state).stat_calls
    }

    /// 下一次 mkdir 返回给定错误
    pub fn fail_mkdir_with(&self, err: SftpError) {
        lock(&self.state).mkdir_failure = Some(err);
    }

    /// 上传到该路径时失败
    pub fn fail_put_on(&self, path: &str) {
        lock(&self.state).put_failures.insert(normalize(path));
    }

    /// 下载传输到指定字节数后停住，直到通道被关闭
    pub fn stall_after(&self, bytes: u64) {
        lock(&self.state).stall_after = Some(bytes);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close_log(&self) -> CloseLog {
        self.close_log.clone()
    }

    fn ensure_open(&self) -> Result<(), SftpError> {
        if self.is_closed() {
            Err(SftpError::Closed)
        } else {
            Ok(())
        }
    }

    fn resolve(&self, path: &str) -> String {
        let state = lock(&self.state);
        if path.starts_with('/') {
            normalize(path)
        } else {
            normalize(&join_path(&state.cwd, path))
        }
    }
}

#[async_trait]
impl RemoteFs for MemoryFs {
    async fn change_dir(&self, path: &str) -> Result<(), SftpError> {
        self.ensure_open()?;
        let target = self.resolve(path);
        let mut state = lock(&self.state);
        match state.nodes.get(&target) {
            Some(Node::Dir) => {
                state.cwd = target;
                Ok(())
            }
            Some(Node::File(_)) => Err(SftpError::NotADirectory(target)),
            None => Err(not_found(&target)),
        }
    }

    async fn pwd(&self) -> Result<String, SftpError> {
        self.ensure_open()?;
        Ok(lock(&self.state).cwd.clone())
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteDirEntry>, SftpError> {
        self.ensure_open()?;
        let dir = self.resolve(path);
        let state = lock(&self.state);
        match state.nodes.get(&dir) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => return Err(SftpError::NotADirectory(dir)),
            None => return Err(not_found(&dir)),
        }

        let mut entries = vec![
            RemoteDirEntry::new(".", attrs(&Node::Dir)),
            RemoteDirEntry::new("..", attrs(&Node::Dir)),
        ];
        for (path, node) in &state.nodes {
            if path != "/" && parent(path) == dir {
                let name = path.rsplit('/').next().unwrap_or_default();
                entries.push(RemoteDirEntry::new(name, attrs(node)));
            }
        }
        Ok(entries)
    }

    async fn stat(&self, path: &str) -> Result<RemoteAttrs, SftpError> {
        self.ensure_open()?;
        let target = self.resolve(path);
        let mut state = lock(&self.state);
        state.stat_calls += 1;
        state.nodes.get(&target).map(attrs).ok_or_else(|| not_found(&target))
    }

    async fn mkdir(&self, path: &str) -> Result<(), SftpError> {
        self.ensure_open()?;
        let target = self.resolve(path);
        let mut state = lock(&self.state);
        state.mkdir_calls += 1;
        state.ops.push(FsOp::Mkdir(target.clone()));

        if let Some(err) = state.mkdir_failure.take() {
            return Err(err);
        }
        if state.nodes.contains_key(&target) {
            return Err(failure("Failure"));
        }
        if !matches!(state.nodes.get(&parent(&target)), Some(Node::Dir)) {
            return Err(not_found(&target));
        }
        state.nodes.insert(target, Node::Dir);
        Ok(())
    }

    async fn get(
        &self,
        remote: &str,
        local: &Path,
        progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<u64, SftpError> {
        self.ensure_open()?;
        let target = self.resolve(remote);
        let (data, stall_after) = {
            let mut state = lock(&self.state);
            state.ops.push(FsOp::Get(target.clone()));
            match state.nodes.get(&target) {
                Some(Node::File(data)) => (data.clone(), state.stall_after),
                Some(Node::Dir) => return Err(failure("Is a directory")),
                None => return Err(not_found(&target)),
            }
        };

        let mut file = tokio::fs::File::create(local).await?;
        let mut transferred = 0u64;
        for chunk in data.chunks(self.chunk_size) {
            if stall_after.is_some_and(|limit| transferred >= limit) {
                while !self.is_closed() {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
            self.ensure_open()?;

            file.write_all(chunk).await?;
            transferred += chunk.len() as u64;
            progress(chunk.len() as u64);
            tokio::task::yield_now().await;
        }
        file.flush().await?;
        Ok(transferred)
    }

    async fn put(
        &self,
        source: &mut (dyn AsyncRead + Send + Unpin),
        remote: &str,
    ) -> Result<u64, SftpError> {
        self.ensure_open()?;
        let target = self.resolve(remote);
        {
            let mut state = lock(&self.state);
            state.ops.push(FsOp::Put(target.clone()));
            if state.put_failures.contains(&target) {
                return Err(failure("Permission denied"));
            }
            if !matches!(state.nodes.get(&parent(&target)), Some(Node::Dir)) {
                return Err(not_found(&target));
            }
        }

        let mut data = Vec::new();
        source.read_to_end(&mut data).await?;
        let len = data.len() as u64;
        lock(&self.state).nodes.insert(target, Node::File(data));
        Ok(len)
    }

    async fn close(&self) -> Result<(), SftpError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(SftpError::Closed);
        }
        lock(&self.close_log).push("sftp");
        Ok(())
    }
}

// ======================== ShellIo ========================

/// 内存 Shell 通道
pub struct MemoryShell {
    output: Mutex<Vec<u8>>,
    written: Mutex<Vec<u8>>,
    closed: AtomicBool,
    fail_writes: AtomicBool,
    close_log: CloseLog,
}

impl MemoryShell {
    pub fn new() -> Self {
        Self::with_close_log(CloseLog::default())
    }

    pub fn with_close_log(close_log: CloseLog) -> Self {
        Self {
            output: Mutex::new(Vec::new()),
            written: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            close_log,
        }
    }

    /// 模拟远端输出
    pub fn push_output(&self, bytes: &[u8]) {
        lock(&self.output).extend_from_slice(bytes);
    }

    /// 模拟远端关闭通道
    pub fn close_remote(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn written(&self) -> Vec<u8> {
        lock(&self.written).clone()
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::Release);
    }
}

#[async_trait]
impl ShellIo for MemoryShell {
    fn drain(&self) -> Vec<u8> {
        std::mem::take(&mut *lock(&self.output))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn write(&self, data: &[u8]) -> Result<(), SshError> {
        if self.is_closed() {
            return Err(SshError::Disconnected("Shell channel closed".into()));
        }
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(SshError::Channel("write rejected".into()));
        }
        lock(&self.written).extend_from_slice(data);
        Ok(())
    }

    async fn flush(&self) -> Result<(), SshError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), SshError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(SshError::Disconnected("Shell channel already closed".into()));
        }
        lock(&self.close_log).push("shell");
        Ok(())
    }
}

// ======================== Connector ========================

/// 在哪一步失败
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Session,
    Shell,
    Sftp,
}

struct ConnectorState {
    fs: Arc<MemoryFs>,
    opened: Mutex<Vec<&'static str>>,
    link: Mutex<Option<Arc<FakeLink>>>,
    shell: Mutex<Option<Arc<MemoryShell>>>,
}

/// 内存 Connector，每次连接共享同一个 `MemoryFs`
pub struct FakeConnector {
    fail_at: Option<FailAt>,
    state: Arc<ConnectorState>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::with_fs(Arc::new(MemoryFs::new("/home/alice")))
    }

    pub fn with_fs(fs: Arc<MemoryFs>) -> Self {
        Self {
            fail_at: None,
            state: Arc::new(ConnectorState {
                fs,
                opened: Mutex::new(Vec::new()),
                link: Mutex::new(None),
                shell: Mutex::new(None),
            }),
        }
    }

    pub fn failing_at(mut self, fail_at: FailAt) -> Self {
        self.fail_at = Some(fail_at);
        self
    }

    pub fn opened(&self) -> Vec<&'static str> {
        lock(&self.state.opened).clone()
    }

    pub fn closed(&self) -> Vec<&'static str> {
        lock(&self.state.fs.close_log).clone()
    }

    pub fn link(&self) -> Option<Arc<FakeLink>> {
        lock(&self.state.link).clone()
    }

    pub fn shell(&self) -> Option<Arc<MemoryShell>> {
        lock(&self.state.shell).clone()
    }

    pub fn fs(&self) -> Arc<MemoryFs> {
        self.state.fs.clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open_session(&self, config: &SshConfig) -> Result<Arc<dyn SessionLink>, SshError> {
        if self.fail_at == Some(FailAt::Session) {
            return Err(SshError::Timeout(config.connect_timeout));
        }
        lock(&self.state.opened).push("session");
        let link = Arc::new(FakeLink {
            fail_at: self.fail_at,
            state: self.state.clone(),
            closed: AtomicBool::new(false),
        });
        *lock(&self.state.link) = Some(link.clone());
        Ok(link)
    }
}

/// 内存会话
pub struct FakeLink {
    fail_at: Option<FailAt>,
    state: Arc<ConnectorState>,
    closed: AtomicBool,
}

impl FakeLink {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl SessionLink for FakeLink {
    async fn open_shell(&self, _config: &SshConfig) -> Result<Arc<dyn ShellIo>, SshError> {
        if self.fail_at == Some(FailAt::Shell) {
            return Err(SshError::Channel("shell request rejected".into()));
        }
        lock(&self.state.opened).push("shell");
        let shell = Arc::new(MemoryShell::with_close_log(self.state.fs.close_log()));
        *lock(&self.state.shell) = Some(shell.clone());
        Ok(shell)
    }

    async fn open_sftp(&self) -> Result<Arc<dyn RemoteFs>, SshError> {
        if self.fail_at == Some(FailAt::Sftp) {
            return Err(SshError::Channel("sftp subsystem rejected".into()));
        }
        lock(&self.state.opened).push("sftp");
        Ok(self.state.fs.clone())
    }

    async fn close(&self) -> Result<(), SshError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(SshError::Disconnected("Session already closed".into()));
        }
        lock(&self.state.fs.close_log).push("session");
        Ok(())
    }
}
