// SFTP 基础数据类型

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local};

use crate::services::format::format_bytes;

/// 远程文件属性（与协议无关）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteAttrs {
    /// 文件大小（字节）
    pub size: u64,
    /// Unix 权限（如 0o755）
    pub permissions: Option<u32>,
    /// 修改时间（Unix 秒）
    pub mtime: Option<u32>,
    pub is_dir: bool,
    pub is_symlink: bool,
}

impl RemoteAttrs {
    /// 格式化权限字符串（如 drwxr-xr-x）
    pub fn permissions_string(&self) -> String {
        let perms = self.permissions.unwrap_or(0);
        let mut s = String::with_capacity(10);

        s.push(if self.is_dir {
            'd'
        } else if self.is_symlink {
            'l'
        } else {
            '-'
        });

        for shift in [6u32, 3, 0] {
            let bits = (perms >> shift) & 0o7;
            s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            s.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }

        s
    }

    /// 修改时间（本地时区，yyyy-MM-dd HH:mm:ss）
    pub fn modified_string(&self) -> String {
        let secs = self.mtime.unwrap_or(0) as u64;
        let time: SystemTime = UNIX_EPOCH + Duration::from_secs(secs);
        let local: DateTime<Local> = time.into();
        local.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// 目录列表中的一项（协议层返回的原始数据）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDirEntry {
    pub name: String,
    pub attrs: RemoteAttrs,
}

impl RemoteDirEntry {
    pub fn new(name: impl Into<String>, attrs: RemoteAttrs) -> Self {
        Self {
            name: name.into(),
            attrs,
        }
    }
}

/// 文件列表展示记录，构造后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// 原始文件名（用于后续操作）
    pub raw_name: String,
    /// 展示名（目录带 `/` 后缀）
    pub display_name: String,
    /// 大小文本（目录为空）
    pub size: String,
    /// 权限文本
    pub permissions: String,
    /// 修改时间文本
    pub modified: String,
    pub is_directory: bool,
}

impl From<&RemoteDirEntry> for RemoteEntry {
    fn from(entry: &RemoteDirEntry) -> Self {
        let is_directory = entry.attrs.is_dir;
        Self {
            raw_name: entry.name.clone(),
            display_name: if is_directory {
                format!("{}/", entry.name)
            } else {
                entry.name.clone()
            },
            size: if is_directory {
                String::new()
            } else {
                format_bytes(entry.attrs.size as i64)
            },
            permissions: entry.attrs.permissions_string(),
            modified: entry.attrs.modified_string(),
            is_directory,
        }
    }
}

/// 一次目录列表的结果：规范化后的绝对路径 + 排好序的条目
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub path: String,
    pub entries: Vec<RemoteEntry>,
}

/// 拼接远程路径（始终使用 `/`）
pub fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else if base == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), name)
    }
}
