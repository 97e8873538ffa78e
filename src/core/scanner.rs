use super::fingerprint::fingerprint;
use crate::error::{Result, SyncError};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use walkdir::WalkDir;

/// 本地文件条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    /// 相对源目录的路径，统一使用 `/` 分隔
    pub key: String,
    /// 内容 MD5（小写十六进制）
    pub digest: String,
}

impl FileEntry {
    pub fn new(key: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            digest: digest.into(),
        }
    }
}

/// 本地目录扫描器
pub struct FileScanner {
    max_concurrent: usize,
}

impl FileScanner {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// 扫描目录并计算所有文件指纹，按遍历顺序返回
    pub async fn scan(&self, root: &Path) -> Result<Vec<FileEntry>> {
        match tokio::fs::metadata(root).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(SyncError::io(
                    root,
                    io::Error::new(io::ErrorKind::InvalidInput, "source is not a directory"),
                ))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SyncError::NotFound {
                    path: root.to_path_buf(),
                })
            }
            Err(e) => return Err(SyncError::io(root, e)),
        }

        info!("开始扫描本地目录: {}", root.display());

        // 使用 spawn_blocking 避免阻塞 async runtime
        let walk_root = root.to_path_buf();
        let files = tokio::task::spawn_blocking(move || walk(&walk_root))
            .await
            .map_err(|e| SyncError::io(root, io::Error::new(io::ErrorKind::Other, e)))??;

        debug!("发现 {} 个文件，开始计算指纹", files.len());

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(files.len());

        for (key, path) in files {
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                // 信号量不会被关闭
                let _permit = semaphore.acquire_owned().await.ok();
                let digest = fingerprint(&path).await?;
                Ok::<_, SyncError>(FileEntry { key, digest })
            }));
        }

        let entries = collect_in_order(root, handles).await?;

        info!("扫描完成: {} 个文件", entries.len());
        Ok(entries)
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new(8)
    }
}

/// 按提交顺序等待所有任务，全部结束后再返回第一个错误
async fn collect_in_order<T>(root: &Path, handles: Vec<JoinHandle<Result<T>>>) -> Result<Vec<T>> {
    let mut items = Vec::with_capacity(handles.len());
    let mut first_error = None;

    for handle in handles {
        let result = handle
            .await
            .map_err(|e| SyncError::io(root, io::Error::new(io::ErrorKind::Other, e)))
            .and_then(|r| r);
        match result {
            Ok(item) => items.push(item),
            Err(e) if first_error.is_none() => first_error = Some(e),
            Err(e) => debug!("忽略后续指纹错误: {}", e),
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(items),
    }
}

/// 遍历目录，返回 (key, 绝对路径)；不跟随符号链接，只收集普通文件
fn walk(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            SyncError::io(path, e.into())
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let key = object_key(root, entry.path())?;
        files.push((key, entry.into_path()));
    }

    Ok(files)
}

/// 相对路径转换为对象 key，与宿主路径分隔符无关
fn object_key(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|e| {
        SyncError::io(path, io::Error::new(io::ErrorKind::InvalidInput, e))
    })?;

    let parts = relative
        .components()
        .map(|c| {
            c.as_os_str().to_str().ok_or_else(|| {
                SyncError::io(
                    path,
                    io::Error::new(io::ErrorKind::InvalidData, "file name is not valid UTF-8"),
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(parts.join("/"))
}
