//! 文件内容指纹
//!
//! 使用 MD5：S3 兼容存储对单次 PUT 上传的对象返回内容 MD5 作为 etag，
//! 本地指纹必须与之一致才能比较。

use crate::error::{Result, SyncError};
use md5::{Digest, Md5};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// 流式读取的块大小
const CHUNK_SIZE: usize = 64 * 1024;

/// 计算文件内容的 MD5，返回小写十六进制
pub async fn fingerprint(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| SyncError::io(path, e))?;

    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .map_err(|e| SyncError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
