//! 内存对象存储
//!
//! 行为与 S3 兼容存储一致：按 key 字典序分页列举，etag 为带引号的大写 MD5。
//! 支持注入失败，主要用于测试。

use super::{Bucket, ListPage, ObjectSummary, PutOptions};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use md5::{Digest, Md5};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub etag: String,
    pub headers: BTreeMap<String, String>,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, StoredObject>,
    failing_keys: HashSet<String>,
    fail_list_page: Option<usize>,
    list_calls: usize,
    delete_calls: HashMap<String, usize>,
    put_calls: HashMap<String, usize>,
}

pub struct MemoryBucket {
    inner: Mutex<Inner>,
    name: String,
}

impl MemoryBucket {
    pub fn new(name: &str) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            name: format!("memory://{}", name),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // 测试替身中锁中毒只会来自已 panic 的测试
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 直接写入对象（不计入调用次数）
    pub fn insert(&self, key: &str, data: &[u8]) {
        self.insert_with_etag(key, data, &quoted_md5(data));
    }

    /// 写入对象并指定 etag，用于模拟 etag 不是内容 MD5 的对象
    pub fn insert_with_etag(&self, key: &str, data: &[u8], etag: &str) {
        self.lock().objects.insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                etag: etag.to_string(),
                headers: BTreeMap::new(),
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.lock().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    /// 对该 key 的 put/delete 将返回错误
    pub fn fail_key(&self, key: &str) {
        self.lock().failing_keys.insert(key.to_string());
    }

    /// 第 n 次（从 0 开始）list 调用返回错误
    pub fn fail_list_page(&self, page: usize) {
        self.lock().fail_list_page = Some(page);
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    pub fn delete_calls(&self, key: &str) -> usize {
        self.lock().delete_calls.get(key).copied().unwrap_or(0)
    }

    pub fn put_calls(&self, key: &str) -> usize {
        self.lock().put_calls.get(key).copied().unwrap_or(0)
    }

    pub fn total_put_calls(&self) -> usize {
        self.lock().put_calls.values().sum()
    }
}

fn quoted_md5(data: &[u8]) -> String {
    format!("\"{}\"", format!("{:x}", Md5::digest(data)).to_uppercase())
}

#[async_trait]
impl Bucket for MemoryBucket {
    async fn list(&self, prefix: &str, max_keys: usize, marker: Option<&str>) -> Result<ListPage> {
        let mut inner = self.lock();
        let call = inner.list_calls;
        inner.list_calls += 1;
        if inner.fail_list_page == Some(call) {
            return Err(anyhow!("injected list failure on page {}", call));
        }

        let mut objects: Vec<ObjectSummary> = inner
            .objects
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .filter(|(k, _)| marker.map_or(true, |m| k.as_str() > m))
            .take(max_keys + 1)
            .map(|(k, o)| ObjectSummary {
                name: k.clone(),
                etag: o.etag.clone(),
            })
            .collect();

        let next_marker = if objects.len() > max_keys {
            objects.truncate(max_keys);
            objects.last().map(|o| o.name.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_marker,
        })
    }

    async fn put(&self, key: &str, local_path: &Path, options: &PutOptions) -> Result<()> {
        let data = tokio::fs::read(local_path).await?;
        let mut inner = self.lock();
        *inner.put_calls.entry(key.to_string()).or_default() += 1;
        if inner.failing_keys.contains(key) {
            return Err(anyhow!("injected put failure for {}", key));
        }
        let etag = quoted_md5(&data);
        inner.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                etag,
                headers: options.headers.clone(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.lock();
        *inner.delete_calls.entry(key.to_string()).or_default() += 1;
        if inner.failing_keys.contains(key) {
            return Err(anyhow!("injected delete failure for {}", key));
        }
        inner.objects.remove(key);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_pages_follow_marker() {
        let bucket = MemoryBucket::new("test");
        for i in 0..5 {
            bucket.insert(&format!("p/{}", i), b"x");
        }
        bucket.insert("other/1", b"x");

        let first = bucket.list("p/", 2, None).await.unwrap();
        assert_eq!(first.objects.len(), 2);
        assert_eq!(first.next_marker.as_deref(), Some("p/1"));

        let last = bucket.list("p/", 3, Some("p/1")).await.unwrap();
        assert_eq!(last.objects.len(), 3);
        assert!(last.next_marker.is_none());
    }

    #[test]
    fn test_etag_is_quoted_uppercase_md5() {
        // md5("hello")
        assert_eq!(quoted_md5(b"hello"), "\"5D41402ABC4B2A76B9719D911017C592\"");
    }
}
