//! 远端对象索引

use crate::error::{Result, SyncError};
use crate::storage::{Bucket, DEFAULT_PAGE_SIZE};
use indexmap::IndexMap;
use tracing::{debug, info, warn};

/// 远端对象
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// 去掉前缀后的 key
    pub key: String,
    /// 存储返回的原始 etag
    pub stored_digest: String,
}

impl RemoteObject {
    pub fn new(key: impl Into<String>, stored_digest: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            stored_digest: stored_digest.into(),
        }
    }

    /// 去掉两端引号并转为小写，用于与本地指纹比较
    pub fn normalized_digest(&self) -> String {
        self.stored_digest.trim().trim_matches('"').to_lowercase()
    }
}

/// key -> 远端对象，保留列举顺序。每次同步构建一次，比较时被消耗
pub type RemoteIndex = IndexMap<String, RemoteObject>;

/// 远端索引构建器
pub struct RemoteIndexBuilder {
    page_size: usize,
}

impl RemoteIndexBuilder {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }

    /// 分页列举 prefix 下的全部对象，任何一页失败则整体失败
    pub async fn build(&self, bucket: &dyn Bucket, prefix: &str) -> Result<RemoteIndex> {
        info!("开始列举远端对象: {}, prefix: {:?}", bucket.name(), prefix);

        let mut index = RemoteIndex::new();
        let mut marker: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = bucket
                .list(prefix, self.page_size, marker.as_deref())
                .await
                .map_err(|e| SyncError::remote("list", prefix, e))?;
            pages += 1;
            debug!("第 {} 页: {} 个对象", pages, page.objects.len());

            for object in page.objects {
                let Some(key) = object.name.strip_prefix(prefix) else {
                    warn!("对象不在前缀下，已忽略: {}", object.name);
                    continue;
                };
                let key = key.to_string();
                if let Some(previous) = index.insert(key.clone(), RemoteObject::new(key.clone(), object.etag)) {
                    warn!("列举结果中出现重复 key，以后出现者为准: {} (etag {})", key, previous.stored_digest);
                }
            }

            match page.next_marker {
                Some(next) if Some(&next) != marker.as_ref() => marker = Some(next),
                Some(next) => {
                    return Err(SyncError::remote(
                        "list",
                        prefix,
                        anyhow::anyhow!("continuation marker did not advance: {}", next),
                    ))
                }
                None => break,
            }
        }

        info!("远端列举完成: {} 页, {} 个对象", pages, index.len());
        Ok(index)
    }
}

impl Default for RemoteIndexBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ListPage, MemoryBucket, ObjectSummary, PutOptions};
    use async_trait::async_trait;
    use std::path::Path;

    #[test]
    fn test_normalized_digest() {
        assert_eq!(RemoteObject::new("k", "\"ABC123\"").normalized_digest(), "abc123");
        assert_eq!(RemoteObject::new("k", "abc123").normalized_digest(), "abc123");
    }

    #[tokio::test]
    async fn test_build_spans_pages() {
        let bucket = MemoryBucket::new("test");
        for i in 0..1500 {
            bucket.insert(&format!("site/{:04}.txt", i), b"x");
        }
        bucket.insert("elsewhere/x.txt", b"x");

        let index = RemoteIndexBuilder::new(1000).build(&bucket, "site/").await.unwrap();

        assert_eq!(index.len(), 1500);
        assert_eq!(bucket.list_calls(), 2);
        assert!(index.contains_key("0000.txt"));
        assert!(index.contains_key("1499.txt"));
    }

    #[tokio::test]
    async fn test_build_strips_exact_prefix() {
        let bucket = MemoryBucket::new("test");
        bucket.insert("backup-a/b.txt", b"x");

        let index = RemoteIndexBuilder::default().build(&bucket, "backup-").await.unwrap();
        assert_eq!(index.keys().collect::<Vec<_>>(), vec!["a/b.txt"]);
    }

    #[tokio::test]
    async fn test_build_fails_on_any_page() {
        let bucket = MemoryBucket::new("test");
        for i in 0..5 {
            bucket.insert(&format!("{}", i), b"x");
        }
        bucket.fail_list_page(1);

        let err = RemoteIndexBuilder::new(2).build(&bucket, "").await.unwrap_err();
        assert!(matches!(err, SyncError::Remote { op: "list", .. }));
    }

    /// 返回固定页面的存储，用于模拟异常后端
    struct ScriptedBucket {
        pages: Vec<ListPage>,
    }

    #[async_trait]
    impl Bucket for ScriptedBucket {
        async fn list(&self, _prefix: &str, _max_keys: usize, marker: Option<&str>) -> anyhow::Result<ListPage> {
            let idx = marker.map_or(0, |m| m.parse::<usize>().unwrap());
            Ok(self.pages[idx].clone())
        }

        async fn put(&self, _key: &str, _local_path: &Path, _options: &PutOptions) -> anyhow::Result<()> {
            unimplemented!()
        }

        async fn delete(&self, _key: &str) -> anyhow::Result<()> {
            unimplemented!()
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn object(name: &str, etag: &str) -> ObjectSummary {
        ObjectSummary {
            name: name.to_string(),
            etag: etag.to_string(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_keys_last_page_wins() {
        let bucket = ScriptedBucket {
            pages: vec![
                ListPage {
                    objects: vec![object("p/a", "\"1\""), object("p/b", "\"2\"")],
                    next_marker: Some("1".to_string()),
                },
                ListPage {
                    objects: vec![object("p/a", "\"3\"")],
                    next_marker: None,
                },
            ],
        };

        let index = RemoteIndexBuilder::default().build(&bucket, "p/").await.unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index["a"].normalized_digest(), "3");
    }

    #[tokio::test]
    async fn test_stuck_marker_is_an_error() {
        let bucket = ScriptedBucket {
            pages: vec![
                ListPage {
                    objects: vec![object("a", "\"1\"")],
                    next_marker: Some("1".to_string()),
                },
                ListPage {
                    objects: vec![],
                    next_marker: Some("1".to_string()),
                },
            ],
        };

        let err = RemoteIndexBuilder::default().build(&bucket, "").await.unwrap_err();
        assert!(matches!(err, SyncError::Remote { .. }));
    }
}
