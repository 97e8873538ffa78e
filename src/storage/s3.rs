use super::{Bucket, ListPage, Locator, ObjectSummary, PutOptions, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use anyhow::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use opendal::{layers::TimeoutLayer, Metakey, Operator};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// 同时缓冲在内存中的上传数据上限（MB）
const UPLOAD_BUDGET_MB: u32 = 256;

const MB: u64 = 1024 * 1024;

/// S3 兼容对象存储（AWS S3、阿里云 OSS、MinIO 等）
pub struct S3Bucket {
    operator: Operator,
    name: String,
    /// 每个许可对应 1MB 上传缓冲
    upload_budget: Semaphore,
}

impl S3Bucket {
    pub fn new(locator: &Locator, region: &str, virtual_host_style: bool) -> Result<Self> {
        use opendal::services::S3;

        let mut builder = S3::default()
            .bucket(&locator.bucket)
            .region(region)
            .endpoint(&locator.endpoint_url())
            .access_key_id(&locator.access_key)
            .secret_access_key(&locator.secret_key)
            .root("/");

        if virtual_host_style {
            builder = builder.enable_virtual_host_style();
        }

        // 添加超时层
        let operator = Operator::new(builder)?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();

        let name = format!("s3://{}.{}", locator.bucket, locator.endpoint);

        Ok(Self {
            operator,
            name,
            upload_budget: Semaphore::new(UPLOAD_BUDGET_MB as usize),
        })
    }
}

/// 上传一个文件需要的缓冲许可数，超过预算的大文件独占全部预算
fn upload_permits(len: u64) -> u32 {
    len.div_ceil(MB).clamp(1, UPLOAD_BUDGET_MB as u64) as u32
}

/// 列举起点：opendal 只能按目录列举，前缀不以 `/` 结尾时从其父目录开始再过滤
fn list_root(prefix: &str) -> &str {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix
    } else {
        prefix.rfind('/').map_or("", |i| &prefix[..=i])
    }
}

#[async_trait]
impl Bucket for S3Bucket {
    async fn list(&self, prefix: &str, max_keys: usize, marker: Option<&str>) -> Result<ListPage> {
        let root = list_root(prefix);

        let mut lister = self.operator.lister_with(root).recursive(true).metakey(Metakey::Etag);
        if let Some(m) = marker {
            lister = lister.start_after(m);
        }
        let mut lister = lister.await?;

        let mut objects = Vec::with_capacity(max_keys);
        let mut has_more = false;

        while let Some(entry) = lister.try_next().await? {
            let meta = entry.metadata();
            let name = entry.path().trim_start_matches('/');

            // 跳过目录占位对象和前缀外的对象
            if meta.is_dir() || !name.starts_with(prefix) {
                continue;
            }

            if objects.len() == max_keys {
                has_more = true;
                break;
            }

            objects.push(ObjectSummary {
                name: name.to_string(),
                etag: meta.etag().unwrap_or_default().to_string(),
            });
        }

        let next_marker = if has_more {
            objects.last().map(|o| o.name.clone())
        } else {
            None
        };

        debug!("列举 {} 个对象, prefix={}, marker={:?}", objects.len(), prefix, marker);

        Ok(ListPage {
            objects,
            next_marker,
        })
    }

    async fn put(&self, key: &str, local_path: &Path, options: &PutOptions) -> Result<()> {
        // 多次 write 会转为分片上传，etag 不再是内容 MD5，因此整文件单次 PUT；
        // 同时缓冲的字节数受 upload_budget 限制
        let len = tokio::fs::metadata(local_path).await?.len();
        let _permit = self.upload_budget.acquire_many(upload_permits(len)).await?;
        let data = tokio::fs::read(local_path).await?;

        let mut writer = self.operator.write_with(key, data);
        for (name, value) in &options.headers {
            match name.to_ascii_lowercase().as_str() {
                "content-type" => writer = writer.content_type(value),
                "cache-control" => writer = writer.cache_control(value),
                "content-disposition" => writer = writer.content_disposition(value),
                _ => warn!("不支持的上传头，已忽略: {}", name),
            }
        }
        writer.await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        // S3 删除不存在的对象不会报错
        self.operator.delete(key).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
