pub mod locator;
pub mod memory;
pub mod s3;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub use locator::Locator;
pub use memory::MemoryBucket;
pub use s3::S3Bucket;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- list, delete 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- 上传
pub const IO_TIMEOUT_SECS: u64 = 300;
/// 单页列举的最大对象数
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// 列举结果中的单个对象
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    /// 完整对象名（包含前缀）
    pub name: String,
    /// 存储返回的原始 etag，可能带引号或为大写
    pub etag: String,
}

/// 一页列举结果
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    /// 为 None 表示已是最后一页
    pub next_marker: Option<String>,
}

/// 上传选项
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// 附加到每次上传的传输头
    pub headers: BTreeMap<String, String>,
}

/// 对象存储抽象接口
#[async_trait]
pub trait Bucket: Send + Sync {
    /// 列举一页 prefix 下的对象，从 marker 之后开始
    async fn list(&self, prefix: &str, max_keys: usize, marker: Option<&str>) -> Result<ListPage>;

    /// 上传本地文件到 key
    async fn put(&self, key: &str, local_path: &Path, options: &PutOptions) -> Result<()>;

    /// 删除对象，对象不存在不视为错误
    async fn delete(&self, key: &str) -> Result<()>;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 根据目标定位符创建存储实例
pub fn create_bucket(locator: &Locator, region: &str, virtual_host_style: bool) -> Result<Arc<dyn Bucket>> {
    tracing::info!(
        "初始化对象存储: bucket={}, endpoint={}, prefix={:?}",
        locator.bucket,
        locator.endpoint,
        locator.prefix
    );
    Ok(Arc::new(S3Bucket::new(locator, region, virtual_host_style)?) as Arc<dyn Bucket>)
}
