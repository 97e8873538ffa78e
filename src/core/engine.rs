use crate::config::SyncConfig;
use crate::core::applier::{apply, ApplyContext};
use crate::core::comparator::{diff, Action, ActionSummary};
use crate::core::remote_index::RemoteIndexBuilder;
use crate::core::scanner::FileScanner;
use crate::error::Result;
use crate::storage::{create_bucket, Bucket, Locator, PutOptions};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// 同步报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub actions: Vec<Action>,
    pub summary: ActionSummary,
    pub dry_run: bool,
    pub duration_ms: u64,
}

/// 同步引擎：扫描 -> 列举 -> 比较 -> 执行
pub struct SyncEngine {
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn with_config(config: SyncConfig) -> Self {
        Self { config }
    }

    /// 扫描本地、列举远端并比较，不修改远端
    ///
    /// 本地扫描和远端列举都完整结束后才开始比较；任一失败则直接返回。
    pub async fn plan(&self, bucket: &dyn Bucket, prefix: &str, source: &Path) -> Result<Vec<Action>> {
        let local = FileScanner::new(self.config.concurrency).scan(source).await?;
        let index = RemoteIndexBuilder::new(self.config.page_size)
            .build(bucket, prefix)
            .await?;

        let actions = diff(local, index);
        let summary = ActionSummary::from_actions(&actions);
        info!(
            "比较完成: {} 个新增, {} 个更新, {} 个删除, {} 个未变化",
            summary.created, summary.updated, summary.deleted, summary.unchanged
        );

        Ok(actions)
    }

    /// 执行一次完整同步，返回已执行的动作
    pub async fn run(&self, bucket: Arc<dyn Bucket>, prefix: &str, source: &Path) -> Result<Vec<Action>> {
        let actions = self.plan(bucket.as_ref(), prefix, source).await?;

        let ctx = ApplyContext {
            bucket,
            source: source.to_path_buf(),
            prefix: prefix.to_string(),
            put_options: PutOptions {
                headers: self.config.headers.clone(),
            },
            max_concurrent: self.config.concurrency,
        };

        apply(&ctx, actions).await
    }

    /// 按配置解析目标、连接存储并执行，dry run 时只比较
    pub async fn execute(&self) -> Result<SyncReport> {
        let start = Instant::now();
        let locator = Locator::parse(&self.config.target)?;
        let bucket = create_bucket(&locator, &self.config.region, self.config.virtual_host_style)
            .map_err(|e| crate::error::SyncError::Config(format!("{:#}", e)))?;
        let source = Path::new(&self.config.source);

        info!(
            "开始同步: {} -> {} (prefix {:?})",
            source.display(),
            bucket.name(),
            locator.prefix
        );

        let actions = if self.config.dry_run {
            self.plan(bucket.as_ref(), &locator.prefix, source).await?
        } else {
            self.run(bucket, &locator.prefix, source).await?
        };

        let summary = ActionSummary::from_actions(&actions);
        let duration_ms = start.elapsed().as_millis() as u64;
        info!("同步完成: {} 个动作, 耗时 {}ms", summary.total(), duration_ms);

        Ok(SyncReport {
            actions,
            summary,
            dry_run: self.config.dry_run,
            duration_ms,
        })
    }
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// 将本地目录同步到目标定位符所指的存储，使用默认设置
pub async fn sync(source: impl AsRef<Path>, target: &str) -> Result<Vec<Action>> {
    let config = SyncConfig {
        source: source.as_ref().to_string_lossy().into_owned(),
        target: target.to_string(),
        ..SyncConfig::default()
    };
    Ok(SyncEngine::with_config(config).execute().await?.actions)
}
