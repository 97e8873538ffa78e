use super::comparator::Action;
use crate::error::{ActionFailure, Result, SyncError};
use crate::storage::{Bucket, PutOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

/// 执行动作所需的上下文
#[derive(Clone)]
pub struct ApplyContext {
    pub bucket: Arc<dyn Bucket>,
    /// 本地源目录
    pub source: PathBuf,
    /// 远端 key 前缀
    pub prefix: String,
    pub put_options: PutOptions,
    /// 最大并发请求数
    pub max_concurrent: usize,
}

impl ApplyContext {
    pub fn new(bucket: Arc<dyn Bucket>, source: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            bucket,
            source: source.into(),
            prefix: prefix.into(),
            put_options: PutOptions::default(),
            max_concurrent: 16,
        }
    }

    fn remote_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// 本地文件路径，key 按 `/` 拆分后拼接
    fn local_path(&self, key: &str) -> PathBuf {
        key.split('/').fold(self.source.clone(), |path, part| path.join(part))
    }
}

/// 并发执行所有动作
///
/// 所有动作都会执行完毕；若有失败，返回 [`SyncError::Apply`]，其中包含已完成的动作和每个失败原因。
/// 已完成的上传和删除不会回滚。成功时按输入顺序返回动作。
pub async fn apply(ctx: &ApplyContext, actions: Vec<Action>) -> Result<Vec<Action>> {
    let semaphore = Arc::new(Semaphore::new(ctx.max_concurrent.max(1)));
    let mut handles = Vec::with_capacity(actions.len());

    for action in actions {
        let ctx = ctx.clone();
        let semaphore = semaphore.clone();
        let task_action = action.clone();

        let handle = tokio::spawn(async move {
            if !task_action.is_mutation() {
                return Ok(());
            }
            // 信号量不会被关闭
            let _permit = semaphore.acquire_owned().await.ok();
            execute_action(&ctx, &task_action).await
        });
        handles.push((action, handle));
    }

    let mut completed = Vec::with_capacity(handles.len());
    let mut failures = Vec::new();

    // 等待所有任务完成
    for (action, handle) in handles {
        let result = handle
            .await
            .unwrap_or_else(|e| Err(anyhow::anyhow!("task aborted: {}", e)));

        match result {
            Ok(()) => {
                info!("{}", action);
                completed.push(action);
            }
            Err(e) => {
                error!("{} 失败: {:#}", action, e);
                failures.push(ActionFailure { action, error: e });
            }
        }
    }

    if failures.is_empty() {
        Ok(completed)
    } else {
        Err(SyncError::Apply {
            completed,
            failures,
        })
    }
}

/// 执行单个动作
async fn execute_action(ctx: &ApplyContext, action: &Action) -> anyhow::Result<()> {
    match action {
        Action::Create { key, .. } | Action::Update { key, .. } => {
            let remote_key = ctx.remote_key(key);
            let local_path = ctx.local_path(key);
            debug!("上传: {} -> {}", local_path.display(), remote_key);
            ctx.bucket.put(&remote_key, &local_path, &ctx.put_options).await
        }
        Action::Delete { key } => {
            let remote_key = ctx.remote_key(key);
            debug!("删除: {}", remote_key);
            ctx.bucket.delete(&remote_key).await
        }
        Action::Unchanged { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBucket;
    use std::fs;
    use tempfile::TempDir;

    fn create(key: &str) -> Action {
        Action::Create {
            key: key.into(),
            digest: String::new(),
        }
    }

    #[tokio::test]
    async fn test_apply_executes_each_kind() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/new.txt"), "new").unwrap();
        fs::write(tmp.path().join("changed.txt"), "v2").unwrap();

        let bucket = Arc::new(MemoryBucket::new("test"));
        bucket.insert("p/changed.txt", b"v1");
        bucket.insert("p/same.txt", b"same");
        bucket.insert("p/gone.txt", b"old");

        let mut ctx = ApplyContext::new(bucket.clone(), tmp.path(), "p/");
        ctx.put_options.headers.insert("Cache-Control".into(), "no-cache".into());

        let actions = vec![
            create("sub/new.txt"),
            Action::Update {
                key: "changed.txt".into(),
                digest: String::new(),
            },
            Action::Unchanged {
                key: "same.txt".into(),
                digest: String::new(),
            },
            Action::Delete { key: "gone.txt".into() },
        ];

        let applied = apply(&ctx, actions.clone()).await.unwrap();
        assert_eq!(applied, actions);

        assert_eq!(bucket.get("p/sub/new.txt").unwrap().data, b"new");
        assert_eq!(bucket.get("p/changed.txt").unwrap().data, b"v2");
        assert_eq!(
            bucket.get("p/sub/new.txt").unwrap().headers.get("Cache-Control").map(String::as_str),
            Some("no-cache")
        );
        assert!(bucket.get("p/gone.txt").is_none());
        assert_eq!(bucket.delete_calls("p/gone.txt"), 1);
        assert_eq!(bucket.put_calls("p/same.txt"), 0);
    }

    #[tokio::test]
    async fn test_apply_runs_all_and_aggregates_failures() {
        let tmp = TempDir::new().unwrap();
        for name in ["a", "b", "c"] {
            fs::write(tmp.path().join(name), name).unwrap();
        }

        let bucket = Arc::new(MemoryBucket::new("test"));
        bucket.fail_key("b");

        let ctx = ApplyContext::new(bucket.clone(), tmp.path(), "");
        let err = apply(&ctx, vec![create("a"), create("b"), create("c")])
            .await
            .unwrap_err();

        match err {
            SyncError::Apply { completed, failures } => {
                assert_eq!(completed, vec![create("a"), create("c")]);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].action, create("b"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(bucket.get("a").is_some());
        assert!(bucket.get("c").is_some());
    }

    #[tokio::test]
    async fn test_apply_missing_local_file_fails_action() {
        let tmp = TempDir::new().unwrap();
        let bucket = Arc::new(MemoryBucket::new("test"));
        let ctx = ApplyContext::new(bucket, tmp.path(), "");

        let err = apply(&ctx, vec![create("missing")]).await.unwrap_err();
        assert!(matches!(err, SyncError::Apply { ref failures, .. } if failures.len() == 1));
    }
}
