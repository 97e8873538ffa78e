//! 同步错误类型

use crate::core::Action;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

/// 单个动作的失败记录
#[derive(Debug)]
pub struct ActionFailure {
    pub action: Action,
    pub error: anyhow::Error,
}

impl fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.action, self.error)
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// 源目录不存在
    #[error("source directory not found: {}", .path.display())]
    NotFound { path: PathBuf },

    /// 本地读取失败
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 远端 list / put / delete 失败
    #[error("remote {op} failed for '{key}': {source:#}")]
    Remote {
        op: &'static str,
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// 部分动作执行失败，已完成的动作不会回滚
    #[error("{} of {} actions failed: {}", .failures.len(), .failures.len() + .completed.len(), summarize(.failures))]
    Apply {
        completed: Vec<Action>,
        failures: Vec<ActionFailure>,
    },

    #[error("invalid target locator: {0}")]
    Locator(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn remote(op: &'static str, key: impl Into<String>, source: anyhow::Error) -> Self {
        SyncError::Remote {
            op,
            key: key.into(),
            source,
        }
    }
}

fn summarize(failures: &[ActionFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
