use super::remote_index::RemoteIndex;
use super::scanner::FileEntry;
use serde::Serialize;
use std::fmt;

/// 同步动作
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// 远端不存在，上传
    Create { key: String, digest: String },
    /// 远端内容不同，覆盖上传
    Update { key: String, digest: String },
    /// 本地不存在，删除远端对象
    Delete { key: String },
    /// 内容相同，跳过
    Unchanged { key: String, digest: String },
}

impl Action {
    pub fn key(&self) -> &str {
        match self {
            Action::Create { key, .. }
            | Action::Update { key, .. }
            | Action::Delete { key }
            | Action::Unchanged { key, .. } => key,
        }
    }

    /// 报告中使用的符号
    pub fn symbol(&self) -> char {
        match self {
            Action::Create { .. } => '+',
            Action::Update { .. } => '*',
            Action::Delete { .. } => '-',
            Action::Unchanged { .. } => '=',
        }
    }

    /// 是否需要访问远端
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Action::Unchanged { .. })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.symbol(), self.key())
    }
}

/// 比较本地文件与远端索引，生成动作列表
///
/// 创建/更新/不变按本地扫描顺序排列，删除追加在后，顺序与索引一致。
/// 索引在比较过程中只读，用标记位记录已匹配的条目，最后消耗索引生成删除动作。
pub fn diff(local: Vec<FileEntry>, index: RemoteIndex) -> Vec<Action> {
    let mut actions = Vec::with_capacity(local.len() + index.len());
    let mut claimed = vec![false; index.len()];

    for FileEntry { key, digest } in local {
        let action = match index.get_full(&key) {
            Some((i, _, object)) => {
                claimed[i] = true;
                if object.normalized_digest() == digest {
                    Action::Unchanged { key, digest }
                } else {
                    Action::Update { key, digest }
                }
            }
            None => Action::Create { key, digest },
        };
        actions.push(action);
    }

    actions.extend(
        index
            .into_keys()
            .zip(claimed)
            .filter(|(_, claimed)| !claimed)
            .map(|(key, _)| Action::Delete { key }),
    );

    actions
}

/// 动作统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl ActionSummary {
    pub fn from_actions(actions: &[Action]) -> Self {
        let mut summary = Self::default();

        for action in actions {
            match action {
                Action::Create { .. } => summary.created += 1,
                Action::Update { .. } => summary.updated += 1,
                Action::Delete { .. } => summary.deleted += 1,
                Action::Unchanged { .. } => summary.unchanged += 1,
            }
        }

        summary
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted + self.unchanged
    }

    /// 需要访问远端的动作数
    pub fn mutations(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}
