use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::{normalize_tag, TagIndex};
use crate::storage::{load_blob, save_blob, SettingsBackend, SettingsBlob};

/// 标签存储：记录名 -> 标签集合。
///
/// - 打开时加载一次（含旧位置迁移）；之后内存态为本会话权威
/// - 每次变更整 blob 写回一次，不跨调用攒批；读操作永不写
/// - 写失败被吞掉（只记日志）：标签是非关键元数据，丢失可接受
pub struct TagStore {
    backend: Arc<dyn SettingsBackend>,
    index: RwLock<TagIndex>,
}

impl TagStore {
    pub fn open(backend: Arc<dyn SettingsBackend>) -> Self {
        let blob = load_blob(backend.as_ref());
        tracing::debug!("Tag store opened: {} records", blob.tags.len());
        Self {
            backend,
            index: RwLock::new(blob.tags),
        }
    }

    /// 查询某记录的标签；未知记录返回空（永不失败）。
    pub fn get_tags(&self, record: &str) -> Vec<String> {
        self.index.read().get(record).cloned().unwrap_or_default()
    }

    /// 整体替换某记录的标签集合：去重、丢弃空白项，然后落盘。
    pub fn set_tags(&self, record: &str, tags: &[String]) {
        let mut cleaned: Vec<String> = Vec::with_capacity(tags.len());
        for raw in tags {
            let Some(tag) = normalize_tag(raw) else { continue };
            if !cleaned.contains(&tag) {
                cleaned.push(tag);
            }
        }
        self.index.write().insert(record.to_string(), cleaned);
        self.persist();
    }

    /// 追加单个标签；已存在（精确匹配）或 trim 后为空则 no-op（不落盘）。
    /// 返回是否实际发生了追加。
    pub fn add_tag(&self, record: &str, tag: &str) -> bool {
        let Some(tag) = normalize_tag(tag) else {
            return false;
        };
        {
            let mut idx = self.index.write();
            let tags = idx.entry(record.to_string()).or_default();
            if tags.contains(&tag) {
                return false;
            }
            tags.push(tag);
        }
        self.persist();
        true
    }

    /// 移除精确匹配的标签；无论是否存在都落盘（幂等）。
    pub fn remove_tag(&self, record: &str, tag: &str) {
        {
            let mut idx = self.index.write();
            if let Some(tags) = idx.get_mut(record) {
                tags.retain(|t| t != tag);
            }
        }
        self.persist();
    }

    /// 全量去重标签清单（字典序），跨所有记录取并集。
    pub fn all_tags(&self) -> Vec<String> {
        let idx = self.index.read();
        let mut set: BTreeSet<&str> = BTreeSet::new();
        for tags in idx.values() {
            for t in tags {
                set.insert(t);
            }
        }
        set.into_iter().map(str::to_string).collect()
    }

    fn persist(&self) {
        let blob = SettingsBlob {
            tags: self.index.read().clone(),
        };
        save_blob(self.backend.as_ref(), &blob);
    }
}
