use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::TagIndex;

/// 设置 blob：`{ "tags": { record: [tag, ...] } }`
///
/// 缺失的键走 default，宿主侧多出来的键在反序列化时忽略：
/// blob 可能与宿主的其他扩展设置同仓存放。
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SettingsBlob {
    #[serde(default)]
    pub tags: TagIndex,
}

/// 键值持久化协作者：由宿主注入，整个 blob 一次读写。
///
/// - `load` 返回 `Ok(None)` 表示存储位置为空（首次使用）
/// - `load_legacy` 暴露旧存储位置，用于一次性迁移（默认没有）
pub trait SettingsBackend: Send + Sync {
    fn load(&self) -> anyhow::Result<Option<Value>>;
    fn save(&self, blob: &Value) -> anyhow::Result<()>;

    fn load_legacy(&self) -> Option<Value> {
        None
    }
}

/// 从 backend 读取并解析设置 blob。
///
/// 任何失败（IO、格式损坏）都退化为空索引：标签是非关键注记，
/// 宁可降级为"无已知标签"也不向上传播。
pub fn load_blob(backend: &dyn SettingsBackend) -> SettingsBlob {
    match backend.load() {
        Ok(Some(value)) => match serde_json::from_value::<SettingsBlob>(value) {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!("Settings blob malformed, starting empty: {}", e);
                SettingsBlob::default()
            }
        },
        Ok(None) => migrate_legacy(backend),
        Err(e) => {
            tracing::warn!("Settings load failed, starting empty: {}", e);
            SettingsBlob::default()
        }
    }
}

/// 新位置为空时，尝试从旧位置导入一次。
///
/// 旧 blob 是裸的 TagIndex map（没有外层 "tags" 键）；导入成功后
/// 立即以新格式落盘，之后的 load 不再走旧位置。
fn migrate_legacy(backend: &dyn SettingsBackend) -> SettingsBlob {
    let Some(raw) = backend.load_legacy() else {
        return SettingsBlob::default();
    };
    match serde_json::from_value::<TagIndex>(raw) {
        Ok(tags) => {
            let blob = SettingsBlob { tags };
            tracing::info!(
                "Migrated {} records from legacy tag storage",
                blob.tags.len()
            );
            save_blob(backend, &blob);
            blob
        }
        Err(e) => {
            tracing::warn!("Legacy tag blob unreadable, ignoring: {}", e);
            SettingsBlob::default()
        }
    }
}

/// 整 blob 写回（fire-and-forget）。
///
/// 写失败只记日志：内存态仍是本会话的权威数据，调用方不感知失败。
pub fn save_blob(backend: &dyn SettingsBackend, blob: &SettingsBlob) {
    let value = match serde_json::to_value(blob) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("Settings blob serialize failed: {}", e);
            return;
        }
    };
    if let Err(e) = backend.save(&value) {
        tracing::error!("Settings save failed (in-memory state kept): {}", e);
    }
}
