use parking_lot::Mutex;
use serde_json::Value;

use crate::storage::SettingsBackend;

/// 进程内存后端：宿主未注入持久化时的缺省实现（数据只存活于会话）。
///
/// 也是测试的标准替身：`with_legacy` 可以预置旧存储位置的内容，
/// 用于覆盖一次性迁移路径。
#[derive(Default)]
pub struct MemoryBackend {
    slot: Mutex<Option<Value>>,
    legacy: Mutex<Option<Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_legacy(legacy: Value) -> Self {
        Self {
            slot: Mutex::new(None),
            legacy: Mutex::new(Some(legacy)),
        }
    }
}

impl SettingsBackend for MemoryBackend {
    fn load(&self) -> anyhow::Result<Option<Value>> {
        Ok(self.slot.lock().clone())
    }

    fn save(&self, blob: &Value) -> anyhow::Result<()> {
        *self.slot.lock() = Some(blob.clone());
        Ok(())
    }

    fn load_legacy(&self) -> Option<Value> {
        self.legacy.lock().clone()
    }
}
