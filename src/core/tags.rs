use std::collections::HashMap;

use unicode_normalization::{is_nfc, UnicodeNormalization};

/// 持久化的标签索引：记录名 -> 标签列表（列表保持插入顺序，集合语义去重）
pub type TagIndex = HashMap<String, Vec<String>>;

/// 标签规范化：trim + NFC。
///
/// 返回 None 表示 trim 后为空（调用方视为 no-op）。
/// NFC 归一避免视觉相同但码位不同的标签重复共存；比较保持大小写敏感。
pub fn normalize_tag(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if is_nfc(trimmed) {
        Some(trimmed.to_string())
    } else {
        Some(trimmed.nfc().collect())
    }
}
