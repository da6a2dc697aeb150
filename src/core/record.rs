use serde::{Deserialize, Serialize};

/// 宿主选择控件中的一个可选项
///
/// `value` 是记录的唯一标识，`text` 是显示名。控件内容由宿主拥有；
/// 本 crate 只持有快照副本用于派生过滤视图。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOption {
    pub value: String,
    pub text: String,
}

impl RecordOption {
    pub fn new(value: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            text: text.into(),
        }
    }
}
