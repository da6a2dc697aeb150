use crate::core::RecordOption;

/// 宿主协作者：记录列表的权威来源 + 选择控件的写入口。
///
/// 本 crate 不触碰任何呈现原语；宿主负责把这些调用映射到它自己的
/// 列表控件上。约定：`replace_options` 之后宿主自身的监听方需要收到
/// change 类信号才会重渲染，信号由 `notify_changed` 触发（带沉降延迟，
/// 见 `TagsExtension`）。
pub trait HostBridge: Send + Sync {
    /// 宿主已知的记录名清单（可能滞后于控件内容）
    fn record_names(&self) -> Vec<String>;

    /// 控件当前的选项列表（标识 + 显示名）
    fn current_options(&self) -> Vec<RecordOption>;

    /// 控件当前选中项
    fn current_selection(&self) -> Option<String>;

    /// 整体替换控件的选项列表
    fn replace_options(&self, options: &[RecordOption]);

    /// 程序化设置当前选中项（空字符串 = 占位态，无选中）
    fn set_selection(&self, value: &str);

    /// 选项替换完成后通知宿主监听方重渲染
    fn notify_changed(&self);
}
