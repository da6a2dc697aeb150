use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};

use crate::core::{normalize_tag, RecordOption};
use crate::index::TagStore;
use crate::query::matcher::create_matcher;

/// 过滤结果为空时的占位项文案（value 为空，宿主应禁止选中）
pub const NO_MATCH_LABEL: &str = "无匹配项";

/// 批量操作的调用错误
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BulkError {
    /// 零元素的交集不是有意义的过滤目标，直接拒绝而不是返回空集
    #[error("no records selected")]
    EmptySelection,
}

/// 管理视图的一行：记录名 + 其标签 + 是否在工作集中
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManageRow {
    pub name: String,
    pub tags: Vec<String>,
    pub selected: bool,
}

/// 一次过滤视图计算的结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilteredView {
    /// 要渲染的选项（保持原始相对顺序；空结果时为单个占位项）
    pub options: Vec<RecordOption>,
    /// 建议选中的记录；None 表示无可选项（占位态）
    pub selection: Option<String>,
    /// 过滤指示器（供 UI 高亮过滤入口）
    pub filter_active: bool,
}

impl FilteredView {
    pub fn no_match_placeholder() -> RecordOption {
        RecordOption::new("", NO_MATCH_LABEL)
    }
}

/// 选择引擎：原始选项快照 + 当前过滤集 + 管理视图工作集。
///
/// 宿主列表是权威数据源，这里只持有显式可刷新的快照副本。
/// 快照仅在三处刷新：挂载时、宿主变更通知且无过滤时、
/// 过滤时快照为空的惰性补读。
pub struct SelectionEngine {
    store: Arc<TagStore>,
    /// 原始选项快照（ArcSwap：刷新不阻塞读取方）
    options: ArcSwap<Vec<RecordOption>>,
    /// 当前过滤标签集（空 = 不过滤，显示全部）
    active_filters: RwLock<BTreeSet<String>>,
    /// 管理视图中被勾选的记录（批量操作的操作数）
    selected: Mutex<BTreeSet<String>>,
    /// 最近一次视图计算是否处于过滤态
    filter_active: AtomicBool,
}

impl SelectionEngine {
    pub fn new(store: Arc<TagStore>) -> Self {
        Self {
            store,
            options: ArcSwap::from_pointee(Vec::new()),
            active_filters: RwLock::new(BTreeSet::new()),
            selected: Mutex::new(BTreeSet::new()),
            filter_active: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<TagStore> {
        &self.store
    }

    /// 用宿主的最新列表整体替换快照。
    pub fn refresh_options(&self, snapshot: Vec<RecordOption>) {
        tracing::debug!("Options snapshot refreshed: {} entries", snapshot.len());
        self.options.store(Arc::new(snapshot));
    }

    pub fn options_snapshot(&self) -> Arc<Vec<RecordOption>> {
        self.options.load_full()
    }

    pub fn set_filters(&self, filters: BTreeSet<String>) {
        *self.active_filters.write() = filters;
    }

    pub fn clear_filters(&self) {
        self.active_filters.write().clear();
    }

    pub fn active_filters(&self) -> BTreeSet<String> {
        self.active_filters.read().clone()
    }

    /// 过滤指示器：供 UI 样式读取。
    pub fn filter_active(&self) -> bool {
        self.filter_active.load(Ordering::Relaxed)
    }

    /// 计算过滤视图 + 选中校正。除过滤指示器外无副作用。
    ///
    /// `current` 是调用方当前选中的记录。`refetch` 是快照为空时的惰性
    /// 补读回调：宿主列表可能尚未加载完成，直接判空会产生瞬态空结果。
    ///
    /// 过滤语义：选项保留 iff 其标签集与过滤集交集非空（OR，不是 AND），
    /// 保持原始相对顺序。选中校正：原选中仍可见则保留，否则取第一项，
    /// 全空则置为占位态（selection = None + 单个占位项）。
    pub fn filtered_view(
        &self,
        current: Option<&str>,
        refetch: impl FnOnce() -> Vec<RecordOption>,
    ) -> FilteredView {
        if self.options.load().is_empty() {
            let fresh = refetch();
            if !fresh.is_empty() {
                self.refresh_options(fresh);
            }
        }

        let options = self.options.load_full();
        let visible: Vec<RecordOption>;
        let active: bool;
        {
            let filters = self.active_filters.read();
            if filters.is_empty() {
                visible = (*options).clone();
                active = false;
            } else {
                visible = options
                    .iter()
                    .filter(|opt| {
                        let tags = self.store.get_tags(&opt.value);
                        filters.iter().any(|f| tags.iter().any(|t| t == f))
                    })
                    .cloned()
                    .collect();
                active = true;
            }
        }
        self.filter_active.store(active, Ordering::Relaxed);

        if visible.is_empty() {
            return FilteredView {
                options: vec![FilteredView::no_match_placeholder()],
                selection: None,
                filter_active: active,
            };
        }

        let selection = match current {
            Some(cur) if visible.iter().any(|o| o.value == cur) => Some(cur.to_string()),
            _ => visible.first().map(|o| o.value.clone()),
        };

        FilteredView {
            options: visible,
            selection,
            filter_active: active,
        }
    }

    /// 管理视图的数据源：快照优先；快照为空时退回宿主提供的裸记录名。
    /// `query` 为文本搜索条件（大小写不敏感包含；含通配符时走 glob）。
    pub fn visible_records(
        &self,
        query: &str,
        fallback_names: impl FnOnce() -> Vec<String>,
    ) -> Vec<String> {
        let options = self.options.load();
        let names: Vec<String> = if options.is_empty() {
            fallback_names()
        } else {
            options.iter().map(|o| o.value.clone()).collect()
        };

        let query = query.trim();
        if query.is_empty() {
            return names;
        }
        let matcher = create_matcher(query);
        names.into_iter().filter(|n| matcher.matches(n)).collect()
    }

    /// 管理视图的行数据：可见记录（搜索过滤后）配上标签与勾选态。
    pub fn management_rows(
        &self,
        query: &str,
        fallback_names: impl FnOnce() -> Vec<String>,
    ) -> Vec<ManageRow> {
        let names = self.visible_records(query, fallback_names);
        let sel = self.selected.lock();
        names
            .into_iter()
            .map(|name| ManageRow {
                tags: self.store.get_tags(&name),
                selected: sel.contains(&name),
                name,
            })
            .collect()
    }

    /// 全选：只加入传入的（当前搜索条件下可见的）记录。
    pub fn select_all(&self, visible: impl IntoIterator<Item = String>) {
        let mut sel = self.selected.lock();
        for id in visible {
            sel.insert(id);
        }
    }

    pub fn deselect_all(&self) {
        self.selected.lock().clear();
    }

    pub fn toggle(&self, id: &str, included: bool) {
        let mut sel = self.selected.lock();
        if included {
            sel.insert(id.to_string());
        } else {
            sel.remove(id);
        }
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.lock().contains(id)
    }

    pub fn selected_count(&self) -> usize {
        self.selected.lock().len()
    }

    /// 工作集全体成员的共同标签（交集）。
    ///
    /// 单成员时即该成员的全部标签；空工作集属调用错误。
    pub fn common_tags(&self) -> Result<BTreeSet<String>, BulkError> {
        let sel = self.selected.lock();
        let mut iter = sel.iter();
        let Some(first) = iter.next() else {
            return Err(BulkError::EmptySelection);
        };

        let mut common: BTreeSet<String> = self.store.get_tags(first).into_iter().collect();
        for id in iter {
            if common.is_empty() {
                break;
            }
            let tags: BTreeSet<String> = self.store.get_tags(id).into_iter().collect();
            common = common.intersection(&tags).cloned().collect();
        }
        Ok(common)
    }

    /// 批量追加标签；返回实际新增的记录数。
    /// 空工作集或 trim 后为空的标签是 no-op。
    pub fn bulk_add_tag(&self, tag: &str) -> usize {
        let Some(tag) = normalize_tag(tag) else {
            return 0;
        };
        let sel = self.selected.lock().clone();
        let mut applied = 0;
        for id in &sel {
            if self.store.add_tag(id, &tag) {
                applied += 1;
            }
        }
        if applied > 0 {
            tracing::info!("Bulk add '{}': {} records updated", tag, applied);
        }
        applied
    }

    /// 对工作集每个成员移除给定的一组标签；返回受影响的记录数。
    pub fn bulk_remove_tags(&self, tags: &[String]) -> usize {
        let sel = self.selected.lock().clone();
        if sel.is_empty() || tags.is_empty() {
            return 0;
        }
        for id in &sel {
            for tag in tags {
                self.store.remove_tag(id, tag);
            }
        }
        tracing::info!(
            "Bulk remove {} tag(s) across {} records",
            tags.len(),
            sel.len()
        );
        sel.len()
    }
}
