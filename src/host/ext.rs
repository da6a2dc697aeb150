use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::host::{HostBridge, ProbeOutcome, ReadinessProbe};
use crate::index::TagStore;
use crate::query::{BulkError, FilteredView, ManageRow, SelectionEngine};
use crate::storage::SettingsBackend;

/// 选项替换后、通知宿主监听方之前的沉降延迟：
/// 宿主自身的渲染需要先完成，否则监听方观察到的是半更新状态。
const NOTIFY_SETTLE_DELAY: Duration = Duration::from_millis(50);

/// 宿主列表变更通知后、刷新快照之前的延迟（等宿主更新完它的控件）
const HOST_REFRESH_DELAY: Duration = Duration::from_millis(500);

/// 过滤面板中的一枚标签及其激活状态
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagChip {
    pub tag: String,
    pub active: bool,
}

/// 扩展入口：把 TagStore + SelectionEngine 与宿主桥接起来。
///
/// 控制流：UI 事件 -> 引擎/存储操作 -> 把返回数据推回宿主控件。
/// 需要在 tokio 运行时内挂载（就绪探测与延迟通知依赖定时器）。
pub struct TagsExtension {
    store: Arc<TagStore>,
    engine: SelectionEngine,
    host: Arc<dyn HostBridge>,
    degraded: AtomicBool,
}

impl TagsExtension {
    /// 挂载：等待宿主就绪（有界重试），然后抓取初始快照。
    pub async fn attach(
        host: Arc<dyn HostBridge>,
        backend: Arc<dyn SettingsBackend>,
    ) -> Arc<Self> {
        Self::attach_with_probe(host, backend, ReadinessProbe::default()).await
    }

    pub async fn attach_with_probe(
        host: Arc<dyn HostBridge>,
        backend: Arc<dyn SettingsBackend>,
        probe: ReadinessProbe,
    ) -> Arc<Self> {
        let store = Arc::new(TagStore::open(backend));
        let engine = SelectionEngine::new(store.clone());

        let outcome = probe.wait_ready(host.as_ref()).await;
        if outcome == ProbeOutcome::Ready {
            engine.refresh_options(host.current_options());
        }

        Arc::new(Self {
            store,
            engine,
            host,
            degraded: AtomicBool::new(outcome == ProbeOutcome::Degraded),
        })
    }

    pub fn store(&self) -> &Arc<TagStore> {
        &self.store
    }

    pub fn engine(&self) -> &SelectionEngine {
        &self.engine
    }

    /// 就绪探测是否以降级告终（快照为空，列表退回裸记录名）。
    pub fn degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// 打开过滤面板：返回全部已知标签及各自的激活状态，供面板渲染。
    ///
    /// 无过滤时顺带刷新快照（上次备份之后用户可能新增了记录）；
    /// 过滤态下控件内容被压缩过，不能作为刷新来源。
    pub fn open_filter(&self) -> Vec<TagChip> {
        let active = self.engine.active_filters();
        if active.is_empty() {
            let fresh = self.host.current_options();
            if !fresh.is_empty() {
                self.engine.refresh_options(fresh);
            }
        }
        self.store
            .all_tags()
            .into_iter()
            .map(|tag| {
                let on = active.contains(&tag);
                TagChip { tag, active: on }
            })
            .collect()
    }

    /// 套用过滤集并把结果推给宿主控件。
    pub fn apply_filters(&self, filters: BTreeSet<String>) -> FilteredView {
        self.engine.set_filters(filters);
        self.reconcile_host_view()
    }

    /// 清除过滤，恢复完整列表。
    pub fn clear_filters(&self) -> FilteredView {
        self.engine.clear_filters();
        self.reconcile_host_view()
    }

    /// 重算视图并推送：replace_options -> set_selection -> (沉降) -> notify。
    fn reconcile_host_view(&self) -> FilteredView {
        let current = self.host.current_selection();
        let view = self
            .engine
            .filtered_view(current.as_deref(), || self.host.current_options());

        self.host.replace_options(&view.options);
        self.host
            .set_selection(view.selection.as_deref().unwrap_or(""));
        tracing::debug!(
            "View reconciled: {} option(s), selection {:?}",
            view.options.len(),
            view.selection
        );

        // 延迟通知：宿主监听方要等它自己的渲染落定后才观察得到更新
        let host = self.host.clone();
        tokio::spawn(async move {
            tokio::time::sleep(NOTIFY_SETTLE_DELAY).await;
            host.notify_changed();
        });

        view
    }

    /// 宿主记录列表变更通知入口。
    ///
    /// 延迟刷新，且仅在无过滤时刷新快照：过滤态下控件里是被压缩过的
    /// 列表，直接抓取会把过滤结果误当原始列表存进快照。
    pub fn on_host_list_changed(self: &Arc<Self>) {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(HOST_REFRESH_DELAY).await;
            if !this.engine.active_filters().is_empty() {
                return;
            }
            let fresh = this.host.current_options();
            if !fresh.is_empty() {
                this.engine.refresh_options(fresh);
            }
        });
    }

    /// 管理视图列表（搜索过滤后）；快照为空时退回宿主的裸记录名。
    pub fn visible_records(&self, query: &str) -> Vec<String> {
        self.engine
            .visible_records(query, || self.host.record_names())
    }

    /// 管理视图的行数据：可见记录配上标签与勾选态。
    pub fn management_rows(&self, query: &str) -> Vec<ManageRow> {
        self.engine
            .management_rows(query, || self.host.record_names())
    }

    /// 打开管理视图：丢弃上一次的工作集，重新开始。
    pub fn open_management(&self) {
        self.engine.deselect_all();
    }

    /// 批量移除的候选标签：只提供工作集的共同标签
    /// （只有全体成员都带的标签才能批量移除）。
    pub fn removable_tags(&self) -> Result<Vec<String>, BulkError> {
        Ok(self.engine.common_tags()?.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RecordOption;
    use crate::query::NO_MATCH_LABEL;
    use crate::storage::MemoryBackend;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicU32;

    fn init_logs() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    /// 宿主替身：widget 字段模拟控件的实际内容
    struct MockHost {
        names: Mutex<Vec<String>>,
        widget: Mutex<Vec<RecordOption>>,
        selection: Mutex<Option<String>>,
        notify_count: AtomicU32,
    }

    impl MockHost {
        fn with_records(names: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                names: Mutex::new(names.iter().map(|n| n.to_string()).collect()),
                widget: Mutex::new(
                    names.iter().map(|n| RecordOption::new(*n, *n)).collect(),
                ),
                selection: Mutex::new(names.first().map(|n| n.to_string())),
                notify_count: AtomicU32::new(0),
            })
        }

        fn empty() -> Arc<Self> {
            Arc::new(Self {
                names: Mutex::new(Vec::new()),
                widget: Mutex::new(Vec::new()),
                selection: Mutex::new(None),
                notify_count: AtomicU32::new(0),
            })
        }

        fn notifies(&self) -> u32 {
            self.notify_count.load(Ordering::Relaxed)
        }
    }

    impl HostBridge for MockHost {
        fn record_names(&self) -> Vec<String> {
            self.names.lock().clone()
        }
        fn current_options(&self) -> Vec<RecordOption> {
            self.widget.lock().clone()
        }
        fn current_selection(&self) -> Option<String> {
            self.selection.lock().clone()
        }
        fn replace_options(&self, options: &[RecordOption]) {
            *self.widget.lock() = options.to_vec();
        }
        fn set_selection(&self, value: &str) {
            *self.selection.lock() = if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            };
        }
        fn notify_changed(&self) {
            self.notify_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn quick_probe() -> ReadinessProbe {
        ReadinessProbe {
            interval: Duration::from_millis(5),
            max_attempts: 3,
        }
    }

    async fn wait_until(deadline_ms: u64, mut cond: impl FnMut() -> bool) {
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(deadline_ms);
        loop {
            if cond() {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("condition not met within {}ms", deadline_ms);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn attach_takes_initial_snapshot() {
        init_logs();
        let host = MockHost::with_records(&["A", "B"]);
        let ext = TagsExtension::attach_with_probe(
            host.clone(),
            Arc::new(MemoryBackend::new()),
            quick_probe(),
        )
        .await;

        assert!(!ext.degraded());
        assert_eq!(ext.engine().options_snapshot().len(), 2);
    }

    #[tokio::test]
    async fn attach_degrades_and_falls_back_to_bare_names() {
        init_logs();
        let host = MockHost::empty();
        // 裸记录名可用，但控件一直为空
        *host.names.lock() = vec!["Ghost".to_string()];

        let ext = TagsExtension::attach_with_probe(
            host.clone(),
            Arc::new(MemoryBackend::new()),
            quick_probe(),
        )
        .await;

        assert!(ext.degraded());
        assert!(ext.engine().options_snapshot().is_empty());
        assert_eq!(ext.visible_records(""), vec!["Ghost".to_string()]);
    }

    #[tokio::test]
    async fn apply_filters_pushes_view_then_notifies() {
        init_logs();
        let host = MockHost::with_records(&["A", "B", "C"]);
        let ext = TagsExtension::attach_with_probe(
            host.clone(),
            Arc::new(MemoryBackend::new()),
            quick_probe(),
        )
        .await;

        ext.store().add_tag("A", "t");
        ext.store().add_tag("C", "t");

        let view = ext.apply_filters(["t".to_string()].into_iter().collect());
        assert_eq!(view.selection, Some("A".to_string()));

        // 控件内容立即被替换
        assert_eq!(
            host.current_options(),
            vec![RecordOption::new("A", "A"), RecordOption::new("C", "C")]
        );
        assert_eq!(host.current_selection(), Some("A".to_string()));
        // 通知在沉降延迟之后才到
        wait_until(2_000, || host.notifies() >= 1).await;
    }

    #[tokio::test]
    async fn filtered_empty_view_pushes_placeholder() {
        init_logs();
        let host = MockHost::with_records(&["A", "B"]);
        let ext = TagsExtension::attach_with_probe(
            host.clone(),
            Arc::new(MemoryBackend::new()),
            quick_probe(),
        )
        .await;

        let view = ext.apply_filters(["nosuch".to_string()].into_iter().collect());
        assert_eq!(view.selection, None);

        let widget = host.current_options();
        assert_eq!(widget.len(), 1);
        assert_eq!(widget[0].text, NO_MATCH_LABEL);
        assert_eq!(host.current_selection(), None);
    }

    #[tokio::test]
    async fn clear_filters_restores_full_list() {
        init_logs();
        let host = MockHost::with_records(&["A", "B"]);
        let ext = TagsExtension::attach_with_probe(
            host.clone(),
            Arc::new(MemoryBackend::new()),
            quick_probe(),
        )
        .await;

        ext.store().add_tag("A", "t");
        ext.apply_filters(["t".to_string()].into_iter().collect());
        assert_eq!(host.current_options().len(), 1);

        let view = ext.clear_filters();
        assert!(!view.filter_active);
        assert_eq!(host.current_options().len(), 2);
    }

    #[tokio::test]
    async fn host_change_refreshes_snapshot_when_unfiltered() {
        init_logs();
        let host = MockHost::with_records(&["A"]);
        let ext = TagsExtension::attach_with_probe(
            host.clone(),
            Arc::new(MemoryBackend::new()),
            quick_probe(),
        )
        .await;

        // 宿主新增了一条记录
        host.widget
            .lock()
            .push(RecordOption::new("B", "B"));
        ext.on_host_list_changed();

        wait_until(3_000, || ext.engine().options_snapshot().len() == 2).await;
    }

    #[tokio::test]
    async fn host_change_suppressed_while_filter_active() {
        init_logs();
        let host = MockHost::with_records(&["A", "B"]);
        let ext = TagsExtension::attach_with_probe(
            host.clone(),
            Arc::new(MemoryBackend::new()),
            quick_probe(),
        )
        .await;

        ext.store().add_tag("A", "t");
        ext.apply_filters(["t".to_string()].into_iter().collect());
        // 控件此刻只剩过滤后的 1 项；若刷新会把它误当原始列表
        ext.on_host_list_changed();

        tokio::time::sleep(HOST_REFRESH_DELAY + Duration::from_millis(200)).await;
        assert_eq!(ext.engine().options_snapshot().len(), 2);
    }

    #[tokio::test]
    async fn open_filter_lists_chips_with_active_state() {
        init_logs();
        let host = MockHost::with_records(&["A", "B"]);
        let ext = TagsExtension::attach_with_probe(
            host.clone(),
            Arc::new(MemoryBackend::new()),
            quick_probe(),
        )
        .await;

        ext.store().add_tag("A", "fav");
        ext.store().add_tag("B", "vip");
        ext.apply_filters(["vip".to_string()].into_iter().collect());

        let chips = ext.open_filter();
        assert_eq!(
            chips,
            vec![
                TagChip {
                    tag: "fav".to_string(),
                    active: false
                },
                TagChip {
                    tag: "vip".to_string(),
                    active: true
                },
            ]
        );
    }

    #[tokio::test]
    async fn open_filter_refreshes_snapshot_only_when_unfiltered() {
        init_logs();
        let host = MockHost::with_records(&["A"]);
        let ext = TagsExtension::attach_with_probe(
            host.clone(),
            Arc::new(MemoryBackend::new()),
            quick_probe(),
        )
        .await;

        // 无过滤：打开面板时把宿主新增的记录补进快照
        host.widget.lock().push(RecordOption::new("B", "B"));
        ext.open_filter();
        assert_eq!(ext.engine().options_snapshot().len(), 2);

        // 过滤态：控件里是压缩后的列表，打开面板不得覆盖快照
        ext.store().add_tag("A", "t");
        ext.apply_filters(["t".to_string()].into_iter().collect());
        ext.open_filter();
        assert_eq!(ext.engine().options_snapshot().len(), 2);
    }

    #[tokio::test]
    async fn management_rows_reflect_tags_and_working_set() {
        init_logs();
        let host = MockHost::with_records(&["A", "B"]);
        let ext = TagsExtension::attach_with_probe(
            host.clone(),
            Arc::new(MemoryBackend::new()),
            quick_probe(),
        )
        .await;

        ext.store().add_tag("A", "fav");
        ext.engine().toggle("A", true);

        let rows = ext.management_rows("");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].tags, vec!["fav".to_string()]);
        assert!(rows[0].selected);
        assert!(!rows[1].selected);
    }

    #[tokio::test]
    async fn open_management_resets_working_set() {
        init_logs();
        let host = MockHost::with_records(&["A", "B"]);
        let ext = TagsExtension::attach_with_probe(
            host.clone(),
            Arc::new(MemoryBackend::new()),
            quick_probe(),
        )
        .await;

        ext.engine().select_all(ext.visible_records(""));
        assert_eq!(ext.engine().selected_count(), 2);

        ext.open_management();
        assert_eq!(ext.engine().selected_count(), 0);
    }

    #[tokio::test]
    async fn removable_tags_limited_to_common_set() {
        init_logs();
        let host = MockHost::with_records(&["A", "B"]);
        let ext = TagsExtension::attach_with_probe(
            host.clone(),
            Arc::new(MemoryBackend::new()),
            quick_probe(),
        )
        .await;

        ext.store()
            .set_tags("A", &["x".to_string(), "y".to_string()]);
        ext.store().set_tags("B", &["y".to_string()]);

        assert_eq!(ext.removable_tags(), Err(BulkError::EmptySelection));

        ext.engine().select_all(ext.visible_records(""));
        assert_eq!(ext.removable_tags().unwrap(), vec!["y".to_string()]);
    }

    #[tokio::test]
    async fn tags_survive_extension_reattach() {
        init_logs();
        let backend = Arc::new(MemoryBackend::new());
        let host = MockHost::with_records(&["Alice"]);

        {
            let ext = TagsExtension::attach_with_probe(
                host.clone(),
                backend.clone(),
                quick_probe(),
            )
            .await;
            ext.store().add_tag("Alice", "fav");
        }

        // 模拟宿主重启后重新挂载：同一持久化位置
        let ext = TagsExtension::attach_with_probe(host, backend, quick_probe()).await;
        assert_eq!(ext.store().get_tags("Alice"), vec!["fav".to_string()]);
    }
}
