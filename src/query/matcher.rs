use std::sync::Arc;

use wildmatch::WildMatch;

/// Matcher 抽象接口，定义管理视图的文本匹配行为
pub trait Matcher: Send + Sync {
    /// 判断记录名是否匹配
    fn matches(&self, text: &str) -> bool;
}

/// 大小写不敏感的包含匹配 (contains)
pub struct ContainsMatcher {
    pattern: String,
}

impl ContainsMatcher {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_lowercase(),
        }
    }
}

impl Matcher for ContainsMatcher {
    fn matches(&self, text: &str) -> bool {
        if self.pattern.is_empty() {
            return true;
        }
        text.to_lowercase().contains(&self.pattern)
    }
}

/// 通配符匹配 (Glob)，同样大小写不敏感
pub struct GlobMatcher {
    wild: WildMatch,
}

impl GlobMatcher {
    pub fn new(pattern: &str) -> Self {
        Self {
            wild: WildMatch::new(&pattern.to_lowercase()),
        }
    }
}

impl Matcher for GlobMatcher {
    fn matches(&self, text: &str) -> bool {
        self.wild.matches(&text.to_lowercase())
    }
}

/// 匹配器工厂与自动识别
pub fn create_matcher(pattern: &str) -> Arc<dyn Matcher> {
    if pattern.contains('*') || pattern.contains('?') {
        Arc::new(GlobMatcher::new(pattern))
    } else {
        Arc::new(ContainsMatcher::new(pattern))
    }
}
