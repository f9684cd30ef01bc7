//! 自动代理决策与缓存
//!
//! 对每个候选对象决定"不代理"或"按这份有序 Advisor 列表代理"。
//! 决策按候选身份缓存：判定为不代理的身份在本轮解析中不再复查，
//! 已解析的列表在代理整个生命周期内复用，除非显式失效。

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::advisor::{sort_advisors, Advisor};
use crate::joinpoint::TargetDescriptor;
use crate::proxy::{EmptyTargetSource, TargetSource};
use crate::registry::AdvisorRegistry;

/// 候选身份键
///
/// 封闭的键形态：按类型或按独立名称，不做字符串前缀约定
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CandidateKey {
    Type(String),
    Named(String),
}

impl CandidateKey {
    /// 有独立名称的候选按名称寻址，否则按类型寻址
    pub fn for_candidate(target: &TargetDescriptor, name: Option<&str>) -> Self {
        match name {
            Some(name) => CandidateKey::Named(name.to_string()),
            None => CandidateKey::Type(target.type_name.clone()),
        }
    }
}

impl fmt::Display for CandidateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateKey::Type(type_name) => write!(f, "type:{}", type_name),
            CandidateKey::Named(name) => write!(f, "name:{}", name),
        }
    }
}

/// 代理决策
#[derive(Clone)]
pub enum ProxyDecision {
    /// 不代理；这是常态而非错误
    NoProxy,

    /// 按有序 Advisor 列表代理
    Proxy {
        advisors: Vec<Arc<dyn Advisor>>,
        target_source: Arc<dyn TargetSource>,
    },
}

impl ProxyDecision {
    pub fn is_proxy(&self) -> bool {
        matches!(self, ProxyDecision::Proxy { .. })
    }

    /// 代理分支的 Advisor 列表
    pub fn advisors(&self) -> &[Arc<dyn Advisor>] {
        match self {
            ProxyDecision::NoProxy => &[],
            ProxyDecision::Proxy { advisors, .. } => advisors,
        }
    }
}

impl fmt::Debug for ProxyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyDecision::NoProxy => write!(f, "NoProxy"),
            ProxyDecision::Proxy { advisors, .. } => {
                write!(f, "Proxy({} advisor(s))", advisors.len())
            }
        }
    }
}

#[derive(Clone)]
enum CachedDecision {
    NotAdvised,
    Advised(Vec<Arc<dyn Advisor>>),
}

/// Advisor 是否可能适用于该候选类型
///
/// 类过滤器放行且至少一个可达方法静态命中才算适用；
/// 方法粒度与动态复核留给调用时的链构建
pub fn can_apply(advisor: &dyn Advisor, target: &TargetDescriptor) -> bool {
    let pointcut = advisor.pointcut();
    if !pointcut.class_filter().matches_type(target) {
        return false;
    }

    let matcher = pointcut.method_matcher();
    target.methods.iter().any(|m| matcher.matches(m, target))
}

/// 自动代理决策器
pub struct AutoProxyResolver {
    registry: Arc<AdvisorRegistry>,

    /// 决策缓存；写入幂等
    decisions: RwLock<HashMap<CandidateKey, CachedDecision>>,

    /// 已构造代理的类型名回填
    proxy_types: RwLock<HashMap<CandidateKey, String>>,

    /// 显式标记"跳过"的名称
    skip_names: RwLock<HashSet<String>>,
}

impl AutoProxyResolver {
    pub fn new(registry: Arc<AdvisorRegistry>) -> Self {
        Self {
            registry,
            decisions: RwLock::new(HashMap::new()),
            proxy_types: RwLock::new(HashMap::new()),
            skip_names: RwLock::new(HashSet::new()),
        }
    }

    /// 后备的 Advisor 注册表
    pub fn registry(&self) -> &Arc<AdvisorRegistry> {
        &self.registry
    }

    /// 显式标记某个名称永不代理
    pub fn mark_skip(&self, name: &str) {
        self.skip_names.write().insert(name.to_string());
    }

    /// 对候选对象做代理决策
    ///
    /// 缓存命中时直接复用，不重跑资格门、收集、过滤与排序，
    /// 也不会再次触发切点求值
    pub fn decide(
        &self,
        target: &TargetDescriptor,
        name: Option<&str>,
        explicit_target_source: Option<Arc<dyn TargetSource>>,
    ) -> ProxyDecision {
        let key = CandidateKey::for_candidate(target, name);

        if let Some(cached) = self.decisions.read().get(&key).cloned() {
            tracing::trace!("Proxy decision cache hit for {}", key);
            return self.decision_from(cached, target, explicit_target_source);
        }

        // 资格门：基础设施对象与显式跳过的名称永不代理
        let skipped = name
            .map(|n| self.skip_names.read().contains(n))
            .unwrap_or(false);
        if target.infrastructure || skipped {
            tracing::trace!("Candidate {} is never proxied", key);
            self.decisions.write().insert(key, CachedDecision::NotAdvised);
            return ProxyDecision::NoProxy;
        }

        // 收集候选 Advisor（不触发切面实例创建），按类型适用性过滤
        let candidates = self.registry.all_advisors();
        let mut applicable: Vec<Arc<dyn Advisor>> = candidates
            .into_iter()
            .filter(|advisor| can_apply(advisor.as_ref(), target))
            .collect();

        if applicable.is_empty() {
            tracing::debug!("No advisors apply to {}", key);
            self.decisions.write().insert(key, CachedDecision::NotAdvised);
            return ProxyDecision::NoProxy;
        }

        sort_advisors(&mut applicable);
        tracing::debug!("{} advisor(s) apply to {}", applicable.len(), key);

        self.decisions
            .write()
            .insert(key, CachedDecision::Advised(applicable.clone()));
        self.decision_from(
            CachedDecision::Advised(applicable),
            target,
            explicit_target_source,
        )
    }

    fn decision_from(
        &self,
        cached: CachedDecision,
        target: &TargetDescriptor,
        explicit_target_source: Option<Arc<dyn TargetSource>>,
    ) -> ProxyDecision {
        match cached {
            CachedDecision::NotAdvised => ProxyDecision::NoProxy,
            CachedDecision::Advised(advisors) => ProxyDecision::Proxy {
                advisors,
                target_source: explicit_target_source.unwrap_or_else(|| {
                    Arc::new(EmptyTargetSource::new(Arc::new(target.clone())))
                }),
            },
        }
    }

    /// 使单个候选的决策失效（显式的再解析触发点）
    pub fn invalidate(&self, key: &CandidateKey) {
        self.decisions.write().remove(key);
        self.proxy_types.write().remove(key);
    }

    /// 清空全部决策
    pub fn clear(&self) {
        self.decisions.write().clear();
        self.proxy_types.write().clear();
    }

    /// 回填已构造代理的类型名
    pub fn record_proxy_type(&self, key: CandidateKey, type_name: impl Into<String>) {
        self.proxy_types.write().insert(key, type_name.into());
    }

    /// 查询已构造代理的类型名
    pub fn proxy_type(&self, key: &CandidateKey) -> Option<String> {
        self.proxy_types.read().get(key).cloned()
    }
}
