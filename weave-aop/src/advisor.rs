//! Advisor - 切点与通知的绑定
//!
//! 一个 Advisor 将一个切点与一个通知配对，并携带排序元数据。
//! 惰性实例化的 Advisor 是整个数据模型里最关键的状态机：
//! 其有效切点从"激活谓词与声明切点之并"开始，每次调用动态复核，
//! 在切面实例物化的那一刻恰好一次、不可逆地收敛为声明切点。

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::advice::{AdviceKind, AdviceRef, Advice, BeforeAdvice};
use crate::instance::AspectInstanceProvider;
use crate::invocation::InvocationError;
use crate::joinpoint::{ArgValue, JoinPoint, MethodDescriptor, TargetDescriptor};
use crate::pointcut::{ClassFilter, MethodMatcher, Pointcut, UnionPointcut};
use weave_core::ordering::{Ordered, LOWEST_PRECEDENCE};

/// Advisor Trait
pub trait Advisor: Ordered + Send + Sync {
    /// 生效的切点
    fn pointcut(&self) -> Arc<dyn Pointcut>;

    /// 承载的通知
    fn advice(&self) -> AdviceRef;

    /// 声明该通知的切面名
    fn aspect_name(&self) -> &str;

    /// 同一切面内的声明位次
    ///
    /// 仅用于同切面内的并列裁决，跨切面的 Advisor 从不按此字段比较
    fn declaration_order(&self) -> usize {
        0
    }
}

/// 优先级比较
///
/// 显式 order 升序；order 相同且同属一个切面时按声明位次；
/// 跨切面的并列返回 Equal，交由稳定排序保留发现顺序
pub fn compare_precedence(a: &dyn Advisor, b: &dyn Advisor) -> CmpOrdering {
    match a.order().cmp(&b.order()) {
        CmpOrdering::Equal if a.aspect_name() == b.aspect_name() => {
            a.declaration_order().cmp(&b.declaration_order())
        }
        other => other,
    }
}

/// 按优先级稳定排序
pub fn sort_advisors(advisors: &mut [Arc<dyn Advisor>]) {
    advisors.sort_by(|a, b| compare_precedence(a.as_ref(), b.as_ref()));
}

/// 最简单的 Advisor：直接持有切点与通知
pub struct DefaultPointcutAdvisor {
    pointcut: Arc<dyn Pointcut>,
    advice: AdviceRef,
    aspect_name: String,
    order: Option<i32>,
    declaration_order: usize,
}

impl DefaultPointcutAdvisor {
    pub fn new(pointcut: Arc<dyn Pointcut>, advice: AdviceRef) -> Self {
        Self {
            pointcut,
            advice,
            aspect_name: String::new(),
            order: None,
            declaration_order: 0,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_aspect_name(mut self, aspect_name: impl Into<String>) -> Self {
        self.aspect_name = aspect_name.into();
        self
    }

    pub fn with_declaration_order(mut self, declaration_order: usize) -> Self {
        self.declaration_order = declaration_order;
        self
    }
}

impl Ordered for DefaultPointcutAdvisor {
    fn order(&self) -> i32 {
        self.order.unwrap_or(LOWEST_PRECEDENCE)
    }
}

impl Advisor for DefaultPointcutAdvisor {
    fn pointcut(&self) -> Arc<dyn Pointcut> {
        self.pointcut.clone()
    }

    fn advice(&self) -> AdviceRef {
        self.advice.clone()
    }

    fn aspect_name(&self) -> &str {
        &self.aspect_name
    }

    fn declaration_order(&self) -> usize {
        self.declaration_order
    }
}

impl fmt::Debug for DefaultPointcutAdvisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DefaultPointcutAdvisor({}, {:?})",
            self.pointcut.key(),
            self.advice
        )
    }
}

/// 通知构建函数
pub type AdviceBuilder = Arc<dyn Fn() -> AdviceRef + Send + Sync>;

/// 物化感知切点
///
/// 实例化完成前：静态按"激活谓词 ∪ 声明切点"纳入链，
/// 动态复核一律不命中（真正的通知不会在物化前运行）；
/// 实例化完成后：仅声明切点生效。该切点始终自报动态。
struct ActivationPointcut {
    declared: Arc<dyn Pointcut>,
    pre_instantiation: Arc<UnionPointcut>,
    provider: Arc<dyn AspectInstanceProvider>,
}

impl ClassFilter for ActivationPointcut {
    fn matches_type(&self, target: &TargetDescriptor) -> bool {
        (self.provider.is_materialized() && self.declared.class_filter().matches_type(target))
            || self.pre_instantiation.class_filter().matches_type(target)
    }
}

impl MethodMatcher for ActivationPointcut {
    fn matches(&self, method: &MethodDescriptor, target: &TargetDescriptor) -> bool {
        (self.provider.is_materialized() && self.declared.method_matcher().matches(method, target))
            || self.pre_instantiation.method_matcher().matches(method, target)
    }

    fn is_dynamic(&self) -> bool {
        true
    }

    fn matches_args(
        &self,
        method: &MethodDescriptor,
        target: &TargetDescriptor,
        args: &[ArgValue],
    ) -> bool {
        if !self.provider.is_materialized() {
            return false;
        }
        let matcher = self.declared.method_matcher();
        matcher.matches(method, target) && matcher.matches_args(method, target, args)
    }
}

impl Pointcut for ActivationPointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        self
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        self
    }

    fn key(&self) -> String {
        format!("activation({})", self.pre_instantiation.key())
    }
}

/// 实例化模型感知的 Advisor
///
/// 急切单例从构建起即处于物化态；其余模型经由 `ActivationPointcut`
/// 走一次性的 未物化 → 已物化 收敛
pub struct InstantiationAwareAdvisor {
    aspect_name: String,
    declaration_order: usize,
    order: Option<i32>,
    declared_pointcut: Arc<dyn Pointcut>,
    pointcut: Arc<dyn Pointcut>,
    lazy: bool,
    provider: Arc<dyn AspectInstanceProvider>,
    builder: AdviceBuilder,
    advice: OnceCell<AdviceRef>,
    /// 等价性只由激活前的并集切点决定
    pointcut_key: String,
}

impl InstantiationAwareAdvisor {
    pub fn new(
        declared_pointcut: Arc<dyn Pointcut>,
        per_clause: Arc<dyn Pointcut>,
        provider: Arc<dyn AspectInstanceProvider>,
        declaration_order: usize,
        order: Option<i32>,
        builder: AdviceBuilder,
    ) -> Self {
        let aspect_name = provider.aspect_name().to_string();
        let lazy = !provider.model().is_eager();

        let (pointcut, pointcut_key, advice): (Arc<dyn Pointcut>, String, OnceCell<AdviceRef>) =
            if lazy {
                let pre_instantiation = Arc::new(UnionPointcut::new(
                    per_clause,
                    declared_pointcut.clone(),
                ));
                let key = pre_instantiation.key();
                let activation = Arc::new(ActivationPointcut {
                    declared: declared_pointcut.clone(),
                    pre_instantiation,
                    provider: provider.clone(),
                });
                (activation, key, OnceCell::new())
            } else {
                (
                    declared_pointcut.clone(),
                    declared_pointcut.key(),
                    OnceCell::with_value(builder()),
                )
            };

        Self {
            aspect_name,
            declaration_order,
            order,
            declared_pointcut,
            pointcut,
            lazy,
            provider,
            builder,
            advice,
            pointcut_key,
        }
    }

    /// 是否为惰性实例化模型
    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    /// 所属切面实例是否已物化
    pub fn is_aspect_materialized(&self) -> bool {
        self.provider.is_materialized()
    }

    /// 声明切点（不含激活谓词）
    pub fn declared_pointcut(&self) -> Arc<dyn Pointcut> {
        self.declared_pointcut.clone()
    }
}

impl Ordered for InstantiationAwareAdvisor {
    fn order(&self) -> i32 {
        self.order.unwrap_or_else(|| self.provider.order())
    }
}

impl Advisor for InstantiationAwareAdvisor {
    fn pointcut(&self) -> Arc<dyn Pointcut> {
        self.pointcut.clone()
    }

    fn advice(&self) -> AdviceRef {
        self.advice.get_or_init(|| (self.builder)()).clone()
    }

    fn aspect_name(&self) -> &str {
        &self.aspect_name
    }

    fn declaration_order(&self) -> usize {
        self.declaration_order
    }
}

impl PartialEq for InstantiationAwareAdvisor {
    fn eq(&self, other: &Self) -> bool {
        self.pointcut_key == other.pointcut_key
    }
}

impl fmt::Debug for InstantiationAwareAdvisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstantiationAwareAdvisor")
            .field("aspect", &self.aspect_name)
            .field("declaration_order", &self.declaration_order)
            .field("lazy", &self.lazy)
            .field("pointcut", &self.pointcut_key)
            .finish()
    }
}

/// 物化通知：唯一作用是触发切面实例的创建
struct MaterializingAdvice {
    name: String,
    provider: Arc<dyn AspectInstanceProvider>,
}

impl Advice for MaterializingAdvice {
    fn kind(&self) -> AdviceKind {
        AdviceKind::Before
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl BeforeAdvice for MaterializingAdvice {
    fn before(&self, join_point: &JoinPoint) -> Result<(), InvocationError> {
        tracing::trace!(
            "Materializing aspect '{}' triggered by {}",
            self.provider.aspect_name(),
            join_point.signature()
        );
        self.provider
            .get()
            .map(|_| ())
            .map_err(|e| Arc::new(e) as InvocationError)
    }
}

/// 合成的物化 Advisor
///
/// 由工厂为非急切模型前置：切点即激活谓词，保证切面实例在
/// 其任何真实通知运行之前已经存在
pub struct SyntheticInstantiationAdvisor {
    pointcut: Arc<dyn Pointcut>,
    advice: AdviceRef,
    aspect_name: String,
    provider: Arc<dyn AspectInstanceProvider>,
}

impl SyntheticInstantiationAdvisor {
    pub fn new(provider: Arc<dyn AspectInstanceProvider>, per_clause: Arc<dyn Pointcut>) -> Self {
        let aspect_name = provider.aspect_name().to_string();
        let advice = AdviceRef::Before(Arc::new(MaterializingAdvice {
            name: format!("{}#materialize", aspect_name),
            provider: provider.clone(),
        }));
        Self {
            pointcut: per_clause,
            advice,
            aspect_name,
            provider,
        }
    }
}

impl Ordered for SyntheticInstantiationAdvisor {
    fn order(&self) -> i32 {
        self.provider.order()
    }
}

impl Advisor for SyntheticInstantiationAdvisor {
    fn pointcut(&self) -> Arc<dyn Pointcut> {
        self.pointcut.clone()
    }

    fn advice(&self) -> AdviceRef {
        self.advice.clone()
    }

    fn aspect_name(&self) -> &str {
        &self.aspect_name
    }

    fn declaration_order(&self) -> usize {
        0
    }
}
