//! 通知（Advice）定义
//!
//! 一个通知是一段带类型标签的横切行为。五种类型构成封闭集合，
//! 执行器不对类型做散落的运行时判断，统一经由适配器归一化。

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error_info::ErrorInfo;
use crate::invocation::{InvocationError, InvocationResult, InvocationValue, MethodInvocation};
use crate::joinpoint::JoinPoint;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdviceKind {
    /// 环绕通知（可以控制方法执行）
    Around,
    /// 前置通知
    Before,
    /// 后置通知（无论成功还是失败都执行）
    After,
    /// 返回后通知（成功返回时执行）
    AfterReturning,
    /// 异常通知（抛出异常时执行）
    AfterThrowing,
}

impl AdviceKind {
    /// 链内嵌套序（数值越小越靠外层）
    pub fn rank(&self) -> u8 {
        match self {
            AdviceKind::Around => 0,
            AdviceKind::Before => 1,
            AdviceKind::After => 2,
            AdviceKind::AfterReturning => 3,
            AdviceKind::AfterThrowing => 4,
        }
    }
}

impl fmt::Display for AdviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdviceKind::Around => "around",
            AdviceKind::Before => "before",
            AdviceKind::After => "after",
            AdviceKind::AfterReturning => "after-returning",
            AdviceKind::AfterThrowing => "after-throwing",
        };
        write!(f, "{}", name)
    }
}

/// 通知 Trait
///
/// 所有通知类型的基础 trait
pub trait Advice: Send + Sync {
    /// 获取通知类型
    fn kind(&self) -> AdviceKind;

    /// 获取通知名称
    fn name(&self) -> &str;
}

/// 前置通知 Trait
///
/// 在目标方法执行前调用；返回错误会中止后续链
pub trait BeforeAdvice: Advice {
    fn before(&self, join_point: &JoinPoint) -> Result<(), InvocationError>;
}

/// 后置通知 Trait
///
/// 在目标方法执行后调用（无论成功还是失败）
pub trait AfterAdvice: Advice {
    fn after(&self, join_point: &JoinPoint);
}

/// 返回后通知 Trait
///
/// 仅在目标方法正常返回后调用
pub trait AfterReturningAdvice: Advice {
    /// 返回值的绑定名（仅作元数据）
    fn returning_name(&self) -> Option<&str> {
        None
    }

    fn after_returning(
        &self,
        join_point: &JoinPoint,
        value: &InvocationValue,
    ) -> Result<(), InvocationError>;
}

/// 异常通知 Trait
///
/// 仅在目标方法抛出且错误命中选择器时调用；原错误随后原样重抛
pub trait AfterThrowingAdvice: Advice {
    /// 异常的绑定名（仅作元数据）
    fn throwing_name(&self) -> Option<&str> {
        None
    }

    /// 声明要处理的异常选择器
    fn selector(&self) -> &ExceptionSelector;

    fn after_throwing(&self, join_point: &JoinPoint, error: &InvocationError);
}

/// 环绕通知 Trait
///
/// 完全控制目标方法的执行；不调用 proceed 即短路整条后续链
pub trait AroundAdvice: Advice {
    fn around(&self, invocation: &mut MethodInvocation) -> InvocationResult;
}

/// 通知的统一引用形态
///
/// 封闭的类型标签集合；`Other` 变体留给通过适配器扩展的自定义形态
#[derive(Clone)]
pub enum AdviceRef {
    Around(Arc<dyn AroundAdvice>),
    Before(Arc<dyn BeforeAdvice>),
    After(Arc<dyn AfterAdvice>),
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    AfterThrowing(Arc<dyn AfterThrowingAdvice>),
    Other(Arc<dyn Advice>),
}

impl AdviceRef {
    pub fn kind(&self) -> AdviceKind {
        match self {
            AdviceRef::Around(a) => a.kind(),
            AdviceRef::Before(a) => a.kind(),
            AdviceRef::After(a) => a.kind(),
            AdviceRef::AfterReturning(a) => a.kind(),
            AdviceRef::AfterThrowing(a) => a.kind(),
            AdviceRef::Other(a) => a.kind(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AdviceRef::Around(a) => a.name(),
            AdviceRef::Before(a) => a.name(),
            AdviceRef::After(a) => a.name(),
            AdviceRef::AfterReturning(a) => a.name(),
            AdviceRef::AfterThrowing(a) => a.name(),
            AdviceRef::Other(a) => a.name(),
        }
    }
}

impl fmt::Debug for AdviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AdviceRef({} '{}')", self.kind(), self.name())
    }
}

type ErrorPredicate = Arc<dyn Fn(&(dyn StdError + 'static)) -> bool + Send + Sync>;

/// 异常选择器
///
/// 判定一个错误是否落入异常通知声明的处理范围：
/// 对错误本身及其 source 链逐级尝试，等价于沿异常类型层级向上查找
#[derive(Clone)]
pub struct ExceptionSelector {
    matcher: Option<(String, ErrorPredicate)>,
}

impl ExceptionSelector {
    /// 匹配任意错误
    pub fn any() -> Self {
        Self { matcher: None }
    }

    /// 仅匹配具体错误类型 E（或 source 链中出现的 E）
    pub fn of<E: StdError + 'static>() -> Self {
        let label = std::any::type_name::<E>().to_string();
        Self {
            matcher: Some((
                label,
                Arc::new(|err: &(dyn StdError + 'static)| err.downcast_ref::<E>().is_some()),
            )),
        }
    }

    /// 沿错误源链向上查找匹配
    pub fn matches(&self, error: &(dyn StdError + 'static)) -> bool {
        let Some((_, predicate)) = &self.matcher else {
            return true;
        };

        let mut current: Option<&(dyn StdError + 'static)> = Some(error);
        while let Some(err) = current {
            if predicate(err) {
                return true;
            }
            current = err.source();
        }
        false
    }

    /// 选择器的可读描述
    pub fn description(&self) -> &str {
        self.matcher
            .as_ref()
            .map(|(label, _)| label.as_str())
            .unwrap_or("any")
    }
}

impl fmt::Debug for ExceptionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExceptionSelector({})", self.description())
    }
}

// ============================================================================
// 预定义的常用通知
// ============================================================================

/// 日志通知 - 记录方法进入
pub struct LoggingBeforeAdvice {
    name: String,
}

impl LoggingBeforeAdvice {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Advice for LoggingBeforeAdvice {
    fn kind(&self) -> AdviceKind {
        AdviceKind::Before
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl BeforeAdvice for LoggingBeforeAdvice {
    fn before(&self, join_point: &JoinPoint) -> Result<(), InvocationError> {
        tracing::info!("→ Entering: {}", join_point.signature());
        Ok(())
    }
}

/// 性能监控通知 - 记录慢调用
pub struct TimingAroundAdvice {
    name: String,
    threshold_ms: u128,
}

impl TimingAroundAdvice {
    pub fn new(name: impl Into<String>, threshold_ms: u128) -> Self {
        Self {
            name: name.into(),
            threshold_ms,
        }
    }
}

impl Advice for TimingAroundAdvice {
    fn kind(&self) -> AdviceKind {
        AdviceKind::Around
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl AroundAdvice for TimingAroundAdvice {
    fn around(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        let started = std::time::Instant::now();
        let result = invocation.proceed();
        let elapsed = started.elapsed().as_millis();
        if elapsed > self.threshold_ms {
            tracing::warn!(
                "Slow method detected: {} took {}ms (threshold: {}ms)",
                invocation.join_point().signature(),
                elapsed,
                self.threshold_ms
            );
        }
        result
    }
}

/// 异常日志通知 - 记录抛出的错误及其源链
pub struct ExceptionLoggingAdvice {
    name: String,
    selector: ExceptionSelector,
}

impl ExceptionLoggingAdvice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: ExceptionSelector::any(),
        }
    }
}

impl Advice for ExceptionLoggingAdvice {
    fn kind(&self) -> AdviceKind {
        AdviceKind::AfterThrowing
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl AfterThrowingAdvice for ExceptionLoggingAdvice {
    fn selector(&self) -> &ExceptionSelector {
        &self.selector
    }

    fn after_throwing(&self, join_point: &JoinPoint, error: &InvocationError) {
        let info = ErrorInfo::from_dyn(error.as_ref());
        tracing::error!(
            "Exception in {}: {}",
            join_point.signature(),
            info.full_description()
        );
    }
}
