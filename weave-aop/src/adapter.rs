//! 通知适配器注册表
//!
//! 把五种异构的通知形态归一化为统一的方法拦截器，链执行代码
//! 不再区分通知类型。注册表是一个显式传递的值：启动时构建一次，
//! 读多写少；额外的通知形态通过显式的扩展列表注册，而非环境
//! 全局可变状态。

use std::sync::Arc;

use crate::advice::{AdviceRef, AfterAdvice, AfterReturningAdvice, AfterThrowingAdvice, AroundAdvice, BeforeAdvice};
use crate::error::{AopError, AopResult};
use crate::invocation::{InvocationError, InvocationResult, MethodInterceptor, MethodInvocation};

/// 通知适配器 Trait
///
/// 识别一种通知形态并产出其拦截器
pub trait AdviceAdapter: Send + Sync {
    /// 适配器名称
    fn name(&self) -> &str;

    /// 是否识别该通知
    fn supports(&self, advice: &AdviceRef) -> bool;

    /// 产出归一化拦截器；不识别时返回 None
    fn interceptor(&self, advice: &AdviceRef) -> Option<Arc<dyn MethodInterceptor>>;
}

/// 通知适配器注册表
pub struct AdviceAdapterRegistry {
    adapters: Vec<Arc<dyn AdviceAdapter>>,
}

impl AdviceAdapterRegistry {
    /// 构建带全部内置适配器的注册表
    pub fn new() -> Self {
        Self {
            adapters: vec![
                Arc::new(BeforeAdviceAdapter),
                Arc::new(AfterAdviceAdapter),
                Arc::new(AfterReturningAdviceAdapter),
                Arc::new(AfterThrowingAdviceAdapter),
            ],
        }
    }

    /// 注册一个扩展适配器
    pub fn register(&mut self, adapter: Arc<dyn AdviceAdapter>) {
        tracing::debug!("Registering advice adapter: {}", adapter.name());
        self.adapters.push(adapter);
    }

    /// 把通知归一化为拦截器
    ///
    /// 环绕通知本身就是拦截器形态，直接包装；其余形态逐个询问适配器
    pub fn interceptor_for(&self, advice: &AdviceRef) -> AopResult<Arc<dyn MethodInterceptor>> {
        if let AdviceRef::Around(around) = advice {
            return Ok(Arc::new(AroundAdviceInterceptor {
                advice: around.clone(),
            }));
        }

        for adapter in &self.adapters {
            if adapter.supports(advice) {
                if let Some(interceptor) = adapter.interceptor(advice) {
                    return Ok(interceptor);
                }
            }
        }

        Err(AopError::UnknownAdviceKind(advice.name().to_string()))
    }
}

impl Default for AdviceAdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// 内置适配器与归一化拦截器
// ============================================================================

/// 前置通知拦截器：先执行通知，再无条件进入下一层
pub struct BeforeAdviceInterceptor {
    advice: Arc<dyn BeforeAdvice>,
}

impl BeforeAdviceInterceptor {
    pub fn new(advice: Arc<dyn BeforeAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for BeforeAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        self.advice.before(invocation.join_point())?;
        invocation.proceed()
    }
}

struct BeforeAdviceAdapter;

impl AdviceAdapter for BeforeAdviceAdapter {
    fn name(&self) -> &str {
        "before"
    }

    fn supports(&self, advice: &AdviceRef) -> bool {
        matches!(advice, AdviceRef::Before(_))
    }

    fn interceptor(&self, advice: &AdviceRef) -> Option<Arc<dyn MethodInterceptor>> {
        match advice {
            AdviceRef::Before(before) => {
                Some(Arc::new(BeforeAdviceInterceptor::new(before.clone())))
            }
            _ => None,
        }
    }
}

/// 后置通知拦截器：finally 语义，下一层正常返回或抛出都执行通知
pub struct AfterAdviceInterceptor {
    advice: Arc<dyn AfterAdvice>,
}

impl AfterAdviceInterceptor {
    pub fn new(advice: Arc<dyn AfterAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for AfterAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        let result = invocation.proceed();
        self.advice.after(invocation.join_point());
        result
    }
}

struct AfterAdviceAdapter;

impl AdviceAdapter for AfterAdviceAdapter {
    fn name(&self) -> &str {
        "after"
    }

    fn supports(&self, advice: &AdviceRef) -> bool {
        matches!(advice, AdviceRef::After(_))
    }

    fn interceptor(&self, advice: &AdviceRef) -> Option<Arc<dyn MethodInterceptor>> {
        match advice {
            AdviceRef::After(after) => Some(Arc::new(AfterAdviceInterceptor::new(after.clone()))),
            _ => None,
        }
    }
}

/// 返回后通知拦截器：仅在下一层正常返回时执行通知，错误原样穿透
pub struct AfterReturningAdviceInterceptor {
    advice: Arc<dyn AfterReturningAdvice>,
}

impl AfterReturningAdviceInterceptor {
    pub fn new(advice: Arc<dyn AfterReturningAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for AfterReturningAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        let value = invocation.proceed()?;
        self.advice.after_returning(invocation.join_point(), &value)?;
        Ok(value)
    }
}

struct AfterReturningAdviceAdapter;

impl AdviceAdapter for AfterReturningAdviceAdapter {
    fn name(&self) -> &str {
        "after-returning"
    }

    fn supports(&self, advice: &AdviceRef) -> bool {
        matches!(advice, AdviceRef::AfterReturning(_))
    }

    fn interceptor(&self, advice: &AdviceRef) -> Option<Arc<dyn MethodInterceptor>> {
        match advice {
            AdviceRef::AfterReturning(advice) => Some(Arc::new(
                AfterReturningAdviceInterceptor::new(advice.clone()),
            )),
            _ => None,
        }
    }
}

/// 异常通知拦截器
///
/// 下一层抛出且错误命中选择器时执行通知，随后重抛原错误对象；
/// 通知没有吞掉错误的能力
pub struct AfterThrowingAdviceInterceptor {
    advice: Arc<dyn AfterThrowingAdvice>,
}

impl AfterThrowingAdviceInterceptor {
    pub fn new(advice: Arc<dyn AfterThrowingAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for AfterThrowingAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        match invocation.proceed() {
            Ok(value) => Ok(value),
            Err(error) => {
                let root: &(dyn std::error::Error + 'static) = error.as_ref();
                if self.advice.selector().matches(root) {
                    self.advice.after_throwing(invocation.join_point(), &error);
                }
                Err(error)
            }
        }
    }
}

struct AfterThrowingAdviceAdapter;

impl AdviceAdapter for AfterThrowingAdviceAdapter {
    fn name(&self) -> &str {
        "after-throwing"
    }

    fn supports(&self, advice: &AdviceRef) -> bool {
        matches!(advice, AdviceRef::AfterThrowing(_))
    }

    fn interceptor(&self, advice: &AdviceRef) -> Option<Arc<dyn MethodInterceptor>> {
        match advice {
            AdviceRef::AfterThrowing(advice) => Some(Arc::new(
                AfterThrowingAdviceInterceptor::new(advice.clone()),
            )),
            _ => None,
        }
    }
}

/// 环绕通知拦截器：通知自身掌握 proceed
pub struct AroundAdviceInterceptor {
    advice: Arc<dyn AroundAdvice>,
}

impl MethodInterceptor for AroundAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        self.advice.around(invocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{Advice, AdviceKind, ExceptionSelector};
    use crate::invocation::{ChainEntry, InvocationValue, TerminalCall};
    use crate::joinpoint::{JoinPoint, MethodDescriptor, TargetDescriptor};
    use std::fmt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct DomainError;

    impl fmt::Display for DomainError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "domain failure")
        }
    }

    impl std::error::Error for DomainError {}

    #[derive(Debug)]
    struct OtherError;

    impl fmt::Display for OtherError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "other failure")
        }
    }

    impl std::error::Error for OtherError {}

    struct CountingThrowHandler {
        selector: ExceptionSelector,
        hits: AtomicUsize,
    }

    impl Advice for CountingThrowHandler {
        fn kind(&self) -> AdviceKind {
            AdviceKind::AfterThrowing
        }

        fn name(&self) -> &str {
            "counting-throw-handler"
        }
    }

    impl AfterThrowingAdvice for CountingThrowHandler {
        fn selector(&self) -> &ExceptionSelector {
            &self.selector
        }

        fn after_throwing(&self, _join_point: &JoinPoint, _error: &InvocationError) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn invoke_throwing(
        handler: Arc<CountingThrowHandler>,
        error: InvocationError,
    ) -> InvocationResult {
        let registry = AdviceAdapterRegistry::default();
        let interceptor = registry
            .interceptor_for(&AdviceRef::AfterThrowing(handler))
            .unwrap();

        let target = Arc::new(TargetDescriptor::new("Service", &["work"]));
        let method = Arc::new(MethodDescriptor::new("work"));
        let jp = JoinPoint::new(target, method);

        let failing: TerminalCall = Arc::new(move |_jp| Err(error.clone()));
        let mut invocation =
            MethodInvocation::new(jp, vec![ChainEntry::Static(interceptor)], failing);
        invocation.proceed()
    }

    #[test]
    fn test_after_throwing_rethrows_identical_error() {
        let handler = Arc::new(CountingThrowHandler {
            selector: ExceptionSelector::of::<DomainError>(),
            hits: AtomicUsize::new(0),
        });
        let error: InvocationError = Arc::new(DomainError);

        let result = invoke_throwing(handler.clone(), error.clone());

        assert_eq!(handler.hits.load(Ordering::SeqCst), 1);
        // 重抛的必须是同一个错误对象
        let rethrown = result.unwrap_err();
        assert!(Arc::ptr_eq(&rethrown, &error));
    }

    #[test]
    fn test_after_throwing_skips_unmatched_errors() {
        let handler = Arc::new(CountingThrowHandler {
            selector: ExceptionSelector::of::<DomainError>(),
            hits: AtomicUsize::new(0),
        });
        let error: InvocationError = Arc::new(OtherError);

        let result = invoke_throwing(handler.clone(), error);

        // 选择器不命中：处理器不执行，错误仍然穿透
        assert_eq!(handler.hits.load(Ordering::SeqCst), 0);
        assert!(result.is_err());
    }

    struct HeartbeatAdvice;

    impl Advice for HeartbeatAdvice {
        fn kind(&self) -> AdviceKind {
            AdviceKind::Before
        }

        fn name(&self) -> &str {
            "heartbeat"
        }
    }

    struct HeartbeatAdapter;

    struct HeartbeatInterceptor;

    impl MethodInterceptor for HeartbeatInterceptor {
        fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
            invocation.proceed()
        }
    }

    impl AdviceAdapter for HeartbeatAdapter {
        fn name(&self) -> &str {
            "heartbeat"
        }

        fn supports(&self, advice: &AdviceRef) -> bool {
            matches!(advice, AdviceRef::Other(a) if a.name() == "heartbeat")
        }

        fn interceptor(&self, _advice: &AdviceRef) -> Option<Arc<dyn MethodInterceptor>> {
            Some(Arc::new(HeartbeatInterceptor))
        }
    }

    #[test]
    fn test_unknown_advice_kind_without_adapter() {
        let registry = AdviceAdapterRegistry::default();
        let exotic = AdviceRef::Other(Arc::new(HeartbeatAdvice));
        assert!(matches!(
            registry.interceptor_for(&exotic),
            Err(AopError::UnknownAdviceKind(_))
        ));
    }

    #[test]
    fn test_extension_adapter_recognizes_custom_kind() {
        let mut registry = AdviceAdapterRegistry::new();
        registry.register(Arc::new(HeartbeatAdapter));

        let exotic = AdviceRef::Other(Arc::new(HeartbeatAdvice));
        assert!(registry.interceptor_for(&exotic).is_ok());
    }

    #[test]
    fn test_builtin_kinds_all_normalize() {
        use crate::advice::LoggingBeforeAdvice;

        let registry = AdviceAdapterRegistry::default();
        let before = AdviceRef::Before(Arc::new(LoggingBeforeAdvice::new("log")));
        assert!(registry.interceptor_for(&before).is_ok());
    }

    #[test]
    fn test_after_returning_error_propagates() {
        struct FailingAfterReturning;

        impl Advice for FailingAfterReturning {
            fn kind(&self) -> AdviceKind {
                AdviceKind::AfterReturning
            }

            fn name(&self) -> &str {
                "failing"
            }
        }

        impl AfterReturningAdvice for FailingAfterReturning {
            fn after_returning(
                &self,
                _join_point: &JoinPoint,
                _value: &InvocationValue,
            ) -> Result<(), InvocationError> {
                Err(Arc::new(DomainError) as InvocationError)
            }
        }

        let registry = AdviceAdapterRegistry::default();
        let interceptor = registry
            .interceptor_for(&AdviceRef::AfterReturning(Arc::new(FailingAfterReturning)))
            .unwrap();

        let target = Arc::new(TargetDescriptor::new("Service", &["work"]));
        let method = Arc::new(MethodDescriptor::new("work"));
        let jp = JoinPoint::new(target, method);
        let ok_terminal: TerminalCall =
            Arc::new(|_jp| Ok(Arc::new(5u8) as InvocationValue));

        let result = MethodInvocation::new(jp, vec![ChainEntry::Static(interceptor)], ok_terminal)
            .proceed();
        assert!(result.is_err());
    }
}
