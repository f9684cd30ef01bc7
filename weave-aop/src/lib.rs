//! Weave AOP - 切面解析与方法拦截引擎
//!
//! 把声明式描述的横切行为（通知）与匹配规则（切点）解析为统一的
//! Advisor 记录，对每个候选对象做"是否代理、按哪份有序列表代理"
//! 的缓存决策，并把命中的通知组装成嵌套的拦截链执行。支持：
//! - 五种通知类型（Before、After、Around、AfterReturning、AfterThrowing）
//! - 急切/惰性单例与 per-* 族实例化模型，惰性物化恰好一次
//! - 显式传递的通知适配器注册表，可扩展自定义通知形态
//! - 候选级的代理决策缓存与显式失效
//!
//! 代理对象的实际构造是外部协作方的职责，引擎只产出 `ProxyPlan`。

pub mod adapter;
pub mod advice;
pub mod advisor;
pub mod aspect;
pub mod auto_proxy;
pub mod error;
pub mod error_info;
pub mod factory;
pub mod instance;
pub mod invocation;
pub mod joinpoint;
pub mod pointcut;
pub mod proxy;
pub mod registry;

// 重新导出核心类型
pub use adapter::{AdviceAdapter, AdviceAdapterRegistry};
pub use advice::{
    Advice, AdviceKind, AdviceRef, AfterAdvice, AfterReturningAdvice, AfterThrowingAdvice,
    AroundAdvice, BeforeAdvice, ExceptionSelector,
};
pub use advisor::{
    compare_precedence, sort_advisors, AdviceBuilder, Advisor, DefaultPointcutAdvisor,
    InstantiationAwareAdvisor, SyntheticInstantiationAdvisor,
};
pub use aspect::{
    AdviceCallback, AdviceMarker, AdviceMemberDeclaration, AspectDeclaration, AspectDefinition,
    AspectMetadata, AspectRegistration, InstanceRef, InstantiationModel,
};
pub use auto_proxy::{can_apply, AutoProxyResolver, CandidateKey, ProxyDecision};
pub use error::{AopError, AopResult};
pub use error_info::ErrorInfo;
pub use factory::DeclarativeAdvisorFactory;
pub use instance::{
    AspectInstanceProvider, BeanAspectInstanceProvider, FunctionAspectInstanceProvider,
    LazySingletonProviderDecorator, SingletonAspectInstanceProvider,
};
pub use invocation::{
    interception_chain, ChainEntry, InvocationError, InvocationResult, InvocationValue,
    MethodInterceptor, MethodInvocation, TerminalCall,
};
pub use joinpoint::{ArgValue, JoinPoint, MethodDescriptor, TargetDescriptor};
pub use pointcut::{
    ClassFilter, DynamicPointcut, ExpressionPointcut, MethodMatcher, Pointcut,
    PointcutExpression, TruePointcut, UnionPointcut,
};
pub use proxy::{
    EmptyTargetSource, ProxyConfig, ProxyFabricator, ProxyPlan, SingletonTargetSource,
    TargetSource,
};
pub use registry::AdvisorRegistry;

// 导出 inventory 供注册宏使用
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::adapter::{AdviceAdapter, AdviceAdapterRegistry};
    pub use crate::advice::*;
    pub use crate::advisor::{Advisor, DefaultPointcutAdvisor};
    pub use crate::aspect::{
        AdviceCallback, AdviceMarker, AspectDeclaration, AspectDefinition, AspectRegistration,
        InstantiationModel,
    };
    pub use crate::auto_proxy::{AutoProxyResolver, CandidateKey, ProxyDecision};
    pub use crate::error::{AopError, AopResult};
    pub use crate::invocation::{
        interception_chain, MethodInterceptor, MethodInvocation, TerminalCall,
    };
    pub use crate::joinpoint::{JoinPoint, MethodDescriptor, TargetDescriptor};
    pub use crate::pointcut::{ExpressionPointcut, Pointcut, PointcutExpression, TruePointcut};
    pub use crate::proxy::{ProxyConfig, ProxyFabricator, ProxyPlan, TargetSource};
    pub use crate::registry::AdvisorRegistry;
    pub use weave_core::ordering::Ordered;
}
