//! 拦截链执行器
//!
//! 把一组按优先级排好序的 Advisor 压平成一条嵌套调用链：
//! 链中第一个拦截器在最外层，每个拦截器通过 `proceed` 进入下一层，
//! 最内层是目标调用本身。执行是同步递归的，引擎不做任何重试，
//! 错误沿链向外传播。

use std::any::Any;
use std::error::Error as StdError;
use std::sync::Arc;

use crate::adapter::AdviceAdapterRegistry;
use crate::advisor::Advisor;
use crate::error::AopResult;
use crate::joinpoint::{JoinPoint, MethodDescriptor, TargetDescriptor};
use crate::pointcut::Pointcut;

/// 目标调用的返回值形态
pub type InvocationValue = Arc<dyn Any + Send + Sync>;

/// 穿越拦截链的错误形态
///
/// 以 Arc 承载以保证错误对象的同一性：异常通知检视后重抛的
/// 必须是同一个错误对象
pub type InvocationError = Arc<dyn StdError + Send + Sync>;

/// 拦截链中每一层的执行结果
pub type InvocationResult = Result<InvocationValue, InvocationError>;

/// 最内层的目标调用
pub type TerminalCall = Arc<dyn Fn(&JoinPoint) -> InvocationResult + Send + Sync>;

/// 方法拦截器
///
/// 所有通知类型归一化后的统一执行形态；链执行器不区分通知类型
pub trait MethodInterceptor: Send + Sync {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult;
}

/// 链元素
///
/// 静态元素在链构建时已确认命中；动态元素还需在调用时以实际参数复核
#[derive(Clone)]
pub enum ChainEntry {
    Static(Arc<dyn MethodInterceptor>),
    Dynamic {
        interceptor: Arc<dyn MethodInterceptor>,
        pointcut: Arc<dyn Pointcut>,
    },
}

/// 一次具体的方法调用
///
/// 持有连接点、拦截链与最内层目标调用；`proceed` 驱动链条前进
pub struct MethodInvocation {
    join_point: JoinPoint,
    chain: Arc<[ChainEntry]>,
    index: usize,
    terminal: TerminalCall,
}

impl MethodInvocation {
    pub fn new(join_point: JoinPoint, chain: Vec<ChainEntry>, terminal: TerminalCall) -> Self {
        Self {
            join_point,
            chain: chain.into(),
            index: 0,
            terminal,
        }
    }

    /// 当前调用的连接点
    pub fn join_point(&self) -> &JoinPoint {
        &self.join_point
    }

    /// 进入链中的下一层，或抵达目标调用
    ///
    /// 动态元素在此刻以实际参数复核；不命中则跳过该层继续前进。
    /// 环绕通知不调用本方法即短路其后整条链，这是用户可见的语义
    pub fn proceed(&mut self) -> InvocationResult {
        if self.index >= self.chain.len() {
            return (self.terminal)(&self.join_point);
        }

        let entry = self.chain[self.index].clone();
        self.index += 1;

        match entry {
            ChainEntry::Static(interceptor) => interceptor.invoke(self),
            ChainEntry::Dynamic {
                interceptor,
                pointcut,
            } => {
                let hit = pointcut.method_matcher().matches_args(
                    &self.join_point.method,
                    &self.join_point.target,
                    &self.join_point.args,
                );
                if hit {
                    interceptor.invoke(self)
                } else {
                    self.proceed()
                }
            }
        }
    }
}

/// 为一个具体方法构建拦截链
///
/// 逐个 Advisor 做类过滤与静态方法匹配；静态命中且匹配器自报
/// 动态的，以动态元素入链，调用时复核。通知经适配器注册表归一化
pub fn interception_chain(
    advisors: &[Arc<dyn Advisor>],
    adapters: &AdviceAdapterRegistry,
    method: &MethodDescriptor,
    target: &TargetDescriptor,
) -> AopResult<Vec<ChainEntry>> {
    let mut entries = Vec::with_capacity(advisors.len());

    for advisor in advisors {
        let pointcut = advisor.pointcut();
        if !pointcut.class_filter().matches_type(target) {
            continue;
        }

        let is_dynamic = {
            let matcher = pointcut.method_matcher();
            if !matcher.matches(method, target) {
                continue;
            }
            matcher.is_dynamic()
        };

        let interceptor = adapters.interceptor_for(&advisor.advice())?;
        if is_dynamic {
            entries.push(ChainEntry::Dynamic {
                interceptor,
                pointcut,
            });
        } else {
            entries.push(ChainEntry::Static(interceptor));
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{
        Advice, AdviceKind, AdviceRef, AfterAdvice, AfterReturningAdvice, AroundAdvice,
        BeforeAdvice,
    };
    use crate::advisor::DefaultPointcutAdvisor;
    use crate::pointcut::{DynamicPointcut, ExpressionPointcut, PointcutExpression, TruePointcut};
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn log_event(log: &Log, event: &str) {
        log.lock().push(event.to_string());
    }

    struct RecordingBefore {
        name: String,
        log: Log,
    }

    impl Advice for RecordingBefore {
        fn kind(&self) -> AdviceKind {
            AdviceKind::Before
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    impl BeforeAdvice for RecordingBefore {
        fn before(&self, _join_point: &JoinPoint) -> Result<(), InvocationError> {
            log_event(&self.log, &self.name);
            Ok(())
        }
    }

    struct RecordingAfter {
        name: String,
        log: Log,
    }

    impl Advice for RecordingAfter {
        fn kind(&self) -> AdviceKind {
            AdviceKind::After
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    impl AfterAdvice for RecordingAfter {
        fn after(&self, _join_point: &JoinPoint) {
            log_event(&self.log, &self.name);
        }
    }

    struct RecordingAfterReturning {
        name: String,
        log: Log,
    }

    impl Advice for RecordingAfterReturning {
        fn kind(&self) -> AdviceKind {
            AdviceKind::AfterReturning
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    impl AfterReturningAdvice for RecordingAfterReturning {
        fn after_returning(
            &self,
            _join_point: &JoinPoint,
            _value: &InvocationValue,
        ) -> Result<(), InvocationError> {
            log_event(&self.log, &self.name);
            Ok(())
        }
    }

    struct RecordingAround {
        name: String,
        log: Log,
        proceed: bool,
    }

    impl Advice for RecordingAround {
        fn kind(&self) -> AdviceKind {
            AdviceKind::Around
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    impl AroundAdvice for RecordingAround {
        fn around(&self, invocation: &mut MethodInvocation) -> InvocationResult {
            log_event(&self.log, &format!("{}-enter", self.name));
            let result = if self.proceed {
                invocation.proceed()
            } else {
                // 刻意不调用 proceed：短路其后整条链
                Ok(Arc::new(()) as InvocationValue)
            };
            log_event(&self.log, &format!("{}-exit", self.name));
            result
        }
    }

    fn advisor_of(advice: AdviceRef) -> Arc<dyn Advisor> {
        Arc::new(DefaultPointcutAdvisor::new(Arc::new(TruePointcut), advice))
    }

    fn run_chain(advisors: &[Arc<dyn Advisor>], log: &Log) -> InvocationResult {
        let adapters = AdviceAdapterRegistry::default();
        let target = Arc::new(TargetDescriptor::new("Service", &["work"]));
        let method = Arc::new(MethodDescriptor::new("work"));
        let chain = interception_chain(advisors, &adapters, &method, &target).unwrap();

        let terminal_log = log.clone();
        let terminal: TerminalCall = Arc::new(move |_jp| {
            terminal_log.lock().push("target".to_string());
            Ok(Arc::new(11u32) as InvocationValue)
        });

        let jp = JoinPoint::new(target, method);
        let mut invocation = MethodInvocation::new(jp, chain, terminal);
        invocation.proceed()
    }

    #[test]
    fn test_before_in_list_order_after_in_reverse() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let advisors = vec![
            advisor_of(AdviceRef::After(Arc::new(RecordingAfter {
                name: "after_x".into(),
                log: log.clone(),
            }))),
            advisor_of(AdviceRef::After(Arc::new(RecordingAfter {
                name: "after_y".into(),
                log: log.clone(),
            }))),
            advisor_of(AdviceRef::Before(Arc::new(RecordingBefore {
                name: "before_a".into(),
                log: log.clone(),
            }))),
            advisor_of(AdviceRef::Before(Arc::new(RecordingBefore {
                name: "before_b".into(),
                log: log.clone(),
            }))),
        ];

        run_chain(&advisors, &log).unwrap();

        // 前置按列表顺序；后置相对目标调用按列表逆序（嵌套回卷）
        assert_eq!(
            *log.lock(),
            vec!["before_a", "before_b", "target", "after_y", "after_x"]
        );
    }

    #[test]
    fn test_after_returning_runs_in_reverse_order() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let advisors = vec![
            advisor_of(AdviceRef::AfterReturning(Arc::new(RecordingAfterReturning {
                name: "ret_outer".into(),
                log: log.clone(),
            }))),
            advisor_of(AdviceRef::AfterReturning(Arc::new(RecordingAfterReturning {
                name: "ret_inner".into(),
                log: log.clone(),
            }))),
        ];

        run_chain(&advisors, &log).unwrap();
        assert_eq!(*log.lock(), vec!["target", "ret_inner", "ret_outer"]);
    }

    #[test]
    fn test_around_short_circuits_when_not_proceeding() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let advisors = vec![
            advisor_of(AdviceRef::Around(Arc::new(RecordingAround {
                name: "wrap".into(),
                log: log.clone(),
                proceed: false,
            }))),
            advisor_of(AdviceRef::Before(Arc::new(RecordingBefore {
                name: "never".into(),
                log: log.clone(),
            }))),
        ];

        run_chain(&advisors, &log).unwrap();

        // 目标与链上后续所有拦截器都不得执行
        assert_eq!(*log.lock(), vec!["wrap-enter", "wrap-exit"]);
    }

    #[test]
    fn test_around_then_before_nesting() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let advisors = vec![
            advisor_of(AdviceRef::Around(Arc::new(RecordingAround {
                name: "around".into(),
                log: log.clone(),
                proceed: true,
            }))),
            advisor_of(AdviceRef::Before(Arc::new(RecordingBefore {
                name: "before".into(),
                log: log.clone(),
            }))),
        ];

        run_chain(&advisors, &log).unwrap();
        assert_eq!(
            *log.lock(),
            vec!["around-enter", "before", "target", "around-exit"]
        );
    }

    #[test]
    fn test_static_mismatch_is_excluded_at_build_time() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let matching: Arc<dyn Advisor> = advisor_of(AdviceRef::Before(Arc::new(RecordingBefore {
            name: "hits".into(),
            log: log.clone(),
        })));
        let missing: Arc<dyn Advisor> = Arc::new(DefaultPointcutAdvisor::new(
            Arc::new(ExpressionPointcut::new(PointcutExpression::MethodPattern(
                "other_*".to_string(),
            ))),
            AdviceRef::Before(Arc::new(RecordingBefore {
                name: "misses".into(),
                log: log.clone(),
            })),
        ));

        run_chain(&[matching, missing], &log).unwrap();
        assert_eq!(*log.lock(), vec!["hits", "target"]);
    }

    #[test]
    fn test_dynamic_entry_rechecked_per_call() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let base: Arc<dyn crate::pointcut::Pointcut> = Arc::new(TruePointcut);
        let dynamic = Arc::new(DynamicPointcut::new(base, "first-arg-true", |args| {
            args.first()
                .and_then(|a| a.downcast_ref::<bool>())
                .copied()
                .unwrap_or(false)
        }));
        let advisor: Arc<dyn Advisor> = Arc::new(DefaultPointcutAdvisor::new(
            dynamic,
            AdviceRef::Before(Arc::new(RecordingBefore {
                name: "guarded".into(),
                log: log.clone(),
            })),
        ));

        let adapters = AdviceAdapterRegistry::default();
        let target = Arc::new(TargetDescriptor::new("Service", &["work"]));
        let method = Arc::new(MethodDescriptor::new("work"));
        let chain =
            interception_chain(&[advisor], &adapters, &method, &target).unwrap();
        assert!(matches!(chain[0], ChainEntry::Dynamic { .. }));

        let terminal_log = log.clone();
        let terminal: TerminalCall = Arc::new(move |_jp| {
            terminal_log.lock().push("target".to_string());
            Ok(Arc::new(()) as InvocationValue)
        });

        // 参数不满足谓词：动态元素被跳过
        let jp = JoinPoint::new(target.clone(), method.clone())
            .with_args(vec![Arc::new(false) as crate::joinpoint::ArgValue]);
        MethodInvocation::new(jp, chain.clone(), terminal.clone())
            .proceed()
            .unwrap();
        assert_eq!(*log.lock(), vec!["target"]);

        log.lock().clear();

        // 参数满足谓词：同一条链在下一次调用中命中
        let jp = JoinPoint::new(target, method)
            .with_args(vec![Arc::new(true) as crate::joinpoint::ArgValue]);
        MethodInvocation::new(jp, chain, terminal).proceed().unwrap();
        assert_eq!(*log.lock(), vec!["guarded", "target"]);
    }

    #[test]
    fn test_error_propagates_through_chain() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let advisors = vec![advisor_of(AdviceRef::After(Arc::new(RecordingAfter {
            name: "finally".into(),
            log: log.clone(),
        })))];

        let adapters = AdviceAdapterRegistry::default();
        let target = Arc::new(TargetDescriptor::new("Service", &["work"]));
        let method = Arc::new(MethodDescriptor::new("work"));
        let chain = interception_chain(&advisors, &adapters, &method, &target).unwrap();

        let terminal: TerminalCall = Arc::new(|_jp| {
            Err(Arc::new(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
                as InvocationError)
        });

        let jp = JoinPoint::new(target, method);
        let result = MethodInvocation::new(jp, chain, terminal).proceed();

        assert!(result.is_err());
        // 后置通知具备 finally 语义：目标抛出也必须执行
        assert_eq!(*log.lock(), vec!["finally"]);
    }
}
